mod analysis;
mod config;
mod error;
mod loader;
mod models;
mod pipeline;
mod report;
mod storage;
mod utils;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::AppConfig;
use crate::loader::{csv_inputs, load_benchmark_csv, load_hourly_csv, load_sentiment_csv};
use crate::pipeline::Pipeline;
use crate::storage::Repository;

#[derive(Parser)]
#[command(
    name = "consensus-impact",
    about = "Daily news-sentiment consensus vs next-day price movement",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Apply schema migrations without loading data
    Migrate,

    /// Import per-article sentiment (ticker,date,score,positive,neutral,negative)
    LoadNews {
        /// CSV file or directory of CSV files
        path: PathBuf,
    },

    /// Import hourly OHLCV bars (yfinance layout)
    LoadPrices {
        /// CSV file or directory of CSV files (default: data/prices)
        #[arg(default_value = "data/prices")]
        path: PathBuf,
    },

    /// Import benchmark daily closes (symbol,date,close)
    LoadBenchmarks {
        path: PathBuf,
    },

    /// Build daily sentiment aggregates
    Aggregate {
        /// Restrict to these tickers (repeatable; default: all with sentiment)
        #[arg(short, long = "ticker")]
        tickers: Vec<String>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        /// Replace existing aggregates instead of reporting them as duplicates
        #[arg(long)]
        overwrite: bool,
    },

    /// Run the per-ticker analysis and write reports
    Analyze {
        /// Restrict to these tickers (repeatable; default: pipeline.tickers)
        #[arg(short, long = "ticker")]
        tickers: Vec<String>,

        /// Overrides report.output_dir
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show database statistics
    Stats,
}

/// Run `load` on every CSV under `path`; a bad file is logged and counted,
/// the rest still load.
fn load_each<T>(
    path: &Path,
    load: impl Fn(&Path) -> Result<Vec<T>>,
    mut store: impl FnMut(&Path, &[T]) -> Result<usize>,
) -> Result<(usize, usize)> {
    let files = csv_inputs(path)?;
    info!("Found {} CSV files in {:?}", files.len(), path);

    let mut total = 0usize;
    let mut errors = 0usize;
    for file in &files {
        match load(file).and_then(|rows| store(file, &rows)) {
            Ok(n) => total += n,
            Err(e) => {
                warn!("Error loading {:?}: {:#}", file, e);
                errors += 1;
            }
        }
    }
    Ok((total, errors))
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "consensus_impact=info,warn",
        1 => "consensus_impact=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }

        Command::LoadNews { path } => {
            let _t = utils::Timer::start("Sentiment import");
            let repo = open_repo(&config)?;
            let (n, errors) = load_each(&path, load_sentiment_csv, |file, rows| {
                repo.replace_sentiment(&file.display().to_string(), rows)
            })?;
            info!("Done: {} sentiment records, {} errors", n, errors);
        }

        Command::LoadPrices { path } => {
            let _t = utils::Timer::start("Hourly price import");
            let repo = open_repo(&config)?;
            let (n, errors) = load_each(&path, load_hourly_csv, |_, rows| repo.upsert_hourly_bars(rows))?;
            info!("Done: {} hourly bars, {} errors", n, errors);
        }

        Command::LoadBenchmarks { path } => {
            let _t = utils::Timer::start("Benchmark import");
            let repo = open_repo(&config)?;
            let (n, errors) = load_each(&path, load_benchmark_csv, |_, rows| repo.upsert_benchmark_closes(rows))?;
            info!("Done: {} benchmark closes, {} errors", n, errors);
        }

        Command::Aggregate { tickers, from, to, overwrite } => {
            let _t = utils::Timer::start("Daily aggregation");
            let stats = Pipeline::new(config).run_aggregation(&tickers, from, to, overwrite)?;
            info!(
                "Done: {} tickers, {} aggregates, {} duplicates",
                stats.tickers_processed, stats.aggregates_written, stats.duplicates
            );
        }

        Command::Analyze { tickers, output_dir } => {
            let _t = utils::Timer::start("Consensus impact analysis");
            let output_dir = output_dir.unwrap_or_else(|| config.report.output_dir.clone());
            let stats = Pipeline::new(config).run_analysis(&tickers, &output_dir).await?;
            for (ticker, reason) in &stats.failed {
                warn!("failed {}: {}", ticker, reason);
            }
            if let Some(paths) = &stats.report {
                println!("Report : {}", paths.text.display());
                println!("CSV    : {}", paths.csv.display());
                println!("JSON   : {}", paths.json.display());
            }
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let c = repo.counts()?;
            println!("─────────────────────────────────");
            println!("  Consensus Impact — Database Stats");
            println!("─────────────────────────────────");
            println!("  Tickers     : {}", utils::fmt_number(c.tickers));
            println!("  Articles    : {}", utils::fmt_number(c.sentiment_records));
            println!("  Aggregates  : {}", utils::fmt_number(c.daily_aggregates));
            println!("  Hourly bars : {}", utils::fmt_number(c.hourly_bars));
            println!("  Benchmarks  : {}", utils::fmt_number(c.benchmark_rows));
            println!("  From        : {}", utils::fmt_date(c.first_date));
            println!("  To          : {}", utils::fmt_date(c.last_date));
            println!("  Last run    : {}", repo.last_run_status()?.unwrap_or_else(|| "—".into()));
            println!("─────────────────────────────────");
        }
    }

    Ok(())
}
