//! Pipeline orchestrator: ties storage → analysis → report together.
//!
//! ## Run modes
//!
//! `run_aggregation()` — reduce stored per-article sentiment into one
//!   `daily_aggregates` row per (ticker, date). Without `overwrite`, an
//!   existing row is a data-integrity violation: it is logged and counted,
//!   never silently replaced. With `overwrite` rows are upserted.
//!
//! `run_analysis()` — per ticker: hourly → daily bars, next-day alignment,
//!   correlations, ridge, classifiers, Granger and the permutation test.
//!   Store reads happen here on the driver; the numeric work runs on the
//!   blocking pool, bounded by `pipeline.concurrency`. A ticker whose
//!   preparation fails, or whose analyses all fail, is recorded as failed
//!   and left out of the report.

use crate::analysis::aggregate::aggregate;
use crate::analysis::{analyze_ticker, prepare_rows, ModelArtifacts};
use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::loader::cleaner::normalise_symbol;
use crate::report::{ReportAggregator, ReportPaths};
use crate::storage::{ConsensusStore, Repository};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Debug, Default)]
pub struct AggregateStats {
    pub tickers_processed: usize,
    pub aggregates_written: usize,
    /// Existing (ticker, date) rows left untouched in strict mode.
    pub duplicates: usize,
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    pub tickers_processed: usize,
    pub analyzed: usize,
    /// (ticker, reason)
    pub failed: Vec<(String, String)>,
    /// Not started because the deadline passed.
    pub skipped: Vec<String>,
    pub report: Option<ReportPaths>,
}

/// Symbols are stored uppercase; user-supplied tickers are matched the same
/// way. Blanks and repeats are dropped, first occurrence wins.
fn normalise_tickers(tickers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tickers.len());
    for t in tickers.iter().map(|t| normalise_symbol(t)) {
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

/// Aggregate every sentiment date of `tickers` within `[from, to]`.
pub fn aggregate_store<S: ConsensusStore + ?Sized>(
    store: &S,
    tickers: &[String],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    overwrite: bool,
) -> Result<AggregateStats> {
    let mut stats = AggregateStats::default();

    for ticker in &normalise_tickers(tickers) {
        let dates: Vec<NaiveDate> = store
            .sentiment_dates(ticker)?
            .into_iter()
            .filter(|d| from.is_none_or(|f| *d >= f) && to.is_none_or(|t| *d <= t))
            .collect();

        let mut aggregates = Vec::with_capacity(dates.len());
        for date in dates {
            let scores = store.sentiment_scores(ticker, date)?;
            if let Some(agg) = aggregate(ticker, date, &scores) {
                aggregates.push(agg);
            }
        }

        if overwrite {
            stats.aggregates_written += store.upsert_daily_aggregates(&aggregates)?;
        } else {
            for agg in &aggregates {
                match store.insert_daily_aggregate(agg) {
                    Ok(()) => stats.aggregates_written += 1,
                    Err(e) if matches!(e.downcast_ref::<AnalysisError>(), Some(AnalysisError::DataIntegrity(_))) => {
                        warn!("{}: {:#}", ticker, e);
                        stats.duplicates += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!("{}: {} daily aggregates", ticker, aggregates.len());
        stats.tickers_processed += 1;
    }

    Ok(stats)
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn open_store(&self) -> Result<Repository> {
        let repo = Repository::open(&self.config.storage.db_path).context("Failed to open DuckDB")?;
        if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }
        Ok(repo)
    }

    /// Empty `tickers` means every ticker with stored sentiment.
    pub fn run_aggregation(
        &self,
        tickers: &[String],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        overwrite: bool,
    ) -> Result<AggregateStats> {
        let repo = self.open_store()?;
        let tickers = if tickers.is_empty() {
            repo.sentiment_tickers()?
        } else {
            tickers.to_vec()
        };

        info!("=== Aggregating sentiment for {} tickers ===", tickers.len());
        let stats = aggregate_store(&repo, &tickers, from, to, overwrite)?;
        info!(
            "=== Done: {} tickers | {} aggregates | {} duplicates ===",
            stats.tickers_processed, stats.aggregates_written, stats.duplicates
        );
        Ok(stats)
    }

    /// Empty `tickers` means `pipeline.tickers` from configuration.
    pub async fn run_analysis(&self, tickers: &[String], output_dir: &Path) -> Result<PipelineStats> {
        let repo = self.open_store()?;
        let tickers = if tickers.is_empty() {
            self.config.pipeline.tickers.clone()
        } else {
            tickers.to_vec()
        };

        let run_id = repo.begin_analysis_run().unwrap_or(0);

        info!("=== Analyzing {} tickers ===", tickers.len());
        let (aggregator, mut stats) = match self.analyze_store(&repo, &tickers).await {
            Ok(v) => v,
            Err(e) => {
                repo.finish_analysis_run(run_id, 0, 0, None, Some(format!("{:#}", e).as_str())).ok();
                return Err(e);
            }
        };

        if aggregator.is_empty() {
            warn!("No ticker produced results; no report written");
        } else {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
            stats.report = Some(aggregator.write_all(output_dir, &stamp)?);
        }

        let report_path = stats.report.as_ref().map(|p| p.text.display().to_string());
        repo.finish_analysis_run(
            run_id,
            stats.analyzed,
            stats.failed.len(),
            report_path.as_deref(),
            if stats.analyzed == 0 { Some("no ticker analyzed") } else { None },
        )
        .ok();

        info!(
            "=== Done: {} tickers | {} analyzed | {} failed | {} skipped ===",
            stats.tickers_processed,
            stats.analyzed,
            stats.failed.len(),
            stats.skipped.len()
        );
        Ok(stats)
    }

    /// Analyze `tickers` from `store` and collect the reportable ones.
    pub async fn analyze_store<S: ConsensusStore + ?Sized>(
        &self,
        store: &S,
        tickers: &[String],
    ) -> Result<(ReportAggregator, PipelineStats)> {
        let tickers = normalise_tickers(tickers);
        let cfg = Arc::new(self.config.analysis.clone());
        let benchmarks = store.benchmark_rows().context("Failed to read benchmark returns")?;
        let benchmarks = if benchmarks.is_empty() {
            None
        } else {
            info!("{} benchmark return rows available", benchmarks.len());
            Some(Arc::new(benchmarks))
        };

        let deadline = self
            .config
            .pipeline
            .deadline_secs
            .map(|s| Instant::now() + Duration::from_secs(s));

        let sem = Arc::new(Semaphore::new(self.config.pipeline.concurrency));
        let mut stats = PipelineStats {
            tickers_processed: tickers.len(),
            ..Default::default()
        };
        let mut handles = Vec::new();

        for ticker in &tickers {
            // Waiting for a slot first means the deadline check below sees
            // the time the ticker would actually start.
            let permit = Arc::clone(&sem).acquire_owned().await?;
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!("{}: deadline passed, not started", ticker);
                stats.skipped.push(ticker.clone());
                continue;
            }

            let aggregates = match store.daily_aggregates(ticker) {
                Ok(a) => a,
                Err(e) => {
                    warn!("{}: {:#}", ticker, e);
                    stats.failed.push((ticker.clone(), format!("{:#}", e)));
                    continue;
                }
            };
            let hourly = match store.hourly_bars(ticker) {
                Ok(b) => b,
                Err(e) => {
                    warn!("{}: {:#}", ticker, e);
                    stats.failed.push((ticker.clone(), format!("{:#}", e)));
                    continue;
                }
            };

            let task_ticker = ticker.clone();
            let cfg = Arc::clone(&cfg);
            let benchmarks = benchmarks.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let ticker = task_ticker;
                let rows = prepare_rows(
                    &ticker,
                    &aggregates,
                    &hourly,
                    benchmarks.as_deref().map(Vec::as_slice),
                    cfg.return_lags,
                )?;
                info!("{}: {} aligned rows", ticker, rows.len());
                Ok::<ModelArtifacts, AnalysisError>(analyze_ticker(&ticker, &rows, &cfg))
            });

            handles.push((ticker.clone(), handle));
        }

        let mut aggregator = ReportAggregator::new(self.config.signal.clone(), self.config.analysis.significance_level);
        for (ticker, handle) in handles {
            match handle.await {
                Ok(Ok(artifacts)) => {
                    let n_failed = artifacts.failures.len();
                    if aggregator.add_ticker(&ticker, artifacts) {
                        info!("{}: analyzed ({} analyses failed)", ticker, n_failed);
                        stats.analyzed += 1;
                    } else {
                        warn!("{}: every analysis failed", ticker);
                        stats.failed.push((ticker, "every analysis failed".to_string()));
                    }
                }
                Ok(Err(e)) => {
                    warn!("{}: {} ({})", ticker, e, e.kind());
                    stats.failed.push((ticker, e.to_string()));
                }
                Err(e) => {
                    error!("Task panic for {}: {}", ticker, e);
                    stats.failed.push((ticker, format!("task panic: {}", e)));
                }
            }
        }

        Ok((aggregator, stats))
    }
}
