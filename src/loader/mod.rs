//! CSV loaders for sentiment exports, yfinance hourly bars and benchmark
//! closes.
//!
//! Columns are located by header name (case-insensitive), so column order
//! and extra columns do not matter. A malformed row aborts the file with a
//! [`AnalysisError::DataIntegrity`] naming the file and line.

pub mod cleaner;

use crate::error::AnalysisError;
use crate::models::{
    BenchmarkClose, HourlyPriceBar, RawBenchmarkRow, RawHourlyRow, RawSentimentRow, SentimentRecord,
};
use anyhow::{Context, Result};
use cleaner::{benchmark_row_to_close, hourly_row_to_bar, sentiment_row_to_record};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extract symbol from CSV filename: "AAPL_hourly.csv" → "AAPL".
pub fn extract_symbol_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let symbol = stem
        .split(['_', ' ', '.'])
        .next()?
        .trim()
        .to_uppercase();

    if symbol.is_empty() { None } else { Some(symbol) }
}

/// Header name → column index, lowercased.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
                .collect(),
        )
    }

    /// First of `names` present in the header.
    fn get(&self, record: &StringRecord, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|n| self.0.get(*n))
            .and_then(|&i| record.get(i))
            .map(str::to_string)
    }

    fn require(&self, path: &Path, names: &[&str]) -> Result<()> {
        if names.iter().any(|n| self.0.contains_key(*n)) {
            Ok(())
        } else {
            Err(AnalysisError::integrity(format!("{}: missing column {:?}", path.display(), names[0])).into())
        }
    }
}

/// Read every record of `path`, converting with `convert`; stops at the
/// first bad row.
fn read_rows<T>(
    path: &Path,
    required: &[&[&str]],
    mut convert: impl FnMut(&Columns, &StringRecord) -> std::result::Result<T, String>,
) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Cannot open {:?}", path))?;

    let cols = Columns::new(reader.headers().with_context(|| format!("No header in {:?}", path))?);
    for names in required {
        cols.require(path, names)?;
    }

    let mut out = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AnalysisError::integrity(format!("{}: {}", path.display(), e)))?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row = convert(&cols, &record)
            .map_err(|reason| AnalysisError::integrity(format!("{}:{}: {}", path.display(), line, reason)))?;
        out.push(row);
    }
    Ok(out)
}

/// `ticker,date,score,positive,neutral,negative`
pub fn load_sentiment_csv(path: &Path) -> Result<Vec<SentimentRecord>> {
    debug!("Loading sentiment from {:?}", path);
    let records = read_rows(
        path,
        &[&["ticker", "symbol"], &["date"], &["score"], &["positive"], &["neutral"], &["negative"]],
        |c, r| {
            sentiment_row_to_record(&RawSentimentRow {
                ticker: c.get(r, &["ticker", "symbol"]),
                date: c.get(r, &["date"]),
                score: c.get(r, &["score"]),
                positive: c.get(r, &["positive"]),
                neutral: c.get(r, &["neutral"]),
                negative: c.get(r, &["negative"]),
            })
        },
    )?;
    info!("{:?}: {} sentiment records loaded", path, records.len());
    Ok(records)
}

/// yfinance layout `Ticker,Datetime,Open,High,Low,Close,Volume`. Without a
/// ticker column the symbol comes from the filename.
pub fn load_hourly_csv(path: &Path) -> Result<Vec<HourlyPriceBar>> {
    let fallback = extract_symbol_from_filename(path);
    debug!("Loading hourly bars from {:?} (fallback symbol {:?})", path, fallback);

    let bars = read_rows(
        path,
        &[&["datetime", "date"], &["open"], &["high"], &["low"], &["close"]],
        |c, r| {
            hourly_row_to_bar(
                fallback.as_deref(),
                &RawHourlyRow {
                    ticker: c.get(r, &["ticker", "symbol"]),
                    datetime: c.get(r, &["datetime", "date"]),
                    open: c.get(r, &["open"]),
                    high: c.get(r, &["high"]),
                    low: c.get(r, &["low"]),
                    close: c.get(r, &["close"]),
                    volume: c.get(r, &["volume"]),
                },
            )
        },
    )?;
    info!("{:?}: {} hourly bars loaded", path, bars.len());
    Ok(bars)
}

/// `symbol,date,close`
pub fn load_benchmark_csv(path: &Path) -> Result<Vec<BenchmarkClose>> {
    let closes = read_rows(
        path,
        &[&["symbol", "ticker"], &["date"], &["close", "adj close"]],
        |c, r| {
            benchmark_row_to_close(&RawBenchmarkRow {
                symbol: c.get(r, &["symbol", "ticker"]),
                date: c.get(r, &["date"]),
                close: c.get(r, &["close", "adj close"]),
            })
        },
    )?;
    info!("{:?}: {} benchmark closes loaded", path, closes.len());
    Ok(closes)
}

/// `*.csv` files directly under `dir`, sorted by name.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(vec![]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Cannot list {:?}", dir))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map(|e| e == "csv").unwrap_or(false) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// A single file as-is, or the CSV files of a directory.
pub fn csv_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        discover_csv_files(path)
    } else {
        anyhow::ensure!(path.exists(), "{:?} does not exist", path);
        Ok(vec![path.to_path_buf()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("consensus_loader_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_extract_symbol_from_filename() {
        assert_eq!(extract_symbol_from_filename(Path::new("data/aapl_hourly.csv")), Some("AAPL".into()));
        assert_eq!(extract_symbol_from_filename(Path::new("TSLA.csv")), Some("TSLA".into()));
    }

    #[test]
    fn test_load_sentiment_csv() {
        let dir = temp_dir("sentiment");
        let path = dir.join("news.csv");
        fs::write(
            &path,
            "ticker,date,score,positive,neutral,negative,title\n\
             AAPL,2025-01-02,0.8,0.85,0.1,0.05,Beat\n\
             aapl,2025-01-02,-0.6,0.1,0.2,0.7,Miss\n\
             \n\
             MSFT,2025-01-03,0.0,0.2,0.6,0.2,Flat\n",
        )
        .unwrap();

        let recs = load_sentiment_csv(&path).unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[1].ticker, "AAPL");
        assert_eq!(recs[2].date, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let dir = temp_dir("malformed");
        let path = dir.join("news.csv");
        fs::write(
            &path,
            "ticker,date,score,positive,neutral,negative\n\
             AAPL,2025-01-02,0.8,0.85,0.1,0.05\n\
             AAPL,not-a-date,0.8,0.85,0.1,0.05\n",
        )
        .unwrap();

        let err = load_sentiment_csv(&path).unwrap_err();
        let typed = err.downcast_ref::<AnalysisError>().unwrap();
        assert!(matches!(typed, AnalysisError::DataIntegrity(_)));
        assert!(err.to_string().contains(":3:"), "{}", err);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_column_is_integrity_error() {
        let dir = temp_dir("missing_col");
        let path = dir.join("bench.csv");
        fs::write(&path, "symbol,date\nSPY,2025-01-02\n").unwrap();
        let err = load_benchmark_csv(&path).unwrap_err();
        assert!(err.downcast_ref::<AnalysisError>().is_some());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_hourly_yfinance_layout() {
        let dir = temp_dir("hourly");
        let path = dir.join("NVDA_1h.csv");
        fs::write(
            &path,
            "Datetime,Open,High,Low,Close,Volume\n\
             2025-01-02 09:30:00-05:00,100.0,101.5,99.5,101.0,120000\n\
             2025-01-02 10:30:00-05:00,101.0,102.0,100.5,101.8,95000\n",
        )
        .unwrap();

        let bars = load_hourly_csv(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ticker, "NVDA");
        assert_eq!(bars[0].datetime.to_string(), "2025-01-02 09:30:00");

        let files = csv_inputs(&dir).unwrap();
        assert_eq!(files, vec![path.clone()]);
        assert_eq!(csv_inputs(&path).unwrap(), vec![path]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_benchmark_csv() {
        let dir = temp_dir("bench");
        let path = dir.join("benchmarks.csv");
        fs::write(&path, "symbol,date,close\nSPY,2025-01-02,590.1\n^VIX,2025-01-02,17.9\n").unwrap();
        let closes = load_benchmark_csv(&path).unwrap();
        assert_eq!(closes.len(), 2);
        assert_eq!(closes[1].symbol, "^VIX");
        fs::remove_dir_all(&dir).ok();
    }
}
