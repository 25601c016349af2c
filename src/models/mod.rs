use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ── Sentiment ─────────────────────────────────────────────────────────────────

/// Classifier output for one article.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SentimentScore {
    pub score: f64,    // [-1, 1]
    pub positive: f64, // [0, 1]
    pub neutral: f64,
    pub negative: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentRecord {
    pub ticker: String,
    pub date: NaiveDate,
    pub sentiment: SentimentScore,
}

/// Daily consensus features for one (ticker, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAggregate {
    pub ticker: String,
    pub date: NaiveDate,
    pub sent_mean: f64,
    pub sent_std: f64,
    pub attention: u32,
    pub bull_bear_ratio: f64,
}

// ── Prices ────────────────────────────────────────────────────────────────────

/// Intraday bar. `datetime` is exchange-local wall-clock time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyPriceBar {
    pub ticker: String,
    pub datetime: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyPriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    #[serde(rename = "return")]
    pub ret: f64,
    pub range: f64,
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

/// Daily close of an index/ETF (SPY, ^VIX, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkClose {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchmarkRow {
    pub symbol: String,
    pub date: NaiveDate,
    #[serde(rename = "return")]
    pub ret: f64,
}

/// Column name a benchmark symbol is pivoted into: "^VIX" → "vix_return".
pub fn benchmark_column(symbol: &str) -> String {
    format!("{}_return", symbol.trim().trim_start_matches('^').to_lowercase())
}

// ── Aligned rows ──────────────────────────────────────────────────────────────

/// One day of sentiment joined with the following trading day's outcome.
/// `next_return` / `next_range` are always defined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedRow {
    pub ticker: String,
    pub date: NaiveDate,
    pub sent_mean: f64,
    pub sent_std: f64,
    pub attention: u32,
    pub bull_bear_ratio: f64,
    pub ret: f64,
    pub next_return: f64,
    pub next_range: f64,
    /// `ret_lags[k - 1]` is the return k trading days earlier.
    pub ret_lags: Vec<Option<f64>>,
    /// Benchmark column → same-date return, `None` when that date is missing.
    pub benchmarks: BTreeMap<String, Option<f64>>,
}

impl AlignedRow {
    pub fn feature(&self, feature: &Feature) -> Option<f64> {
        match feature {
            Feature::SentMean => Some(self.sent_mean),
            Feature::SentStd => Some(self.sent_std),
            Feature::Attention => Some(self.attention as f64),
            Feature::BullBearRatio => Some(self.bull_bear_ratio),
            Feature::Return => Some(self.ret),
            Feature::ReturnLag(k) => self.ret_lags.get(k.checked_sub(1)?).copied().flatten(),
            Feature::Benchmark(col) => self.benchmarks.get(col).copied().flatten(),
        }
    }

    pub fn target(&self, target: Target) -> f64 {
        match target {
            Target::NextReturn => self.next_return,
            Target::NextRange => self.next_range,
        }
    }
}

/// A named model input column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Feature {
    SentMean,
    SentStd,
    Attention,
    BullBearRatio,
    Return,
    ReturnLag(usize),
    Benchmark(String),
}

impl Feature {
    /// The four consensus features every analysis uses by default.
    pub fn sentiment_set() -> Vec<Feature> {
        vec![
            Feature::SentMean,
            Feature::SentStd,
            Feature::Attention,
            Feature::BullBearRatio,
        ]
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::SentMean => f.write_str("sent_mean"),
            Feature::SentStd => f.write_str("sent_std"),
            Feature::Attention => f.write_str("attention"),
            Feature::BullBearRatio => f.write_str("bull_bear_ratio"),
            Feature::Return => f.write_str("return"),
            Feature::ReturnLag(k) => write!(f, "ret_lag_{}", k),
            Feature::Benchmark(col) => f.write_str(col),
        }
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "sent_mean" => Ok(Feature::SentMean),
            "sent_std" => Ok(Feature::SentStd),
            "attention" => Ok(Feature::Attention),
            "bull_bear_ratio" => Ok(Feature::BullBearRatio),
            "return" => Ok(Feature::Return),
            _ => {
                if let Some(k) = s.strip_prefix("ret_lag_") {
                    return match k.parse::<usize>() {
                        Ok(k) if k > 0 => Ok(Feature::ReturnLag(k)),
                        _ => Err(format!("invalid lag in feature {:?}", s)),
                    };
                }
                if s.len() > "_return".len() && s.ends_with("_return") {
                    return Ok(Feature::Benchmark(s.to_string()));
                }
                Err(format!("unknown feature {:?}", s))
            }
        }
    }
}

impl TryFrom<String> for Feature {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Feature> for String {
    fn from(f: Feature) -> Self {
        f.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    NextReturn,
    NextRange,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::NextReturn => f.write_str("next_return"),
            Target::NextRange => f.write_str("next_range"),
        }
    }
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Sentiment export: ticker, date, score, positive, neutral, negative
#[derive(Debug, Clone, Default)]
pub struct RawSentimentRow {
    pub ticker: Option<String>,
    pub date: Option<String>,
    pub score: Option<String>,
    pub positive: Option<String>,
    pub neutral: Option<String>,
    pub negative: Option<String>,
}

/// yfinance hourly CSV: Ticker, Datetime, Open, High, Low, Close, Volume
#[derive(Debug, Clone, Default)]
pub struct RawHourlyRow {
    pub ticker: Option<String>,
    pub datetime: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
}

/// Benchmark closes: symbol, date, close
#[derive(Debug, Clone, Default)]
pub struct RawBenchmarkRow {
    pub symbol: Option<String>,
    pub date: Option<String>,
    pub close: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names_roundtrip() {
        for name in ["sent_mean", "sent_std", "attention", "bull_bear_ratio", "return", "ret_lag_3", "spy_return"] {
            let f: Feature = name.parse().unwrap();
            assert_eq!(f.to_string(), name);
        }
        assert!("ret_lag_0".parse::<Feature>().is_err());
        assert!("_return".parse::<Feature>().is_err());
        assert!("volume".parse::<Feature>().is_err());
    }

    #[test]
    fn test_benchmark_column() {
        assert_eq!(benchmark_column("SPY"), "spy_return");
        assert_eq!(benchmark_column("^VIX"), "vix_return");
    }

    #[test]
    fn test_row_feature_lookup() {
        let mut benchmarks = BTreeMap::new();
        benchmarks.insert("spy_return".to_string(), None);
        let row = AlignedRow {
            ticker: "TEST".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            sent_mean: 0.5,
            sent_std: 0.1,
            attention: 4,
            bull_bear_ratio: 1.5,
            ret: 0.01,
            next_return: -0.02,
            next_range: 0.03,
            ret_lags: vec![Some(0.02), None],
            benchmarks,
        };
        assert_eq!(row.feature(&Feature::Attention), Some(4.0));
        assert_eq!(row.feature(&Feature::ReturnLag(1)), Some(0.02));
        assert_eq!(row.feature(&Feature::ReturnLag(2)), None);
        assert_eq!(row.feature(&Feature::ReturnLag(5)), None);
        assert_eq!(row.feature(&Feature::Benchmark("spy_return".into())), None);
        assert_eq!(row.target(Target::NextRange), 0.03);
    }
}
