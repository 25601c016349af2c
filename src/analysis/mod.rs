//! Analysis core: aggregation, alignment, statistics and models.
//!
//! Everything here is synchronous and owns no I/O. Failures are typed
//! [`AnalysisError`]s; [`analyze_ticker`] collects them per analysis so one
//! degenerate test never sinks the rest of a ticker.

pub mod aggregate;
pub mod align;
pub mod dataset;
pub mod forest;
pub mod linalg;
pub mod metrics;
pub mod modeling;
pub mod monte_carlo;
pub mod prices;
pub mod stats;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AlignedRow, BenchmarkRow, DailyAggregate, Feature, HourlyPriceBar, Target};
use modeling::{ClassifierReport, ModelFamily, RidgeFit};
use monte_carlo::PermutationResult;
use serde::{Deserialize, Serialize};
use stats::CorrelationPair;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Feature tested for Granger causality and by the permutation test.
pub const PRIMARY_FEATURE: Feature = Feature::SentMean;

/// Everything computed for one ticker. Absent entries failed; the reason is
/// in `failures`, keyed by analysis name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelArtifacts {
    pub n_rows: usize,
    #[serde(default)]
    pub return_correlations: BTreeMap<Feature, CorrelationPair>,
    #[serde(default)]
    pub range_correlations: BTreeMap<Feature, CorrelationPair>,
    pub return_ridge: Option<RidgeFit>,
    pub range_ridge: Option<RidgeFit>,
    pub logistic: Option<ClassifierReport>,
    pub random_forest: Option<ClassifierReport>,
    #[serde(default)]
    pub granger: BTreeMap<usize, f64>,
    pub monte_carlo: Option<PermutationResult>,
    #[serde(default)]
    pub failures: BTreeMap<String, String>,
}

impl ModelArtifacts {
    /// Number of analyses that produced a result.
    pub fn succeeded(&self) -> usize {
        [
            !self.return_correlations.is_empty(),
            !self.range_correlations.is_empty(),
            self.return_ridge.is_some(),
            self.range_ridge.is_some(),
            self.logistic.is_some(),
            self.random_forest.is_some(),
            !self.granger.is_empty(),
            self.monte_carlo.is_some(),
        ]
        .iter()
        .filter(|&&ok| ok)
        .count()
    }

    pub fn classifier(&self, family: ModelFamily) -> Option<&ClassifierReport> {
        match family {
            ModelFamily::Logistic => self.logistic.as_ref(),
            ModelFamily::RandomForest => self.random_forest.as_ref(),
        }
    }

    fn record<T>(&mut self, ticker: &str, name: &str, result: AnalysisResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("{}: {} failed ({}): {}", ticker, name, e.kind(), e);
                self.failures.insert(name.to_string(), e.to_string());
                None
            }
        }
    }
}

/// Hourly bars + aggregates (+ benchmarks) → aligned rows for one ticker.
pub fn prepare_rows(
    ticker: &str,
    aggregates: &[DailyAggregate],
    hourly: &[HourlyPriceBar],
    benchmarks: Option<&[BenchmarkRow]>,
    return_lags: usize,
) -> AnalysisResult<Vec<AlignedRow>> {
    let daily = prices::to_daily(hourly)?;
    let rows = align::align(aggregates, &daily, benchmarks, return_lags);
    if rows.is_empty() {
        return Err(AnalysisError::insufficient(
            format!("alignment for {}", ticker),
            "at least 1 aligned row",
            0,
        ));
    }
    debug!("{}: {} aggregates, {} trading days, {} aligned rows", ticker, aggregates.len(), daily.len(), rows.len());
    Ok(rows)
}

/// Run every analysis for one ticker's aligned rows.
pub fn analyze_ticker(ticker: &str, rows: &[AlignedRow], cfg: &AnalysisConfig) -> ModelArtifacts {
    let mut art = ModelArtifacts {
        n_rows: rows.len(),
        ..Default::default()
    };

    // Correlations are tracked per feature so a constant column only loses
    // its own entry.
    for (target, label) in [(Target::NextReturn, "return"), (Target::NextRange, "range")] {
        for feature in &cfg.features {
            let name = format!("{}_correlation:{}", label, feature);
            let table = stats::correlate(rows, std::slice::from_ref(feature), target);
            if let Some(pair) = art.record(ticker, &name, table).and_then(|mut t| t.remove(feature)) {
                match target {
                    Target::NextReturn => art.return_correlations.insert(feature.clone(), pair),
                    Target::NextRange => art.range_correlations.insert(feature.clone(), pair),
                };
            }
        }
    }

    let fit = modeling::fit_ridge(rows, &cfg.features, Target::NextReturn, cfg.ridge_alpha);
    art.return_ridge = art.record(ticker, "return_ridge", fit);
    let fit = modeling::fit_ridge(rows, &cfg.features, Target::NextRange, cfg.ridge_alpha);
    art.range_ridge = art.record(ticker, "range_ridge", fit);

    let report = modeling::fit_classifier(rows, &cfg.features, Target::NextReturn, ModelFamily::Logistic, cfg);
    art.logistic = art.record(ticker, "logistic", report);
    let report = modeling::fit_classifier(rows, &cfg.features, Target::NextReturn, ModelFamily::RandomForest, cfg);
    art.random_forest = art.record(ticker, "random_forest", report);

    let pvals = stats::granger(rows, &PRIMARY_FEATURE, Target::NextReturn, cfg.granger_max_lag);
    art.granger = art.record(ticker, "granger", pvals).unwrap_or_default();

    let perm = monte_carlo::permutation_test(
        rows,
        &PRIMARY_FEATURE,
        Target::NextReturn,
        cfg.monte_carlo_iterations,
        cfg.ridge_alpha,
        cfg.random_seed,
    );
    art.monte_carlo = art.record(ticker, "monte_carlo", perm);

    debug!("{}: {} analyses succeeded, {} failed", ticker, art.succeeded(), art.failures.len());
    art
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn synthetic_rows(n: usize, seed: u64) -> Vec<AlignedRow> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let s: f64 = rng.gen_range(-1.0..1.0);
                AlignedRow {
                    ticker: "TEST".into(),
                    date: start + chrono::Days::new(i as u64),
                    sent_mean: s,
                    sent_std: rng.gen_range(0.0..0.5),
                    attention: rng.gen_range(1..20),
                    bull_bear_ratio: rng.gen_range(0.0..3.0),
                    ret: 0.0,
                    next_return: 0.01 * s + rng.gen_range(-0.01..0.01),
                    next_range: 0.02 + rng.gen_range(0.0..0.01),
                    ret_lags: vec![],
                    benchmarks: Default::default(),
                }
            })
            .collect()
    }

    fn small_cfg() -> AnalysisConfig {
        let mut cfg = AnalysisConfig::default();
        cfg.forest.n_trees = 30;
        cfg.monte_carlo_iterations = 100;
        cfg
    }

    #[test]
    fn test_full_artifacts_on_healthy_data() {
        let rows = synthetic_rows(120, 1);
        let art = analyze_ticker("TEST", &rows, &small_cfg());
        assert!(art.failures.is_empty(), "{:?}", art.failures);
        assert_eq!(art.succeeded(), 8);
        assert_eq!(art.return_correlations.len(), 4);
        assert_eq!(art.granger.len(), 3);
        assert_eq!(art.n_rows, 120);
    }

    #[test]
    fn test_constant_feature_fails_only_dependent_analyses() {
        let mut rows = synthetic_rows(80, 2);
        for r in &mut rows {
            r.sent_std = 0.25;
        }
        let art = analyze_ticker("TEST", &rows, &small_cfg());

        assert!(art.failures.contains_key("return_correlation:sent_std"));
        assert!(art.failures.contains_key("return_ridge"));
        assert!(art.return_ridge.is_none());
        // sent_mean analyses are unaffected.
        assert!(art.return_correlations.contains_key(&Feature::SentMean));
        assert!(art.monte_carlo.is_some());
        assert!(!art.granger.is_empty());
    }

    #[test]
    fn test_tiny_ticker_records_failures() {
        let rows = synthetic_rows(3, 3);
        let art = analyze_ticker("TEST", &rows, &small_cfg());
        assert!(art.failures.contains_key("granger"));
        assert!(art.granger.is_empty());
    }

    #[test]
    fn test_prepare_rows_end_to_end_scenario() {
        let dt = |d: u32, h: u32| -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 1, d).unwrap().and_hms_opt(h, 30, 0).unwrap()
        };
        let bar = |d: u32, h: u32, open: f64, close: f64| HourlyPriceBar {
            ticker: "TEST".into(),
            datetime: dt(d, h),
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 100,
        };
        let hourly = vec![
            bar(1, 9, 100.0, 101.0),
            bar(1, 15, 101.0, 102.0),
            bar(2, 9, 102.0, 103.0),
            bar(3, 9, 103.0, 101.0),
        ];
        let aggregates: Vec<DailyAggregate> = (1..=3)
            .map(|d| DailyAggregate {
                ticker: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2026, 1, d).unwrap(),
                sent_mean: 0.1 * d as f64,
                sent_std: 0.0,
                attention: 1,
                bull_bear_ratio: 1.0,
            })
            .collect();

        let rows = prepare_rows("TEST", &aggregates, &hourly, None, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[0].next_return - (103.0 / 102.0 - 1.0)).abs() < 1e-12);

        let err = prepare_rows("TEST", &aggregates[2..], &hourly, None, 1).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_artifacts_json_round_trip() {
        let rows = synthetic_rows(60, 4);
        let art = analyze_ticker("TEST", &rows, &small_cfg());
        let json = serde_json::to_string(&art).unwrap();
        let back: ModelArtifacts = serde_json::from_str(&json).unwrap();
        assert_eq!(art, back);
    }
}
