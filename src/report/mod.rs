//! Cross-ticker summaries, signal scoring and report artifacts.
//!
//! Three files are produced per run: a human-readable text report (also
//! emitted through `tracing`), a flat CSV with one row per ticker, and a
//! detailed JSON export that [`load_json`] can read back.

use crate::analysis::modeling::ModelFamily;
use crate::analysis::ModelArtifacts;
use crate::config::SignalConfig;
use crate::models::Feature;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// ── Signal quality ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalQuality {
    Weak,
    Moderate,
    Strong,
}

impl SignalQuality {
    /// 0–1 points ⇒ WEAK, 2 ⇒ MODERATE, 3+ ⇒ STRONG.
    pub fn from_score(score: u8) -> Self {
        match score {
            0 | 1 => SignalQuality::Weak,
            2 => SignalQuality::Moderate,
            _ => SignalQuality::Strong,
        }
    }
}

impl fmt::Display for SignalQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalQuality::Weak => f.write_str("WEAK"),
            SignalQuality::Moderate => f.write_str("MODERATE"),
            SignalQuality::Strong => f.write_str("STRONG"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAssessment {
    pub score: u8,
    pub quality: SignalQuality,
    /// Which criteria contributed a point.
    pub factors: Vec<String>,
}

pub fn assess_signal(art: &ModelArtifacts, cfg: &SignalConfig, significance: f64) -> SignalAssessment {
    let mut factors = Vec::new();

    if !art.return_correlations.is_empty() {
        let mean_abs = art.return_correlations.values().map(|c| c.pearson.abs()).sum::<f64>()
            / art.return_correlations.len() as f64;
        if mean_abs > cfg.corr_threshold {
            factors.push(format!("mean |pearson| {:.3} > {:.2}", mean_abs, cfg.corr_threshold));
        }
    }

    if let Some(rf) = &art.random_forest {
        if rf.test.accuracy > cfg.accuracy_threshold && rf.test.roc_auc > cfg.auc_threshold {
            factors.push(format!(
                "random forest test accuracy {:.3} / AUC {:.3}",
                rf.test.accuracy, rf.test.roc_auc
            ));
        }
    }

    if let Some((lag, p)) = art.granger.iter().find(|(_, p)| **p < significance) {
        factors.push(format!("granger lag {} p={:.4}", lag, p));
    }

    if let Some(mc) = art.monte_carlo.as_ref().filter(|mc| mc.is_significant(significance)) {
        factors.push(format!("permutation p={:.4}", mc.p_value));
    }

    let score = factors.len() as u8;
    SignalAssessment {
        score,
        quality: SignalQuality::from_score(score),
        factors,
    }
}

// ── Cross-ticker summaries ────────────────────────────────────────────────────

/// Mean and population standard deviation with range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            n: values.len(),
            mean,
            std: var.sqrt(),
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationSummary {
    pub pearson: Summary,
    pub spearman: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientSummary {
    pub summary: Summary,
    /// "positive" / "negative" when every ticker agrees, else "mixed".
    pub consensus_sign: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSummary {
    pub test_accuracy: Summary,
    pub test_auc: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub n_tested: usize,
    pub n_significant: usize,
    pub mean_p: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationSummary {
    pub test: TestSummary,
    pub mean_real_coefficient: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossTickerSummary {
    pub correlations: BTreeMap<Feature, CorrelationSummary>,
    pub ridge_coefficients: BTreeMap<Feature, CoefficientSummary>,
    /// Keyed by model family name.
    pub classifiers: BTreeMap<String, ClassifierSummary>,
    pub granger: BTreeMap<usize, TestSummary>,
    pub permutation: Option<PermutationSummary>,
}

fn consensus_sign(values: &[f64]) -> String {
    if values.iter().all(|v| *v > 0.0) {
        "positive".into()
    } else if values.iter().all(|v| *v < 0.0) {
        "negative".into()
    } else {
        "mixed".into()
    }
}

fn test_summary(p_values: &[f64], significance: f64) -> Option<TestSummary> {
    let s = Summary::from_values(p_values)?;
    Some(TestSummary {
        n_tested: s.n,
        n_significant: p_values.iter().filter(|p| **p < significance).count(),
        mean_p: s.mean,
    })
}

// ── Aggregator ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerReport {
    pub artifacts: ModelArtifacts,
    pub signal: SignalAssessment,
}

/// On-disk shape of the detailed JSON export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedExport {
    pub generated_at: String,
    pub significance_level: f64,
    pub tickers: BTreeMap<String, TickerReport>,
    pub summary: CrossTickerSummary,
}

#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub text: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
}

pub struct ReportAggregator {
    signal: SignalConfig,
    significance: f64,
    tickers: BTreeMap<String, TickerReport>,
}

impl ReportAggregator {
    pub fn new(signal: SignalConfig, significance: f64) -> Self {
        Self {
            signal,
            significance,
            tickers: BTreeMap::new(),
        }
    }

    /// Returns false (and keeps nothing) when no analysis succeeded.
    pub fn add_ticker(&mut self, ticker: &str, artifacts: ModelArtifacts) -> bool {
        if artifacts.succeeded() == 0 {
            return false;
        }
        let signal = assess_signal(&artifacts, &self.signal, self.significance);
        self.tickers
            .insert(ticker.to_string(), TickerReport { artifacts, signal });
        true
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn ticker(&self, ticker: &str) -> Option<&TickerReport> {
        self.tickers.get(ticker)
    }

    pub fn summary(&self) -> CrossTickerSummary {
        let arts: Vec<&ModelArtifacts> = self.tickers.values().map(|t| &t.artifacts).collect();
        let mut out = CrossTickerSummary::default();

        let features: BTreeSet<&Feature> = arts.iter().flat_map(|a| a.return_correlations.keys()).collect();
        for feature in features {
            let pairs: Vec<_> = arts.iter().filter_map(|a| a.return_correlations.get(feature)).collect();
            let pearson: Vec<f64> = pairs.iter().map(|p| p.pearson).collect();
            let spearman: Vec<f64> = pairs.iter().map(|p| p.spearman).collect();
            if let (Some(pearson), Some(spearman)) = (Summary::from_values(&pearson), Summary::from_values(&spearman)) {
                out.correlations
                    .insert(feature.clone(), CorrelationSummary { pearson, spearman });
            }
        }

        let features: BTreeSet<&Feature> = arts
            .iter()
            .filter_map(|a| a.return_ridge.as_ref())
            .flat_map(|r| r.coefficients.keys())
            .collect();
        for feature in features {
            let coefs: Vec<f64> = arts
                .iter()
                .filter_map(|a| a.return_ridge.as_ref()?.coefficients.get(feature).copied())
                .collect();
            if let Some(summary) = Summary::from_values(&coefs) {
                out.ridge_coefficients.insert(
                    feature.clone(),
                    CoefficientSummary {
                        summary,
                        consensus_sign: consensus_sign(&coefs),
                    },
                );
            }
        }

        for family in [ModelFamily::Logistic, ModelFamily::RandomForest] {
            let reports: Vec<_> = arts.iter().filter_map(|a| a.classifier(family)).collect();
            let acc: Vec<f64> = reports.iter().map(|r| r.test.accuracy).collect();
            let auc: Vec<f64> = reports.iter().map(|r| r.test.roc_auc).collect();
            if let (Some(test_accuracy), Some(test_auc)) = (Summary::from_values(&acc), Summary::from_values(&auc)) {
                out.classifiers
                    .insert(family.to_string(), ClassifierSummary { test_accuracy, test_auc });
            }
        }

        let lags: BTreeSet<usize> = arts.iter().flat_map(|a| a.granger.keys().copied()).collect();
        for lag in lags {
            let pvals: Vec<f64> = arts.iter().filter_map(|a| a.granger.get(&lag).copied()).collect();
            if let Some(s) = test_summary(&pvals, self.significance) {
                out.granger.insert(lag, s);
            }
        }

        let perms: Vec<_> = arts.iter().filter_map(|a| a.monte_carlo.as_ref()).collect();
        let pvals: Vec<f64> = perms.iter().map(|m| m.p_value).collect();
        out.permutation = test_summary(&pvals, self.significance).map(|test| PermutationSummary {
            test,
            mean_real_coefficient: perms.iter().map(|m| m.real_coefficient).sum::<f64>() / perms.len() as f64,
        });

        out
    }

    // ── Text ─────────────────────────────────────────────────────────────────

    pub fn render_text(&self, generated_at: &str) -> String {
        let summary = self.summary();
        let mut s = String::new();
        let rule = "─".repeat(64);

        let _ = writeln!(s, "{}", rule);
        let _ = writeln!(s, "  Consensus Impact Analysis  ({})", generated_at);
        let _ = writeln!(s, "{}", rule);
        let _ = writeln!(s, "  Tickers analyzed : {}", self.tickers.len());
        let _ = writeln!(s, "  Significance     : {}", self.significance);
        let _ = writeln!(s);

        let _ = writeln!(s, "Signal quality");
        for (ticker, t) in &self.tickers {
            let _ = writeln!(
                s,
                "  {:<8} {:<9} score {}  rows {:>5}  failed {}",
                ticker,
                t.signal.quality,
                t.signal.score,
                t.artifacts.n_rows,
                t.artifacts.failures.len()
            );
            for factor in &t.signal.factors {
                let _ = writeln!(s, "           + {}", factor);
            }
        }
        let _ = writeln!(s);

        let _ = writeln!(s, "Correlation with next-day return (Pearson | Spearman, mean ± std)");
        for (feature, c) in &summary.correlations {
            let _ = writeln!(
                s,
                "  {:<18} {:>7.4} ± {:.4} | {:>7.4} ± {:.4}   [{:.4}, {:.4}]",
                feature.to_string(),
                c.pearson.mean,
                c.pearson.std,
                c.spearman.mean,
                c.spearman.std,
                c.pearson.min,
                c.pearson.max
            );
        }
        let _ = writeln!(s);

        let _ = writeln!(s, "Ridge coefficients on next-day return");
        for (feature, c) in &summary.ridge_coefficients {
            let _ = writeln!(
                s,
                "  {:<18} {:>10.6} ± {:.6}  ({})",
                feature.to_string(),
                c.summary.mean,
                c.summary.std,
                c.consensus_sign
            );
        }
        let _ = writeln!(s);

        let _ = writeln!(s, "Direction classifiers (test split)");
        for (family, c) in &summary.classifiers {
            let _ = writeln!(
                s,
                "  {:<14} accuracy {:.3} ± {:.3}   AUC {:.3} ± {:.3}   (n={})",
                family, c.test_accuracy.mean, c.test_accuracy.std, c.test_auc.mean, c.test_auc.std, c.test_auc.n
            );
        }
        let _ = writeln!(s);

        let _ = writeln!(s, "Granger causality (sent_mean → next-day return)");
        for (lag, g) in &summary.granger {
            let _ = writeln!(
                s,
                "  lag {}  significant {}/{}  mean p {:.4}",
                lag, g.n_significant, g.n_tested, g.mean_p
            );
        }
        if let Some(p) = &summary.permutation {
            let _ = writeln!(s);
            let _ = writeln!(
                s,
                "Permutation test: significant {}/{}  mean p {:.4}  mean coefficient {:.6}",
                p.test.n_significant, p.test.n_tested, p.test.mean_p, p.mean_real_coefficient
            );
        }
        let _ = writeln!(s, "{}", rule);
        s
    }

    pub fn write_text(&self, path: &Path, generated_at: &str) -> Result<()> {
        let text = self.render_text(generated_at);
        for line in text.lines() {
            info!("{}", line);
        }
        fs::write(path, text).with_context(|| format!("Cannot write report {:?}", path))
    }

    // ── CSV ──────────────────────────────────────────────────────────────────

    /// Flatten every scalar metric of a ticker into `column → value`.
    fn flat_row(ticker: &str, t: &TickerReport) -> BTreeMap<String, String> {
        let a = &t.artifacts;
        let mut row = BTreeMap::new();
        row.insert("ticker".to_string(), ticker.to_string());
        row.insert("n_rows".to_string(), a.n_rows.to_string());
        row.insert("n_failures".to_string(), a.failures.len().to_string());
        row.insert("signal_score".to_string(), t.signal.score.to_string());
        row.insert("signal_quality".to_string(), t.signal.quality.to_string());

        for (prefix, table) in [("ret_corr", &a.return_correlations), ("range_corr", &a.range_correlations)] {
            for (feature, c) in table {
                row.insert(format!("{}_pearson_{}", prefix, feature), c.pearson.to_string());
                row.insert(format!("{}_spearman_{}", prefix, feature), c.spearman.to_string());
            }
        }

        for (prefix, fit) in [("ret_ridge", &a.return_ridge), ("range_ridge", &a.range_ridge)] {
            if let Some(fit) = fit {
                for (feature, coef) in &fit.coefficients {
                    row.insert(format!("{}_coef_{}", prefix, feature), coef.to_string());
                }
                row.insert(format!("{}_intercept", prefix), fit.intercept.to_string());
                row.insert(format!("{}_r2", prefix), fit.r_squared.to_string());
            }
        }

        for family in [ModelFamily::Logistic, ModelFamily::RandomForest] {
            if let Some(c) = a.classifier(family) {
                row.insert(format!("{}_threshold", family), c.threshold.to_string());
                row.insert(format!("{}_train_accuracy", family), c.train.accuracy.to_string());
                row.insert(format!("{}_test_accuracy", family), c.test.accuracy.to_string());
                row.insert(format!("{}_test_precision", family), c.test.precision.to_string());
                row.insert(format!("{}_test_recall", family), c.test.recall.to_string());
                row.insert(format!("{}_test_f1", family), c.test.f1.to_string());
                row.insert(format!("{}_test_auc", family), c.test.roc_auc.to_string());
                row.insert(format!("{}_test_start", family), c.test_start.to_string());
            }
        }

        for (lag, p) in &a.granger {
            row.insert(format!("granger_p_lag{}", lag), p.to_string());
        }
        if let Some(mc) = &a.monte_carlo {
            row.insert("perm_coefficient".to_string(), mc.real_coefficient.to_string());
            row.insert("perm_p_value".to_string(), mc.p_value.to_string());
        }
        row
    }

    /// One row per ticker; the header is the union of all columns, blank
    /// where a ticker lacks a metric.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let rows: Vec<BTreeMap<String, String>> = self
            .tickers
            .iter()
            .map(|(ticker, t)| Self::flat_row(ticker, t))
            .collect();

        let mut columns: BTreeSet<&str> = rows.iter().flat_map(|r| r.keys().map(String::as_str)).collect();
        columns.remove("ticker");
        let header: Vec<&str> = std::iter::once("ticker").chain(columns).collect();

        let mut wtr = csv::Writer::from_path(path).with_context(|| format!("Cannot create {:?}", path))?;
        wtr.write_record(&header)?;
        for row in &rows {
            wtr.write_record(header.iter().map(|c| row.get(*c).map(String::as_str).unwrap_or("")))?;
        }
        wtr.flush().with_context(|| format!("Cannot flush {:?}", path))?;
        Ok(())
    }

    // ── JSON ─────────────────────────────────────────────────────────────────

    pub fn export(&self, generated_at: &str) -> DetailedExport {
        DetailedExport {
            generated_at: generated_at.to_string(),
            significance_level: self.significance,
            tickers: self.tickers.clone(),
            summary: self.summary(),
        }
    }

    pub fn write_json(&self, path: &Path, generated_at: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.export(generated_at))?;
        fs::write(path, json).with_context(|| format!("Cannot write {:?}", path))
    }

    /// Write all three artifacts into `dir`, named with `stamp`.
    pub fn write_all(&self, dir: &Path, stamp: &str) -> Result<ReportPaths> {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create output dir {:?}", dir))?;
        let paths = ReportPaths {
            text: dir.join(format!("analysis_report_{}.txt", stamp)),
            csv: dir.join(format!("analysis_summary_{}.csv", stamp)),
            json: dir.join(format!("analysis_detailed_{}.json", stamp)),
        };
        self.write_text(&paths.text, stamp)?;
        self.write_csv(&paths.csv)?;
        self.write_json(&paths.json, stamp)?;
        info!("Reports written to {:?}", dir);
        Ok(paths)
    }
}

pub fn load_json(path: &Path) -> Result<DetailedExport> {
    let raw = fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid report JSON {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::metrics::ClassificationMetrics;
    use crate::analysis::modeling::{ClassifierReport, RidgeFit};
    use crate::analysis::monte_carlo::PermutationResult;
    use crate::analysis::stats::CorrelationPair;
    use chrono::NaiveDate;

    fn metrics(accuracy: f64, roc_auc: f64) -> ClassificationMetrics {
        ClassificationMetrics {
            accuracy,
            precision: 0.5,
            recall: 0.5,
            f1: 0.5,
            roc_auc,
            n_samples: 30,
        }
    }

    fn artifacts(pearson: f64, rf_acc: f64, granger_p: f64, perm_p: f64) -> ModelArtifacts {
        let mut a = ModelArtifacts {
            n_rows: 100,
            ..Default::default()
        };
        a.return_correlations.insert(
            Feature::SentMean,
            CorrelationPair {
                pearson,
                spearman: pearson / 2.0,
            },
        );
        a.return_ridge = Some(RidgeFit {
            coefficients: [(Feature::SentMean, pearson / 10.0)].into_iter().collect(),
            intercept: 0.001,
            r_squared: 0.1,
            n_obs: 100,
        });
        a.random_forest = Some(ClassifierReport {
            family: ModelFamily::RandomForest,
            threshold: 0.47,
            train: metrics(0.7, 0.75),
            test: metrics(rf_acc, rf_acc),
            train_end: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            test_start: NaiveDate::from_ymd_opt(2025, 4, 11).unwrap(),
        });
        a.granger = [(1, granger_p), (2, 0.9)].into_iter().collect();
        a.monte_carlo = Some(PermutationResult {
            feature: Feature::SentMean,
            real_coefficient: pearson / 10.0,
            p_value: perm_p,
            null_distribution: vec![0.0, 0.001, -0.002],
            n_iterations: 3,
        });
        a
    }

    fn aggregator() -> ReportAggregator {
        ReportAggregator::new(SignalConfig::default(), 0.05)
    }

    #[test]
    fn test_signal_levels() {
        let cfg = SignalConfig::default();
        let none = assess_signal(&artifacts(0.01, 0.5, 0.5, 0.5), &cfg, 0.05);
        assert_eq!((none.score, none.quality), (0, SignalQuality::Weak));

        // A single point is still WEAK.
        let one = assess_signal(&artifacts(0.2, 0.5, 0.5, 0.5), &cfg, 0.05);
        assert_eq!((one.score, one.quality), (1, SignalQuality::Weak));

        let two = assess_signal(&artifacts(0.2, 0.6, 0.5, 0.5), &cfg, 0.05);
        assert_eq!((two.score, two.quality), (2, SignalQuality::Moderate));

        let all = assess_signal(&artifacts(0.2, 0.6, 0.01, 0.01), &cfg, 0.05);
        assert_eq!((all.score, all.quality), (4, SignalQuality::Strong));
        assert_eq!(all.factors.len(), 4);
    }

    #[test]
    fn test_empty_artifacts_not_added() {
        let mut agg = aggregator();
        assert!(!agg.add_ticker("FAIL", ModelArtifacts::default()));
        assert!(agg.is_empty());
        assert!(agg.add_ticker("AAA", artifacts(0.2, 0.6, 0.5, 0.5)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_cross_ticker_summary() {
        let mut agg = aggregator();
        agg.add_ticker("AAA", artifacts(0.2, 0.6, 0.01, 0.5));
        agg.add_ticker("BBB", artifacts(0.4, 0.5, 0.5, 0.01));
        let s = agg.summary();

        let c = &s.correlations[&Feature::SentMean];
        assert!((c.pearson.mean - 0.3).abs() < 1e-12);
        assert!((c.pearson.std - 0.1).abs() < 1e-12);
        assert_eq!(c.pearson.min, 0.2);
        assert_eq!(c.pearson.max, 0.4);

        assert_eq!(s.ridge_coefficients[&Feature::SentMean].consensus_sign, "positive");
        assert!(s.classifiers.contains_key("random_forest"));
        assert!(!s.classifiers.contains_key("logistic"));
        assert_eq!(s.granger[&1].n_significant, 1);
        assert_eq!(s.granger[&2].n_significant, 0);
        let perm = s.permutation.unwrap();
        assert_eq!(perm.test.n_tested, 2);
        assert_eq!(perm.test.n_significant, 1);
    }

    #[test]
    fn test_consensus_sign_mixed() {
        assert_eq!(consensus_sign(&[0.1, -0.2]), "mixed");
        assert_eq!(consensus_sign(&[-0.1, -0.2]), "negative");
    }

    #[test]
    fn test_text_report_mentions_every_ticker() {
        let mut agg = aggregator();
        // correlation + forest = 2 points; nothing for BBB
        agg.add_ticker("AAA", artifacts(0.2, 0.6, 0.5, 0.5));
        agg.add_ticker("BBB", artifacts(0.01, 0.5, 0.5, 0.5));
        assert_eq!(agg.ticker("AAA").unwrap().signal.quality, SignalQuality::Moderate);
        let text = agg.render_text("20260101_000000");
        assert!(text.contains("AAA"));
        assert!(text.contains("BBB"));
        assert!(text.contains("MODERATE"));
        assert!(text.contains("WEAK"));
        assert!(!text.contains("STRONG"));
    }

    #[test]
    fn test_write_all_and_json_round_trip() {
        let dir = std::env::temp_dir().join(format!("consensus_report_{}", std::process::id()));
        let mut agg = aggregator();
        let mut partial = artifacts(0.123456789012345, 0.61, 0.0123, 0.04);
        partial.monte_carlo = None;
        partial.failures.insert("monte_carlo".into(), "insufficient data".into());
        agg.add_ticker("AAA", artifacts(1.0 / 3.0, 0.6, 0.01, 0.5));
        agg.add_ticker("BBB", partial);

        let paths = agg.write_all(&dir, "20260101_000000").unwrap();
        assert!(paths.text.exists());

        let loaded = load_json(&paths.json).unwrap();
        assert_eq!(loaded, agg.export("20260101_000000"));
        assert_eq!(
            loaded.tickers["AAA"].artifacts.return_correlations[&Feature::SentMean].pearson,
            1.0 / 3.0
        );

        let mut rdr = csv::Reader::from_path(&paths.csv).unwrap();
        let header = rdr.headers().unwrap().clone();
        assert_eq!(&header[0], "ticker");
        let perm_col = header.iter().position(|h| h == "perm_p_value").unwrap();
        let split_col = header.iter().position(|h| h == "random_forest_test_start").unwrap();
        let records: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][perm_col], "0.5");
        assert_eq!(&records[1][perm_col], "");
        assert_eq!(&records[1][split_col], "2025-04-11");

        fs::remove_dir_all(&dir).ok();
    }
}
