use crate::models::Feature;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Numerical settings shared by every per-ticker analysis.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_features")]
    pub features: Vec<Feature>,

    /// Own-return lags attached to aligned rows (ret_lag_1..k).
    #[serde(default = "default_return_lags")]
    pub return_lags: usize,

    #[serde(default = "default_ridge_alpha")]
    pub ridge_alpha: f64,

    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,

    #[serde(default)]
    pub threshold: ThresholdConfig,

    #[serde(default)]
    pub forest: ForestConfig,

    #[serde(default = "default_granger_max_lag")]
    pub granger_max_lag: usize,

    #[serde(default = "default_mc_iterations")]
    pub monte_carlo_iterations: usize,

    #[serde(default = "default_significance")]
    pub significance_level: f64,

    #[serde(default = "default_seed")]
    pub random_seed: u64,
}

/// Decision-threshold grid searched on training probabilities.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_threshold_start")]
    pub start: f64,

    #[serde(default = "default_threshold_end")]
    pub end: f64,

    #[serde(default = "default_threshold_step")]
    pub step: f64,

    #[serde(default)]
    pub objective: ThresholdObjective,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdObjective {
    /// ROC-AUC of the thresholded labels, i.e. (TPR + TNR) / 2.
    #[default]
    BalancedAccuracy,
    F1,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForestConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,

    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
}

/// Thresholds behind the per-ticker signal quality score.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    #[serde(default = "default_corr_threshold")]
    pub corr_threshold: f64,

    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,

    #[serde(default = "default_auc_threshold")]
    pub auc_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Stop scheduling new tickers once this many seconds have elapsed.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_db_path() -> PathBuf {
    PathBuf::from("data/consensus.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_features() -> Vec<Feature> {
    Feature::sentiment_set()
}
fn default_return_lags() -> usize {
    3
}
fn default_ridge_alpha() -> f64 {
    1.0
}
fn default_train_fraction() -> f64 {
    0.7
}
fn default_threshold_start() -> f64 {
    0.05
}
fn default_threshold_end() -> f64 {
    0.95
}
fn default_threshold_step() -> f64 {
    0.01
}
fn default_n_trees() -> usize {
    300
}
fn default_max_depth() -> usize {
    5
}
fn default_min_samples_split() -> usize {
    2
}
fn default_min_samples_leaf() -> usize {
    1
}
fn default_granger_max_lag() -> usize {
    3
}
fn default_mc_iterations() -> usize {
    1000
}
fn default_significance() -> f64 {
    0.05
}
fn default_seed() -> u64 {
    42
}
fn default_corr_threshold() -> f64 {
    0.10
}
fn default_accuracy_threshold() -> f64 {
    0.55
}
fn default_auc_threshold() -> f64 {
    0.55
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("analysis_results")
}
fn default_tickers() -> Vec<String> {
    ["AAPL", "AMZN", "GOOGL", "META", "MSFT", "NFLX", "NVDA", "TSLA"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_concurrency() -> usize {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            features: default_features(),
            return_lags: default_return_lags(),
            ridge_alpha: default_ridge_alpha(),
            train_fraction: default_train_fraction(),
            threshold: ThresholdConfig::default(),
            forest: ForestConfig::default(),
            granger_max_lag: default_granger_max_lag(),
            monte_carlo_iterations: default_mc_iterations(),
            significance_level: default_significance(),
            random_seed: default_seed(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            start: default_threshold_start(),
            end: default_threshold_end(),
            step: default_threshold_step(),
            objective: ThresholdObjective::default(),
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            corr_threshold: default_corr_threshold(),
            accuracy_threshold: default_accuracy_threshold(),
            auc_threshold: default_auc_threshold(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tickers: default_tickers(),
            concurrency: default_concurrency(),
            deadline_secs: None,
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("CONSENSUS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pipeline.tickers")
                    .with_list_parse_key("analysis.features"),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        anyhow::ensure!(
            a.train_fraction > 0.0 && a.train_fraction < 1.0,
            "analysis.train_fraction must be in (0, 1), got {}",
            a.train_fraction
        );
        anyhow::ensure!(a.ridge_alpha >= 0.0, "analysis.ridge_alpha must be >= 0");
        anyhow::ensure!(
            a.threshold.step > 0.0 && a.threshold.start <= a.threshold.end,
            "analysis.threshold grid is empty"
        );
        anyhow::ensure!(!a.features.is_empty(), "analysis.features is empty");
        anyhow::ensure!(a.granger_max_lag > 0, "analysis.granger_max_lag must be > 0");
        anyhow::ensure!(a.forest.n_trees > 0, "analysis.forest.n_trees must be > 0");
        anyhow::ensure!(self.pipeline.concurrency > 0, "pipeline.concurrency must be > 0");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.analysis.train_fraction, 0.7);
        assert_eq!(cfg.analysis.forest.n_trees, 300);
        assert_eq!(cfg.analysis.forest.max_depth, 5);
        assert_eq!(cfg.analysis.significance_level, 0.05);
        assert_eq!(cfg.analysis.features, Feature::sentiment_set());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "[analysis]\nridge_alpha = 2.5\nfeatures = [\"sent_mean\", \"ret_lag_1\"]\n\n[pipeline]\ntickers = [\"TEST\"]\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(cfg.analysis.ridge_alpha, 2.5);
        assert_eq!(cfg.analysis.features, vec![Feature::SentMean, Feature::ReturnLag(1)]);
        assert_eq!(cfg.analysis.monte_carlo_iterations, 1000);
        assert_eq!(cfg.pipeline.tickers, vec!["TEST".to_string()]);
        assert_eq!(cfg.storage.db_path, PathBuf::from("data/consensus.duckdb"));
    }

    #[test]
    fn test_validate_rejects_bad_split() {
        let mut cfg = AppConfig::default();
        cfg.analysis.train_fraction = 1.0;
        assert!(cfg.validate().is_err());
    }
}
