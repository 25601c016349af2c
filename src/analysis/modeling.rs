//! Ridge regression (impact strength) and directional classifiers evaluated
//! under a chronological train/test split.

use super::dataset::Dataset;
use super::forest::{balanced_weights, RandomForest};
use super::linalg::{column_moments, solve};
use super::metrics::{evaluate, select_threshold, ClassificationMetrics};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AlignedRow, Feature, Target};
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

// ── Ridge ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RidgeFit {
    /// Expected change in the target per unit change in the feature,
    /// others held fixed.
    pub coefficients: BTreeMap<Feature, f64>,
    pub intercept: f64,
    pub r_squared: f64,
    pub n_obs: usize,
}

/// L2-regularized least squares with an unpenalized intercept.
///
/// Solves `(XcᵀXc + αI) β = Xcᵀyc` on centered data.
pub fn fit_ridge(rows: &[AlignedRow], features: &[Feature], target: Target, alpha: f64) -> AnalysisResult<RidgeFit> {
    let ds = Dataset::from_rows(rows, features, target)?;
    let context = format!("ridge on {}", target);
    if ds.n_samples() < 2 {
        return Err(AnalysisError::insufficient(context, "at least 2 rows", ds.n_samples()));
    }
    ds.ensure_non_constant(&context, true)?;

    let (beta, intercept) = ridge_solve(&ds.x, &ds.y, alpha)
        .ok_or_else(|| AnalysisError::degenerate(&context, "normal equations are singular"))?;

    let fitted = ds.x.dot(&beta) + intercept;
    let y_mean = ds.y.mean().unwrap_or(0.0);
    let ss_res: f64 = ds.y.iter().zip(&fitted).map(|(y, f)| (y - f).powi(2)).sum();
    let ss_tot: f64 = ds.y.iter().map(|y| (y - y_mean).powi(2)).sum();

    Ok(RidgeFit {
        coefficients: ds.features.iter().cloned().zip(beta.iter().copied()).collect(),
        intercept,
        r_squared: 1.0 - ss_res / ss_tot,
        n_obs: ds.n_samples(),
    })
}

pub(crate) fn ridge_solve(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Option<(Array1<f64>, f64)> {
    let x_mean = x.mean_axis(Axis(0))?;
    let y_mean = y.mean()?;
    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut xtx = xc.t().dot(&xc);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    let beta = solve(&xtx, &xc.t().dot(&yc))?;
    let intercept = y_mean - x_mean.dot(&beta);
    Some((beta, intercept))
}

// ── Chronological split ───────────────────────────────────────────────────────

/// First `floor(n · train_fraction)` items train, the remainder test.
/// Callers pass date-sorted data; the split never shuffles.
pub fn chronological_split<T>(items: &[T], train_fraction: f64) -> AnalysisResult<(&[T], &[T])> {
    let split = (items.len() as f64 * train_fraction).floor() as usize;
    if split == 0 || split >= items.len() {
        return Err(AnalysisError::insufficient(
            "chronological split",
            format!("non-empty train and test at fraction {}", train_fraction),
            items.len(),
        ));
    }
    Ok(items.split_at(split))
}

// ── Logistic regression ───────────────────────────────────────────────────────

/// L2-penalized (C = 1) logistic regression with balanced class weights,
/// fit by Newton–Raphson on standardized inputs.
#[derive(Debug, Clone)]
pub struct LogisticModel {
    means: Array1<f64>,
    scales: Array1<f64>,
    weights: Array1<f64>,
    intercept: f64,
}

const LOGISTIC_MAX_ITER: usize = 100;
const LOGISTIC_TOL: f64 = 1e-8;

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl LogisticModel {
    pub fn fit(x: &Array2<f64>, y: &[bool]) -> Option<Self> {
        // Scaler statistics come from the training rows only.
        let (means, stds) = column_moments(x);
        let scales = stds.mapv(|s| if s > 0.0 { s } else { 1.0 });
        let xs = (x - &means) / &scales;

        let (n, p) = xs.dim();
        let (w_down, w_up) = balanced_weights(y);
        let sw: Vec<f64> = y.iter().map(|&v| if v { w_up } else { w_down }).collect();

        // Parameter vector: [intercept, w_1..w_p].
        let mut theta = Array1::<f64>::zeros(p + 1);
        for iter in 0..LOGISTIC_MAX_ITER {
            let mut grad = Array1::<f64>::zeros(p + 1);
            let mut hess = Array2::<f64>::zeros((p + 1, p + 1));

            for i in 0..n {
                let row = xs.row(i);
                let z = theta[0] + row.dot(&theta.slice(ndarray::s![1..]));
                let prob = sigmoid(z);
                let label = if y[i] { 1.0 } else { 0.0 };
                let g = sw[i] * (prob - label);
                let h = sw[i] * prob * (1.0 - prob);

                grad[0] += g;
                hess[[0, 0]] += h;
                for a in 0..p {
                    grad[a + 1] += g * row[a];
                    hess[[0, a + 1]] += h * row[a];
                    hess[[a + 1, 0]] += h * row[a];
                    for b in 0..p {
                        hess[[a + 1, b + 1]] += h * row[a] * row[b];
                    }
                }
            }
            // Penalty on the weights, not on the intercept.
            for a in 1..=p {
                grad[a] += theta[a];
                hess[[a, a]] += 1.0;
            }

            let step = solve(&hess, &grad)?;
            theta = &theta - &step;
            if step.iter().map(|v| v.abs()).fold(0.0, f64::max) < LOGISTIC_TOL {
                debug!("logistic converged after {} iterations", iter + 1);
                break;
            }
        }

        if theta.iter().any(|v| !v.is_finite()) {
            return None;
        }

        Some(Self {
            means,
            scales,
            intercept: theta[0],
            weights: theta.slice(ndarray::s![1..]).to_owned(),
        })
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        let xs = (x - &self.means) / &self.scales;
        xs.rows()
            .into_iter()
            .map(|row| sigmoid(self.intercept + row.dot(&self.weights)))
            .collect()
    }
}

// ── Classifier driver ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Logistic,
    RandomForest,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Logistic => f.write_str("logistic"),
            ModelFamily::RandomForest => f.write_str("random_forest"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierReport {
    pub family: ModelFamily,
    /// Chosen on training probabilities, applied unchanged to test.
    pub threshold: f64,
    pub train: ClassificationMetrics,
    pub test: ClassificationMetrics,
    /// Last training date; every test row is later.
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
}

/// Predict `target > 0` from `features`.
///
/// Rows are ordered by date and split chronologically; the scaler, the
/// model and the decision threshold only ever see the training part.
pub fn fit_classifier(
    rows: &[AlignedRow],
    features: &[Feature],
    target: Target,
    family: ModelFamily,
    cfg: &AnalysisConfig,
) -> AnalysisResult<ClassifierReport> {
    let context = format!("{} classifier on {}", family, target);

    let mut ordered: Vec<&AlignedRow> = rows.iter().collect();
    ordered.sort_by_key(|r| r.date);
    let ordered: Vec<AlignedRow> = ordered.into_iter().cloned().collect();

    let ds = Dataset::from_rows(&ordered, features, target)?;
    ds.ensure_non_constant(&context, false)?;

    let idx: Vec<usize> = (0..ds.n_samples()).collect();
    let (train_idx, test_idx) = chronological_split(&idx, cfg.train_fraction)?;
    let train = ds.select(train_idx);
    let test = ds.select(test_idx);
    let (Some(&train_end), Some(&test_start)) = (train.dates.last(), test.dates.first()) else {
        return Err(AnalysisError::insufficient(context, "rows on both sides of the split", ds.n_samples()));
    };

    let y_train: Vec<bool> = train.y.iter().map(|&v| v > 0.0).collect();
    let y_test: Vec<bool> = test.y.iter().map(|&v| v > 0.0).collect();

    let n_up = y_train.iter().filter(|&&v| v).count();
    if n_up == 0 || n_up == y_train.len() {
        return Err(AnalysisError::insufficient(
            context,
            "both up and down days in the training split",
            y_train.len(),
        ));
    }

    let (p_train, p_test) = match family {
        ModelFamily::Logistic => {
            let model = LogisticModel::fit(&train.x, &y_train)
                .ok_or_else(|| AnalysisError::degenerate(&context, "Newton step hit a singular Hessian"))?;
            (model.predict_proba(&train.x), model.predict_proba(&test.x))
        }
        ModelFamily::RandomForest => {
            let forest = RandomForest::fit(&train.x, &y_train, &cfg.forest, cfg.random_seed);
            (forest.predict_proba(&train.x), forest.predict_proba(&test.x))
        }
    };

    let threshold = select_threshold(&y_train, &p_train, &cfg.threshold);
    debug!("{}: threshold {:.2} on {} train / {} test rows", context, threshold, train.n_samples(), test.n_samples());

    Ok(ClassifierReport {
        family,
        threshold,
        train: evaluate(&y_train, &p_train, threshold, &format!("{} (train)", context))?,
        test: evaluate(&y_test, &p_test, threshold, &format!("{} (test)", context))?,
        train_end,
        test_start,
    })
}
