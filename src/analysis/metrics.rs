//! Binary classification metrics and decision-threshold selection.

use super::stats::ranks;
use crate::config::{ThresholdConfig, ThresholdObjective};
use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub n_samples: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Confusion {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

impl Confusion {
    fn from_predictions(labels: &[bool], probs: &[f64], threshold: f64) -> Self {
        let mut c = Confusion::default();
        for (&y, &p) in labels.iter().zip(probs) {
            match (y, p >= threshold) {
                (true, true) => c.tp += 1,
                (false, true) => c.fp += 1,
                (false, false) => c.tn += 1,
                (true, false) => c.fn_ += 1,
            }
        }
        c
    }

    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.tp + self.tn + self.fp + self.fn_)
    }
}

/// Zero division yields 0.
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Evaluate probabilities at a fixed threshold (`p >= threshold` ⇒ up).
pub fn evaluate(labels: &[bool], probs: &[f64], threshold: f64, context: &str) -> AnalysisResult<ClassificationMetrics> {
    if labels.is_empty() {
        return Err(AnalysisError::insufficient(context, "at least 1 row", 0));
    }
    let c = Confusion::from_predictions(labels, probs, threshold);
    Ok(ClassificationMetrics {
        accuracy: c.accuracy(),
        precision: c.precision(),
        recall: c.recall(),
        f1: c.f1(),
        roc_auc: roc_auc(labels, probs, context)?,
        n_samples: labels.len(),
    })
}

/// Area under the ROC curve via the Mann–Whitney statistic (ties averaged).
pub fn roc_auc(labels: &[bool], probs: &[f64], context: &str) -> AnalysisResult<f64> {
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AnalysisError::degenerate(
            context,
            format!("ROC-AUC undefined with one class ({} up, {} down)", n_pos, n_neg),
        ));
    }

    let r = ranks(probs);
    let rank_sum: f64 = labels.iter().zip(&r).filter(|(y, _)| **y).map(|(_, rk)| rk).sum();
    let u = rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Ok(u / (n_pos * n_neg) as f64)
}

/// Grid of candidate thresholds, inclusive of `end` within rounding.
pub fn threshold_grid(cfg: &ThresholdConfig) -> Vec<f64> {
    let steps = ((cfg.end - cfg.start) / cfg.step + 1e-9).floor() as usize;
    (0..=steps)
        .map(|i| ((cfg.start + i as f64 * cfg.step) * 1e10).round() / 1e10)
        .collect()
}

/// Pick the threshold maximizing the objective on *training* probabilities.
/// Ties keep the lowest threshold.
pub fn select_threshold(labels: &[bool], probs: &[f64], cfg: &ThresholdConfig) -> f64 {
    let mut best = (f64::NEG_INFINITY, 0.5);
    for t in threshold_grid(cfg) {
        let c = Confusion::from_predictions(labels, probs, t);
        let score = match cfg.objective {
            ThresholdObjective::BalancedAccuracy => (c.recall() + c.specificity()) / 2.0,
            ThresholdObjective::F1 => c.f1(),
        };
        if score > best.0 {
            best = (score, t);
        }
    }
    best.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let labels = [false, false, true, true];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9], "t").unwrap(), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1], "t").unwrap(), 0.0);
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5], "t").unwrap(), 0.5);
    }

    #[test]
    fn test_roc_auc_single_class_is_degenerate() {
        let err = roc_auc(&[true, true], &[0.3, 0.6], "t").unwrap_err();
        assert!(matches!(err, AnalysisError::NumericDegenerate { .. }));
    }

    #[test]
    fn test_evaluate_confusion() {
        let labels = [true, true, false, false, true];
        let probs = [0.9, 0.4, 0.6, 0.1, 0.7];
        let m = evaluate(&labels, &probs, 0.5, "t").unwrap();
        // tp=2 fp=1 tn=1 fn=1
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.n_samples, 5);
    }

    #[test]
    fn test_zero_division_is_zero() {
        let m = evaluate(&[true, false], &[0.1, 0.2], 0.9, "t").unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn test_threshold_grid_bounds() {
        let grid = threshold_grid(&ThresholdConfig::default());
        assert_eq!(grid.len(), 91);
        assert_eq!(grid[0], 0.05);
        assert_eq!(*grid.last().unwrap(), 0.95);
    }

    #[test]
    fn test_select_threshold_separates_training_classes() {
        let labels = [false, false, false, true, true, true];
        let probs = [0.30, 0.35, 0.40, 0.62, 0.65, 0.70];
        let t = select_threshold(&labels, &probs, &ThresholdConfig::default());
        // Lowest grid point that still separates: 0.41.
        assert_eq!(t, 0.41);
    }
}
