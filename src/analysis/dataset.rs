//! Feature-matrix extraction from aligned rows.

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AlignedRow, Feature, Target};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use tracing::debug;

/// Rows × features matrix with its target, in the order of the input rows.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Feature>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub dates: Vec<NaiveDate>,
}

impl Dataset {
    /// Build from rows, skipping any row where a requested feature is absent
    /// (leading lag rows, benchmark gaps).
    pub fn from_rows(rows: &[AlignedRow], features: &[Feature], target: Target) -> AnalysisResult<Self> {
        if features.is_empty() {
            return Err(AnalysisError::insufficient("feature matrix", "at least 1 feature", 0));
        }

        let mut values = Vec::with_capacity(rows.len() * features.len());
        let mut y = Vec::with_capacity(rows.len());
        let mut dates = Vec::with_capacity(rows.len());

        for row in rows {
            let vals: Option<Vec<f64>> = features.iter().map(|f| row.feature(f)).collect();
            let Some(vals) = vals else { continue };
            values.extend(vals);
            y.push(row.target(target));
            dates.push(row.date);
        }

        let skipped = rows.len() - y.len();
        if skipped > 0 {
            debug!("{} of {} rows skipped for absent feature values", skipped, rows.len());
        }

        if let Some(bad) = values.iter().chain(y.iter()).find(|v| !v.is_finite()) {
            return Err(AnalysisError::integrity(format!("non-finite value {} in feature matrix", bad)));
        }

        let n = y.len();
        let x = Array2::from_shape_vec((n, features.len()), values)
            .map_err(|e| AnalysisError::integrity(format!("feature matrix shape: {}", e)))?;

        Ok(Self {
            features: features.to_vec(),
            x,
            y: Array1::from(y),
            dates,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }

    /// Fail with `NumericDegenerate` if any feature column (or the target,
    /// when `check_target`) has zero variance.
    pub fn ensure_non_constant(&self, context: &str, check_target: bool) -> AnalysisResult<()> {
        for (j, col) in self.x.columns().into_iter().enumerate() {
            if is_constant(col.iter().copied()) {
                return Err(AnalysisError::degenerate(
                    context,
                    format!("feature {} is constant", self.features[j]),
                ));
            }
        }
        if check_target && is_constant(self.y.iter().copied()) {
            return Err(AnalysisError::degenerate(context, "target is constant"));
        }
        Ok(())
    }

    /// Keep only the given row indices (in that order).
    pub fn select(&self, idx: &[usize]) -> Self {
        Self {
            features: self.features.clone(),
            x: self.x.select(ndarray::Axis(0), idx),
            y: self.y.select(ndarray::Axis(0), idx),
            dates: idx.iter().map(|&i| self.dates[i]).collect(),
        }
    }
}

pub fn is_constant(mut values: impl Iterator<Item = f64>) -> bool {
    match values.next() {
        None => true,
        Some(first) => values.all(|v| v == first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(day: u32, sent_mean: f64, lag: Option<f64>) -> AlignedRow {
        AlignedRow {
            ticker: "TEST".into(),
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            sent_mean,
            sent_std: 0.0,
            attention: day,
            bull_bear_ratio: 1.0,
            ret: 0.0,
            next_return: sent_mean / 10.0,
            next_range: 0.01,
            ret_lags: vec![lag],
            benchmarks: BTreeMap::new(),
        }
    }

    #[test]
    fn test_absent_features_skip_rows() {
        let rows = vec![row(1, 0.1, None), row(2, 0.2, Some(0.01)), row(3, 0.3, Some(0.02))];
        let ds = Dataset::from_rows(&rows, &[Feature::SentMean, Feature::ReturnLag(1)], Target::NextReturn).unwrap();
        assert_eq!(ds.n_samples(), 2);
        assert_eq!(ds.x[[0, 1]], 0.01);
        assert_eq!(ds.dates[0], rows[1].date);
    }

    #[test]
    fn test_constant_column_detected() {
        let rows = vec![row(1, 0.1, None), row(2, 0.2, None)];
        let ds = Dataset::from_rows(&rows, &[Feature::SentMean, Feature::SentStd], Target::NextReturn).unwrap();
        let err = ds.ensure_non_constant("ridge", true).unwrap_err();
        assert!(matches!(err, AnalysisError::NumericDegenerate { .. }));
        assert!(err.to_string().contains("sent_std"));
    }
}
