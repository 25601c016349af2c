//! Correlation and Granger-causality tests of sentiment against next-day outcomes.

use super::dataset::is_constant;
use super::linalg::ols;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AlignedRow, Feature, Target};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CorrelationPair {
    /// Linear dependence.
    pub pearson: f64,
    /// Rank dependence; above |pearson| hints at a non-linear effect.
    pub spearman: f64,
}

// ── Correlation ───────────────────────────────────────────────────────────────

/// Pearson and Spearman correlation of each feature against `target`.
///
/// Rows where a feature is absent are skipped for that feature only.
pub fn correlate(
    rows: &[AlignedRow],
    features: &[Feature],
    target: Target,
) -> AnalysisResult<BTreeMap<Feature, CorrelationPair>> {
    let mut out = BTreeMap::new();
    for feature in features {
        let (x, y): (Vec<f64>, Vec<f64>) = rows
            .iter()
            .filter_map(|r| Some((r.feature(feature)?, r.target(target))))
            .unzip();

        let context = format!("{} vs {}", feature, target);
        let pearson = pearson(&x, &y, &context)?;
        let spearman = spearman(&x, &y, &context)?;
        out.insert(feature.clone(), CorrelationPair { pearson, spearman });
    }
    Ok(out)
}

pub fn pearson(x: &[f64], y: &[f64], context: &str) -> AnalysisResult<f64> {
    if x.len() != y.len() {
        return Err(AnalysisError::integrity(format!(
            "{}: series lengths differ ({} vs {})",
            context,
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(AnalysisError::insufficient(context, "at least 2 rows", x.len()));
    }
    if is_constant(x.iter().copied()) {
        return Err(AnalysisError::degenerate(context, "feature is constant"));
    }
    if is_constant(y.iter().copied()) {
        return Err(AnalysisError::degenerate(context, "target is constant"));
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if !(denom > 0.0) || !denom.is_finite() {
        return Err(AnalysisError::degenerate(context, "zero variance denominator"));
    }
    Ok((cov / denom).clamp(-1.0, 1.0))
}

pub fn spearman(x: &[f64], y: &[f64], context: &str) -> AnalysisResult<f64> {
    pearson(&ranks(x), &ranks(y), context)
}

/// 1-based ranks, ties share their average rank.
pub fn ranks(values: &[f64]) -> Vec<f64> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut out = vec![0.0; values.len()];
    let mut i = 0;
    while i < idx.len() {
        let mut j = i;
        while j + 1 < idx.len() && values[idx[j + 1]] == values[idx[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &idx[i..=j] {
            out[k] = avg;
        }
        i = j + 1;
    }
    out
}

// ── Granger causality ─────────────────────────────────────────────────────────

/// SSR F-test p-value per lag (1..=max_lag) for "`feature` Granger-causes
/// `target`".
///
/// H0: lags of the feature add nothing beyond the target's own lags.
pub fn granger(
    rows: &[AlignedRow],
    feature: &Feature,
    target: Target,
    max_lag: usize,
) -> AnalysisResult<BTreeMap<usize, f64>> {
    let context = format!("granger {} -> {}", feature, target);
    if max_lag == 0 {
        return Err(AnalysisError::insufficient(context, "max_lag >= 1", 0));
    }

    let (x, y): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .filter_map(|r| Some((r.feature(feature)?, r.target(target))))
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .unzip();

    let required = 2 * max_lag + 2;
    if y.len() <= required {
        return Err(AnalysisError::insufficient(context, format!("more than {} paired rows", required), y.len()));
    }

    let mut out = BTreeMap::new();
    for lag in 1..=max_lag {
        out.insert(lag, granger_at_lag(&x, &y, lag, &context)?);
    }
    Ok(out)
}

fn granger_at_lag(x: &[f64], y: &[f64], lag: usize, context: &str) -> AnalysisResult<f64> {
    let nobs = y.len() - lag;
    let restricted_cols = 1 + lag;
    let full_cols = 1 + 2 * lag;

    let mut restricted = Array2::zeros((nobs, restricted_cols));
    let mut full = Array2::zeros((nobs, full_cols));
    let mut target = Array1::zeros(nobs);

    for t in 0..nobs {
        let row = t + lag;
        target[t] = y[row];
        restricted[[t, 0]] = 1.0;
        full[[t, 0]] = 1.0;
        for k in 1..=lag {
            restricted[[t, k]] = y[row - k];
            full[[t, k]] = y[row - k];
            full[[t, lag + k]] = x[row - k];
        }
    }

    let singular = || AnalysisError::degenerate(context, format!("singular design at lag {}", lag));
    let (_, ssr_r) = ols(&restricted, &target).ok_or_else(singular)?;
    let (_, ssr_u) = ols(&full, &target).ok_or_else(singular)?;

    let df_num = lag as f64;
    let df_den = nobs as f64 - full_cols as f64;
    if !(ssr_u > 0.0) {
        return Err(AnalysisError::degenerate(context, format!("zero residual at lag {}", lag)));
    }

    let f_stat = ((ssr_r - ssr_u).max(0.0) / df_num) / (ssr_u / df_den);
    let dist = FisherSnedecor::new(df_num, df_den)
        .map_err(|e| AnalysisError::degenerate(context, format!("F({}, {}): {}", df_num, df_den, e)))?;

    let p = dist.sf(f_stat);
    if !p.is_finite() {
        return Err(AnalysisError::degenerate(context, format!("non-finite p-value at lag {}", lag)));
    }
    Ok(p.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn rows_from(sent: &[f64], next_return: &[f64]) -> Vec<AlignedRow> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        sent.iter()
            .zip(next_return)
            .enumerate()
            .map(|(i, (&s, &r))| AlignedRow {
                ticker: "TEST".into(),
                date: start + chrono::Days::new(i as u64),
                sent_mean: s,
                sent_std: 0.2,
                attention: (i % 5) as u32 + 1,
                bull_bear_ratio: 1.0 + s,
                ret: 0.0,
                next_return: r,
                next_range: r.abs(),
                ret_lags: vec![],
                benchmarks: Default::default(),
            })
            .collect()
    }

    #[test]
    fn test_pearson_perfect_and_inverse() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0], "t").unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &[8.0, 6.0, 4.0, 2.0], "t").unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_spearman_monotone_nonlinear() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.powi(3)).collect();
        assert!((spearman(&x, &y, "t").unwrap() - 1.0).abs() < 1e-12);
        assert!(pearson(&x, &y, "t").unwrap() < 1.0);
    }

    #[test]
    fn test_ranks_with_ties() {
        assert_eq!(ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_correlate_constant_feature_is_degenerate() {
        let rows = rows_from(&[0.1, 0.2, 0.3, 0.4], &[0.01, -0.02, 0.03, 0.0]);
        // sent_std is 0.2 on every row.
        let err = correlate(&rows, &[Feature::SentStd], Target::NextReturn).unwrap_err();
        assert!(matches!(err, AnalysisError::NumericDegenerate { .. }));
    }

    #[test]
    fn test_correlate_needs_two_rows() {
        let rows = rows_from(&[0.1], &[0.01]);
        let err = correlate(&rows, &[Feature::SentMean], Target::NextReturn).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_correlate_table() {
        let rows = rows_from(&[0.1, 0.2, 0.3, 0.4, 0.5], &[0.01, 0.02, 0.03, 0.05, 0.04]);
        let table = correlate(&rows, &[Feature::SentMean, Feature::BullBearRatio], Target::NextReturn).unwrap();
        let pair = table[&Feature::SentMean];
        assert!(pair.pearson > 0.8);
        assert!((pair.spearman - 0.9).abs() < 1e-12);
        // bull_bear_ratio = 1 + sent_mean here, an affine copy.
        let other = table[&Feature::BullBearRatio];
        assert!((other.pearson - pair.pearson).abs() < 1e-9);
        assert_eq!(other.spearman, pair.spearman);
    }

    #[test]
    fn test_granger_insufficient_rows() {
        let rows = rows_from(&[0.1; 8], &[0.01; 8]);
        let err = granger(&rows, &Feature::SentMean, Target::NextReturn, 3).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { actual: 8, .. }));
    }

    #[test]
    fn test_granger_detects_lagged_driver() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 200;
        let sent: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let noise: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.01..0.01)).collect();
        let mut ret = vec![0.0; n];
        for t in 1..n {
            ret[t] = 0.05 * sent[t - 1] + noise[t];
        }
        let rows = rows_from(&sent, &ret);

        let pvals = granger(&rows, &Feature::SentMean, Target::NextReturn, 3).unwrap();
        assert_eq!(pvals.len(), 3);
        assert!(pvals.values().all(|&p| p < 1e-6));
    }

    #[test]
    fn test_granger_independent_series_not_significant_everywhere() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 300;
        let sent: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let ret: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.02..0.02)).collect();
        let rows = rows_from(&sent, &ret);

        let pvals = granger(&rows, &Feature::SentMean, Target::NextReturn, 2).unwrap();
        assert!(pvals.values().all(|&p| (0.0..=1.0).contains(&p)));
        assert!(pvals.values().any(|&p| p > 0.01));
    }
}
