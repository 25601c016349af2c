//! Permutation test for the ridge coefficient of a single feature.

use super::dataset::Dataset;
use super::modeling::ridge_solve;
use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{AlignedRow, Feature, Target};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermutationResult {
    pub feature: Feature,
    pub real_coefficient: f64,
    pub p_value: f64,
    pub null_distribution: Vec<f64>,
    pub n_iterations: usize,
}

impl PermutationResult {
    pub fn is_significant(&self, level: f64) -> bool {
        self.p_value < level
    }
}

/// Compare the real coefficient against coefficients refit on shuffled
/// copies of the feature.
///
/// Each shuffle is an independent permutation of the whole series, so any
/// autocorrelation in the feature is destroyed along with the pairing.
/// Iteration `i` is seeded with `seed + i`.
pub fn permutation_test(
    rows: &[AlignedRow],
    feature: &Feature,
    target: Target,
    n_iterations: usize,
    alpha: f64,
    seed: u64,
) -> AnalysisResult<PermutationResult> {
    let context = format!("permutation test {} -> {}", feature, target);
    if n_iterations == 0 {
        return Err(AnalysisError::insufficient(context, "at least 1 iteration", 0));
    }

    let ds = Dataset::from_rows(rows, std::slice::from_ref(feature), target)?;
    if ds.n_samples() < 2 {
        return Err(AnalysisError::insufficient(context, "at least 2 rows", ds.n_samples()));
    }
    ds.ensure_non_constant(&context, true)?;

    let real_coefficient = single_coefficient(&ds.x, &ds.y, alpha)
        .ok_or_else(|| AnalysisError::degenerate(&context, "singular fit on real data"))?;

    let column: Vec<f64> = ds.x.column(0).to_vec();
    let null_distribution: Vec<f64> = (0..n_iterations)
        .into_par_iter()
        .filter_map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut shuffled = column.clone();
            shuffled.shuffle(&mut rng);
            let x = Array2::from_shape_vec((shuffled.len(), 1), shuffled).ok()?;
            single_coefficient(&x, &ds.y, alpha)
        })
        .collect();

    if null_distribution.len() != n_iterations {
        return Err(AnalysisError::degenerate(
            &context,
            format!("{} of {} permuted fits failed", n_iterations - null_distribution.len(), n_iterations),
        ));
    }

    let extreme = null_distribution
        .iter()
        .filter(|c| c.abs() >= real_coefficient.abs())
        .count();

    Ok(PermutationResult {
        feature: feature.clone(),
        real_coefficient,
        p_value: extreme as f64 / n_iterations as f64,
        null_distribution,
        n_iterations,
    })
}

fn single_coefficient(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Option<f64> {
    let (beta, _) = ridge_solve(x, y, alpha)?;
    beta.first().copied().filter(|c| c.is_finite())
}
