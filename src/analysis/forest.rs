//! Class-weighted random forest for up/down classification.

use crate::config::ForestConfig;
use ndarray::{Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Weighted fraction of class 1 among the samples that reached the leaf.
        p_up: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            Node::Leaf { p_up } => *p_up,
            Node::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    y: &'a [bool],
    /// Per-sample class weight times bootstrap multiplicity.
    w: &'a [f64],
    cfg: &'a ForestConfig,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &[usize], depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let (w_up, w_total) = weighted_counts(self.y, self.w, indices);
        let p_up = if w_total > 0.0 { w_up / w_total } else { 0.5 };

        if depth >= self.cfg.max_depth
            || indices.len() < self.cfg.min_samples_split
            || gini(w_up, w_total) < 1e-12
        {
            return Node::Leaf { p_up };
        }

        match self.best_split(indices, rng) {
            Some((feature, threshold)) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| self.x[[i, feature]] <= threshold);
                Node::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(&left, depth + 1, rng)),
                    right: Box::new(self.build(&right, depth + 1, rng)),
                }
            }
            None => Node::Leaf { p_up },
        }
    }

    /// Best Gini-decreasing split over a random subset of features.
    fn best_split(&self, indices: &[usize], rng: &mut ChaCha8Rng) -> Option<(usize, f64)> {
        if indices.len() < 2 {
            return None;
        }
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);
        features.truncate(self.max_features);

        let (w_up, w_total) = weighted_counts(self.y, self.w, indices);
        let parent = gini(w_up, w_total);
        let min_leaf = self.cfg.min_samples_leaf.max(1);

        let mut best: Option<(f64, usize, f64)> = None;
        for feature in features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut left_up, mut left_total) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left_total += self.w[i];
                if self.y[i] {
                    left_up += self.w[i];
                }

                let (v, next) = (self.x[[i, feature]], self.x[[order[pos + 1], feature]]);
                if v == next {
                    continue;
                }
                let n_left = pos + 1;
                if n_left < min_leaf || order.len() - n_left < min_leaf {
                    continue;
                }

                let right_up = w_up - left_up;
                let right_total = w_total - left_total;
                let child = (left_total * gini(left_up, left_total) + right_total * gini(right_up, right_total)) / w_total;
                let gain = parent - child;
                if gain > 1e-12 && best.is_none_or(|(g, _, _)| gain > g) {
                    best = Some((gain, feature, (v + next) / 2.0));
                }
            }
        }

        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

fn weighted_counts(y: &[bool], w: &[f64], indices: &[usize]) -> (f64, f64) {
    indices.iter().fold((0.0, 0.0), |(up, total), &i| {
        (if y[i] { up + w[i] } else { up }, total + w[i])
    })
}

fn gini(w_up: f64, w_total: f64) -> f64 {
    if w_total <= 0.0 {
        return 0.0;
    }
    let p = w_up / w_total;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

/// "Balanced" class weights: n / (2 · n_class).
pub fn balanced_weights(y: &[bool]) -> (f64, f64) {
    let n = y.len() as f64;
    let n_up = y.iter().filter(|&&v| v).count() as f64;
    let n_down = n - n_up;
    let w = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    (w(n_down), w(n_up))
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Node>,
}

impl RandomForest {
    /// Fit on `x`/`y`; tree `i` uses seed `seed + i` for its bootstrap and
    /// feature draws, so results do not depend on thread scheduling.
    pub fn fit(x: &Array2<f64>, y: &[bool], cfg: &ForestConfig, seed: u64) -> Self {
        let n = y.len();
        let (w_down, w_up) = balanced_weights(y);
        let class_w: Vec<f64> = y.iter().map(|&v| if v { w_up } else { w_down }).collect();
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);

        let trees = (0..cfg.n_trees)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(t as u64));

                let mut multiplicity = vec![0.0; n];
                for _ in 0..n {
                    multiplicity[rng.gen_range(0..n)] += 1.0;
                }
                let w: Vec<f64> = class_w.iter().zip(&multiplicity).map(|(c, m)| c * m).collect();
                let in_bag: Vec<usize> = (0..n).filter(|&i| multiplicity[i] > 0.0).collect();

                let builder = TreeBuilder { x, y, w: &w, cfg, max_features };
                builder.build(&in_bag, 0, &mut rng)
            })
            .collect();

        Self { trees }
    }

    /// Mean of per-tree up-probabilities for each row of `x`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Vec<f64> {
        let k = self.trees.len().max(1) as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / k)
            .collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cfg() -> ForestConfig {
        ForestConfig {
            n_trees: 25,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    #[test]
    fn test_balanced_weights() {
        let y = [true, true, true, false];
        let (w_down, w_up) = balanced_weights(&y);
        assert!((w_down - 2.0).abs() < 1e-12);
        assert!((w_up - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(0.0, 4.0), 0.0);
        assert_eq!(gini(2.0, 4.0), 0.5);
    }

    #[test]
    fn test_forest_learns_threshold_rule() {
        let n = 60;
        // Both columns are monotone in the row index, so any drawn feature can split.
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Vec<bool> = (0..n).map(|i| i >= 30).collect();

        let forest = RandomForest::fit(&x, &y, &small_cfg(), 42);
        assert_eq!(forest.n_trees(), 25);

        let probs = forest.predict_proba(&x);
        let correct = probs.iter().zip(&y).filter(|(p, y)| (**p >= 0.5) == **y).count();
        assert_eq!(correct, n);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * (j + 3)) % 11) as f64);
        let y: Vec<bool> = (0..40).map(|i| i % 3 == 0).collect();
        let a = RandomForest::fit(&x, &y, &small_cfg(), 9).predict_proba(&x);
        let b = RandomForest::fit(&x, &y, &small_cfg(), 9).predict_proba(&x);
        assert_eq!(a, b);
    }
}
