//! Small dense solvers shared by the regression code.

use ndarray::{Array1, Array2};

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when `A` is (numerically) singular.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }

    let mut m = a.clone();
    let mut rhs = b.clone();
    let scale = m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let tol = scale * 1e-12;

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))?;
        if m[[pivot, col]].abs() < tol {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
            }
            rhs.swap(col, pivot);
        }

        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| m[[row, k]] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[[row, row]];
    }
    Some(x)
}

/// Ordinary least squares with the design matrix used as given (include a
/// column of ones for an intercept). Returns coefficients and the residual
/// sum of squares.
pub fn ols(x: &Array2<f64>, y: &Array1<f64>) -> Option<(Array1<f64>, f64)> {
    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    let beta = solve(&xtx, &xty)?;
    let resid = y - &x.dot(&beta);
    let ssr = resid.dot(&resid);
    Some((beta, ssr))
}

/// Column means and population standard deviations.
pub fn column_moments(x: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let n = x.nrows().max(1) as f64;
    let mut means = Array1::zeros(x.ncols());
    let mut stds = Array1::zeros(x.ncols());
    for (j, col) in x.columns().into_iter().enumerate() {
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        means[j] = mean;
        stds[j] = var.sqrt();
    }
    (means, stds)
}
