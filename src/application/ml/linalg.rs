//! Ordinary least squares on small dense design matrices.

use ndarray::{Array1, Array2, Axis};
use std::f64::consts::PI;

/// Relative pivot size below which a normal-equation matrix is treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct OlsFit {
    pub coefficients: Array1<f64>,
    pub std_errors: Array1<f64>,
    pub residuals: Array1<f64>,
    pub rss: f64,
    pub nobs: usize,
}

impl OlsFit {
    pub fn n_params(&self) -> usize {
        self.coefficients.len()
    }

    /// Gaussian log-likelihood at the least-squares solution
    pub fn log_likelihood(&self) -> f64 {
        let n = self.nobs as f64;
        -n / 2.0 * ((2.0 * PI).ln() + (self.rss / n).ln() + 1.0)
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood() + 2.0 * self.n_params() as f64
    }
}

/// Solves `min ||y - X b||²`. Returns `None` when `X'X` is singular or the
/// system is underdetermined.
pub fn ols(x: &Array2<f64>, y: &Array1<f64>) -> Option<OlsFit> {
    let (nobs, k) = x.dim();
    if nobs != y.len() || k == 0 || nobs <= k {
        return None;
    }

    let xtx = x.t().dot(x);
    let xty = x.t().dot(y);
    let xtx_inv = invert(&xtx)?;

    let coefficients = xtx_inv.dot(&xty);
    let residuals = y - &x.dot(&coefficients);
    let rss = residuals.dot(&residuals);
    if !rss.is_finite() {
        return None;
    }

    let sigma2 = rss / (nobs - k) as f64;
    let std_errors = xtx_inv
        .diag()
        .mapv(|v| (sigma2 * v.max(0.0)).sqrt());

    Some(OlsFit {
        coefficients,
        std_errors,
        residuals,
        rss,
        nobs,
    })
}

/// Gauss-Jordan inversion with partial pivoting.
pub fn invert(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return None;
    }

    let scale = matrix
        .diag()
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()))
        .max(f64::MIN_POSITIVE);

    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| {
            a[[i, col]]
                .abs()
                .partial_cmp(&a[[j, col]].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;

        let pivot = a[[pivot_row, col]];
        if !pivot.is_finite() || pivot.abs() < SINGULAR_TOLERANCE * scale {
            return None;
        }

        if pivot_row != col {
            swap_rows(&mut a, pivot_row, col);
            swap_rows(&mut inv, pivot_row, col);
        }

        a.row_mut(col).mapv_inplace(|v| v / pivot);
        inv.row_mut(col).mapv_inplace(|v| v / pivot);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            let a_pivot = a.row(col).to_owned();
            let inv_pivot = inv.row(col).to_owned();
            a.row_mut(row).scaled_add(-factor, &a_pivot);
            inv.row_mut(row).scaled_add(-factor, &inv_pivot);
        }
    }

    Some(inv)
}

fn swap_rows(matrix: &mut Array2<f64>, a: usize, b: usize) {
    let row_a = matrix.index_axis(Axis(0), a).to_owned();
    let row_b = matrix.index_axis(Axis(0), b).to_owned();
    matrix.row_mut(a).assign(&row_b);
    matrix.row_mut(b).assign(&row_a);
}
