//! Augmented Dickey-Fuller unit-root test (constant, no trend).
//!
//! Lag length is chosen by AIC over a common estimation sample, then the
//! chosen regression is refit on every available observation. The p-value
//! uses MacKinnon's (1994) approximate response surface for a single series.

use crate::application::ml::linalg::ols;
use crate::domain::errors::{ForecastError, Result};
use crate::domain::forecasting::magnitude;
use ndarray::{Array1, Array2};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

// MacKinnon surface for the constant-only regression, N = 1
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub nobs: usize,
}

impl AdfResult {
    pub fn is_stationary(&self, significance: f64) -> bool {
        self.p_value < significance
    }
}

/// Default upper bound on the augmentation lag, `ceil(12 * (n / 100)^(1/4))`
/// capped so the regression keeps enough degrees of freedom.
pub fn max_lag(n: usize) -> Option<usize> {
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let cap = (n / 2).checked_sub(2)?;
    Some(schwert.min(cap))
}

pub fn adf_test(values: &[f64]) -> Result<AdfResult> {
    let n = values.len();
    let max_lag = max_lag(n).ok_or_else(|| {
        ForecastError::algorithm("stationarity test", format!("series of {} points is too short", n))
    })?;

    if values.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::algorithm(
            "stationarity test",
            "series contains non-finite values",
        ));
    }
    let first = values[0];
    if values.iter().all(|v| (v - first).abs() <= f64::EPSILON * first.abs().max(1.0)) {
        return Err(ForecastError::algorithm(
            "stationarity test",
            "series is constant",
        ));
    }

    // The statistic is scale-free; normalising keeps the cross products finite
    let scale = magnitude(values);
    let values: Vec<f64> = values.iter().map(|v| v / scale).collect();
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    // Pick the lag on the sample every candidate can use
    let mut best: Option<(usize, f64)> = None;
    for lag in 0..=max_lag {
        let (x, y) = adf_design(&values, &diffs, lag, max_lag);
        if let Some(fit) = ols(&x, &y) {
            let aic = fit.aic();
            if best.is_none_or(|(_, best_aic)| aic < best_aic) {
                best = Some((lag, aic));
            }
        }
    }
    let (used_lag, _) = best.ok_or_else(|| {
        ForecastError::algorithm("stationarity test", "lag-selection regressions are singular")
    })?;

    let (x, y) = adf_design(&values, &diffs, used_lag, used_lag);
    let fit = ols(&x, &y).ok_or_else(|| {
        ForecastError::algorithm("stationarity test", "final ADF regression is singular")
    })?;

    let se = fit.std_errors[1];
    if se <= 0.0 || !se.is_finite() {
        return Err(ForecastError::algorithm(
            "stationarity test",
            "degenerate standard error on lagged level",
        ));
    }
    let statistic = fit.coefficients[1] / se;
    let p_value = mackinnon_p_value(statistic);

    debug!(
        "ADF statistic={:.4} p={:.4} lag={} nobs={}",
        statistic, p_value, used_lag, fit.nobs
    );

    Ok(AdfResult {
        statistic,
        p_value,
        used_lag,
        nobs: fit.nobs,
    })
}

/// Rows regress `Δx_t` on `[1, x_{t}, Δx_{t-1}, …, Δx_{t-lag}]`, starting at `start`.
fn adf_design(values: &[f64], diffs: &[f64], lag: usize, start: usize) -> (Array2<f64>, Array1<f64>) {
    let rows = diffs.len() - start;
    let cols = 2 + lag;
    let mut x = Array2::<f64>::zeros((rows, cols));
    let mut y = Array1::<f64>::zeros(rows);

    for (row, t) in (start..diffs.len()).enumerate() {
        y[row] = diffs[t];
        x[[row, 0]] = 1.0;
        x[[row, 1]] = values[t];
        for j in 1..=lag {
            x[[row, 1 + j]] = diffs[t - j];
        }
    }

    (x, y)
}

/// Approximate asymptotic p-value of an ADF statistic.
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }

    let coefficients: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let z = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);

    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(z),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn white_noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| 100.0 + rng.random_range(-5.0..5.0)).collect()
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut level = 100.0;
        (0..n)
            .map(|_| {
                level += rng.random_range(-1.0..1.0);
                level
            })
            .collect()
    }

    #[test]
    fn test_mackinnon_p_value_is_monotonic() {
        let p_low = mackinnon_p_value(-4.0);
        let p_mid = mackinnon_p_value(-2.86);
        let p_high = mackinnon_p_value(0.0);

        assert!(p_low < p_mid && p_mid < p_high);
        // -2.86 is the 5% critical value for the constant-only case
        assert!((p_mid - 0.05).abs() < 0.01);
    }

    #[test]
    fn test_mackinnon_p_value_saturates() {
        assert_eq!(mackinnon_p_value(5.0), 1.0);
        assert_eq!(mackinnon_p_value(-25.0), 0.0);
    }

    #[test]
    fn test_white_noise_is_stationary() {
        let result = adf_test(&white_noise(200, 7)).unwrap();
        assert!(result.is_stationary(0.05), "p = {}", result.p_value);
    }

    #[test]
    fn test_random_walk_is_not_stationary() {
        let result = adf_test(&random_walk(200, 11)).unwrap();
        assert!(!result.is_stationary(0.01), "p = {}", result.p_value);
    }

    #[test]
    fn test_constant_series_is_an_error() {
        let result = adf_test(&[42.0; 60]);
        assert!(matches!(result, Err(ForecastError::AlgorithmFailure { .. })));
    }

    #[test]
    fn test_statistic_ignores_price_magnitude() {
        let walk = random_walk(200, 11);
        let huge: Vec<f64> = walk.iter().map(|v| v * 1e299).collect();

        let base = adf_test(&walk).unwrap();
        let scaled = adf_test(&huge).unwrap();
        assert_eq!(base.used_lag, scaled.used_lag);
        assert!((base.statistic - scaled.statistic).abs() < 1e-6);
    }

    #[test]
    fn test_too_short_series_is_an_error() {
        assert!(adf_test(&[1.0, 2.0, 3.0]).is_err());
    }
}
