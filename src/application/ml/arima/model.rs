//! ARIMA(p, d, q) estimation and forecasting.
//!
//! The ARMA part of the differenced series is estimated with the two-stage
//! Hannan-Rissanen regression: a long autoregression supplies innovation
//! estimates, then the series is regressed on its own lags and the lagged
//! innovations. Coefficients outside the stationary (AR) or invertible (MA)
//! region are damped back inside before the likelihood is evaluated. When
//! either regression is singular (deterministic trends, exact cycles) the AR
//! part falls back to Yule-Walker and the MA part to zero.
//!
//! Fitting runs on the series divided by its largest absolute value so that
//! extreme price magnitudes cannot overflow the sums of squares.

use crate::application::ml::linalg::ols;
use crate::domain::errors::{ForecastError, Result};
use crate::domain::forecasting::{ArimaOrder, magnitude};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Per-round root scaling applied when coefficients leave the admissible region
const DAMPING: f64 = 0.95;
const MAX_DAMPING_ROUNDS: usize = 500;
const MIN_INNOVATION_VARIANCE: f64 = 1e-12;

/// Fitted parameters plus the trailing state needed to continue the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedArima {
    pub order: ArimaOrder,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// Divisor applied to the series before fitting
    pub scale: f64,
    /// Constant of the differenced series (zero unless d = 0), in units of `scale`
    pub mean: f64,
    /// Innovation variance in units of `scale²`
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    pub nobs: usize,
    /// Last value of the k-times differenced series for k in 0..d
    integration_tails: Vec<f64>,
    /// Last p values of the centred, differenced series
    recent_values: Vec<f64>,
    /// Last q in-sample innovations
    recent_residuals: Vec<f64>,
}

impl FittedArima {
    pub fn fit(values: &[f64], order: ArimaOrder) -> Result<Self> {
        let ArimaOrder { p, d, q } = order;
        let scale = magnitude(values);
        let scaled: Vec<f64> = values.iter().map(|v| v / scale).collect();
        let (differenced, integration_tails) = difference(&scaled, d);
        let n = differenced.len();

        if n <= p + q + 1 {
            return Err(ForecastError::algorithm(
                "ARIMA fit",
                format!(
                    "{} observations after differencing cannot support order {}",
                    n, order
                ),
            ));
        }

        let mean = if d == 0 {
            differenced.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        let centred: Vec<f64> = differenced.iter().map(|v| v - mean).collect();

        let spread = centred.iter().map(|v| v * v).sum::<f64>();
        let (mut ar, mut ma) = if spread <= f64::EPSILON {
            debug!("Differenced series has no variation; using zero ARMA coefficients");
            (vec![0.0; p], vec![0.0; q])
        } else {
            estimate_arma(&centred, p, q)
        };

        if constrain(&mut ar, is_stationary) {
            warn!("AR coefficients damped into the stationary region: {:?}", ar);
        }
        if constrain(&mut ma, is_invertible) {
            warn!("MA coefficients damped into the invertible region: {:?}", ma);
        }

        let residuals = arma_residuals(&centred, &ar, &ma);
        let effective = (n - p) as f64;
        let sigma2 = (residuals[p..].iter().map(|e| e * e).sum::<f64>() / effective)
            .max(MIN_INNOVATION_VARIANCE);
        // Jacobian of the rescaling keeps the likelihood on the original scale
        let log_likelihood =
            -effective / 2.0 * ((2.0 * PI * sigma2).ln() + 1.0) - effective * scale.ln();

        // AR + MA + variance, plus the constant when the series is not differenced
        let n_params = p + q + 1 + usize::from(d == 0);
        let aic = 2.0 * n_params as f64 - 2.0 * log_likelihood;

        Ok(Self {
            order,
            recent_values: centred[n - p..].to_vec(),
            recent_residuals: residuals[n - q..].to_vec(),
            ar,
            ma,
            scale,
            mean,
            sigma2,
            log_likelihood,
            aic,
            nobs: n,
            integration_tails,
        })
    }

    /// Point forecasts for the next `horizon` steps on the original scale.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut values = self.recent_values.clone();
        let mut innovations = self.recent_residuals.clone();
        let mut tails = self.integration_tails.clone();
        let mut forecasts = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let mut next = 0.0;
            for (i, coefficient) in self.ar.iter().enumerate() {
                next += coefficient * values[values.len() - 1 - i];
            }
            for (j, coefficient) in self.ma.iter().enumerate() {
                next += coefficient * innovations[innovations.len() - 1 - j];
            }
            values.push(next);
            innovations.push(0.0);

            let mut level = next + self.mean;
            for tail in tails.iter_mut().rev() {
                level += *tail;
                *tail = level;
            }
            forecasts.push(level * self.scale);
        }

        forecasts
    }

    /// Coefficients of the AR polynomial after multiplying in `(1 - B)^d`.
    fn integrated_ar(&self) -> Vec<f64> {
        let mut polynomial = Vec::with_capacity(self.ar.len() + 1);
        polynomial.push(1.0);
        polynomial.extend(self.ar.iter().map(|c| -c));

        for _ in 0..self.order.d {
            let mut next = vec![0.0; polynomial.len() + 1];
            for (i, c) in polynomial.iter().enumerate() {
                next[i] += c;
                next[i + 1] -= c;
            }
            polynomial = next;
        }

        polynomial[1..].iter().map(|c| -c).collect()
    }

    /// First `n` weights of the MA(∞) representation of the integrated model.
    pub fn psi_weights(&self, n: usize) -> Vec<f64> {
        let phi = self.integrated_ar();
        let mut psi = vec![0.0; n];
        if n == 0 {
            return psi;
        }
        psi[0] = 1.0;

        for j in 1..n {
            let mut weight = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for i in 1..=j.min(phi.len()) {
                weight += phi[i - 1] * psi[j - i];
            }
            psi[j] = weight;
        }

        psi
    }

    /// Standard error of the h-step forecast for h = 1..=horizon.
    pub fn forecast_std_errors(&self, horizon: usize) -> Vec<f64> {
        let mut cumulative = 0.0;
        self.psi_weights(horizon)
            .into_iter()
            .map(|psi| {
                cumulative += psi * psi;
                self.scale * (self.sigma2 * cumulative).sqrt()
            })
            .collect()
    }
}

/// Applies `(1 - B)^d`, returning the differenced series and the last value
/// of each intermediate level (needed to integrate forecasts back).
fn difference(values: &[f64], d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut current = values.to_vec();
    let mut tails = Vec::with_capacity(d);
    for _ in 0..d {
        tails.push(current.last().copied().unwrap_or(0.0));
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (current, tails)
}

/// Order of the preliminary long autoregression
fn long_ar_order(n: usize, p: usize, q: usize) -> usize {
    let lower = p.max(q) + 1;
    let upper = (n / 4).max(lower);
    ((n as f64).ln().powi(2).round() as usize).clamp(lower, upper)
}

fn estimate_arma(z: &[f64], p: usize, q: usize) -> (Vec<f64>, Vec<f64>) {
    match hannan_rissanen(z, p, q) {
        Ok(coefficients) => coefficients,
        Err(e) => {
            warn!("{}; falling back to Yule-Walker AR({}) with zero MA terms", e, p);
            (yule_walker(z, p), vec![0.0; q])
        }
    }
}

fn hannan_rissanen(z: &[f64], p: usize, q: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    let n = z.len();
    if p == 0 && q == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut innovations = vec![0.0; n];
    let mut start = p;
    if q > 0 {
        let m = long_ar_order(n, p, q);
        let (x, y) = lagged_design(z, &[], m, 0, m);
        let long_fit = ols(&x, &y).ok_or_else(|| {
            ForecastError::algorithm("ARIMA fit", format!("long AR({}) regression is singular", m))
        })?;
        for (offset, residual) in long_fit.residuals.iter().enumerate() {
            innovations[m + offset] = *residual;
        }
        start = p.max(m + q);
    }

    if n <= start + p + q {
        return Err(ForecastError::algorithm(
            "ARIMA fit",
            format!("{} observations are too few for ARMA({}, {})", n, p, q),
        ));
    }

    let (x, y) = lagged_design(z, &innovations, p, q, start);
    let fit = ols(&x, &y).ok_or_else(|| {
        ForecastError::algorithm("ARIMA fit", "Hannan-Rissanen regression is singular")
    })?;

    let coefficients = fit.coefficients.to_vec();
    let ma = coefficients[p..].to_vec();
    let mut ar = coefficients;
    ar.truncate(p);
    Ok((ar, ma))
}

/// AR(p) coefficients from the Levinson-Durbin recursion on biased
/// autocovariances. The recursion stops early once a reflection coefficient
/// reaches the unit circle or the prediction error vanishes, so the result is
/// always stationary.
fn yule_walker(z: &[f64], p: usize) -> Vec<f64> {
    let n = z.len();
    let mut phi = vec![0.0; p];
    if p == 0 || n == 0 {
        return phi;
    }

    let autocovariance: Vec<f64> = (0..=p)
        .map(|k| {
            let lagged = &z[k.min(n)..];
            lagged.iter().zip(z).map(|(a, b)| a * b).sum::<f64>() / n as f64
        })
        .collect();

    let mut error = autocovariance[0];
    if !(error.is_finite() && error > 0.0) {
        return phi;
    }

    for k in 0..p {
        let mut numerator = autocovariance[k + 1];
        for j in 0..k {
            numerator -= phi[j] * autocovariance[k - j];
        }
        let reflection = numerator / error;
        if !reflection.is_finite() || reflection.abs() >= 1.0 {
            break;
        }

        let previous = phi.clone();
        phi[k] = reflection;
        for j in 0..k {
            phi[j] = previous[j] - reflection * previous[k - 1 - j];
        }

        error *= 1.0 - reflection * reflection;
        if error <= MIN_INNOVATION_VARIANCE * autocovariance[0] {
            break;
        }
    }

    phi
}

/// Rows `t = start..n` regress `z_t` on `z_{t-1..t-p}` and `e_{t-1..t-q}`.
fn lagged_design(
    z: &[f64],
    innovations: &[f64],
    p: usize,
    q: usize,
    start: usize,
) -> (Array2<f64>, Array1<f64>) {
    let rows = z.len() - start;
    let mut x = Array2::<f64>::zeros((rows, p + q));
    let mut y = Array1::<f64>::zeros(rows);

    for (row, t) in (start..z.len()).enumerate() {
        y[row] = z[t];
        for i in 1..=p {
            x[[row, i - 1]] = z[t - i];
        }
        for j in 1..=q {
            x[[row, p + j - 1]] = innovations[t - j];
        }
    }

    (x, y)
}

/// One-step prediction errors with pre-sample values taken as zero.
fn arma_residuals(z: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut residuals = vec![0.0; z.len()];
    for t in 0..z.len() {
        let mut prediction = 0.0;
        for (i, coefficient) in ar.iter().enumerate().take(t) {
            prediction += coefficient * z[t - 1 - i];
        }
        for (j, coefficient) in ma.iter().enumerate().take(t) {
            prediction += coefficient * residuals[t - 1 - j];
        }
        residuals[t] = z[t] - prediction;
    }
    residuals
}

/// Schur-Cohn check on `1 - Σ φ_i B^i` via the Durbin-Levinson step-down:
/// every partial autocorrelation must lie strictly inside (-1, 1).
pub fn is_stationary(ar: &[f64]) -> bool {
    let mut current = ar.to_vec();
    while let Some(&reflection) = current.last() {
        if !reflection.is_finite() || reflection.abs() >= 1.0 {
            return false;
        }
        let k = current.len();
        let denominator = 1.0 - reflection * reflection;
        current = (0..k - 1)
            .map(|j| (current[j] + reflection * current[k - 2 - j]) / denominator)
            .collect();
    }
    true
}

/// `1 + Σ θ_j B^j` has its roots outside the unit circle
pub fn is_invertible(ma: &[f64]) -> bool {
    let negated: Vec<f64> = ma.iter().map(|c| -c).collect();
    is_stationary(&negated)
}

/// Scales coefficient j by `DAMPING^j` until `admissible` holds, which pushes
/// every polynomial root outward by `1 / DAMPING`. Returns whether anything changed.
fn constrain(coefficients: &mut [f64], admissible: fn(&[f64]) -> bool) -> bool {
    let mut rounds = 0;
    while !admissible(coefficients) {
        if rounds >= MAX_DAMPING_ROUNDS {
            coefficients.fill(0.0);
            return true;
        }
        for (j, c) in coefficients.iter_mut().enumerate() {
            *c *= DAMPING.powi(j as i32 + 1);
        }
        rounds += 1;
    }
    rounds > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ar1_series(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut value = 0.0;
        (0..n)
            .map(|_| {
                value = phi * value + rng.random_range(-1.0..1.0);
                50.0 + value
            })
            .collect()
    }

    #[test]
    fn test_difference_tracks_tails() {
        let (diffed, tails) = difference(&[1.0, 3.0, 6.0, 10.0], 2);
        assert_eq!(diffed, vec![1.0, 1.0]);
        assert_eq!(tails, vec![10.0, 4.0]);
    }

    #[test]
    fn test_stationarity_check() {
        assert!(is_stationary(&[]));
        assert!(is_stationary(&[0.5]));
        assert!(!is_stationary(&[1.0]));
        assert!(!is_stationary(&[1.2, -0.1]));
        assert!(is_stationary(&[0.5, 0.3]));
        // 1 - 0.5B - 0.6B² has a root inside the unit circle
        assert!(!is_stationary(&[0.5, 0.6]));
    }

    #[test]
    fn test_constrain_damps_explosive_coefficients() {
        let mut coefficients = vec![1.3, -0.1];
        assert!(constrain(&mut coefficients, is_stationary));
        assert!(is_stationary(&coefficients));

        let mut fine = vec![0.4];
        assert!(!constrain(&mut fine, is_stationary));
        assert_eq!(fine, vec![0.4]);
    }

    #[test]
    fn test_fit_recovers_ar1_coefficient() {
        let series = ar1_series(0.7, 400, 5);
        let fitted = FittedArima::fit(&series, ArimaOrder::new(1, 0, 0)).unwrap();

        assert!((fitted.ar[0] - 0.7).abs() < 0.1, "ar = {:?}", fitted.ar);
        assert!((fitted.mean * fitted.scale - 50.0).abs() < 0.5);
        assert!(fitted.aic.is_finite());
    }

    #[test]
    fn test_stationary_forecast_reverts_to_mean() {
        let series = ar1_series(0.5, 300, 9);
        let fitted = FittedArima::fit(&series, ArimaOrder::new(2, 0, 1)).unwrap();
        let forecasts = fitted.forecast(200);

        assert_eq!(forecasts.len(), 200);
        assert!((forecasts[199] - fitted.mean * fitted.scale).abs() < 0.5);
    }

    #[test]
    fn test_forecast_intervals_widen_with_horizon() {
        let series = ar1_series(0.6, 200, 13);
        let fitted = FittedArima::fit(&series, ArimaOrder::new(1, 1, 1)).unwrap();
        let errors = fitted.forecast_std_errors(10);

        assert_eq!(errors.len(), 10);
        assert!((errors[0] - fitted.scale * fitted.sigma2.sqrt()).abs() < 1e-9);
        for pair in errors.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_psi_weights_of_random_walk_are_ones() {
        let series: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 * 0.5 + (i % 3) as f64).collect();
        let mut fitted = FittedArima::fit(&series, ArimaOrder::new(1, 1, 0)).unwrap();
        fitted.ar = vec![0.0];
        assert_eq!(fitted.psi_weights(4), vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_constant_series_fits_with_zero_coefficients() {
        let fitted = FittedArima::fit(&[7.0; 40], ArimaOrder::FALLBACK).unwrap();
        assert_eq!(fitted.ar, vec![0.0]);
        assert_eq!(fitted.ma, vec![0.0]);
        for value in fitted.forecast(5) {
            assert!((value - 7.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_short_series_is_rejected() {
        let result = FittedArima::fit(&[1.0, 2.0, 3.0], ArimaOrder::new(2, 1, 2));
        assert!(matches!(result, Err(ForecastError::AlgorithmFailure { .. })));
    }

    fn assert_usable(fitted: &FittedArima, horizon: usize) {
        let forecasts = fitted.forecast(horizon);
        let errors = fitted.forecast_std_errors(horizon);
        assert_eq!(forecasts.len(), horizon);
        assert!(forecasts.iter().all(|v| v.is_finite()), "{:?}", forecasts);
        assert!(errors.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(fitted.aic.is_finite());
    }

    #[test]
    fn test_yule_walker_recovers_ar1() {
        let series = ar1_series(0.6, 500, 21);
        let mean = series.iter().sum::<f64>() / series.len() as f64;
        let centred: Vec<f64> = series.iter().map(|v| v - mean).collect();
        let phi = yule_walker(&centred, 1);
        assert!((phi[0] - 0.6).abs() < 0.1, "phi = {:?}", phi);
    }

    #[test]
    fn test_yule_walker_is_stationary_on_degenerate_input() {
        let constant = vec![3.0; 40];
        let phi = yule_walker(&constant, 5);
        assert!(is_stationary(&phi));
        assert_eq!(yule_walker(&[0.0; 10], 2), vec![0.0, 0.0]);
    }

    #[test]
    fn test_deterministic_shapes_fit_at_selected_orders() {
        let trend: Vec<f64> = (0..90).map(|i| 2000.0 + 5.0 * i as f64).collect();
        let alternating: Vec<f64> = (0..90)
            .map(|i| if i % 2 == 0 { 2400.0 } else { 2600.0 })
            .collect();
        let period_three: Vec<f64> = (0..90).map(|i| [2400.0, 2500.0, 2600.0][i % 3]).collect();
        let sinusoid: Vec<f64> = (0..90)
            .map(|i| 2500.0 + 50.0 * (0.35 * i as f64).sin())
            .collect();
        let stepped: Vec<f64> = (0..90).map(|i| 2000.0 + 25.0 * (i / 10) as f64).collect();

        let cases = [
            ("trend", trend),
            ("alternating", alternating),
            ("period three", period_three),
            ("sinusoid", sinusoid),
            ("stepped", stepped),
        ];
        for (name, series) in cases {
            for order in [ArimaOrder::new(5, 1, 5), ArimaOrder::new(5, 0, 5), ArimaOrder::FALLBACK] {
                let fitted = FittedArima::fit(&series, order)
                    .unwrap_or_else(|e| panic!("{} at {}: {}", name, order, e));
                assert!(is_stationary(&fitted.ar), "{} at {}", name, order);
                assert!(is_invertible(&fitted.ma), "{} at {}", name, order);
                assert_usable(&fitted, 365);
            }
        }
    }

    #[test]
    fn test_trend_forecast_keeps_rising() {
        let trend: Vec<f64> = (0..90).map(|i| 2000.0 + 5.0 * i as f64).collect();
        let fitted = FittedArima::fit(&trend, ArimaOrder::FALLBACK).unwrap();
        let forecasts = fitted.forecast(3);
        assert!(forecasts[0] >= 2445.0 - 1e-6, "{:?}", forecasts);
    }

    #[test]
    fn test_extreme_magnitudes_stay_finite() {
        let series: Vec<f64> = (0..90)
            .map(|i| 1e300 * (1.0 + 0.01 * (0.35 * i as f64).sin()))
            .collect();
        let fitted = FittedArima::fit(&series, ArimaOrder::new(5, 1, 5)).unwrap();
        assert_usable(&fitted, 365);
        let first = fitted.forecast(1)[0];
        assert!(first > 9e299 && first < 1.1e300);
    }

    #[test]
    fn test_scale_leaves_forecasts_unchanged() {
        let series = ar1_series(0.5, 200, 17);
        let fitted = FittedArima::fit(&series, ArimaOrder::new(1, 0, 1)).unwrap();
        let rescaled: Vec<f64> = series.iter().map(|v| v * 1000.0).collect();
        let refitted = FittedArima::fit(&rescaled, ArimaOrder::new(1, 0, 1)).unwrap();

        for (a, b) in fitted.forecast(5).iter().zip(refitted.forecast(5)) {
            assert!((a * 1000.0 - b).abs() < 1e-6 * b.abs());
        }
    }
}
