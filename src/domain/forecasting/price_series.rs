//! Ordered price history handed to the forecasters.
//!
//! Conditioning (non-finite removal followed by 3σ outlier clamping) lives
//! here so both forecasters see identically prepared data.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Number of standard deviations kept around the mean when clamping outliers
pub const OUTLIER_SIGMA: f64 = 3.0;

/// Chronologically ascending prices for a single commodity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceSeries {
    values: Vec<f64>,
}

/// Largest absolute value, or 1 when that is zero or not finite.
pub fn magnitude(values: &[f64]) -> f64 {
    let largest = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if largest.is_finite() && largest > 0.0 {
        largest
    } else {
        1.0
    }
}

/// Mean and population standard deviation, computed on the values divided by
/// their magnitude so squared deviations of huge prices stay finite.
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let scale = magnitude(values);
    let scaled: Vec<f64> = values.iter().map(|v| v / scale).collect();
    (
        scaled.iter().mean() * scale,
        scaled.iter().population_std_dev() * scale,
    )
}

/// Clamp interval derived from a series' mean and population standard deviation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierBounds {
    pub lower: f64,
    pub upper: f64,
}

impl OutlierBounds {
    /// Bounds at `mean ± OUTLIER_SIGMA * std_dev`. `None` for an empty series.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let (mean, std_dev) = mean_and_std_dev(values);
        Some(Self {
            lower: mean - OUTLIER_SIGMA * std_dev,
            upper: mean + OUTLIER_SIGMA * std_dev,
        })
    }
}

impl PriceSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The most recent `n` prices (or all of them when shorter)
    pub fn tail(&self, n: usize) -> &[f64] {
        &self.values[self.values.len().saturating_sub(n)..]
    }

    pub fn mean(&self) -> f64 {
        self.values.iter().mean()
    }

    /// Population standard deviation (divides by n)
    pub fn population_std_dev(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        mean_and_std_dev(&self.values).1
    }

    /// Drops NaN and infinite entries, keeping order.
    pub fn finite_only(&self) -> PriceSeries {
        PriceSeries::new(
            self.values
                .iter()
                .copied()
                .filter(|v| v.is_finite())
                .collect(),
        )
    }

    /// Clamps every value into `bounds`. Length and order are preserved.
    pub fn clip(&self, bounds: OutlierBounds) -> PriceSeries {
        PriceSeries::new(
            self.values
                .iter()
                .map(|v| v.clamp(bounds.lower, bounds.upper))
                .collect(),
        )
    }

    /// Full conditioning pipeline applied before any forecaster sees data.
    pub fn conditioned(&self) -> PriceSeries {
        let finite = self.finite_only();
        match OutlierBounds::from_values(finite.values()) {
            Some(bounds) => finite.clip(bounds),
            None => finite,
        }
    }
}

impl From<Vec<f64>> for PriceSeries {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for PriceSeries {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_with_spike() -> PriceSeries {
        let mut values: Vec<f64> = (0..50).map(|i| 100.0 + (i % 5) as f64).collect();
        values.push(10_000.0);
        PriceSeries::new(values)
    }

    #[test]
    fn test_conditioning_drops_non_finite() {
        let series = PriceSeries::new(vec![1.0, f64::NAN, 2.0, f64::INFINITY, 3.0]);
        let conditioned = series.conditioned();
        assert_eq!(conditioned.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_conditioning_clamps_spike_without_dropping() {
        let series = series_with_spike();
        let conditioned = series.conditioned();

        assert_eq!(conditioned.len(), series.len());
        let bounds = OutlierBounds::from_values(series.values()).unwrap();
        let last = *conditioned.values().last().unwrap();
        assert!((last - bounds.upper).abs() < 1e-9);
        assert!(last < 10_000.0);
    }

    #[test]
    fn test_clip_is_idempotent_for_fixed_bounds() {
        let series = series_with_spike();
        let bounds = OutlierBounds::from_values(series.values()).unwrap();

        let once = series.clip(bounds);
        let twice = once.clip(bounds);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_conditioning_is_noop_on_clean_series() {
        let series = PriceSeries::new((0..90).map(|i| 2500.0 + (i as f64).sin() * 50.0).collect());
        let once = series.conditioned();
        assert_eq!(once, series);
        assert_eq!(once.conditioned(), once);
    }

    #[test]
    fn test_conditioning_does_not_mutate_input() {
        let series = series_with_spike();
        let snapshot = series.clone();
        let _ = series.conditioned();
        assert_eq!(series, snapshot);
    }

    #[test]
    fn test_empty_series_conditions_to_empty() {
        let series = PriceSeries::new(vec![f64::NAN]);
        assert!(series.conditioned().is_empty());
    }

    #[test]
    fn test_std_dev_survives_extreme_magnitudes() {
        let small: Vec<f64> = (0..60).map(|i| 1.0 + 0.01 * (i % 5) as f64).collect();
        let huge = PriceSeries::new(small.iter().map(|v| v * 1e300).collect());
        let expected = PriceSeries::new(small).population_std_dev() * 1e300;

        let std_dev = huge.population_std_dev();
        assert!(std_dev.is_finite());
        assert!((std_dev - expected).abs() < 1e-9 * expected);

        let bounds = OutlierBounds::from_values(huge.values()).unwrap();
        assert!(bounds.lower.is_finite() && bounds.upper.is_finite());
        assert_eq!(huge.conditioned(), huge);
    }

    #[test]
    fn test_magnitude() {
        assert_eq!(magnitude(&[-3.0, 2.0]), 3.0);
        assert_eq!(magnitude(&[0.0, 0.0]), 1.0);
        assert_eq!(magnitude(&[]), 1.0);
    }

    #[test]
    fn test_tail() {
        let series = PriceSeries::new(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(series.tail(2), &[3.0, 4.0]);
        assert_eq!(series.tail(10), &[1.0, 2.0, 3.0, 4.0]);
    }
}
