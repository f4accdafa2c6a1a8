use serde::{Deserialize, Serialize};

/// Min-max normalisation onto `[0, 1]`.
///
/// A zero-range input is shifted but not scaled, so constant series map to 0
/// and invert exactly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    range: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Self {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if !min.is_finite() || !max.is_finite() {
            return Self {
                min: 0.0,
                range: 1.0,
            };
        }

        let range = max - min;
        Self {
            min,
            range: if range > 0.0 { range } else { 1.0 },
        }
    }

    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| (v - self.min) / self.range).collect()
    }

    pub fn inverse_transform(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| v * self.range + self.min).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_maps_onto_unit_interval() {
        let scaler = MinMaxScaler::fit(&[10.0, 20.0, 15.0]);
        assert_eq!(scaler.transform(&[10.0, 20.0, 15.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_inverse_restores_values() {
        let values = [2480.0, 2510.5, 2555.25];
        let scaler = MinMaxScaler::fit(&values);
        let restored = scaler.inverse_transform(&scaler.transform(&values));
        for (a, b) in restored.iter().zip(values.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_input_does_not_divide_by_zero() {
        let scaler = MinMaxScaler::fit(&[5.0; 4]);
        assert_eq!(scaler.transform(&[5.0]), vec![0.0]);
        assert_eq!(scaler.inverse_transform(&[0.0]), vec![5.0]);
    }
}
