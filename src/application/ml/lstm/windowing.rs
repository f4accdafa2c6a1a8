use crate::domain::errors::{ForecastError, Result};
use crate::domain::forecasting::ModelKind;

/// Supervised pairs cut from a series: each input is `window` consecutive
/// values and its target is the value right after them.
#[derive(Debug, Clone, PartialEq)]
pub struct Windows {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl Windows {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Builds `values.len() - window` overlapping windows.
pub fn sliding_windows(values: &[f64], window: usize) -> Result<Windows> {
    if window == 0 || values.len() <= window {
        return Err(ForecastError::InsufficientData {
            model: ModelKind::Lstm.to_string(),
            required: window + 1,
            actual: values.len(),
        });
    }

    let (inputs, targets): (Vec<Vec<f64>>, Vec<f64>) = values
        .windows(window + 1)
        .map(|w| (w[..window].to_vec(), w[window]))
        .unzip();

    Ok(Windows { inputs, targets })
}
