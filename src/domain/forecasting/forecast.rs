use crate::domain::errors::{ForecastError, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// (lower, upper) bound around one point forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceBand {
    /// Prices cannot go below zero, so negative lower bounds are clamped.
    pub fn clamped(lower: f64, upper: f64) -> Self {
        Self {
            lower: lower.max(0.0),
            upper,
        }
    }

    /// Symmetric band `center ± half_width`, lower bound clamped at zero.
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::clamped(center - half_width, center + half_width)
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// (p, d, q) order of an autoregressive integrated moving-average model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const FALLBACK: ArimaOrder = ArimaOrder { p: 1, d: 1, q: 1 };

    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

/// Algorithm-specific details attached to a forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "lowercase")]
pub enum ModelMetadata {
    Arima {
        order: ArimaOrder,
        aic: f64,
    },
    Lstm {
        sequence_length: usize,
        training_loss: f64,
    },
}

/// Added by the registry once a forecast has been produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAnnotation {
    pub model_name: String,
    pub input_prices_count: usize,
    pub prediction_generated: DateTime<Utc>,
}

/// Multi-step forecast: one date, one value and one band per horizon step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub dates: Vec<NaiveDate>,
    pub predictions: Vec<f64>,
    pub confidence: Vec<ConfidenceBand>,
    pub model_info: ModelMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunAnnotation>,
}

impl ForecastResult {
    /// Builds a result, rejecting mismatched lengths or non-finite numbers.
    pub fn new(
        dates: Vec<NaiveDate>,
        predictions: Vec<f64>,
        confidence: Vec<ConfidenceBand>,
        model_info: ModelMetadata,
    ) -> Result<Self> {
        if dates.len() != predictions.len() || predictions.len() != confidence.len() {
            return Err(ForecastError::algorithm(
                "forecast assembly",
                format!(
                    "length mismatch: {} dates, {} predictions, {} confidence bands",
                    dates.len(),
                    predictions.len(),
                    confidence.len()
                ),
            ));
        }

        if let Some(index) = predictions.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::algorithm(
                "forecast assembly",
                format!("prediction at step {} is not finite", index + 1),
            ));
        }

        if let Some(index) = confidence
            .iter()
            .position(|b| !b.lower.is_finite() || !b.upper.is_finite() || b.lower > b.upper)
        {
            return Err(ForecastError::algorithm(
                "forecast assembly",
                format!("confidence band at step {} is invalid", index + 1),
            ));
        }

        Ok(Self {
            dates,
            predictions,
            confidence,
            model_info,
            run: None,
        })
    }

    pub fn horizon(&self) -> usize {
        self.predictions.len()
    }

    pub fn with_run(mut self, run: RunAnnotation) -> Self {
        self.run = Some(run);
        self
    }
}

/// Calendar days following `today`: `today + 1 ..= today + horizon`.
pub fn dates_after(today: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64)
        .map(|offset| today + Duration::days(offset))
        .collect()
}

/// Forecast dates starting the day after the current UTC date.
pub fn dates_from_tomorrow(horizon: usize) -> Vec<NaiveDate> {
    dates_after(Utc::now().date_naive(), horizon)
}
