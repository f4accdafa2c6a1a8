use thiserror::Error;

/// Reasons a caller-supplied price series or horizon is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("price series is empty")]
    EmptySeries,

    #[error("need at least {required} historical prices for prediction, got {actual}")]
    TooShort { required: usize, actual: usize },

    #[error("price at index {index} is not numeric")]
    NonNumeric { index: usize },

    #[error("price at index {index} is negative ({value})")]
    Negative { index: usize, value: f64 },

    #[error("prediction horizon must be between {min} and {max} days, got {horizon}")]
    HorizonOutOfRange {
        horizon: usize,
        min: usize,
        max: usize,
    },
}

/// Errors raised by the forecasting core
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationIssue),

    #[error("Insufficient data for {model}: need at least {required} prices, got {actual}")]
    InsufficientData {
        model: String,
        required: usize,
        actual: usize,
    },

    #[error("Model {model} needs to be trained first")]
    ModelNotTrained { model: String },

    #[error("Model {requested} not found. Available models: {available:?}")]
    UnknownModel {
        requested: String,
        available: Vec<String>,
    },

    #[error("Algorithm failure during {stage}: {reason}")]
    AlgorithmFailure { stage: String, reason: String },

    #[error("Persistence failure for {name}: {reason}")]
    Persistence { name: String, reason: String },
}

impl ForecastError {
    pub fn algorithm(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::AlgorithmFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(name: impl Into<String>, reason: impl ToString) -> Self {
        ForecastError::Persistence {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;
