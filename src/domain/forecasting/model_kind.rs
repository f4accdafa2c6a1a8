use crate::domain::errors::ForecastError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of forecasting algorithms served by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Windowed recurrent-network sequence model
    Lstm,
    /// Stationarity-tested autoregressive integrated moving-average model
    Arima,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Lstm, ModelKind::Arima];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Lstm => "lstm",
            ModelKind::Arima => "arima",
        }
    }

    pub fn available_names() -> Vec<String> {
        Self::ALL.iter().map(|k| k.as_str().to_string()).collect()
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lstm" => Ok(ModelKind::Lstm),
            "arima" => Ok(ModelKind::Arima),
            _ => Err(ForecastError::UnknownModel {
                requested: s.to_string(),
                available: Self::available_names(),
            }),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
