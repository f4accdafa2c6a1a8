//! Configuration module for agriforecast.
//!
//! Settings are loaded from environment variables by the binary and handed to
//! the forecasting core explicitly.

mod forecast_config;

pub use forecast_config::ForecastEnvConfig;
