pub mod arima;
pub mod linalg;
pub mod lstm;
pub mod registry;

pub use arima::{ArimaConfig, ArimaForecaster};
pub use lstm::{LstmConfig, LstmForecaster};
pub use registry::{ForecasterVariant, ModelInfo, ModelRegistry};
