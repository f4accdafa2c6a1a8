// Forecasting models and the registry that dispatches to them
pub mod ml;
