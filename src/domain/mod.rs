// Price series, forecast results and model identities
pub mod forecasting;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
