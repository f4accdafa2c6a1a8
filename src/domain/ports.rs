use crate::domain::errors::Result;
use crate::domain::forecasting::{ForecastResult, ModelKind, PriceSeries};

/// Capability shared by every forecasting algorithm.
///
/// `train` replaces any previous fit wholesale and returns the algorithm's
/// score (lower is better). `predict` takes `&mut self` because a forecaster
/// without an in-memory fit may reload its persisted state first.
pub trait Forecaster: Send {
    fn kind(&self) -> ModelKind;

    fn train(&mut self, series: &PriceSeries) -> Result<f64>;

    fn predict(&mut self, series: &PriceSeries, horizon: usize) -> Result<ForecastResult>;

    /// Whether a fit is currently held in memory
    fn is_fitted(&self) -> bool;
}

/// Storage for opaque fitted-model artifacts, one per model name.
pub trait ModelStore: Send + Sync {
    fn save(&self, name: &str, payload: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing has been stored under `name`
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;
}
