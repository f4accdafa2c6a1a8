pub mod forecast;
pub mod model_kind;
pub mod price_series;

pub use forecast::{ArimaOrder, ConfidenceBand, ForecastResult, ModelMetadata, RunAnnotation};
pub use model_kind::ModelKind;
pub use price_series::{OutlierBounds, PriceSeries, magnitude};
