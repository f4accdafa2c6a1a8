//! Stationary-order forecaster: ADF-driven differencing order, ARIMA fit,
//! multi-step forecasts with normal-theory confidence bands.

pub mod model;
pub mod order;
pub mod stationarity;

pub use model::FittedArima;
pub use order::select_order;

use crate::domain::errors::{ForecastError, Result};
use crate::domain::forecasting::forecast::dates_from_tomorrow;
use crate::domain::forecasting::{
    ConfidenceBand, ForecastResult, ModelKind, ModelMetadata, PriceSeries,
};
use crate::domain::ports::{Forecaster, ModelStore};
use statrs::distribution::{ContinuousCDF, Normal};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ArimaConfig {
    pub min_training_samples: usize,
    /// Two-sided coverage of the reported forecast bands
    pub confidence_level: f64,
    pub artifact_name: String,
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self {
            min_training_samples: 30,
            confidence_level: 0.95,
            artifact_name: ModelKind::Arima.as_str().to_string(),
        }
    }
}

pub struct ArimaForecaster {
    config: ArimaConfig,
    store: Arc<dyn ModelStore>,
    fitted: Option<FittedArima>,
}

impl ArimaForecaster {
    pub fn new(config: ArimaConfig, store: Arc<dyn ModelStore>) -> Self {
        Self {
            config,
            store,
            fitted: None,
        }
    }

    fn require_length(&self, series: &PriceSeries) -> Result<()> {
        if series.len() < self.config.min_training_samples {
            return Err(ForecastError::InsufficientData {
                model: ModelKind::Arima.to_string(),
                required: self.config.min_training_samples,
                actual: series.len(),
            });
        }
        Ok(())
    }

    fn persist(&self, fitted: &FittedArima) -> Result<()> {
        let name = &self.config.artifact_name;
        let payload = serde_json::to_vec(fitted).map_err(|e| ForecastError::persistence(name, e))?;
        self.store.save(name, &payload)
    }

    /// Reloads the persisted fit when nothing is held in memory.
    fn ensure_loaded(&mut self) -> Result<()> {
        if self.fitted.is_some() {
            return Ok(());
        }

        let name = self.config.artifact_name.clone();
        match self.store.load(&name)? {
            Some(payload) => {
                info!("Loading saved ARIMA model...");
                let fitted: FittedArima = serde_json::from_slice(&payload)
                    .map_err(|e| ForecastError::persistence(&name, e))?;
                self.fitted = Some(fitted);
                Ok(())
            }
            None => Err(ForecastError::ModelNotTrained {
                model: ModelKind::Arima.to_string(),
            }),
        }
    }

    fn z_score(&self) -> Result<f64> {
        let level = self.config.confidence_level;
        if level <= 0.0 || level >= 1.0 {
            return Err(ForecastError::algorithm(
                "ARIMA intervals",
                format!("confidence level {} outside (0, 1)", level),
            ));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::algorithm("ARIMA intervals", e.to_string()))?;
        Ok(normal.inverse_cdf(0.5 + level / 2.0))
    }
}

impl Forecaster for ArimaForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Arima
    }

    fn train(&mut self, series: &PriceSeries) -> Result<f64> {
        self.require_length(series)?;

        let order = select_order(series.values());
        info!("Fitting ARIMA{} on {} prices...", order, series.len());
        let fitted = FittedArima::fit(series.values(), order).inspect_err(|e| {
            error!("ARIMA{} fit failed on {} prices: {}", order, series.len(), e);
        })?;

        self.persist(&fitted)?;
        let aic = fitted.aic;
        self.fitted = Some(fitted);

        info!("ARIMA model trained and saved successfully (AIC {:.3})", aic);
        Ok(aic)
    }

    fn predict(&mut self, series: &PriceSeries, horizon: usize) -> Result<ForecastResult> {
        self.ensure_loaded()?;
        self.require_length(series)?;
        let z = self.z_score()?;

        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ForecastError::ModelNotTrained {
                model: ModelKind::Arima.to_string(),
            })?;

        info!("Making ARIMA predictions for {} days...", horizon);
        let predictions = fitted.forecast(horizon);
        let confidence = predictions
            .iter()
            .zip(fitted.forecast_std_errors(horizon))
            .map(|(value, se)| ConfidenceBand::around(*value, z * se))
            .collect();

        let result = ForecastResult::new(
            dates_from_tomorrow(horizon),
            predictions,
            confidence,
            ModelMetadata::Arima {
                order: fitted.order,
                aic: fitted.aic,
            },
        )?;

        info!("ARIMA predictions generated successfully");
        Ok(result)
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}
