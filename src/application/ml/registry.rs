use super::arima::{ArimaConfig, ArimaForecaster};
use super::lstm::{LstmConfig, LstmForecaster};
use crate::domain::errors::{ForecastError, Result, ValidationIssue};
use crate::domain::forecasting::{ForecastResult, ModelKind, PriceSeries, RunAnnotation};
use crate::domain::ports::{Forecaster, ModelStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info};

/// Shortest series accepted by the registry, whatever the model
pub const MIN_PRICES: usize = 60;
pub const MIN_HORIZON: usize = 1;
pub const MAX_HORIZON: usize = 365;

/// The closed set of forecasters the registry can dispatch to
pub enum ForecasterVariant {
    Lstm(LstmForecaster),
    Arima(ArimaForecaster),
}

impl Forecaster for ForecasterVariant {
    fn kind(&self) -> ModelKind {
        match self {
            ForecasterVariant::Lstm(f) => f.kind(),
            ForecasterVariant::Arima(f) => f.kind(),
        }
    }

    fn train(&mut self, series: &PriceSeries) -> Result<f64> {
        match self {
            ForecasterVariant::Lstm(f) => f.train(series),
            ForecasterVariant::Arima(f) => f.train(series),
        }
    }

    fn predict(&mut self, series: &PriceSeries, horizon: usize) -> Result<ForecastResult> {
        match self {
            ForecasterVariant::Lstm(f) => f.predict(series, horizon),
            ForecasterVariant::Arima(f) => f.predict(series, horizon),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            ForecasterVariant::Lstm(f) => f.is_fitted(),
            ForecasterVariant::Arima(f) => f.is_fitted(),
        }
    }
}

/// A forecaster together with its "trained in this process" flag.
/// Both live behind one lock so a train-then-predict sequence is atomic.
pub struct RegistryEntry {
    forecaster: ForecasterVariant,
    trained: bool,
}

impl RegistryEntry {
    pub fn forecaster(&self) -> &ForecasterVariant {
        &self.forecaster
    }

    pub fn forecaster_mut(&mut self) -> &mut ForecasterVariant {
        &mut self.forecaster
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub is_trained: bool,
    pub min_prices_required: usize,
    pub max_prediction_days: usize,
}

/// Owns one forecaster per model name and serialises access per name.
pub struct ModelRegistry {
    entries: Vec<(ModelKind, Mutex<RegistryEntry>)>,
}

impl ModelRegistry {
    pub fn new(store: Arc<dyn ModelStore>, lstm: LstmConfig, arima: ArimaConfig) -> Self {
        let entries = ModelKind::ALL
            .iter()
            .map(|kind| {
                let forecaster = match kind {
                    ModelKind::Lstm => {
                        ForecasterVariant::Lstm(LstmForecaster::new(lstm.clone(), store.clone()))
                    }
                    ModelKind::Arima => {
                        ForecasterVariant::Arima(ArimaForecaster::new(arima.clone(), store.clone()))
                    }
                };
                (
                    *kind,
                    Mutex::new(RegistryEntry {
                        forecaster,
                        trained: false,
                    }),
                )
            })
            .collect();

        Self { entries }
    }

    pub fn available_models(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(kind, _)| kind.as_str().to_string())
            .collect()
    }

    /// Case-insensitive lookup of a model name.
    pub fn resolve(&self, name: &str) -> Result<ModelKind> {
        let unknown = || ForecastError::UnknownModel {
            requested: name.to_string(),
            available: self.available_models(),
        };
        let kind: ModelKind = name.parse().map_err(|_| unknown())?;
        if self.entries.iter().any(|(k, _)| *k == kind) {
            Ok(kind)
        } else {
            Err(unknown())
        }
    }

    /// Locks and returns the entry for `name`.
    pub fn get_model(&self, name: &str) -> Result<MutexGuard<'_, RegistryEntry>> {
        let kind = self.resolve(name)?;
        self.lock(kind)
    }

    fn lock(&self, kind: ModelKind) -> Result<MutexGuard<'_, RegistryEntry>> {
        let (_, entry) = self
            .entries
            .iter()
            .find(|(k, _)| *k == kind)
            .ok_or_else(|| ForecastError::UnknownModel {
                requested: kind.to_string(),
                available: self.available_models(),
            })?;
        entry
            .lock()
            .map_err(|_| ForecastError::algorithm("registry", format!("lock for {} poisoned", kind)))
    }

    pub fn validate_prices(prices: &[f64]) -> Result<()> {
        if prices.is_empty() {
            return Err(ValidationIssue::EmptySeries.into());
        }
        if prices.len() < MIN_PRICES {
            return Err(ValidationIssue::TooShort {
                required: MIN_PRICES,
                actual: prices.len(),
            }
            .into());
        }
        if let Some(index) = prices.iter().position(|p| !p.is_finite()) {
            return Err(ValidationIssue::NonNumeric { index }.into());
        }
        if let Some((index, value)) = prices.iter().enumerate().find(|(_, p)| **p < 0.0) {
            return Err(ValidationIssue::Negative {
                index,
                value: *value,
            }
            .into());
        }
        Ok(())
    }

    pub fn validate_input(prices: &[f64], horizon: usize) -> Result<()> {
        Self::validate_prices(prices)?;
        if !(MIN_HORIZON..=MAX_HORIZON).contains(&horizon) {
            return Err(ValidationIssue::HorizonOutOfRange {
                horizon,
                min: MIN_HORIZON,
                max: MAX_HORIZON,
            }
            .into());
        }
        Ok(())
    }

    /// Retrains `name` on `prices` and returns its training score.
    pub fn train(&self, name: &str, prices: &[f64]) -> Result<f64> {
        let outcome = self.train_inner(name, prices);
        if let Err(e) = &outcome {
            error!(
                "Training failed for model {} on {} prices: {}",
                name,
                prices.len(),
                e
            );
        }
        outcome
    }

    fn train_inner(&self, name: &str, prices: &[f64]) -> Result<f64> {
        Self::validate_prices(prices)?;
        let kind = self.resolve(name)?;
        let series = PriceSeries::from(prices).conditioned();

        let mut entry = self.lock(kind)?;
        info!("Training {} model on {} prices", kind, series.len());
        let score = entry.forecaster.train(&series)?;
        entry.trained = true;
        Ok(score)
    }

    /// Validates, conditions, trains on first use, predicts and annotates.
    pub fn predict(&self, name: &str, prices: &[f64], horizon: usize) -> Result<ForecastResult> {
        let outcome = self.predict_inner(name, prices, horizon);
        if let Err(e) = &outcome {
            error!(
                "Prediction failed for model {} ({} prices, horizon {}): {}",
                name,
                prices.len(),
                horizon,
                e
            );
        }
        outcome
    }

    fn predict_inner(&self, name: &str, prices: &[f64], horizon: usize) -> Result<ForecastResult> {
        Self::validate_input(prices, horizon)?;
        let kind = self.resolve(name)?;
        let series = PriceSeries::from(prices).conditioned();

        let mut entry = self.lock(kind)?;
        if !entry.trained {
            info!("Training {} model for first use...", kind);
            entry.forecaster.train(&series)?;
            entry.trained = true;
        }

        let result = entry.forecaster.predict(&series, horizon)?;
        info!("Generated {} day forecast with {} model", horizon, kind);

        Ok(result.with_run(RunAnnotation {
            model_name: kind.to_string(),
            input_prices_count: prices.len(),
            prediction_generated: Utc::now(),
        }))
    }

    pub fn model_info(&self, name: &str) -> Result<ModelInfo> {
        let entry = self.get_model(name)?;
        Ok(ModelInfo {
            name: entry.forecaster.kind().to_string(),
            is_trained: entry.trained,
            min_prices_required: MIN_PRICES,
            max_prediction_days: MAX_HORIZON,
        })
    }
}
