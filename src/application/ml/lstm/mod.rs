//! Recurrent forecaster: a stacked LSTM over min-max scaled windows, rolled
//! forward autoregressively for multi-step forecasts.

pub mod network;
pub mod scaler;
pub mod windowing;

pub use network::{Activation, NetworkShape, SequenceNetwork, TrainingOptions, TrainingReport};
pub use scaler::MinMaxScaler;
pub use windowing::{Windows, sliding_windows};

use crate::domain::errors::{ForecastError, Result};
use crate::domain::forecasting::forecast::dates_from_tomorrow;
use crate::domain::forecasting::{
    ConfidenceBand, ForecastResult, ModelKind, ModelMetadata, PriceSeries,
};
use crate::domain::ports::{Forecaster, ModelStore};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct LstmConfig {
    /// Number of past prices fed to the network per step
    pub sequence_length: usize,
    pub hidden_units: usize,
    pub dense_units: usize,
    pub dropout: f64,
    /// Candidate and cell-output nonlinearity of both LSTM layers
    pub activation: Activation,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub clip_norm: f64,
    pub min_training_samples: usize,
    /// Multiplier on the input standard deviation for the band half-width
    pub confidence_z: f64,
    pub seed: u64,
    pub training_timeout: Option<Duration>,
    pub artifact_name: String,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            sequence_length: 10,
            hidden_units: 100,
            dense_units: 50,
            dropout: 0.2,
            activation: Activation::Relu,
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            validation_split: 0.1,
            clip_norm: 1.0,
            min_training_samples: 20,
            confidence_z: 1.96,
            seed: 42,
            training_timeout: Some(Duration::from_secs(300)),
            artifact_name: ModelKind::Lstm.as_str().to_string(),
        }
    }
}

impl LstmConfig {
    fn shape(&self) -> NetworkShape {
        NetworkShape {
            hidden_units: self.hidden_units,
            dense_units: self.dense_units,
            dropout: self.dropout,
            activation: self.activation,
        }
    }
}

/// Everything needed to forecast after a restart, stored as one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmState {
    pub network: SequenceNetwork,
    /// Scaler fitted on the full training series
    pub scaler: MinMaxScaler,
    pub sequence_length: usize,
    pub training_loss: f64,
}

pub struct LstmForecaster {
    config: LstmConfig,
    store: Arc<dyn ModelStore>,
    state: Option<LstmState>,
}

impl LstmForecaster {
    pub fn new(config: LstmConfig, store: Arc<dyn ModelStore>) -> Self {
        Self {
            config,
            store,
            state: None,
        }
    }

    fn persist(&self, state: &LstmState) -> Result<()> {
        let name = &self.config.artifact_name;
        let payload = serde_json::to_vec(state).map_err(|e| ForecastError::persistence(name, e))?;
        self.store.save(name, &payload)
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }

        let name = self.config.artifact_name.clone();
        match self.store.load(&name)? {
            Some(payload) => {
                info!("Loading saved LSTM model...");
                let state: LstmState = serde_json::from_slice(&payload)
                    .map_err(|e| ForecastError::persistence(&name, e))?;
                if state.sequence_length != self.config.sequence_length {
                    warn!(
                        "Saved LSTM uses sequence length {} (configured {}); using saved value",
                        state.sequence_length, self.config.sequence_length
                    );
                }
                self.state = Some(state);
                Ok(())
            }
            None => Err(ForecastError::ModelNotTrained {
                model: ModelKind::Lstm.to_string(),
            }),
        }
    }

    fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs: self.config.epochs,
            batch_size: self.config.batch_size,
            learning_rate: self.config.learning_rate,
            validation_split: self.config.validation_split,
            clip_norm: self.config.clip_norm,
            deadline: self.config.training_timeout.map(|t| Instant::now() + t),
        }
    }
}

impl Forecaster for LstmForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm
    }

    fn train(&mut self, series: &PriceSeries) -> Result<f64> {
        if series.len() < self.config.min_training_samples {
            return Err(ForecastError::InsufficientData {
                model: ModelKind::Lstm.to_string(),
                required: self.config.min_training_samples,
                actual: series.len(),
            });
        }

        let scaler = MinMaxScaler::fit(series.values());
        let scaled = scaler.transform(series.values());
        let windows = sliding_windows(&scaled, self.config.sequence_length)?;

        info!(
            "Training LSTM on {} windows of {} prices ({} epochs)...",
            windows.len(),
            self.config.sequence_length,
            self.config.epochs
        );

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network = SequenceNetwork::new(&self.config.shape(), &mut rng);
        let report = network
            .fit(&windows, &self.training_options(), &mut rng)
            .inspect_err(|e| error!("LSTM training failed on {} prices: {}", series.len(), e))?;

        let state = LstmState {
            network,
            scaler,
            sequence_length: self.config.sequence_length,
            training_loss: report.training_loss,
        };
        self.persist(&state)?;
        self.state = Some(state);

        info!(
            "LSTM model trained and saved successfully (loss {:.6} after {} epochs)",
            report.training_loss, report.epochs_run
        );
        Ok(report.training_loss)
    }

    fn predict(&mut self, series: &PriceSeries, horizon: usize) -> Result<ForecastResult> {
        self.ensure_loaded()?;
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| ForecastError::ModelNotTrained {
                model: ModelKind::Lstm.to_string(),
            })?;

        let window_len = state.sequence_length;
        if series.len() < window_len {
            return Err(ForecastError::InsufficientData {
                model: ModelKind::Lstm.to_string(),
                required: window_len,
                actual: series.len(),
            });
        }

        info!("Making LSTM predictions for {} days...", horizon);

        // Scaled against the recent window, not the training range
        let recent = series.tail(window_len);
        let scaler = MinMaxScaler::fit(recent);
        let mut window: VecDeque<f64> = scaler.transform(recent).into();

        let mut scaled_predictions = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = state.network.predict(window.make_contiguous());
            if !next.is_finite() {
                return Err(ForecastError::algorithm(
                    "LSTM prediction",
                    "network produced a non-finite value",
                ));
            }
            scaled_predictions.push(next);
            window.pop_front();
            window.push_back(next);
        }

        let predictions = scaler.inverse_transform(&scaled_predictions);
        let half_width = self.config.confidence_z * series.population_std_dev();
        let confidence = predictions
            .iter()
            .map(|value| ConfidenceBand::around(*value, half_width))
            .collect();

        let result = ForecastResult::new(
            dates_from_tomorrow(horizon),
            predictions,
            confidence,
            ModelMetadata::Lstm {
                sequence_length: window_len,
                training_loss: state.training_loss,
            },
        )?;

        info!("LSTM predictions generated successfully");
        Ok(result)
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}
