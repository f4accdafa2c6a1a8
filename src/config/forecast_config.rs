//! Forecasting configuration parsing from environment variables.
//!
//! Model hyper-parameters and the artifact directory.

use crate::application::ml::arima::ArimaConfig;
use crate::application::ml::lstm::{Activation, LstmConfig};
use anyhow::{Context, Result, ensure};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Forecasting environment configuration
#[derive(Debug, Clone)]
pub struct ForecastEnvConfig {
    pub model_dir: PathBuf,

    // LSTM
    pub lstm_epochs: usize,
    pub lstm_hidden_units: usize,
    pub lstm_dense_units: usize,
    pub lstm_activation: Activation,
    pub lstm_learning_rate: f64,
    pub lstm_batch_size: usize,
    pub lstm_validation_split: f64,
    pub lstm_seed: u64,

    /// Zero disables the training deadline
    pub training_timeout_secs: u64,
}

impl Default for ForecastEnvConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            lstm_epochs: 100,
            lstm_hidden_units: 100,
            lstm_dense_units: 50,
            lstm_activation: Activation::Relu,
            lstm_learning_rate: 0.001,
            lstm_batch_size: 32,
            lstm_validation_split: 0.1,
            lstm_seed: 42,
            training_timeout_secs: 300,
        }
    }
}

impl ForecastEnvConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            lstm_epochs: Self::parse_usize("LSTM_EPOCHS", defaults.lstm_epochs)?,
            lstm_hidden_units: Self::parse_usize("LSTM_HIDDEN_UNITS", defaults.lstm_hidden_units)?,
            lstm_dense_units: Self::parse_usize("LSTM_DENSE_UNITS", defaults.lstm_dense_units)?,
            lstm_activation: match env::var("LSTM_ACTIVATION") {
                Ok(value) => value
                    .parse::<Activation>()
                    .context("Failed to parse LSTM_ACTIVATION")?,
                Err(_) => defaults.lstm_activation,
            },
            lstm_learning_rate: Self::parse_f64("LSTM_LEARNING_RATE", defaults.lstm_learning_rate)?,
            lstm_batch_size: Self::parse_usize("LSTM_BATCH_SIZE", defaults.lstm_batch_size)?,
            lstm_validation_split: Self::parse_f64(
                "LSTM_VALIDATION_SPLIT",
                defaults.lstm_validation_split,
            )?,
            lstm_seed: env::var("LSTM_SEED")
                .unwrap_or_else(|_| defaults.lstm_seed.to_string())
                .parse::<u64>()
                .context("Failed to parse LSTM_SEED")?,
            training_timeout_secs: env::var("TRAINING_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.training_timeout_secs.to_string())
                .parse::<u64>()
                .context("Failed to parse TRAINING_TIMEOUT_SECS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.lstm_hidden_units > 0, "LSTM_HIDDEN_UNITS must be positive");
        ensure!(self.lstm_dense_units > 0, "LSTM_DENSE_UNITS must be positive");
        ensure!(self.lstm_batch_size > 0, "LSTM_BATCH_SIZE must be positive");
        ensure!(
            self.lstm_learning_rate > 0.0 && self.lstm_learning_rate.is_finite(),
            "LSTM_LEARNING_RATE must be a positive number"
        );
        ensure!(
            (0.0..1.0).contains(&self.lstm_validation_split),
            "LSTM_VALIDATION_SPLIT must be in [0, 1)"
        );
        Ok(())
    }

    pub fn training_timeout(&self) -> Option<Duration> {
        (self.training_timeout_secs > 0).then(|| Duration::from_secs(self.training_timeout_secs))
    }

    pub fn lstm_config(&self) -> LstmConfig {
        LstmConfig {
            hidden_units: self.lstm_hidden_units,
            dense_units: self.lstm_dense_units,
            activation: self.lstm_activation,
            epochs: self.lstm_epochs,
            batch_size: self.lstm_batch_size,
            learning_rate: self.lstm_learning_rate,
            validation_split: self.lstm_validation_split,
            seed: self.lstm_seed,
            training_timeout: self.training_timeout(),
            ..LstmConfig::default()
        }
    }

    pub fn arima_config(&self) -> ArimaConfig {
        ArimaConfig::default()
    }

    fn parse_usize(key: &str, default: usize) -> Result<usize> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<usize>()
            .context(format!("Failed to parse {}", key))
    }

    fn parse_f64(key: &str, default: f64) -> Result<f64> {
        env::var(key)
            .unwrap_or_else(|_| default.to_string())
            .parse::<f64>()
            .context(format!("Failed to parse {}", key))
    }
}
