//! Agriforecast CLI - price forecasting from a CSV file
//!
//! Reads historical prices, trains (if needed) and runs one forecaster, and
//! prints the forecast as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//! ```sh
//! cargo run --bin forecast -- --input data/coffee.csv --model arima --horizon 30
//! ```
//!
//! # Environment Variables
//! - `MODEL_DIR` - Directory holding saved models (default: models)
//! - `LSTM_EPOCHS`, `LSTM_HIDDEN_UNITS`, ... - see `ForecastEnvConfig`

use agriforecast::application::ml::ModelRegistry;
use agriforecast::config::ForecastEnvConfig;
use agriforecast::infrastructure::JsonModelStore;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV of historical prices, oldest first (a `price` column or a single column)
    #[arg(long)]
    input: PathBuf,

    /// Model to use: lstm or arima
    #[arg(long, default_value = "arima")]
    model: String,

    /// Number of days to forecast
    #[arg(long, default_value_t = 30)]
    horizon: usize,

    /// Override MODEL_DIR
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Retrain and print the training score instead of forecasting
    #[arg(long)]
    train: bool,
}

fn read_prices(path: &Path) -> Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut records = reader.records();
    let first = match records.next() {
        Some(record) => record.context("Failed to read first CSV row")?,
        None => bail!("{} is empty", path.display()),
    };

    // A header row is recognised by a non-numeric value in the price column
    let header_column = first.iter().position(|field| field.eq_ignore_ascii_case("price"));
    let column = match (header_column, first.len()) {
        (Some(index), _) => index,
        (None, 1) => 0,
        (None, n) => bail!("Expected a 'price' column or a single column, found {} columns", n),
    };

    let mut prices = Vec::new();
    if first.get(column).is_some_and(|f| f.parse::<f64>().is_ok()) {
        prices.push(first[column].parse::<f64>()?);
    }

    for (line, record) in records.enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", line + 2))?;
        let field = record
            .get(column)
            .with_context(|| format!("Row {} has no price column", line + 2))?;
        let price = field
            .parse::<f64>()
            .with_context(|| format!("Row {}: '{}' is not a number", line + 2, field))?;
        prices.push(price);
    }

    Ok(prices)
}

fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    let args = Args::parse();
    let mut config = ForecastEnvConfig::from_env()?;
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }

    info!(
        "Agriforecast {} (model dir {})",
        env!("CARGO_PKG_VERSION"),
        config.model_dir.display()
    );

    let prices = read_prices(&args.input)?;
    info!("Loaded {} prices from {}", prices.len(), args.input.display());

    let store = Arc::new(JsonModelStore::new(config.model_dir.clone()));
    let registry = ModelRegistry::new(store, config.lstm_config(), config.arima_config());

    if args.train {
        let score = registry
            .train(&args.model, &prices)
            .with_context(|| format!("Training {} failed", args.model))?;
        let info = registry.model_info(&args.model)?;
        let output = serde_json::json!({ "model": info.name, "score": score });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let forecast = registry
        .predict(&args.model, &prices, args.horizon)
        .with_context(|| format!("Forecast with {} failed", args.model))?;
    println!("{}", serde_json::to_string_pretty(&forecast)?);

    Ok(())
}
