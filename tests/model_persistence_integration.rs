use agriforecast::application::ml::{ArimaConfig, LstmConfig, ModelRegistry};
use agriforecast::domain::errors::ForecastError;
use agriforecast::domain::forecasting::PriceSeries;
use agriforecast::domain::ports::{Forecaster, ModelStore};
use agriforecast::infrastructure::JsonModelStore;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn create_test_dir() -> PathBuf {
    let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "agriforecast_persistence_it_{}_{}",
        std::process::id(),
        unique_id
    ))
}

fn cleanup_test_dir(temp_dir: PathBuf) {
    fs::remove_dir_all(temp_dir).ok();
}

fn prices() -> Vec<f64> {
    (0..80)
        .map(|i| 1800.0 + 30.0 * (i as f64 * 0.4).cos() + (i % 5) as f64 * 2.0)
        .collect()
}

fn registry_at(dir: &PathBuf) -> ModelRegistry {
    let lstm = LstmConfig {
        hidden_units: 4,
        dense_units: 4,
        epochs: 2,
        ..LstmConfig::default()
    };
    ModelRegistry::new(
        Arc::new(JsonModelStore::new(dir.clone())),
        lstm,
        ArimaConfig::default(),
    )
}

#[test]
fn test_trained_models_written_as_named_artifacts() {
    let dir = create_test_dir();
    let registry = registry_at(&dir);

    registry.train("arima", &prices()).unwrap();
    registry.train("lstm", &prices()).unwrap();

    assert!(dir.join("arima_model.json").exists());
    assert!(dir.join("lstm_model.json").exists());

    // No temp files left behind
    let leftovers = fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);

    cleanup_test_dir(dir);
}

#[test]
fn test_restarted_process_reloads_saved_fit() {
    let dir = create_test_dir();
    let series = PriceSeries::new(prices()).conditioned();

    let first = registry_at(&dir);
    first.train("arima", &prices()).unwrap();
    let expected = first
        .get_model("arima")
        .unwrap()
        .forecaster_mut()
        .predict(&series, 6)
        .unwrap();

    // A new registry over the same directory has nothing in memory
    let second = registry_at(&dir);
    let mut entry = second.get_model("arima").unwrap();
    assert!(!entry.forecaster().is_fitted());
    let reloaded = entry.forecaster_mut().predict(&series, 6).unwrap();

    for (a, b) in reloaded.predictions.iter().zip(&expected.predictions) {
        assert!((a - b).abs() < 1e-6 * b.abs().max(1.0));
    }

    cleanup_test_dir(dir);
}

#[test]
fn test_missing_artifact_means_not_trained() {
    let dir = create_test_dir();
    let registry = registry_at(&dir);
    let series = PriceSeries::new(prices());

    let result = registry
        .get_model("lstm")
        .unwrap()
        .forecaster_mut()
        .predict(&series, 3);
    assert!(matches!(result, Err(ForecastError::ModelNotTrained { .. })));

    cleanup_test_dir(dir);
}

#[test]
fn test_concurrent_writers_leave_a_complete_artifact() {
    let dir = create_test_dir();
    let store = Arc::new(JsonModelStore::new(dir.clone()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                let payload = serde_json::to_vec(&vec![i as f64; 2000]).unwrap();
                store.save("arima", &payload).unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let payload = store.load("arima").unwrap().unwrap();
    let values: Vec<f64> = serde_json::from_slice(&payload).unwrap();
    assert_eq!(values.len(), 2000);
    assert!(values.iter().all(|v| *v == values[0]));

    cleanup_test_dir(dir);
}
