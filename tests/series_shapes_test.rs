use agriforecast::application::ml::{ArimaConfig, LstmConfig, ModelRegistry};
use agriforecast::infrastructure::InMemoryModelStore;
use std::sync::Arc;

const LENGTH: usize = 90;
const HORIZONS: [usize; 2] = [1, 365];

fn shapes() -> Vec<(&'static str, Vec<f64>)> {
    vec![
        (
            "linear trend",
            (0..LENGTH).map(|i| 2000.0 + 5.0 * i as f64).collect(),
        ),
        (
            "step",
            (0..LENGTH).map(|i| 2000.0 + 25.0 * (i / 10) as f64).collect(),
        ),
        (
            "alternating",
            (0..LENGTH)
                .map(|i| if i % 2 == 0 { 2400.0 } else { 2600.0 })
                .collect(),
        ),
        (
            "period three",
            (0..LENGTH).map(|i| [2400.0, 2500.0, 2600.0][i % 3]).collect(),
        ),
        (
            "sinusoid",
            (0..LENGTH)
                .map(|i| 2500.0 + 50.0 * (0.35 * i as f64).sin())
                .collect(),
        ),
        ("constant", vec![2500.0; LENGTH]),
        (
            "extreme magnitude",
            (0..LENGTH)
                .map(|i| 1e300 * (1.0 + 0.01 * (0.35 * i as f64).sin()))
                .collect(),
        ),
    ]
}

fn quick_lstm() -> LstmConfig {
    LstmConfig {
        hidden_units: 8,
        dense_units: 4,
        epochs: 5,
        ..LstmConfig::default()
    }
}

fn assert_forecasts_every_shape(model: &str) {
    for (shape, prices) in shapes() {
        // Fresh registry per shape so each series trains its own model
        let store = InMemoryModelStore::new();
        let registry =
            ModelRegistry::new(Arc::new(store.clone()), quick_lstm(), ArimaConfig::default());

        for horizon in HORIZONS {
            let result = registry
                .predict(model, &prices, horizon)
                .unwrap_or_else(|e| panic!("{} on {} (horizon {}): {}", model, shape, horizon, e));

            assert_eq!(result.dates.len(), horizon, "{} on {}", model, shape);
            assert_eq!(result.predictions.len(), horizon, "{} on {}", model, shape);
            assert_eq!(result.confidence.len(), horizon, "{} on {}", model, shape);

            for (value, band) in result.predictions.iter().zip(&result.confidence) {
                assert!(
                    value.is_finite(),
                    "{} on {} (horizon {}): prediction {}",
                    model,
                    shape,
                    horizon,
                    value
                );
                assert!(band.lower.is_finite() && band.upper.is_finite());
                assert!(band.lower >= 0.0);
                assert!(
                    band.lower <= band.upper,
                    "{} on {}: band {:?}",
                    model,
                    shape,
                    band
                );
            }
        }

        assert!(registry.model_info(model).unwrap().is_trained);
        assert!(store.contains(model));
    }
}

#[test]
fn test_arima_forecasts_every_shape_at_both_horizon_limits() {
    assert_forecasts_every_shape("arima");
}

#[test]
fn test_lstm_forecasts_every_shape_at_both_horizon_limits() {
    assert_forecasts_every_shape("lstm");
}

#[test]
fn test_constant_series_gives_flat_arima_and_zero_width_lstm_bands() {
    let prices = vec![2500.0; LENGTH];
    let store = InMemoryModelStore::new();
    let registry = ModelRegistry::new(Arc::new(store), quick_lstm(), ArimaConfig::default());

    let arima = registry.predict("arima", &prices, 30).unwrap();
    for value in &arima.predictions {
        assert!((value - 2500.0).abs() < 1e-6, "arima drifted to {}", value);
    }

    let lstm = registry.predict("lstm", &prices, 30).unwrap();
    for (value, band) in lstm.predictions.iter().zip(&lstm.confidence) {
        assert!((band.upper - value).abs() < 1e-9);
    }
}
