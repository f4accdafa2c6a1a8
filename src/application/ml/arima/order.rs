use super::stationarity::adf_test;
use crate::domain::errors::Result;
use crate::domain::forecasting::ArimaOrder;
use tracing::{error, info};

/// ADF p-value below which the series is modelled without differencing
pub const STATIONARITY_SIGNIFICANCE: f64 = 0.05;

/// Upper bound on both the AR and MA orders
pub const MAX_ARMA_ORDER: usize = 5;

/// Picks `(p, d, q)` for a conditioned series.
///
/// Never fails: any error from the stationarity test degrades to
/// [`ArimaOrder::FALLBACK`].
pub fn select_order(values: &[f64]) -> ArimaOrder {
    match try_select_order(values) {
        Ok(order) => {
            info!("Determined ARIMA order: {}", order);
            order
        }
        Err(e) => {
            error!(
                "Order selection failed for {} prices ({}), falling back to {}",
                values.len(),
                e,
                ArimaOrder::FALLBACK
            );
            ArimaOrder::FALLBACK
        }
    }
}

fn try_select_order(values: &[f64]) -> Result<ArimaOrder> {
    let adf = adf_test(values)?;
    let d = if adf.is_stationary(STATIONARITY_SIGNIFICANCE) {
        0
    } else {
        1
    };
    let p = MAX_ARMA_ORDER.min(values.len() / 10);
    let q = MAX_ARMA_ORDER.min(values.len() / 10);
    Ok(ArimaOrder::new(p, d, q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_prices(n: usize) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(3);
        (0..n).map(|_| 100.0 + rng.random_range(-4.0..4.0)).collect()
    }

    #[test]
    fn test_constant_series_falls_back() {
        assert_eq!(select_order(&[2500.0; 90]), ArimaOrder::FALLBACK);
    }

    #[test]
    fn test_empty_series_falls_back() {
        assert_eq!(select_order(&[]), ArimaOrder::FALLBACK);
    }

    #[test]
    fn test_orders_follow_length_heuristic() {
        let order = select_order(&noisy_prices(35));
        assert_eq!(order.p, 3);
        assert_eq!(order.q, 3);
        assert!(order.d <= 1);

        let order = select_order(&noisy_prices(200));
        assert_eq!(order.p, MAX_ARMA_ORDER);
        assert_eq!(order.q, MAX_ARMA_ORDER);
    }
}
