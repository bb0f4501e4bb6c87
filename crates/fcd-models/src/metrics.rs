//! Forecast accuracy metrics shared by the backtest engine and the
//! accuracy tracker.
//!
//! All functions are pure. MAPE is reported in percent and excludes
//! zero-actual points from the denominator accumulation; when every actual
//! is zero the metric is undefined and reported as `None` rather than a
//! fabricated value.

use serde::{Deserialize, Serialize};

/// Metric computation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsError {
    LengthMismatch { actuals: usize, forecasts: usize },
    Empty,
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::LengthMismatch { actuals, forecasts } => write!(
                f,
                "actuals ({actuals}) and forecasts ({forecasts}) must have equal length"
            ),
            MetricsError::Empty => write!(f, "cannot compute metrics over zero points"),
        }
    }
}

impl std::error::Error for MetricsError {}

/// The standard accuracy triple over one actual/forecast sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Mean absolute percentage error, in percent. `None` when undefined
    /// (every actual was zero).
    pub mape: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    pub sample_size: usize,
}

/// Compute MAPE/RMSE/MAE for an actual/forecast pair of equal length.
pub fn calculate_accuracy_metrics(
    actuals: &[f64],
    forecasts: &[f64],
) -> Result<AccuracyMetrics, MetricsError> {
    if actuals.len() != forecasts.len() {
        return Err(MetricsError::LengthMismatch {
            actuals: actuals.len(),
            forecasts: forecasts.len(),
        });
    }
    if actuals.is_empty() {
        return Err(MetricsError::Empty);
    }

    Ok(AccuracyMetrics {
        mape: mape(actuals, forecasts),
        rmse: rmse(actuals, forecasts),
        mae: mae(actuals, forecasts),
        sample_size: actuals.len(),
    })
}

/// Mean absolute percentage error in percent, averaged over the points
/// whose actual is nonzero. `None` when no such point exists.
pub fn mape(actuals: &[f64], forecasts: &[f64]) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0usize;
    for (a, f) in actuals.iter().zip(forecasts.iter()) {
        if *a != 0.0 {
            sum += ((a - f) / a).abs();
            n += 1;
        }
    }
    if n == 0 {
        None
    } else {
        Some(sum / n as f64 * 100.0)
    }
}

/// Root mean squared error.
pub fn rmse(actuals: &[f64], forecasts: &[f64]) -> f64 {
    let n = actuals.len().min(forecasts.len());
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = actuals
        .iter()
        .zip(forecasts.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum();
    (sse / n as f64).sqrt()
}

/// Mean absolute error.
pub fn mae(actuals: &[f64], forecasts: &[f64]) -> f64 {
    let n = actuals.len().min(forecasts.len());
    if n == 0 {
        return 0.0;
    }
    let sae: f64 = actuals
        .iter()
        .zip(forecasts.iter())
        .map(|(a, f)| (a - f).abs())
        .sum();
    sae / n as f64
}
