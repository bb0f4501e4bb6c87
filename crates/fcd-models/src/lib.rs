//! fcd-models
//!
//! The forecasting model library: SMA, Holt-Winters, ARIMA, Linear, and the
//! Ensemble combiner, all behind one fit/predict/diagnose contract, plus the
//! shared accuracy metrics (`metrics`).
//!
//! Construction is keyed by [`fcd_schemas::ModelKind`] through
//! [`build_forecaster`]; there is no string-keyed model lookup. Every model
//! returns typed errors on insufficient data, non-finite input, or singular
//! systems — numerical failure never panics.

use std::collections::BTreeMap;

use fcd_schemas::{ForecastPoint, ForecastSeries, ModelKind};
use serde::{Deserialize, Serialize};

pub mod arima;
pub mod ensemble;
pub mod holt_winters;
pub mod linear;
pub mod metrics;
pub mod sma;

pub use ensemble::{inverse_mape_weights, EnsembleForecaster};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Additive vs multiplicative seasonal decomposition for Holt-Winters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalMode {
    Additive,
    Multiplicative,
}

/// Tunables for every model in the library. One bag keeps the factory
/// signature stable; each model reads only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// SMA trailing window.
    pub sma_window: usize,
    /// Holt-Winters smoothing constants.
    pub hw_alpha: f64,
    pub hw_beta: f64,
    pub hw_gamma: f64,
    /// Seasonal cycle length in points (7 = weekly on daily data).
    pub season_length: usize,
    pub seasonal_mode: SeasonalMode,
    /// ARIMA orders.
    pub arima_p: usize,
    pub arima_d: usize,
    pub arima_q: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sma_window: 7,
            hw_alpha: 0.3,
            hw_beta: 0.1,
            hw_gamma: 0.1,
            season_length: 7,
            seasonal_mode: SeasonalMode::Additive,
            arima_p: 1,
            arima_d: 1,
            arima_q: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fit-time failures. These are reported per model and isolated by the
/// caller; a single model failing never aborts a whole job.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// The series is too short for this model's requirements.
    InsufficientData { needed: usize, actual: usize },
    /// The input contains NaN or infinite values.
    NonFinite { index: usize },
    /// A linear system required by the fit is singular.
    Singular(String),
    /// The model configuration is unusable (e.g. zero-length window).
    BadConfig(String),
    /// Every constituent of an ensemble failed to fit.
    AllConstituentsFailed,
}

impl FitError {
    /// Stable machine-readable tag used in structured failure markers.
    pub fn reason(&self) -> &'static str {
        match self {
            FitError::InsufficientData { .. } => "insufficient_data",
            FitError::NonFinite { .. } => "non_finite",
            FitError::Singular(_) => "singular",
            FitError::BadConfig(_) => "bad_config",
            FitError::AllConstituentsFailed => "all_constituents_failed",
        }
    }
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::InsufficientData { needed, actual } => {
                write!(f, "insufficient data: need {needed} observations, have {actual}")
            }
            FitError::NonFinite { index } => {
                write!(f, "non-finite value at observation index {index}")
            }
            FitError::Singular(what) => write!(f, "singular system: {what}"),
            FitError::BadConfig(what) => write!(f, "bad model config: {what}"),
            FitError::AllConstituentsFailed => {
                write!(f, "every constituent model failed to fit")
            }
        }
    }
}

impl std::error::Error for FitError {}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Per-model diagnostics: fitted parameters plus free-form notes (e.g. the
/// explicit seasonal-degradation marker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub model: ModelKind,
    pub params: BTreeMap<String, f64>,
    pub notes: Vec<String>,
}

/// An unfitted model: construction is cheap, fitting may fail.
pub trait Forecaster: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Fit on the observed values of a series (missing points already
    /// removed by the caller).
    fn fit(&self, values: &[f64]) -> Result<Box<dyn FittedForecaster>, FitError>;
}

/// A fitted model holding its state; predicting cannot fail.
pub trait FittedForecaster: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ModelKind;

    /// Forecast `horizon` steps past the series end, with 95% intervals.
    fn predict(&self, horizon: u32) -> ForecastSeries;

    /// Mandatory on every model: fitted parameters and diagnostics.
    fn diagnose(&self) -> Diagnostics;
}

/// Build a model for `kind`. The `Ensemble` kind combines every fittable
/// constituent with equal weights; callers with backtest metrics construct
/// [`EnsembleForecaster`] directly to supply inverse-MAPE weights.
pub fn build_forecaster(kind: ModelKind, cfg: &ModelConfig) -> Box<dyn Forecaster> {
    match kind {
        ModelKind::Sma => Box::new(sma::SmaForecaster::new(cfg.sma_window)),
        ModelKind::HoltWinters => Box::new(holt_winters::HoltWintersForecaster::new(cfg.clone())),
        ModelKind::Arima => Box::new(arima::ArimaForecaster::new(
            cfg.arima_p,
            cfg.arima_d,
            cfg.arima_q,
        )),
        ModelKind::Linear => Box::new(linear::LinearForecaster),
        ModelKind::Ensemble => Box::new(EnsembleForecaster::new(
            ModelKind::constituents().to_vec(),
            None,
            cfg.clone(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Shared numeric helpers
// ---------------------------------------------------------------------------

/// z-score for a 95% two-sided interval.
pub(crate) const Z95: f64 = 1.96;

/// Reject NaN / infinite observations with the offending index.
pub(crate) fn check_finite(values: &[f64]) -> Result<(), FitError> {
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(FitError::NonFinite { index: i });
        }
    }
    Ok(())
}

/// Population standard deviation of one-step-ahead residuals; 0 when empty.
pub(crate) fn residual_sigma(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sse: f64 = residuals.iter().map(|r| r * r).sum();
    (sse / residuals.len() as f64).sqrt()
}

/// Wrap point forecasts into a [`ForecastSeries`] with residual-based
/// intervals widening as sqrt(h).
pub(crate) fn forecast_series(model: ModelKind, points: Vec<f64>, sigma: f64) -> ForecastSeries {
    let points = points
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let h = (i + 1) as f64;
            let margin = Z95 * sigma * h.sqrt();
            ForecastPoint {
                horizon_index: (i + 1) as u32,
                value,
                lower: value - margin,
                upper: value + margin,
            }
        })
        .collect();
    ForecastSeries { model, points }
}
