//! Holt-Winters exponential smoothing: level + trend + seasonal components,
//! additive or multiplicative.
//!
//! Seasonal fitting needs at least two full cycles of data. With less, the
//! model degrades to double exponential smoothing (level + trend only) and
//! says so in its diagnostics — the degradation is never silent.

use std::collections::BTreeMap;

use fcd_schemas::{ForecastSeries, ModelKind};

use crate::{
    check_finite, forecast_series, residual_sigma, Diagnostics, FitError, FittedForecaster,
    Forecaster, ModelConfig, SeasonalMode,
};

/// Floor applied to multiplicative divisors; keeps the recursion defined
/// when the level or a seasonal index approaches zero.
const MULT_EPS: f64 = 1e-3;

pub struct HoltWintersForecaster {
    cfg: ModelConfig,
}

impl HoltWintersForecaster {
    pub fn new(cfg: ModelConfig) -> Self {
        Self { cfg }
    }
}

impl Forecaster for HoltWintersForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::HoltWinters
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn FittedForecaster>, FitError> {
        let cfg = &self.cfg;
        for (name, v) in [
            ("hw_alpha", cfg.hw_alpha),
            ("hw_beta", cfg.hw_beta),
            ("hw_gamma", cfg.hw_gamma),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(FitError::BadConfig(format!("{name} must be in [0, 1], got {v}")));
            }
        }
        check_finite(values)?;
        if values.len() < 2 {
            return Err(FitError::InsufficientData {
                needed: 2,
                actual: values.len(),
            });
        }

        let period = cfg.season_length.max(2);
        let mut notes = Vec::new();

        // Multiplicative seasonality is undefined on non-positive data;
        // fall back to additive and record the switch.
        let mut mode = cfg.seasonal_mode;
        if mode == SeasonalMode::Multiplicative && values.iter().any(|v| *v <= 0.0) {
            mode = SeasonalMode::Additive;
            notes.push("multiplicative_unavailable_nonpositive_values".to_string());
        }

        let seasonal_fitted = values.len() >= 2 * period;
        if !seasonal_fitted {
            notes.push("seasonal_degraded_to_level_trend".to_string());
        }

        let state = if seasonal_fitted {
            fit_triple(values, period, mode, cfg)
        } else {
            fit_double(values, cfg)
        };

        let mut params = BTreeMap::new();
        params.insert("alpha".to_string(), cfg.hw_alpha);
        params.insert("beta".to_string(), cfg.hw_beta);
        params.insert("gamma".to_string(), cfg.hw_gamma);
        params.insert("season_length".to_string(), period as f64);
        params.insert("level".to_string(), state.level);
        params.insert("trend".to_string(), state.trend);
        params.insert(
            "seasonal_degraded".to_string(),
            if seasonal_fitted { 0.0 } else { 1.0 },
        );

        Ok(Box::new(FittedHoltWinters {
            state,
            mode,
            params,
            notes,
            n_obs: values.len(),
        }))
    }
}

#[derive(Debug)]
struct HwState {
    level: f64,
    trend: f64,
    /// Empty when the seasonal component was not fitted.
    seasonal: Vec<f64>,
    /// Index into the seasonal cycle for the first forecast step.
    phase: usize,
    sigma: f64,
}

/// Full level + trend + seasonal recursion (two cycles of data guaranteed).
fn fit_triple(values: &[f64], period: usize, mode: SeasonalMode, cfg: &ModelConfig) -> HwState {
    let (alpha, beta, gamma) = (cfg.hw_alpha, cfg.hw_beta, cfg.hw_gamma);

    let initial_level: f64 = values[..period].iter().sum::<f64>() / period as f64;
    let second_cycle_mean: f64 = values[period..2 * period].iter().sum::<f64>() / period as f64;

    let mut level = initial_level;
    let mut trend = (second_cycle_mean - initial_level) / period as f64;

    let mut seasonal: Vec<f64> = match mode {
        SeasonalMode::Additive => values[..period].iter().map(|v| v - initial_level).collect(),
        SeasonalMode::Multiplicative => values[..period]
            .iter()
            .map(|v| v / initial_level.max(MULT_EPS))
            .collect(),
    };

    let mut residuals = Vec::new();

    for (i, &v) in values.iter().enumerate().skip(period) {
        let s_idx = i % period;
        let prev_level = level;

        let one_step = match mode {
            SeasonalMode::Additive => level + trend + seasonal[s_idx],
            SeasonalMode::Multiplicative => (level + trend) * seasonal[s_idx],
        };
        residuals.push(v - one_step);

        match mode {
            SeasonalMode::Additive => {
                level = alpha * (v - seasonal[s_idx]) + (1.0 - alpha) * (level + trend);
                trend = beta * (level - prev_level) + (1.0 - beta) * trend;
                seasonal[s_idx] = gamma * (v - level) + (1.0 - gamma) * seasonal[s_idx];
            }
            SeasonalMode::Multiplicative => {
                level = alpha * (v / seasonal[s_idx].max(MULT_EPS))
                    + (1.0 - alpha) * (level + trend);
                trend = beta * (level - prev_level) + (1.0 - beta) * trend;
                seasonal[s_idx] =
                    gamma * (v / level.max(MULT_EPS)) + (1.0 - gamma) * seasonal[s_idx];
            }
        }
    }

    HwState {
        level,
        trend,
        seasonal,
        phase: values.len() % period,
        sigma: residual_sigma(&residuals),
    }
}

/// Double exponential smoothing (Holt): the degraded path.
fn fit_double(values: &[f64], cfg: &ModelConfig) -> HwState {
    let (alpha, beta) = (cfg.hw_alpha, cfg.hw_beta);

    let mut level = values[0];
    let mut trend = values[1] - values[0];
    let mut residuals = Vec::new();

    for &v in values.iter().skip(1) {
        let one_step = level + trend;
        residuals.push(v - one_step);

        let prev_level = level;
        level = alpha * v + (1.0 - alpha) * (level + trend);
        trend = beta * (level - prev_level) + (1.0 - beta) * trend;
    }

    HwState {
        level,
        trend,
        seasonal: Vec::new(),
        phase: 0,
        sigma: residual_sigma(&residuals),
    }
}

#[derive(Debug)]
struct FittedHoltWinters {
    state: HwState,
    mode: SeasonalMode,
    params: BTreeMap<String, f64>,
    notes: Vec<String>,
    n_obs: usize,
}

impl FittedForecaster for FittedHoltWinters {
    fn kind(&self) -> ModelKind {
        ModelKind::HoltWinters
    }

    fn predict(&self, horizon: u32) -> ForecastSeries {
        let st = &self.state;
        let points: Vec<f64> = (1..=horizon as usize)
            .map(|h| {
                let base = st.level + st.trend * h as f64;
                if st.seasonal.is_empty() {
                    base
                } else {
                    let s = st.seasonal[(st.phase + h - 1) % st.seasonal.len()];
                    match self.mode {
                        SeasonalMode::Additive => base + s,
                        SeasonalMode::Multiplicative => base * s,
                    }
                }
            })
            .collect();

        forecast_series(ModelKind::HoltWinters, points, st.sigma)
    }

    fn diagnose(&self) -> Diagnostics {
        let mut params = self.params.clone();
        params.insert("n_obs".to_string(), self.n_obs as f64);
        params.insert("residual_sigma".to_string(), self.state.sigma);
        Diagnostics {
            model: ModelKind::HoltWinters,
            params,
            notes: self.notes.clone(),
        }
    }
}
