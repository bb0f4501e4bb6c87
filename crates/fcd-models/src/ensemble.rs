//! Ensemble combiner: fits its constituent models and blends their point
//! forecasts.
//!
//! Default combination is a simple average. When per-model backtest MAPEs
//! are available, [`inverse_mape_weights`] turns them into normalized
//! weights (sum 1.0, lower error → higher weight) and the ensemble blends
//! with those instead. Constituents that fail to fit are excluded and
//! reported in diagnostics; the ensemble itself fails only when every
//! constituent failed.

use std::collections::BTreeMap;

use fcd_schemas::{ForecastPoint, ForecastSeries, ModelKind};

use crate::{
    build_forecaster, Diagnostics, FitError, FittedForecaster, Forecaster, ModelConfig,
};

/// MAPE floor used when inverting; keeps a perfect (zero-error) model from
/// collapsing every other weight to zero.
const MAPE_FLOOR: f64 = 1e-6;

/// Normalize inverse-MAPE weights over `(model, mape_percent)` pairs.
/// Weights sum to 1.0; the lowest-MAPE model gets the highest weight.
pub fn inverse_mape_weights(mapes: &[(ModelKind, f64)]) -> Vec<(ModelKind, f64)> {
    let inverses: Vec<(ModelKind, f64)> = mapes
        .iter()
        .map(|(kind, mape)| (*kind, 1.0 / mape.max(MAPE_FLOOR)))
        .collect();
    let total: f64 = inverses.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        let equal = 1.0 / mapes.len().max(1) as f64;
        return mapes.iter().map(|(kind, _)| (*kind, equal)).collect();
    }
    inverses
        .into_iter()
        .map(|(kind, w)| (kind, w / total))
        .collect()
}

/// Blend already-predicted constituent forecasts with normalized weights.
/// Point values and interval bounds combine as the same weighted average.
///
/// Weights are assumed normalized (sum 1.0); every forecast must cover the
/// same horizon. This is the combination step used both by
/// [`EnsembleForecaster`] and by callers that already hold per-model
/// forecasts (e.g. after a backtest chose the weights).
pub fn combine_forecasts(weighted: &[(f64, &ForecastSeries)]) -> ForecastSeries {
    let horizon = weighted
        .iter()
        .map(|(_, fs)| fs.points.len())
        .min()
        .unwrap_or(0);

    let points = (0..horizon)
        .map(|i| {
            let mut value = 0.0;
            let mut lower = 0.0;
            let mut upper = 0.0;
            for (w, fs) in weighted {
                value += w * fs.points[i].value;
                lower += w * fs.points[i].lower;
                upper += w * fs.points[i].upper;
            }
            ForecastPoint {
                horizon_index: (i + 1) as u32,
                value,
                lower,
                upper,
            }
        })
        .collect();

    ForecastSeries {
        model: ModelKind::Ensemble,
        points,
    }
}

pub struct EnsembleForecaster {
    constituents: Vec<ModelKind>,
    /// Pre-normalized weights (e.g. from a backtest); `None` = equal weights.
    weights: Option<Vec<(ModelKind, f64)>>,
    cfg: ModelConfig,
}

impl EnsembleForecaster {
    pub fn new(
        constituents: Vec<ModelKind>,
        weights: Option<Vec<(ModelKind, f64)>>,
        cfg: ModelConfig,
    ) -> Self {
        Self {
            constituents,
            weights,
            cfg,
        }
    }
}

impl Forecaster for EnsembleForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Ensemble
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn FittedForecaster>, FitError> {
        if self.constituents.is_empty() {
            return Err(FitError::BadConfig("ensemble needs at least one constituent".to_string()));
        }

        let mut fitted: Vec<(ModelKind, Box<dyn FittedForecaster>)> = Vec::new();
        let mut failures: Vec<(ModelKind, FitError)> = Vec::new();

        for &kind in &self.constituents {
            if kind == ModelKind::Ensemble {
                continue; // an ensemble never nests itself
            }
            match build_forecaster(kind, &self.cfg).fit(values) {
                Ok(f) => fitted.push((kind, f)),
                Err(e) => failures.push((kind, e)),
            }
        }

        if fitted.is_empty() {
            return Err(FitError::AllConstituentsFailed);
        }

        // Restrict supplied weights to the survivors and renormalize; fall
        // back to equal weights when none were supplied.
        let survivor_kinds: Vec<ModelKind> = fitted.iter().map(|(k, _)| *k).collect();
        let weights = normalize_over_survivors(self.weights.as_deref(), &survivor_kinds);

        Ok(Box::new(FittedEnsemble {
            fitted,
            weights,
            failures,
        }))
    }
}

fn normalize_over_survivors(
    supplied: Option<&[(ModelKind, f64)]>,
    survivors: &[ModelKind],
) -> Vec<(ModelKind, f64)> {
    let raw: Vec<(ModelKind, f64)> = match supplied {
        Some(ws) => survivors
            .iter()
            .map(|k| {
                let w = ws
                    .iter()
                    .find(|(wk, _)| wk == k)
                    .map(|(_, w)| *w)
                    .unwrap_or(0.0);
                (*k, w)
            })
            .collect(),
        None => survivors.iter().map(|k| (*k, 1.0)).collect(),
    };

    let total: f64 = raw.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        let equal = 1.0 / survivors.len().max(1) as f64;
        return survivors.iter().map(|k| (*k, equal)).collect();
    }
    raw.into_iter().map(|(k, w)| (k, w / total)).collect()
}

#[derive(Debug)]
struct FittedEnsemble {
    fitted: Vec<(ModelKind, Box<dyn FittedForecaster>)>,
    /// Normalized over survivors; sums to 1.0.
    weights: Vec<(ModelKind, f64)>,
    failures: Vec<(ModelKind, FitError)>,
}

impl FittedForecaster for FittedEnsemble {
    fn kind(&self) -> ModelKind {
        ModelKind::Ensemble
    }

    fn predict(&self, horizon: u32) -> ForecastSeries {
        let forecasts: Vec<(f64, ForecastSeries)> = self
            .fitted
            .iter()
            .map(|(kind, f)| {
                let w = self
                    .weights
                    .iter()
                    .find(|(wk, _)| wk == kind)
                    .map(|(_, w)| *w)
                    .unwrap_or(0.0);
                (w, f.predict(horizon))
            })
            .collect();

        let borrowed: Vec<(f64, &ForecastSeries)> =
            forecasts.iter().map(|(w, fs)| (*w, fs)).collect();
        combine_forecasts(&borrowed)
    }

    fn diagnose(&self) -> Diagnostics {
        let mut params = BTreeMap::new();
        for (kind, w) in &self.weights {
            params.insert(format!("weight_{}", kind.as_str()), *w);
        }
        params.insert("constituents".to_string(), self.fitted.len() as f64);

        let notes = self
            .failures
            .iter()
            .map(|(kind, e)| format!("constituent_failed:{}:{}", kind.as_str(), e.reason()))
            .collect();

        Diagnostics {
            model: ModelKind::Ensemble,
            params,
            notes,
        }
    }
}
