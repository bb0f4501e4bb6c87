//! The rolling-origin backtest engine.
//!
//! Fold layout: fold `k` of `n` (oldest first) trains on the prefix ending
//! `horizon * (n - k)` points before the series end and is scored on the
//! next `horizon` points, so holdouts never overlap. Folds whose training
//! prefix is shorter than `min_train_len` are skipped, never fabricated.
//!
//! A model failing on a fold is recorded and excluded from that model's
//! aggregate; the run itself only fails when zero folds could be formed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fcd_models::metrics::calculate_accuracy_metrics;
use fcd_models::build_forecaster;
use fcd_schemas::ModelKind;

use crate::types::{BacktestConfig, BacktestReport, FoldResult, FoldScore, ModelAggregate};

/// Backtest error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktestError {
    /// No models requested.
    NoModels,
    /// Not a single fold had enough data to train and hold out.
    InsufficientData { needed: usize, actual: usize },
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacktestError::NoModels => write!(f, "backtest requires at least one model"),
            BacktestError::InsufficientData { needed, actual } => write!(
                f,
                "insufficient data for any fold: need {needed} points, have {actual}"
            ),
        }
    }
}

impl std::error::Error for BacktestError {}

/// The backtest engine: deterministic walk-forward replay.
pub struct BacktestEngine {
    config: BacktestConfig,
    /// Cooperative cancel flag, checked between folds.
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            cancel_flag: None,
        }
    }

    /// Attach a cancel flag observed at the fold boundary.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Run the backtest over the observed values of one series.
    pub fn run(&self, values: &[f64]) -> Result<BacktestReport, BacktestError> {
        let cfg = &self.config;
        if cfg.models.is_empty() {
            return Err(BacktestError::NoModels);
        }

        let n = values.len();
        let horizon = cfg.horizon as usize;

        // Plan folds oldest-first; a fold is usable when its training prefix
        // reaches min_train_len and its holdout fits before the series end.
        let mut train_ends: Vec<usize> = Vec::new();
        let mut skipped = 0usize;
        for k in 0..cfg.fold_count {
            let holdouts_after = cfg.fold_count - k; // this fold's plus later ones
            match n.checked_sub(horizon * holdouts_after) {
                Some(train_end) if train_end >= cfg.min_train_len => train_ends.push(train_end),
                _ => skipped += 1,
            }
        }

        if train_ends.is_empty() {
            return Err(BacktestError::InsufficientData {
                needed: cfg.min_train_len + horizon,
                actual: n,
            });
        }

        let mut folds: Vec<FoldResult> = Vec::with_capacity(train_ends.len());
        let mut cancelled = false;

        for (fold_index, &train_end) in train_ends.iter().enumerate() {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }

            let train = &values[..train_end];
            let actuals = &values[train_end..train_end + horizon];

            let mut scores = BTreeMap::new();
            let mut failures = BTreeMap::new();

            for &kind in &cfg.models {
                match build_forecaster(kind, &cfg.model_cfg).fit(train) {
                    Ok(fitted) => {
                        let forecast = fitted.predict(cfg.horizon);
                        let predicted: Vec<f64> =
                            forecast.points.iter().map(|p| p.value).collect();
                        match calculate_accuracy_metrics(actuals, &predicted) {
                            Ok(m) => {
                                scores.insert(
                                    kind,
                                    FoldScore {
                                        mape: m.mape,
                                        rmse: m.rmse,
                                        mae: m.mae,
                                    },
                                );
                            }
                            Err(e) => {
                                failures.insert(kind, e.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        failures.insert(kind, e.reason().to_string());
                    }
                }
            }

            folds.push(FoldResult {
                fold_index,
                train_end,
                horizon: cfg.horizon,
                scores,
                failures,
            });
        }

        let per_model = aggregate(&cfg.models, &folds);
        let best_model = select_best(&per_model);

        Ok(BacktestReport {
            folds,
            per_model,
            best_model,
            skipped_folds: skipped,
            cancelled,
        })
    }
}

fn aggregate(models: &[ModelKind], folds: &[FoldResult]) -> BTreeMap<ModelKind, ModelAggregate> {
    let mut out = BTreeMap::new();
    for &kind in models {
        let mut mapes = Vec::new();
        let mut rmses = Vec::new();
        let mut maes = Vec::new();
        let mut failed = 0usize;

        for fold in folds {
            if let Some(score) = fold.scores.get(&kind) {
                if let Some(m) = score.mape {
                    mapes.push(m);
                }
                rmses.push(score.rmse);
                maes.push(score.mae);
            } else if fold.failures.contains_key(&kind) {
                failed += 1;
            }
        }

        let mean = |xs: &[f64]| -> f64 {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };

        out.insert(
            kind,
            ModelAggregate {
                folds_scored: rmses.len(),
                folds_failed: failed,
                mean_mape: if mapes.is_empty() { None } else { Some(mean(&mapes)) },
                mean_rmse: mean(&rmses),
                mean_mae: mean(&maes),
            },
        );
    }
    out
}

/// Lowest mean MAPE wins, ties broken by lowest mean RMSE. Models that
/// never scored a fold are out; when no model has a defined MAPE (all-zero
/// holdouts), fall back to lowest mean RMSE.
fn select_best(per_model: &BTreeMap<ModelKind, ModelAggregate>) -> Option<ModelKind> {
    let any_mape = per_model
        .values()
        .any(|agg| agg.folds_scored > 0 && agg.mean_mape.is_some());

    per_model
        .iter()
        .filter(|(_, agg)| agg.folds_scored > 0)
        .filter(|(_, agg)| !any_mape || agg.mean_mape.is_some())
        .min_by(|(_, a), (_, b)| {
            let a_key = (a.mean_mape.unwrap_or(f64::MAX), a.mean_rmse);
            let b_key = (b.mean_mape.unwrap_or(f64::MAX), b.mean_rmse);
            a_key
                .partial_cmp(&b_key)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(kind, _)| *kind)
}
