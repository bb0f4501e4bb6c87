use std::collections::BTreeMap;

use fcd_models::ModelConfig;
use fcd_schemas::ModelKind;
use serde::{Deserialize, Serialize};

/// Backtest configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    /// Requested number of folds; folds without enough trailing data are
    /// skipped, so the report may contain fewer.
    pub fold_count: usize,
    /// Holdout length per fold.
    pub horizon: u32,
    /// Minimum training-prefix length for a fold to be usable.
    pub min_train_len: usize,
    /// Models to score.
    pub models: Vec<ModelKind>,
    /// Model tunables forwarded to the factory.
    pub model_cfg: ModelConfig,
}

impl BacktestConfig {
    /// Reasonable defaults for testing.
    pub fn test_defaults() -> Self {
        Self {
            fold_count: 5,
            horizon: 7,
            min_train_len: 10,
            models: vec![ModelKind::Sma, ModelKind::Linear],
            model_cfg: ModelConfig::default(),
        }
    }
}

/// One model's accuracy on one fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    /// None when every actual in the holdout was zero.
    pub mape: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
}

/// One usable fold: the training prefix end, the holdout, and what each
/// model did there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_index: usize,
    /// Exclusive end of the training prefix.
    pub train_end: usize,
    pub horizon: u32,
    pub scores: BTreeMap<ModelKind, FoldScore>,
    /// Models that failed on this fold, with the failure reason tag.
    pub failures: BTreeMap<ModelKind, String>,
}

/// Per-model aggregate across all folds it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelAggregate {
    pub folds_scored: usize,
    pub folds_failed: usize,
    /// Mean over the folds where MAPE was defined.
    pub mean_mape: Option<f64>,
    pub mean_rmse: f64,
    pub mean_mae: f64,
}

/// Backtest report produced after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub folds: Vec<FoldResult>,
    pub per_model: BTreeMap<ModelKind, ModelAggregate>,
    /// Lowest mean MAPE, ties broken by lowest mean RMSE.
    pub best_model: Option<ModelKind>,
    /// Requested folds that lacked sufficient trailing data.
    pub skipped_folds: usize,
    /// True when a cooperative cancel stopped the run early.
    pub cancelled: bool,
}
