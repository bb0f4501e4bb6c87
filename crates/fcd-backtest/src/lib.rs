//! fcd-backtest
//!
//! Rolling-origin (walk-forward) validation for the model library: each
//! fold fits every requested model on a training prefix and scores its
//! forecast against the held-out horizon. Produces per-fold and per-model
//! aggregates and selects a best model.

pub mod engine;
pub mod types;

pub use engine::{BacktestEngine, BacktestError};
pub use types::{BacktestConfig, BacktestReport, FoldResult, FoldScore, ModelAggregate};
