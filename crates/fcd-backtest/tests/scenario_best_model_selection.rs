//! Best-model selection: lowest mean MAPE wins, ties break on RMSE, and a
//! model failing every fold is excluded without aborting the run.

use fcd_backtest::{BacktestConfig, BacktestEngine};
use fcd_models::ModelConfig;
use fcd_schemas::ModelKind;

/// A strongly trending series: linear extrapolation should beat a flat
/// trailing-mean forecast on every holdout.
fn trending_series(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 5.0 * i as f64 + ((i * 13 % 7) as f64 - 3.0))
        .collect()
}

#[test]
fn linear_beats_sma_on_a_trend() {
    let config = BacktestConfig {
        fold_count: 4,
        horizon: 10,
        models: vec![ModelKind::Sma, ModelKind::Linear],
        ..BacktestConfig::test_defaults()
    };
    let report = BacktestEngine::new(config).run(&trending_series(100)).unwrap();

    assert_eq!(report.best_model, Some(ModelKind::Linear));

    let linear = &report.per_model[&ModelKind::Linear];
    let sma = &report.per_model[&ModelKind::Sma];
    assert!(linear.mean_mape.unwrap() < sma.mean_mape.unwrap());
}

#[test]
fn model_failing_every_fold_is_tolerated() {
    // SMA with a window longer than any training prefix fails each fold;
    // Linear still scores and is selected.
    let config = BacktestConfig {
        fold_count: 3,
        horizon: 10,
        models: vec![ModelKind::Sma, ModelKind::Linear],
        model_cfg: ModelConfig {
            sma_window: 500,
            ..ModelConfig::default()
        },
        ..BacktestConfig::test_defaults()
    };
    let report = BacktestEngine::new(config).run(&trending_series(80)).unwrap();

    let sma = &report.per_model[&ModelKind::Sma];
    assert_eq!(sma.folds_scored, 0);
    assert_eq!(sma.folds_failed, report.folds.len());
    assert_eq!(sma.mean_mape, None);

    assert_eq!(report.best_model, Some(ModelKind::Linear));
    for fold in &report.folds {
        assert_eq!(fold.failures[&ModelKind::Sma], "insufficient_data");
    }
}

#[test]
fn cancel_flag_stops_between_folds() {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    let flag = Arc::new(AtomicBool::new(true));
    let config = BacktestConfig {
        fold_count: 4,
        horizon: 10,
        ..BacktestConfig::test_defaults()
    };
    let report = BacktestEngine::new(config)
        .with_cancel_flag(flag)
        .run(&trending_series(100))
        .unwrap();

    assert!(report.cancelled);
    assert!(report.folds.is_empty());
}
