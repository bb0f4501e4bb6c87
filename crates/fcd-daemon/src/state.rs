//! Shared runtime state for fcd-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The scheduler handle
//! owns all job state; the accuracy tracker is the only state guarded
//! here, behind a `tokio::sync::RwLock`.

use std::sync::Arc;

use fcd_accuracy::{AccuracyTracker, RetentionPolicy};
use fcd_config::EngineConfig;
use fcd_scheduler::Scheduler;
use tokio::sync::RwLock;

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
    pub build: BuildInfo,
    /// Rolling forecast-vs-actual accuracy history.
    pub accuracy: Arc<RwLock<AccuracyTracker>>,
    /// Advisory MAPE alert threshold (percent), from the engine config.
    pub mape_alert_threshold: f64,
}

impl AppState {
    pub fn new(scheduler: Scheduler, config: &EngineConfig) -> Self {
        let retention = RetentionPolicy {
            max_records: config.accuracy_retention_records,
            max_days: config.accuracy_retention_days,
        };
        Self {
            scheduler,
            build: BuildInfo {
                service: "fcd-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            accuracy: Arc::new(RwLock::new(AccuracyTracker::new(retention))),
            mape_alert_threshold: config.mape_alert_threshold,
        }
    }
}
