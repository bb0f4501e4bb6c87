//! fcd-config
//!
//! Typed engine configuration with YAML overlay and a stable config hash.
//!
//! Defaults are code; an optional YAML document overrides individual keys
//! (deep merge, later keys win). The effective config serializes to
//! canonical JSON and hashes with SHA-256 so every run is attributable to
//! an exact configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use fcd_features::OutlierConfig;
use fcd_models::ModelConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io { path: String, detail: String },
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, detail } => write!(f, "failed to read config {path}: {detail}"),
            ConfigError::Parse(detail) => write!(f, "invalid config: {detail}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Everything tunable in the forecasting engine, with serde defaults so a
/// partial YAML overlay only has to name the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker tasks executing jobs concurrently.
    pub worker_count: usize,
    /// Bounded job-queue depth; submissions beyond this are rejected.
    pub queue_depth: usize,
    /// Event-bus (broadcast) channel capacity.
    pub bus_capacity: usize,

    /// Model tunables (windows, smoothing constants, ARIMA orders).
    pub model: ModelConfig,
    /// Outlier detection tunables.
    pub outliers: OutlierConfig,

    /// Rolling-origin backtest: requested fold count.
    pub backtest_fold_count: usize,
    /// Minimum training-prefix length; shorter folds are skipped.
    pub backtest_min_train_len: usize,

    /// Advisory alert threshold on MAPE, in percent.
    pub mape_alert_threshold: f64,
    /// Accuracy history retention: maximum records per (series, model).
    pub accuracy_retention_records: usize,
    /// Accuracy history retention: maximum age in days.
    pub accuracy_retention_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_depth: 64,
            bus_capacity: 1024,
            model: ModelConfig::default(),
            outliers: OutlierConfig::default(),
            backtest_fold_count: 5,
            backtest_min_train_len: 10,
            mape_alert_threshold: 25.0,
            accuracy_retention_records: 100,
            accuracy_retention_days: 90,
        }
    }
}

impl EngineConfig {
    /// Load defaults overridden by the YAML document at `path`.
    pub fn load_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let raw = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path_str,
            detail: e.to_string(),
        })?;
        Self::load_yaml_str(&raw)
    }

    /// Load defaults overridden by an in-memory YAML document.
    pub fn load_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let overlay: serde_yaml::Value =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let overlay_json =
            serde_json::to_value(overlay).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let base = serde_json::to_value(EngineConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        let merged = deep_merge(base, overlay_json);

        serde_json::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// SHA-256 of the canonical JSON rendering. Identical configs hash
    /// identically across processes and runs.
    pub fn config_hash(&self) -> String {
        // serde_json serializes struct fields in declaration order, which is
        // stable for a fixed binary.
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Recursive JSON merge: objects merge key-wise, anything else is replaced
/// by the overlay value.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, overlay_val) in overlay_map {
                let base_val = base_map.remove(&k).unwrap_or(Value::Null);
                base_map.insert(k, deep_merge(base_val, overlay_val));
            }
            Value::Object(base_map)
        }
        (_, overlay_other) => overlay_other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.worker_count, 2);
        assert_eq!(cfg.backtest_fold_count, 5);
        assert_eq!(cfg.mape_alert_threshold, 25.0);
        assert_eq!(cfg.model.sma_window, 7);
    }

    #[test]
    fn yaml_overlay_overrides_individual_keys() {
        let cfg = EngineConfig::load_yaml_str(
            "worker_count: 4\nmodel:\n  sma_window: 14\n",
        )
        .unwrap();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.model.sma_window, 14);
        // Untouched keys keep their defaults.
        assert_eq!(cfg.queue_depth, 64);
        assert_eq!(cfg.model.arima_p, 1);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let err = EngineConfig::load_yaml_str("worker_count: [not a number").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
