//! fcd-accuracy
//!
//! Post-hoc forecast accuracy tracking: ingest actual-vs-forecast pairs,
//! keep a rolling per-(series, model) history, classify accuracy trends,
//! and raise advisory alerts when error drifts past a threshold.
//!
//! Metric math is shared with the backtest engine via
//! [`fcd_models::metrics`]; nothing here recomputes MAPE/RMSE/MAE
//! differently. All outputs are advisory data — this crate performs no
//! side-effecting actions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use fcd_models::metrics::{calculate_accuracy_metrics, AccuracyMetrics, MetricsError};
use fcd_schemas::{AccuracyRecord, ModelKind};
use serde::{Deserialize, Serialize};

pub use fcd_models::metrics::{mae, mape, rmse};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccuracyError {
    LengthMismatch { actuals: usize, forecasts: usize },
    Empty,
}

impl std::fmt::Display for AccuracyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccuracyError::LengthMismatch { actuals, forecasts } => write!(
                f,
                "actuals ({actuals}) and forecasts ({forecasts}) must have equal length"
            ),
            AccuracyError::Empty => write!(f, "cannot record accuracy over zero points"),
        }
    }
}

impl std::error::Error for AccuracyError {}

impl From<MetricsError> for AccuracyError {
    fn from(e: MetricsError) -> Self {
        match e {
            MetricsError::LengthMismatch { actuals, forecasts } => {
                AccuracyError::LengthMismatch { actuals, forecasts }
            }
            MetricsError::Empty => AccuracyError::Empty,
        }
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Rolling-history windowing: a record survives only while it is among the
/// newest `max_records` for its (series, model) AND younger than `max_days`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_records: usize,
    pub max_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: 100,
            max_days: 90,
        }
    }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

/// Direction of the tracked metric (MAPE): `Increasing` means error is
/// growing, i.e. accuracy is getting worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Relative-change band within which a metric counts as stable (±5%).
pub const TREND_STABLE_BAND: f64 = 0.05;

/// Trend classification for one (series, model) history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyTrend {
    pub series_id: String,
    pub model: ModelKind,
    pub direction: TrendDirection,
    /// Relative change of the second-half mean vs the first-half mean.
    pub relative_change: f64,
    pub sample_size: usize,
}

/// Advisory recommendation raised when a model's error breaches the alert
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyAlert {
    pub series_id: String,
    pub model: ModelKind,
    /// Latest recorded MAPE, in percent.
    pub latest_mape: f64,
    pub threshold: f64,
    /// "high" — reserved for future grading.
    pub priority: String,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Re-export of the pure metric triple for standalone diagnostics use.
pub fn accuracy_metrics(actuals: &[f64], forecasts: &[f64]) -> Result<AccuracyMetrics, AccuracyError> {
    Ok(calculate_accuracy_metrics(actuals, forecasts)?)
}

/// Append-only accuracy history with retention, trend classification, and
/// alerting. Owned by whoever embeds it; no interior locking.
#[derive(Debug, Clone, Default)]
pub struct AccuracyTracker {
    /// (series_id, model) -> records, oldest first.
    history: BTreeMap<(String, ModelKind), Vec<AccuracyRecord>>,
    retention: RetentionPolicy,
}

impl AccuracyTracker {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            history: BTreeMap::new(),
            retention,
        }
    }

    /// Score an actual-vs-forecast pair and append the record.
    pub fn record(
        &mut self,
        series_id: &str,
        model: ModelKind,
        actuals: &[f64],
        forecasts: &[f64],
        ts: DateTime<Utc>,
    ) -> Result<AccuracyRecord, AccuracyError> {
        let metrics = calculate_accuracy_metrics(actuals, forecasts)?;

        let record = AccuracyRecord {
            series_id: series_id.to_string(),
            model,
            ts,
            mape: metrics.mape,
            rmse: metrics.rmse,
            mae: metrics.mae,
            sample_size: metrics.sample_size,
        };

        let entry = self
            .history
            .entry((series_id.to_string(), model))
            .or_default();
        entry.push(record.clone());
        self.apply_retention(series_id, model, ts);

        Ok(record)
    }

    fn apply_retention(&mut self, series_id: &str, model: ModelKind, now: DateTime<Utc>) {
        let policy = self.retention;
        if let Some(records) = self.history.get_mut(&(series_id.to_string(), model)) {
            let cutoff = now - Duration::days(policy.max_days);
            records.retain(|r| r.ts >= cutoff);
            if records.len() > policy.max_records {
                let drop = records.len() - policy.max_records;
                records.drain(..drop);
            }
        }
    }

    /// Full history for one (series, model), oldest first.
    pub fn history(&self, series_id: &str, model: ModelKind) -> &[AccuracyRecord] {
        self.history
            .get(&(series_id.to_string(), model))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Classify the MAPE trend of every tracked (series, model) history.
    ///
    /// The classification compares the mean of the first half of the
    /// history against the mean of the second half; a relative change
    /// beyond ±5% is Increasing/Decreasing, anything inside the band is
    /// Stable. Histories with fewer than 4 records with defined MAPE are
    /// skipped — two points per half is the minimum meaningful split.
    pub fn trends(&self) -> Vec<AccuracyTrend> {
        let mut out = Vec::new();
        for ((series_id, model), records) in &self.history {
            let mapes: Vec<f64> = records.iter().filter_map(|r| r.mape).collect();
            if mapes.len() < 4 {
                continue;
            }

            let mid = mapes.len() / 2;
            let first = &mapes[..mid];
            let second = &mapes[mid..];
            let first_mean = first.iter().sum::<f64>() / first.len() as f64;
            let second_mean = second.iter().sum::<f64>() / second.len() as f64;

            if first_mean == 0.0 {
                continue;
            }
            let relative_change = (second_mean - first_mean) / first_mean;

            let direction = if relative_change > TREND_STABLE_BAND {
                TrendDirection::Increasing
            } else if relative_change < -TREND_STABLE_BAND {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            };

            out.push(AccuracyTrend {
                series_id: series_id.clone(),
                model: *model,
                direction,
                relative_change,
                sample_size: mapes.len(),
            });
        }
        out
    }

    /// Advisory alerts for histories whose latest MAPE exceeds `threshold`
    /// (percent). Pure output; nothing is mutated or sent anywhere.
    pub fn alerts(&self, threshold: f64) -> Vec<AccuracyAlert> {
        let mut out = Vec::new();
        for ((series_id, model), records) in &self.history {
            let latest_mape = records.iter().rev().find_map(|r| r.mape);
            if let Some(m) = latest_mape {
                if m > threshold {
                    out.push(AccuracyAlert {
                        series_id: series_id.clone(),
                        model: *model,
                        latest_mape: m,
                        threshold,
                        priority: "high".to_string(),
                        recommendation: format!(
                            "model {} on series {} has MAPE {:.1}% (threshold {:.1}%); \
                             consider refitting or switching the primary model",
                            model, series_id, m, threshold
                        ),
                    });
                }
            }
        }
        out
    }
}
