use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

/// One observation in a series. `value == None` means the point is missing
/// (the timestamp exists in the calendar but no measurement was recorded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ts: DateTime<Utc>,
    pub value: Option<f64>,
}

/// An ordered series of observations for one series identifier.
///
/// Immutable once loaded for a job: the scheduler snapshots it and no
/// component mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub series_id: String,
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn new(series_id: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            series_id: series_id.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Observed (non-missing) values in series order.
    pub fn observed(&self) -> Vec<f64> {
        self.points.iter().filter_map(|p| p.value).collect()
    }

    /// Fraction of points that carry a value. 1.0 for an empty series.
    pub fn completeness(&self) -> f64 {
        if self.points.is_empty() {
            return 1.0;
        }
        let observed = self.points.iter().filter(|p| p.value.is_some()).count();
        observed as f64 / self.points.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Model kinds
// ---------------------------------------------------------------------------

/// The closed set of supported forecasting models.
///
/// Model construction is keyed by this enum; there is no string-keyed
/// dynamic lookup anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Sma,
    HoltWinters,
    Arima,
    Linear,
    Ensemble,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Sma => "sma",
            ModelKind::HoltWinters => "holt_winters",
            ModelKind::Arima => "arima",
            ModelKind::Linear => "linear",
            ModelKind::Ensemble => "ensemble",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sma" => Some(ModelKind::Sma),
            "holt_winters" | "holtwinters" | "holt-winters" => Some(ModelKind::HoltWinters),
            "arima" => Some(ModelKind::Arima),
            "linear" => Some(ModelKind::Linear),
            "ensemble" => Some(ModelKind::Ensemble),
            _ => None,
        }
    }

    /// The fittable constituents an ensemble combines (everything but itself).
    pub fn constituents() -> &'static [ModelKind] {
        &[
            ModelKind::Sma,
            ModelKind::HoltWinters,
            ModelKind::Arima,
            ModelKind::Linear,
        ]
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Forecast request
// ---------------------------------------------------------------------------

/// A forecast request as submitted by the caller.
///
/// `currency_mode`, `fx_scenario`, `scenario_config` and `feature_flags` are
/// opaque pass-through: the core snapshots them onto the job and never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub series_ids: Vec<String>,
    pub horizon: u32,
    pub models: Vec<ModelKind>,
    #[serde(default)]
    pub currency_mode: Option<String>,
    #[serde(default)]
    pub fx_scenario: Option<Value>,
    #[serde(default)]
    pub scenario_config: Option<Value>,
    #[serde(default)]
    pub feature_flags: Option<Value>,
}

/// Horizon bounds accepted by the engine (inclusive).
pub const MIN_HORIZON: u32 = 1;
pub const MAX_HORIZON: u32 = 365;

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

/// Job lifecycle states. Queued < Running < {Completed, Failed, Cancelled};
/// the three terminal states are unordered among themselves and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Rank in the lifecycle partial order (terminal states share a rank).
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forecast job owned by the scheduler. Mutated only through the
/// scheduler's defined transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastJob {
    pub job_id: Uuid,
    pub idempotency_key: Option<String>,
    pub status: JobStatus,
    pub request: ForecastRequest,
    /// 0–100; strictly monotonic over a job's lifetime.
    pub progress: u8,
    /// Human-readable stage label matching the last progress checkpoint.
    pub stage: String,
    pub results: Option<JobResults>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Forecast output
// ---------------------------------------------------------------------------

/// One forecasted point at `horizon_index` steps past the series end
/// (1-based), with a 95% confidence interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub horizon_index: u32,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// A full horizon of forecasted points from a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub model: ModelKind,
    pub points: Vec<ForecastPoint>,
}

/// Structured marker for a model that could not produce a forecast.
/// These are data, not job failures: the job fails only when every
/// requested model failed for every series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub series_id: String,
    pub model: ModelKind,
    /// "insufficient_data" | "non_finite" | "singular" | "bad_config"
    pub reason: String,
    pub detail: String,
}

/// Per-series forecast output: each surviving model's forecast plus the
/// ensemble combination and its normalized weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesForecast {
    pub series_id: String,
    pub forecasts: Vec<ForecastSeries>,
    pub ensemble: Option<ForecastSeries>,
    /// Normalized ensemble weights per constituent (sum to 1.0 when present).
    pub ensemble_weights: Vec<(ModelKind, f64)>,
    /// Best model chosen by the backtest for this series, if one ran.
    pub best_model: Option<ModelKind>,
}

/// Structured marker for a series the job could not process at all
/// (loader miss, empty series).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesFailure {
    pub series_id: String,
    /// "series_not_found" | "load_failed" | "empty_series"
    pub reason: String,
    pub detail: String,
}

/// Everything a completed job carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResults {
    pub series: Vec<SeriesForecast>,
    pub model_errors: Vec<ModelFailure>,
    pub series_errors: Vec<SeriesFailure>,
}

// ---------------------------------------------------------------------------
// Job events
// ---------------------------------------------------------------------------

/// Events broadcast by the scheduler over its event bus. External sinks
/// subscribe; the scheduler never depends on their identity or liveness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        job_id: Uuid,
        percent: u8,
        stage: String,
    },
    Completed {
        job_id: Uuid,
    },
    Failed {
        job_id: Uuid,
        error: String,
    },
    Cancelled {
        job_id: Uuid,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => *job_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Accuracy history
// ---------------------------------------------------------------------------

/// One appended actual-vs-forecast scoring for a (series, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub series_id: String,
    pub model: ModelKind,
    pub ts: DateTime<Utc>,
    /// None when every actual in the sample was zero (MAPE undefined).
    pub mape: Option<f64>,
    pub rmse: f64,
    pub mae: f64,
    pub sample_size: usize,
}
