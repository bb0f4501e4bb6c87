//! Request and response types for all fcd-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here beyond the
//! wire-to-core request conversion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use fcd_schemas::{ForecastJob, ForecastRequest, JobStatus, ModelKind};

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Error body (400 / 404)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// POST /forecast
// ---------------------------------------------------------------------------

/// Series selector; mirrors the upstream API shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesFilter {
    #[serde(default)]
    pub series_ids: Vec<String>,
}

/// Submission body. Model names arrive as strings and are resolved against
/// the closed [`ModelKind`] registry; unknown names are a 400.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitForecastBody {
    #[serde(default)]
    pub series_filter: SeriesFilter,
    pub horizon: u32,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub currency_mode: Option<String>,
    #[serde(default)]
    pub fx_scenario: Option<Value>,
    #[serde(default)]
    pub scenario_config: Option<Value>,
    #[serde(default)]
    pub feature_flags: Option<Value>,
}

impl SubmitForecastBody {
    /// Resolve the wire body into a core request. Unknown model names are
    /// rejected here so the scheduler only ever sees registry kinds; an
    /// empty model list defaults to the full library plus the ensemble.
    pub fn into_request(self) -> Result<ForecastRequest, String> {
        let mut models = Vec::with_capacity(self.models.len());
        for name in &self.models {
            match ModelKind::parse(name) {
                Some(kind) => models.push(kind),
                None => return Err(format!("unknown model '{name}'")),
            }
        }
        if models.is_empty() {
            models = ModelKind::constituents().to_vec();
            models.push(ModelKind::Ensemble);
        }

        Ok(ForecastRequest {
            series_ids: self.series_filter.series_ids,
            horizon: self.horizon,
            models,
            currency_mode: self.currency_mode,
            fx_scenario: self.fx_scenario,
            scenario_config: self.scenario_config,
            feature_flags: self.feature_flags,
        })
    }
}

/// 202 body for accepted submissions (new or idempotent replay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub deduplicated: bool,
}

// ---------------------------------------------------------------------------
// GET /forecast/jobs/:job_id  and  /results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job: ForecastJob,
}

/// Results body: the job always, plus an explanatory message while results
/// are not yet available. Never a 500 for an existing job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub job: ForecastJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /forecast/jobs/:job_id/cancel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// POST /forecast/series/:series_id/accuracy
// ---------------------------------------------------------------------------

/// One actual-vs-forecast sample to append to the accuracy history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAccuracyBody {
    pub model: ModelKind,
    pub actuals: Vec<f64>,
    pub forecasts: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAccuracyResponse {
    pub record: fcd_schemas::AccuracyRecord,
}

// ---------------------------------------------------------------------------
// GET /forecast/accuracy/trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyTrendsResponse {
    pub trends: Vec<fcd_accuracy::AccuracyTrend>,
    pub alerts: Vec<fcd_accuracy::AccuracyAlert>,
}
