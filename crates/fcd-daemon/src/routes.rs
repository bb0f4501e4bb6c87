//! Axum router and all HTTP handlers for fcd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and
//! attaches middleware layers. All handlers are `pub(crate)` so the
//! scenario tests in `tests/` can compose the router directly.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use fcd_schemas::JobEvent;
use fcd_scheduler::SchedulerError;

use crate::{
    api_types::{
        AccuracyTrendsResponse, CancelResponse, ErrorResponse, HealthResponse, JobResponse,
        RecordAccuracyBody, RecordAccuracyResponse, ResultsResponse, SubmitForecastBody,
        SubmitResponse,
    },
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream", get(stream))
        .route("/forecast", post(submit_forecast))
        .route("/forecast/jobs/:job_id", get(job_status))
        .route("/forecast/jobs/:job_id/results", get(job_results))
        .route("/forecast/jobs/:job_id/cancel", post(job_cancel))
        .route(
            "/forecast/series/:series_id/diagnostics",
            get(series_diagnostics),
        )
        .route(
            "/forecast/series/:series_id/accuracy",
            post(record_accuracy),
        )
        .route("/forecast/accuracy/trends", get(accuracy_trends))
        .with_state(state)
}

fn error_body(msg: impl Into<String>) -> Json<ErrorResponse> {
    Json(ErrorResponse { error: msg.into() })
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /forecast
// ---------------------------------------------------------------------------

/// Accept a forecast request. The optional `Idempotent-Key` header makes
/// resubmission safe: a matching key returns the original job untouched.
pub(crate) async fn submit_forecast(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SubmitForecastBody>,
) -> Response {
    let idempotency_key = headers
        .get("Idempotent-Key")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let request = match body.into_request() {
        Ok(r) => r,
        Err(msg) => return (StatusCode::BAD_REQUEST, error_body(msg)).into_response(),
    };

    match st.scheduler.submit(request, idempotency_key) {
        Ok(outcome) => {
            info!(job_id = %outcome.job_id, deduplicated = outcome.deduplicated, "forecast accepted");
            (
                StatusCode::ACCEPTED,
                Json(SubmitResponse {
                    job_id: outcome.job_id,
                    status: outcome.status,
                    deduplicated: outcome.deduplicated,
                }),
            )
                .into_response()
        }
        Err(SchedulerError::Validation(msg)) => {
            (StatusCode::BAD_REQUEST, error_body(msg)).into_response()
        }
        Err(SchedulerError::QueueFull) => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("job queue is full; retry later"),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /forecast/jobs/:job_id
// ---------------------------------------------------------------------------

pub(crate) async fn job_status(
    State(st): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_id) = job_id.parse::<Uuid>() else {
        return (StatusCode::NOT_FOUND, error_body("no such job")).into_response();
    };

    match st.scheduler.get_status(job_id) {
        Ok(job) => (StatusCode::OK, Json(JobResponse { job })).into_response(),
        Err(SchedulerError::JobNotFound(_)) => {
            (StatusCode::NOT_FOUND, error_body("no such job")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /forecast/jobs/:job_id/results
// ---------------------------------------------------------------------------

/// Results are returned with the job once COMPLETED; before that the job
/// is returned with an explanatory message. An existing job never 500s.
pub(crate) async fn job_results(
    State(st): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_id) = job_id.parse::<Uuid>() else {
        return (StatusCode::NOT_FOUND, error_body("no such job")).into_response();
    };

    match st.scheduler.get_results(job_id) {
        Ok(job) => {
            let message = match job.status {
                fcd_schemas::JobStatus::Completed => None,
                status => Some(format!(
                    "results not available: job is {status} ({}% — {})",
                    job.progress, job.stage
                )),
            };
            (StatusCode::OK, Json(ResultsResponse { job, message })).into_response()
        }
        Err(SchedulerError::JobNotFound(_)) => {
            (StatusCode::NOT_FOUND, error_body("no such job")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /forecast/jobs/:job_id/cancel
// ---------------------------------------------------------------------------

pub(crate) async fn job_cancel(
    State(st): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_id) = job_id.parse::<Uuid>() else {
        return (StatusCode::NOT_FOUND, error_body("no such job")).into_response();
    };

    match st.scheduler.cancel(job_id) {
        Ok(true) => {
            info!(%job_id, "cancel accepted");
            (
                StatusCode::OK,
                Json(CancelResponse {
                    job_id,
                    cancelled: true,
                    status: fcd_schemas::JobStatus::Cancelled,
                }),
            )
                .into_response()
        }
        Ok(false) => {
            // Terminal job: not cancellable, state untouched.
            let status = st
                .scheduler
                .get_status(job_id)
                .map(|j| j.status)
                .unwrap_or(fcd_schemas::JobStatus::Completed);
            (
                StatusCode::BAD_REQUEST,
                error_body(format!("job is {status} and cannot be cancelled")),
            )
                .into_response()
        }
        Err(SchedulerError::JobNotFound(_)) => {
            (StatusCode::NOT_FOUND, error_body("no such job")).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /forecast/series/:series_id/diagnostics
// ---------------------------------------------------------------------------

pub(crate) async fn series_diagnostics(
    State(st): State<Arc<AppState>>,
    Path(series_id): Path<String>,
) -> Response {
    match st.scheduler.series_diagnostics(&series_id).await {
        Ok(diag) => (StatusCode::OK, Json(diag)).into_response(),
        Err(SchedulerError::SeriesNotFound(id)) => (
            StatusCode::NOT_FOUND,
            error_body(format!("series not found: {id}")),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /forecast/series/:series_id/accuracy
// ---------------------------------------------------------------------------

/// Append an actual-vs-forecast sample to the rolling accuracy history.
pub(crate) async fn record_accuracy(
    State(st): State<Arc<AppState>>,
    Path(series_id): Path<String>,
    Json(body): Json<RecordAccuracyBody>,
) -> Response {
    let mut tracker = st.accuracy.write().await;
    match tracker.record(
        &series_id,
        body.model,
        &body.actuals,
        &body.forecasts,
        chrono::Utc::now(),
    ) {
        Ok(record) => (StatusCode::OK, Json(RecordAccuracyResponse { record })).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, error_body(e.to_string())).into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /forecast/accuracy/trends
// ---------------------------------------------------------------------------

/// Trend classification plus advisory alerts over the tracked histories.
pub(crate) async fn accuracy_trends(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let tracker = st.accuracy.read().await;
    (
        StatusCode::OK,
        Json(AccuracyTrendsResponse {
            trends: tracker.trends(),
            alerts: tracker.alerts(st.mape_alert_threshold),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let rx = st.scheduler.subscribe();
    let events = broadcast_to_sse(rx);
    Sse::new(events).keep_alive(KeepAlive::new()).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<JobEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(event) => {
                let event_name = match &event {
                    JobEvent::Progress { .. } => "progress",
                    JobEvent::Completed { .. } => "completed",
                    JobEvent::Failed { .. } => "failed",
                    JobEvent::Cancelled { .. } => "cancelled",
                };
                let data = serde_json::to_string(&event).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
