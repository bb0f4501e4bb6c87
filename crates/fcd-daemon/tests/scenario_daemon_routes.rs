//! In-process scenario tests for fcd-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O required.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use fcd_config::EngineConfig;
use fcd_daemon::{routes, state};
use fcd_scheduler::Scheduler;
use fcd_testkit::{seasonal_series, trend_series, InMemorySeriesLoader};
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a fresh in-process state with two loadable series.
fn make_state() -> Arc<state::AppState> {
    let loader = Arc::new(
        InMemorySeriesLoader::new()
            .with_series(seasonal_series("demand", 90, 11))
            .with_series(trend_series("cash", 60, 4)),
    );
    let config = EngineConfig::default();
    let scheduler = Scheduler::new(loader, config.clone());
    Arc::new(state::AppState::new(scheduler, &config))
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(
    st: &Arc<state::AppState>,
    req: Request<axum::body::Body>,
) -> (StatusCode, bytes::Bytes) {
    let router = routes::build_router(Arc::clone(st));
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

/// Parse body bytes as a `serde_json::Value`.
fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

fn submit_body(series: &[&str], horizon: u32) -> String {
    serde_json::json!({
        "series_filter": { "series_ids": series },
        "horizon": horizon,
        "models": ["sma", "linear"],
    })
    .to_string()
}

fn post_forecast(body: String, idem_key: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/forecast")
        .header("content-type", "application/json");
    if let Some(key) = idem_key {
        builder = builder.header("Idempotent-Key", key);
    }
    builder.body(axum::body::Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

/// Poll the status endpoint until the job reaches a terminal state.
async fn wait_terminal(st: &Arc<state::AppState>, job_id: &str) -> serde_json::Value {
    for _ in 0..1000 {
        let (status, body) = call(st, get(&format!("/forecast/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        let json = parse_json(body);
        let state = json["job"]["status"].as_str().unwrap().to_string();
        if state == "completed" || state == "failed" || state == "cancelled" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let st = make_state();
    let (status, body) = call(&st, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "fcd-daemon");
}

// ---------------------------------------------------------------------------
// POST /forecast
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_202_with_job_id() {
    let st = make_state();
    let (status, body) = call(&st, post_forecast(submit_body(&["demand"], 14), None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let json = parse_json(body);
    assert!(!json["job_id"].as_str().unwrap().is_empty());
    assert_eq!(json["status"], "queued");
    assert_eq!(json["deduplicated"], false);
}

#[tokio::test]
async fn submit_empty_series_ids_is_400() {
    let st = make_state();
    let (status, body) = call(&st, post_forecast(submit_body(&[], 14), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("series_ids"));
}

#[tokio::test]
async fn submit_horizon_out_of_range_is_400() {
    let st = make_state();
    for horizon in [0u32, 366] {
        let (status, _) = call(&st, post_forecast(submit_body(&["demand"], horizon), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "horizon {horizon}");
    }
}

#[tokio::test]
async fn submit_unknown_model_is_400() {
    let st = make_state();
    let body = serde_json::json!({
        "series_filter": { "series_ids": ["demand"] },
        "horizon": 14,
        "models": ["prophet"],
    })
    .to_string();
    let (status, body) = call(&st, post_forecast(body, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("unknown model"));
}

#[tokio::test]
async fn idempotent_key_replays_the_same_job() {
    let st = make_state();

    let (s1, b1) = call(&st, post_forecast(submit_body(&["demand"], 14), Some("k1"))).await;
    assert_eq!(s1, StatusCode::ACCEPTED);
    let first = parse_json(b1);
    assert_eq!(first["deduplicated"], false);

    // Different body, same key: same job, nothing new created.
    let (s2, b2) = call(&st, post_forecast(submit_body(&["cash"], 30), Some("k1"))).await;
    assert_eq!(s2, StatusCode::ACCEPTED);
    let second = parse_json(b2);
    assert_eq!(second["deduplicated"], true);
    assert_eq!(first["job_id"], second["job_id"]);
}

// ---------------------------------------------------------------------------
// GET /forecast/jobs/:job_id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_is_404() {
    let st = make_state();
    let (status, _) = call(
        &st,
        get("/forecast/jobs/00000000-0000-0000-0000-000000000000"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&st, get("/forecast/jobs/not-a-uuid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// GET /forecast/jobs/:job_id/results
// ---------------------------------------------------------------------------

#[tokio::test]
async fn results_explain_while_pending_and_deliver_when_completed() {
    let st = make_state();
    let (_, body) = call(&st, post_forecast(submit_body(&["demand"], 7), None)).await;
    let job_id = parse_json(body)["job_id"].as_str().unwrap().to_string();

    // Immediately after submit: 200 with the job and an explanatory
    // message (never an error for an existing job).
    let (status, body) = call(&st, get(&format!("/forecast/jobs/{job_id}/results"))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    if json["job"]["status"] != "completed" {
        assert!(json["message"]
            .as_str()
            .unwrap()
            .contains("results not available"));
    }

    wait_terminal(&st, &job_id).await;

    let (status, body) = call(&st, get(&format!("/forecast/jobs/{job_id}/results"))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["job"]["status"], "completed");
    assert!(json["message"].is_null());

    let results = &json["job"]["results"];
    assert_eq!(results["series"].as_array().unwrap().len(), 1);
    assert!(results["series"][0]["ensemble"].is_object());
}

// ---------------------------------------------------------------------------
// POST /forecast/jobs/:job_id/cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_completed_job_is_400_and_missing_job_404() {
    let st = make_state();
    let (_, body) = call(&st, post_forecast(submit_body(&["cash"], 7), None)).await;
    let job_id = parse_json(body)["job_id"].as_str().unwrap().to_string();
    wait_terminal(&st, &job_id).await;

    let (status, body) = call(&st, post(&format!("/forecast/jobs/{job_id}/cancel"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(parse_json(body)["error"]
        .as_str()
        .unwrap()
        .contains("cannot be cancelled"));

    let (status, _) = call(
        &st,
        post("/forecast/jobs/00000000-0000-0000-0000-000000000000/cancel"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// GET /forecast/series/:series_id/diagnostics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn diagnostics_assemble_quality_features_and_backtest() {
    let st = make_state();
    let (status, body) = call(&st, get("/forecast/series/demand/diagnostics")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["series_id"], "demand");
    assert!(json["data_quality"]["score"].as_f64().unwrap() > 0.0);
    assert!(json["features"]["lag_coverage"].is_object());
    assert_eq!(json["backtest_status"], "ok");
    assert!(json["backtest"]["best_model"].is_string());
    assert!(json["recommendations"].is_array());
}

#[tokio::test]
async fn diagnostics_for_unknown_series_is_404() {
    let st = make_state();
    let (status, _) = call(&st, get("/forecast/series/ghost/diagnostics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Accuracy history: record + trends
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accuracy_records_and_surfaces_alerts() {
    let st = make_state();

    // A sample with ~33% error: lands above the default 25% threshold.
    let body = serde_json::json!({
        "model": "sma",
        "actuals": [90.0, 120.0],
        "forecasts": [60.0, 80.0],
    })
    .to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/forecast/series/demand/accuracy")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, body) = call(&st, req).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["record"]["series_id"], "demand");
    assert_eq!(json["record"]["sample_size"], 2);
    assert!(json["record"]["mape"].as_f64().unwrap() > 25.0);

    let (status, body) = call(&st, get("/forecast/accuracy/trends")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    let alerts = json["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["priority"], "high");
}

#[tokio::test]
async fn accuracy_length_mismatch_is_400() {
    let st = make_state();
    let body = serde_json::json!({
        "model": "linear",
        "actuals": [1.0, 2.0],
        "forecasts": [1.0],
    })
    .to_string();
    let req = Request::builder()
        .method("POST")
        .uri("/forecast/series/demand/accuracy")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body))
        .unwrap();
    let (status, _) = call(&st, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Unknown routes return 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let st = make_state();
    let (status, _) = call(&st, get("/does_not_exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
