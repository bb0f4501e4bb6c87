//! Idempotent submission: the same key never creates a second job or
//! re-runs work, even when the request bodies differ.

use std::sync::Arc;

use fcd_config::EngineConfig;
use fcd_scheduler::{Scheduler, SchedulerError};
use fcd_schemas::{ForecastRequest, ModelKind};
use fcd_testkit::{trend_series, InMemorySeriesLoader};

fn request(series: &str, horizon: u32) -> ForecastRequest {
    ForecastRequest {
        series_ids: vec![series.to_string()],
        horizon,
        models: vec![ModelKind::Sma, ModelKind::Linear],
        currency_mode: None,
        fx_scenario: None,
        scenario_config: None,
        feature_flags: None,
    }
}

fn scheduler() -> Scheduler {
    let loader = Arc::new(InMemorySeriesLoader::new().with_series(trend_series("demand", 60, 7)));
    Scheduler::new(loader, EngineConfig::default())
}

#[tokio::test]
async fn same_key_returns_same_job_and_never_duplicates() {
    let scheduler = scheduler();

    let first = scheduler
        .submit(request("demand", 14), Some("key-1".to_string()))
        .unwrap();
    assert!(!first.deduplicated);

    // Different body, same key: replayed, not re-executed.
    let second = scheduler
        .submit(request("demand", 30), Some("key-1".to_string()))
        .unwrap();
    assert!(second.deduplicated);
    assert_eq!(first.job_id, second.job_id);

    // The stored job still carries the first request's horizon.
    let job = scheduler.get_status(first.job_id).unwrap();
    assert_eq!(job.request.horizon, 14);
}

#[tokio::test]
async fn replay_works_even_after_the_job_finished() {
    let scheduler = scheduler();
    let first = scheduler
        .submit(request("demand", 7), Some("key-2".to_string()))
        .unwrap();

    // Wait for the job to finish, then replay the key.
    for _ in 0..500 {
        if scheduler.get_status(first.job_id).unwrap().status.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let replay = scheduler
        .submit(request("demand", 7), Some("key-2".to_string()))
        .unwrap();
    assert!(replay.deduplicated);
    assert_eq!(replay.job_id, first.job_id);
    assert!(replay.status.is_terminal());
}

#[tokio::test]
async fn distinct_keys_and_no_key_create_distinct_jobs() {
    let scheduler = scheduler();

    let a = scheduler
        .submit(request("demand", 7), Some("key-a".to_string()))
        .unwrap();
    let b = scheduler
        .submit(request("demand", 7), Some("key-b".to_string()))
        .unwrap();
    let c = scheduler.submit(request("demand", 7), None).unwrap();
    let d = scheduler.submit(request("demand", 7), None).unwrap();

    assert_ne!(a.job_id, b.job_id);
    assert_ne!(c.job_id, d.job_id);
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_any_job_exists() {
    let scheduler = scheduler();

    let empty_series = ForecastRequest {
        series_ids: vec![],
        ..request("demand", 7)
    };
    assert!(matches!(
        scheduler.submit(empty_series, None).unwrap_err(),
        SchedulerError::Validation(_)
    ));

    assert!(matches!(
        scheduler.submit(request("demand", 0), None).unwrap_err(),
        SchedulerError::Validation(_)
    ));
    assert!(matches!(
        scheduler.submit(request("demand", 366), None).unwrap_err(),
        SchedulerError::Validation(_)
    ));

    let no_models = ForecastRequest {
        models: vec![],
        ..request("demand", 7)
    };
    assert!(matches!(
        scheduler.submit(no_models, None).unwrap_err(),
        SchedulerError::Validation(_)
    ));
}
