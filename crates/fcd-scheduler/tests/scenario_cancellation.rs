//! Cancellation: queued and running jobs cancel; terminal jobs refuse and
//! stay untouched; unknown jobs are a typed error.

use std::sync::Arc;
use std::time::Duration;

use fcd_config::EngineConfig;
use fcd_scheduler::{LoadError, Scheduler, SchedulerError, SeriesLoader};
use fcd_schemas::{ForecastRequest, JobStatus, ModelKind, TimeSeries};
use fcd_testkit::{trend_series, InMemorySeriesLoader};
use uuid::Uuid;

/// Loader that sleeps before answering, pinning each job in its load phase
/// long enough for the tests to act on queued work deterministically.
struct SlowLoader {
    inner: InMemorySeriesLoader,
    delay: Duration,
}

#[async_trait::async_trait]
impl SeriesLoader for SlowLoader {
    async fn load(&self, series_id: &str) -> Result<TimeSeries, LoadError> {
        tokio::time::sleep(self.delay).await;
        self.inner.load(series_id).await
    }
}

fn slow_scheduler(worker_count: usize, delay_ms: u64) -> Scheduler {
    let mut config = EngineConfig::default();
    config.worker_count = worker_count;

    let loader = Arc::new(SlowLoader {
        inner: InMemorySeriesLoader::new().with_series(trend_series("demand", 80, 21)),
        delay: Duration::from_millis(delay_ms),
    });
    Scheduler::new(loader, config)
}

fn request(series: &str) -> ForecastRequest {
    ForecastRequest {
        series_ids: vec![series.to_string()],
        horizon: 7,
        models: vec![ModelKind::Sma, ModelKind::Linear],
        currency_mode: None,
        fx_scenario: None,
        scenario_config: None,
        feature_flags: None,
    }
}

async fn wait_terminal(scheduler: &Scheduler, job_id: Uuid) -> JobStatus {
    for _ in 0..1000 {
        let job = scheduler.get_status(job_id).unwrap();
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[tokio::test]
async fn queued_job_cancels_and_is_never_executed() {
    // One worker and a slow loader: the last submission stays QUEUED while
    // earlier jobs hold the worker.
    let scheduler = slow_scheduler(1, 50);

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(scheduler.submit(request("demand"), None).unwrap().job_id);
    }
    let victim = *ids.last().unwrap();

    let cancelled = scheduler.cancel(victim).unwrap();
    assert!(cancelled);
    assert_eq!(
        scheduler.get_status(victim).unwrap().status,
        JobStatus::Cancelled
    );

    // Earlier jobs still complete; the cancelled one stays cancelled with
    // no results.
    for id in &ids[..ids.len() - 1] {
        assert_eq!(wait_terminal(&scheduler, *id).await, JobStatus::Completed);
    }
    let victim_job = scheduler.get_status(victim).unwrap();
    assert_eq!(victim_job.status, JobStatus::Cancelled);
    assert!(victim_job.results.is_none());
}

#[tokio::test]
async fn running_job_observes_the_flag_at_a_checkpoint() {
    // Single job, slow load: cancel lands while the worker is mid-load and
    // the next checkpoint stops the run without results.
    let scheduler = slow_scheduler(1, 100);

    let job_id = scheduler.submit(request("demand"), None).unwrap().job_id;
    tokio::time::sleep(Duration::from_millis(20)).await; // let the worker pick it up

    assert!(scheduler.cancel(job_id).unwrap());
    assert_eq!(wait_terminal(&scheduler, job_id).await, JobStatus::Cancelled);

    // Bounded-latency stop: the job never flips out of CANCELLED later.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let job = scheduler.get_status(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.results.is_none());
}

#[tokio::test]
async fn cancel_on_terminal_job_returns_false_and_changes_nothing() {
    let loader =
        Arc::new(InMemorySeriesLoader::new().with_series(trend_series("demand", 60, 2)));
    let scheduler = Scheduler::new(loader, EngineConfig::default());

    let job_id = scheduler.submit(request("demand"), None).unwrap().job_id;
    assert_eq!(wait_terminal(&scheduler, job_id).await, JobStatus::Completed);

    let before = scheduler.get_status(job_id).unwrap();
    assert!(!scheduler.cancel(job_id).unwrap());
    let after = scheduler.get_status(job_id).unwrap();

    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.progress, before.progress);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn double_cancel_returns_false_the_second_time() {
    let scheduler = slow_scheduler(1, 50);

    // Park a filler job so the victim stays queued.
    let _filler = scheduler.submit(request("demand"), None).unwrap();
    let victim = scheduler.submit(request("demand"), None).unwrap().job_id;

    assert!(scheduler.cancel(victim).unwrap());
    assert!(!scheduler.cancel(victim).unwrap());
    assert_eq!(
        scheduler.get_status(victim).unwrap().status,
        JobStatus::Cancelled
    );
}

#[tokio::test]
async fn cancelling_an_unknown_job_is_not_found() {
    let loader = Arc::new(InMemorySeriesLoader::new());
    let scheduler = Scheduler::new(loader, EngineConfig::default());

    let ghost = Uuid::new_v4();
    assert_eq!(
        scheduler.cancel(ghost).unwrap_err(),
        SchedulerError::JobNotFound(ghost)
    );
}
