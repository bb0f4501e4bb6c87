//! The job scheduler: owns job identity, idempotency, the worker pool,
//! cancellation, and progress emission.
//!
//! Concurrency model:
//! - `submit` is synchronous-fast: validation, an atomic idempotency
//!   check-and-set, and a bounded-queue enqueue, all under one lock.
//! - A fixed pool of worker tasks drains the queue; each job's heavy
//!   compute (features, backtest, model fits) runs inside
//!   `spawn_blocking` so runtime threads never stall.
//! - Cancellation is cooperative: a per-job `AtomicBool` checked before
//!   each series load, each model fit, and each backtest fold.
//! - Progress events are fire-and-forget on a broadcast bus; emission
//!   failure never fails a job, and per-job percent is strictly
//!   increasing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use fcd_backtest::{BacktestConfig, BacktestEngine, BacktestReport};
use fcd_config::EngineConfig;
use fcd_models::ensemble::{combine_forecasts, inverse_mape_weights};
use fcd_models::build_forecaster;
use fcd_schemas::{
    ForecastJob, ForecastRequest, ForecastSeries, JobEvent, JobResults, JobStatus, ModelFailure,
    ModelKind, SeriesFailure, SeriesForecast, TimeSeries, MAX_HORIZON, MIN_HORIZON,
};

use crate::error::SchedulerError;
use crate::loader::{LoadError, SeriesLoader};

// ---------------------------------------------------------------------------
// Submit outcome
// ---------------------------------------------------------------------------

/// What `submit` hands back: the job (new or replayed) and whether the
/// idempotency key deduplicated the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub deduplicated: bool,
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

/// The single shared mutable state of the engine. All access goes through
/// [`Scheduler`] methods under one lock; idempotency lookup and job
/// creation are therefore atomic.
struct JobStore {
    jobs: HashMap<Uuid, ForecastJob>,
    idempotency: HashMap<String, Uuid>,
    cancel_flags: HashMap<Uuid, Arc<AtomicBool>>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct SchedulerInner {
    config: EngineConfig,
    loader: Arc<dyn SeriesLoader>,
    store: Mutex<JobStore>,
    bus: broadcast::Sender<JobEvent>,
    queue: mpsc::Sender<Uuid>,
}

/// Cloneable handle to the scheduler; all clones share one store, queue,
/// and worker pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Build the scheduler and spawn its worker pool. Must be called from
    /// within a tokio runtime.
    pub fn new(loader: Arc<dyn SeriesLoader>, config: EngineConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<JobEvent>(config.bus_capacity.max(16));
        let (tx, rx) = mpsc::channel::<Uuid>(config.queue_depth.max(1));

        let inner = Arc::new(SchedulerInner {
            config,
            loader,
            store: Mutex::new(JobStore {
                jobs: HashMap::new(),
                idempotency: HashMap::new(),
                cancel_flags: HashMap::new(),
            }),
            bus,
            queue: tx,
        });

        let shared_rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker_id in 0..inner.config.worker_count.max(1) {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&shared_rx);
            tokio::spawn(async move {
                loop {
                    let job_id = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match job_id {
                        Some(id) => run_job(&inner, id).await,
                        None => {
                            info!(worker_id, "job queue closed; worker exiting");
                            break;
                        }
                    }
                }
            });
        }

        Self { inner }
    }

    /// Subscribe to the scheduler's event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.bus.subscribe()
    }

    /// Validate and enqueue a forecast request.
    ///
    /// When `idempotency_key` matches an existing job, that job's id and
    /// status are returned and nothing new is created or executed.
    pub fn submit(
        &self,
        request: ForecastRequest,
        idempotency_key: Option<String>,
    ) -> Result<SubmitOutcome, SchedulerError> {
        validate_request(&request)?;

        let (outcome, enqueue) = self.inner.with_store(|store| {
            if let Some(key) = idempotency_key.as_deref() {
                if let Some(existing_id) = store.idempotency.get(key) {
                    let status = store
                        .jobs
                        .get(existing_id)
                        .map(|j| j.status)
                        .unwrap_or(JobStatus::Queued);
                    return (
                        Ok(SubmitOutcome {
                            job_id: *existing_id,
                            status,
                            deduplicated: true,
                        }),
                        None,
                    );
                }
            }

            let job_id = Uuid::new_v4();
            let now = Utc::now();
            let job = ForecastJob {
                job_id,
                idempotency_key: idempotency_key.clone(),
                status: JobStatus::Queued,
                request,
                progress: 0,
                stage: "queued".to_string(),
                results: None,
                error: None,
                created_at: now,
                updated_at: now,
            };

            store.jobs.insert(job_id, job);
            store
                .cancel_flags
                .insert(job_id, Arc::new(AtomicBool::new(false)));
            if let Some(key) = idempotency_key {
                store.idempotency.insert(key, job_id);
            }

            (
                Ok(SubmitOutcome {
                    job_id,
                    status: JobStatus::Queued,
                    deduplicated: false,
                }),
                Some(job_id),
            )
        });

        let outcome = outcome?;
        if let Some(job_id) = enqueue {
            if self.inner.queue.try_send(job_id).is_err() {
                // Roll the creation back: the queue refused the job.
                self.inner.with_store(|store| {
                    if let Some(job) = store.jobs.remove(&job_id) {
                        if let Some(key) = job.idempotency_key {
                            store.idempotency.remove(&key);
                        }
                    }
                    store.cancel_flags.remove(&job_id);
                });
                return Err(SchedulerError::QueueFull);
            }
            info!(%job_id, "job queued");
        }
        Ok(outcome)
    }

    pub fn get_status(&self, job_id: Uuid) -> Result<ForecastJob, SchedulerError> {
        self.inner.with_store(|store| {
            store
                .jobs
                .get(&job_id)
                .cloned()
                .ok_or(SchedulerError::JobNotFound(job_id))
        })
    }

    /// Results accessor: identical to `get_status`; the caller inspects
    /// `status` and `results`. An existing job never errors here.
    pub fn get_results(&self, job_id: Uuid) -> Result<ForecastJob, SchedulerError> {
        self.get_status(job_id)
    }

    /// Cancel a queued or running job. Terminal jobs return `false`
    /// untouched; a running job observes the flag at its next checkpoint.
    pub fn cancel(&self, job_id: Uuid) -> Result<bool, SchedulerError> {
        let cancelled = self.inner.with_store(|store| {
            let job = match store.jobs.get_mut(&job_id) {
                Some(j) => j,
                None => return Err(SchedulerError::JobNotFound(job_id)),
            };
            if job.status.is_terminal() {
                return Ok(false);
            }
            job.status = JobStatus::Cancelled;
            job.stage = "cancelled".to_string();
            job.updated_at = Utc::now();
            if let Some(flag) = store.cancel_flags.get(&job_id) {
                flag.store(true, Ordering::Relaxed);
            }
            Ok(true)
        })?;

        if cancelled {
            info!(%job_id, "job cancelled");
            let _ = self.inner.bus.send(JobEvent::Cancelled { job_id });
        }
        Ok(cancelled)
    }

    /// Assemble on-demand diagnostics for one series (data quality,
    /// outliers, feature summaries, a backtest summary, recommendations).
    pub async fn series_diagnostics(
        &self,
        series_id: &str,
    ) -> Result<crate::diagnostics::SeriesDiagnostics, SchedulerError> {
        let series = match self.inner.loader.load(series_id).await {
            Ok(s) => s,
            Err(LoadError::NotFound(id)) => return Err(SchedulerError::SeriesNotFound(id)),
            Err(e) => return Err(SchedulerError::Internal(e.to_string())),
        };

        let config = self.inner.config.clone();
        tokio::task::spawn_blocking(move || {
            crate::diagnostics::assemble_diagnostics(&series, &config)
        })
        .await
        .map_err(|e| SchedulerError::Internal(e.to_string()))
    }
}

impl SchedulerInner {
    fn with_store<T>(&self, f: impl FnOnce(&mut JobStore) -> T) -> T {
        let mut guard = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Update job progress and emit the event. Skips unless the new percent
    /// strictly exceeds the stored one, so per-job emission is strictly
    /// increasing; terminal jobs are never touched.
    fn emit_progress(&self, job_id: Uuid, percent: u8, stage: &str) {
        let emitted = self.with_store(|store| {
            let job = match store.jobs.get_mut(&job_id) {
                Some(j) => j,
                None => return false,
            };
            if job.status.is_terminal() || percent <= job.progress {
                return false;
            }
            job.progress = percent;
            job.stage = stage.to_string();
            job.updated_at = Utc::now();
            true
        });

        if emitted {
            let _ = self.bus.send(JobEvent::Progress {
                job_id,
                percent,
                stage: stage.to_string(),
            });
        }
    }
}

fn validate_request(request: &ForecastRequest) -> Result<(), SchedulerError> {
    if request.series_ids.is_empty() {
        return Err(SchedulerError::Validation(
            "series_ids must not be empty".to_string(),
        ));
    }
    if !(MIN_HORIZON..=MAX_HORIZON).contains(&request.horizon) {
        return Err(SchedulerError::Validation(format!(
            "horizon must be in [{MIN_HORIZON}, {MAX_HORIZON}], got {}",
            request.horizon
        )));
    }
    if request.models.is_empty() {
        return Err(SchedulerError::Validation(
            "models must not be empty".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Progress span used for pipeline units; the remainder is reserved for the
/// queued/completed edges.
const PCT_FLOOR: usize = 5;
const PCT_SPAN: usize = 90;

async fn run_job(inner: &Arc<SchedulerInner>, job_id: Uuid) {
    // Queued -> Running; a job cancelled while queued is left alone.
    let request = inner.with_store(|store| {
        let job = store.jobs.get_mut(&job_id)?;
        if job.status != JobStatus::Queued {
            return None;
        }
        job.status = JobStatus::Running;
        job.stage = "running".to_string();
        job.updated_at = Utc::now();
        Some(job.request.clone())
    });
    let Some(request) = request else {
        return;
    };

    let cancel = inner.with_store(|store| {
        store
            .cancel_flags
            .get(&job_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)))
    });

    info!(%job_id, series = request.series_ids.len(), "job running");

    // Unit accounting for monotonic percent: per series one load unit plus
    // the compute units (features, backtest, each model, ensemble).
    let constituents = constituent_models(&request.models);
    let units_per_series = 1 + 1 + 1 + constituents.len() + 1;
    let total_units = request.series_ids.len() * units_per_series;
    let mut units_done = 0usize;

    // Phase 1 (async): load every series through the injected boundary.
    let mut loaded: Vec<TimeSeries> = Vec::new();
    let mut series_errors: Vec<SeriesFailure> = Vec::new();

    for series_id in &request.series_ids {
        if cancel.load(Ordering::Relaxed) {
            return; // cancel() already finalized status and event
        }
        match inner.loader.load(series_id).await {
            Ok(series) => {
                if series.observed().is_empty() {
                    series_errors.push(SeriesFailure {
                        series_id: series_id.clone(),
                        reason: "empty_series".to_string(),
                        detail: "series has no observed values".to_string(),
                    });
                } else {
                    loaded.push(series);
                }
            }
            Err(LoadError::NotFound(_)) => series_errors.push(SeriesFailure {
                series_id: series_id.clone(),
                reason: "series_not_found".to_string(),
                detail: "loader reported no such series".to_string(),
            }),
            Err(e) => series_errors.push(SeriesFailure {
                series_id: series_id.clone(),
                reason: "load_failed".to_string(),
                detail: e.to_string(),
            }),
        }
        units_done += 1;
        inner.emit_progress(
            job_id,
            percent_for(units_done, total_units),
            &format!("series_loaded:{series_id}"),
        );
    }

    // Phase 2 (blocking): features, backtest, model fits, ensemble.
    let pipeline_inner = Arc::clone(inner);
    let pipeline_cancel = Arc::clone(&cancel);
    let pipeline_request = request.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        execute_pipeline(
            &pipeline_inner,
            job_id,
            &pipeline_request,
            &loaded,
            &pipeline_cancel,
            units_done,
            total_units,
        )
    })
    .await;

    let mut outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            warn!(%job_id, error = %e, "job pipeline panicked");
            finalize_failed(inner, job_id, format!("internal pipeline failure: {e}"));
            return;
        }
    };
    outcome.results.series_errors.extend(series_errors);

    if outcome.cancelled {
        return; // status already Cancelled via cancel()
    }

    let usable = outcome
        .results
        .series
        .iter()
        .any(|s| !s.forecasts.is_empty() || s.ensemble.is_some());

    if usable {
        finalize_completed(inner, job_id, outcome.results);
    } else {
        let results = outcome.results;
        inner.with_store(|store| {
            if let Some(job) = store.jobs.get_mut(&job_id) {
                if job.status == JobStatus::Running {
                    job.results = Some(results);
                }
            }
        });
        finalize_failed(
            inner,
            job_id,
            "no model produced a usable forecast for any series".to_string(),
        );
    }
}

fn percent_for(units_done: usize, total_units: usize) -> u8 {
    let total = total_units.max(1);
    (PCT_FLOOR + units_done * PCT_SPAN / total).min(99) as u8
}

/// The non-ensemble models a job fits directly; an ensemble-only request
/// falls back to the full constituent set.
fn constituent_models(requested: &[ModelKind]) -> Vec<ModelKind> {
    let direct: Vec<ModelKind> = requested
        .iter()
        .copied()
        .filter(|k| *k != ModelKind::Ensemble)
        .collect();
    if direct.is_empty() {
        ModelKind::constituents().to_vec()
    } else {
        direct
    }
}

struct PipelineOutcome {
    results: JobResults,
    cancelled: bool,
}

/// Per-series compute pipeline. Runs on a blocking thread; observes the
/// cancel flag between every expensive step and emits progress checkpoints
/// through the scheduler's bus.
fn execute_pipeline(
    inner: &Arc<SchedulerInner>,
    job_id: Uuid,
    request: &ForecastRequest,
    loaded: &[TimeSeries],
    cancel: &Arc<AtomicBool>,
    mut units_done: usize,
    total_units: usize,
) -> PipelineOutcome {
    let cfg = &inner.config;
    let constituents = constituent_models(&request.models);

    let mut results = JobResults {
        series: Vec::new(),
        model_errors: Vec::new(),
        series_errors: Vec::new(),
    };

    let emit = |units_done: usize, stage: String| {
        inner.emit_progress(job_id, percent_for(units_done, total_units), &stage);
    };

    for series in loaded {
        if cancel.load(Ordering::Relaxed) {
            return PipelineOutcome {
                results,
                cancelled: true,
            };
        }

        let series_id = series.series_id.clone();
        let observed = series.observed();

        // Feature stage: quality and outliers inform operators via the log;
        // the forecast itself runs on the raw observed values.
        let quality = fcd_features::assess_data_quality(series, &cfg.outliers);
        if quality.score < 0.5 {
            warn!(%job_id, series_id = %series_id, score = quality.score, "low data quality");
        }
        units_done += 1;
        emit(units_done, format!("features_computed:{series_id}"));

        // Backtest stage: score the constituents to weight the ensemble and
        // pick a best model. Insufficient history downgrades to equal
        // weights rather than failing the job.
        if cancel.load(Ordering::Relaxed) {
            return PipelineOutcome {
                results,
                cancelled: true,
            };
        }
        let backtest = run_series_backtest(cfg, &constituents, &observed, request.horizon, cancel);
        units_done += 1;
        emit(units_done, format!("backtest_scored:{series_id}"));

        // Model stage: fit every constituent, isolating failures.
        let mut forecasts: Vec<ForecastSeries> = Vec::new();
        for &kind in &constituents {
            if cancel.load(Ordering::Relaxed) {
                return PipelineOutcome {
                    results,
                    cancelled: true,
                };
            }
            match build_forecaster(kind, &cfg.model).fit(&observed) {
                Ok(fitted) => forecasts.push(fitted.predict(request.horizon)),
                Err(e) => results.model_errors.push(ModelFailure {
                    series_id: series_id.clone(),
                    model: kind,
                    reason: e.reason().to_string(),
                    detail: e.to_string(),
                }),
            }
            units_done += 1;
            emit(units_done, format!("model_completed:{}:{series_id}", kind));
        }

        // Ensemble stage: combine the survivors, inverse-MAPE weighted when
        // the backtest produced per-model error, equal otherwise.
        let (ensemble, weights) = combine_series_ensemble(&forecasts, backtest.as_ref());
        units_done += 1;
        emit(units_done, format!("ensemble_combined:{series_id}"));

        results.series.push(SeriesForecast {
            series_id,
            forecasts,
            ensemble,
            ensemble_weights: weights,
            best_model: backtest.as_ref().and_then(|b| b.best_model),
        });
    }

    PipelineOutcome {
        results,
        cancelled: false,
    }
}

fn run_series_backtest(
    cfg: &EngineConfig,
    constituents: &[ModelKind],
    observed: &[f64],
    horizon: u32,
    cancel: &Arc<AtomicBool>,
) -> Option<BacktestReport> {
    let config = BacktestConfig {
        fold_count: cfg.backtest_fold_count,
        horizon,
        min_train_len: cfg.backtest_min_train_len,
        models: constituents.to_vec(),
        model_cfg: cfg.model.clone(),
    };
    BacktestEngine::new(config)
        .with_cancel_flag(Arc::clone(cancel))
        .run(observed)
        .ok()
}

fn combine_series_ensemble(
    forecasts: &[ForecastSeries],
    backtest: Option<&BacktestReport>,
) -> (Option<ForecastSeries>, Vec<(ModelKind, f64)>) {
    if forecasts.is_empty() {
        return (None, Vec::new());
    }

    // Inverse-MAPE weights over the survivors that the backtest scored;
    // survivors without a backtest MAPE fall back into the equal-weight
    // path together with everyone else.
    let backtest_mapes: Vec<(ModelKind, f64)> = forecasts
        .iter()
        .filter_map(|fs| {
            backtest
                .and_then(|b| b.per_model.get(&fs.model))
                .and_then(|agg| agg.mean_mape)
                .map(|m| (fs.model, m))
        })
        .collect();

    let weights: Vec<(ModelKind, f64)> = if backtest_mapes.len() == forecasts.len() {
        inverse_mape_weights(&backtest_mapes)
    } else {
        let equal = 1.0 / forecasts.len() as f64;
        forecasts.iter().map(|fs| (fs.model, equal)).collect()
    };

    let weighted: Vec<(f64, &ForecastSeries)> = forecasts
        .iter()
        .map(|fs| {
            let w = weights
                .iter()
                .find(|(k, _)| *k == fs.model)
                .map(|(_, w)| *w)
                .unwrap_or(0.0);
            (w, fs)
        })
        .collect();

    (Some(combine_forecasts(&weighted)), weights)
}

fn finalize_completed(inner: &Arc<SchedulerInner>, job_id: Uuid, results: JobResults) {
    let finalized = inner.with_store(|store| {
        let job = match store.jobs.get_mut(&job_id) {
            Some(j) => j,
            None => return false,
        };
        if job.status != JobStatus::Running {
            return false; // cancelled (or otherwise terminal) mid-flight
        }
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.stage = "completed".to_string();
        job.results = Some(results);
        job.updated_at = Utc::now();
        true
    });

    if finalized {
        info!(%job_id, "job completed");
        let _ = inner.bus.send(JobEvent::Completed { job_id });
    }
}

fn finalize_failed(inner: &Arc<SchedulerInner>, job_id: Uuid, error: String) {
    let finalized = inner.with_store(|store| {
        let job = match store.jobs.get_mut(&job_id) {
            Some(j) => j,
            None => return false,
        };
        if job.status != JobStatus::Running {
            return false;
        }
        job.status = JobStatus::Failed;
        job.stage = "failed".to_string();
        job.error = Some(error.clone());
        job.updated_at = Utc::now();
        true
    });

    if finalized {
        warn!(%job_id, error = %error, "job failed");
        let _ = inner.bus.send(JobEvent::Failed { job_id, error });
    }
}
