//! Scheduler error variants.
//!
//! Per-model and per-series failures are *data* carried in job results,
//! not errors; these variants cover the scheduler's own contract.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Malformed request: horizon out of [1, 365], empty series list,
    /// empty model list. Rejected before any job exists.
    Validation(String),
    /// Unknown job id.
    JobNotFound(Uuid),
    /// Unknown series id (diagnostics path).
    SeriesNotFound(String),
    /// The bounded job queue is full; nothing was created.
    QueueFull,
    /// Unexpected internal failure (worker panic, poisoned lock).
    Internal(String),
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Validation(msg) => write!(f, "validation failed: {msg}"),
            SchedulerError::JobNotFound(id) => write!(f, "job not found: {id}"),
            SchedulerError::SeriesNotFound(id) => write!(f, "series not found: {id}"),
            SchedulerError::QueueFull => write!(f, "job queue is full"),
            SchedulerError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for SchedulerError {}
