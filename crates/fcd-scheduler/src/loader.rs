//! Series-loader boundary.
//!
//! The scheduler never knows where series come from: callers inject a
//! [`SeriesLoader`]. The trait is object-safe and `Send + Sync` so a
//! `Arc<dyn SeriesLoader>` can cross worker-task boundaries.
//!
//! [`CsvDirSeriesLoader`] is the bundled filesystem implementation: one
//! `<series_id>.csv` per series with `ts,value` columns (RFC 3339
//! timestamps; an empty value cell is a missing point).

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fcd_schemas::{SeriesPoint, TimeSeries};

/// Loader errors are small, explicit, and test-friendly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    NotFound(String),
    Io { series_id: String, detail: String },
    BadRow { series_id: String, line: usize, reason: String },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NotFound(id) => write!(f, "series not found: {id}"),
            LoadError::Io { series_id, detail } => {
                write!(f, "io error loading series {series_id}: {detail}")
            }
            LoadError::BadRow {
                series_id,
                line,
                reason,
            } => write!(f, "bad row in series {series_id} at line {line}: {reason}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Upstream series source contract.
#[async_trait::async_trait]
pub trait SeriesLoader: Send + Sync {
    async fn load(&self, series_id: &str) -> Result<TimeSeries, LoadError>;
}

/// Filesystem loader: `<root>/<series_id>.csv`, columns `ts,value`.
#[derive(Debug, Clone)]
pub struct CsvDirSeriesLoader {
    root: PathBuf,
}

impl CsvDirSeriesLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl SeriesLoader for CsvDirSeriesLoader {
    async fn load(&self, series_id: &str) -> Result<TimeSeries, LoadError> {
        // Reject path-shaped ids before they touch the filesystem.
        if series_id.contains('/') || series_id.contains("..") {
            return Err(LoadError::NotFound(series_id.to_string()));
        }

        let path = self.root.join(format!("{series_id}.csv"));
        if !path.exists() {
            return Err(LoadError::NotFound(series_id.to_string()));
        }

        let series_id_owned = series_id.to_string();
        let parsed = tokio::task::spawn_blocking(move || parse_series_csv(&path, &series_id_owned))
            .await
            .map_err(|e| LoadError::Io {
                series_id: series_id.to_string(),
                detail: e.to_string(),
            })?;
        parsed
    }
}

fn parse_series_csv(path: &std::path::Path, series_id: &str) -> Result<TimeSeries, LoadError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| LoadError::Io {
        series_id: series_id.to_string(),
        detail: e.to_string(),
    })?;

    let headers = reader.headers().map_err(|e| LoadError::Io {
        series_id: series_id.to_string(),
        detail: e.to_string(),
    })?;
    let ts_col = headers.iter().position(|h| h.trim() == "ts");
    let value_col = headers.iter().position(|h| h.trim() == "value");
    let (ts_col, value_col) = match (ts_col, value_col) {
        (Some(t), Some(v)) => (t, v),
        _ => {
            return Err(LoadError::BadRow {
                series_id: series_id.to_string(),
                line: 1,
                reason: "missing required headers: ts, value".to_string(),
            })
        }
    };

    let mut points = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2; // 1-based, counting the header
        let record = record.map_err(|e| LoadError::Io {
            series_id: series_id.to_string(),
            detail: e.to_string(),
        })?;

        let ts_raw = record.get(ts_col).unwrap_or("").trim();
        let ts = ts_raw
            .parse::<DateTime<Utc>>()
            .map_err(|_| LoadError::BadRow {
                series_id: series_id.to_string(),
                line,
                reason: format!("unparseable timestamp '{ts_raw}'"),
            })?;

        let value_raw = record.get(value_col).unwrap_or("").trim();
        let value = if value_raw.is_empty() {
            None
        } else {
            Some(value_raw.parse::<f64>().map_err(|_| LoadError::BadRow {
                series_id: series_id.to_string(),
                line,
                reason: format!("unparseable value '{value_raw}'"),
            })?)
        };

        points.push(SeriesPoint { ts, value });
    }

    // Deterministic ordering regardless of file order.
    points.sort_by_key(|p| p.ts);
    Ok(TimeSeries::new(series_id, points))
}
