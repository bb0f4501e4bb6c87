//! fcd-testkit
//!
//! Deterministic test support for the forecasting workspace: synthetic
//! series generators (no RNG crate — a seeded LCG supplies repeatable
//! noise) and an in-memory [`SeriesLoader`] for scenario tests.
//!
//! Everything here is deterministic by construction so scenario tests
//! replay identically.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fcd_schemas::{SeriesPoint, TimeSeries};
use fcd_scheduler::{LoadError, SeriesLoader};

/// Fixed origin for generated timestamps (2023-11-14T22:13:20Z).
fn origin() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Small deterministic noise stream in [-1, 1] (numerical recipes LCG).
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        // Top 11 bits -> [0, 2048) -> [-1, 1).
        ((self.0 >> 53) as f64 / 1024.0) - 1.0
    }
}

fn daily_points(values: Vec<Option<f64>>) -> Vec<SeriesPoint> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| SeriesPoint {
            ts: origin() + Duration::days(i as i64),
            value,
        })
        .collect()
}

/// Upward-trending daily series with bounded noise.
pub fn trend_series(series_id: &str, n: usize, seed: u64) -> TimeSeries {
    let mut noise = Lcg(seed);
    let values = (0..n)
        .map(|i| Some(100.0 + 2.0 * i as f64 + 3.0 * noise.next_unit()))
        .collect();
    TimeSeries::new(series_id, daily_points(values))
}

/// Weekly-seasonal daily series (period 7) with trend and bounded noise.
pub fn seasonal_series(series_id: &str, n: usize, seed: u64) -> TimeSeries {
    let pattern = [20.0, 24.0, 28.0, 26.0, 22.0, 12.0, 10.0];
    let mut noise = Lcg(seed);
    let values = (0..n)
        .map(|i| Some(100.0 + 0.5 * i as f64 + pattern[i % 7] + noise.next_unit()))
        .collect();
    TimeSeries::new(series_id, daily_points(values))
}

/// Constant-valued series.
pub fn flat_series(series_id: &str, n: usize, value: f64) -> TimeSeries {
    TimeSeries::new(series_id, daily_points(vec![Some(value); n]))
}

/// Trend series with every `gap_every`-th point missing.
pub fn series_with_missing(series_id: &str, n: usize, gap_every: usize, seed: u64) -> TimeSeries {
    let mut noise = Lcg(seed);
    let values = (0..n)
        .map(|i| {
            if gap_every > 0 && i % gap_every == gap_every - 1 {
                None
            } else {
                Some(50.0 + 1.0 * i as f64 + 2.0 * noise.next_unit())
            }
        })
        .collect();
    TimeSeries::new(series_id, daily_points(values))
}

/// In-memory series source for scenario tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesLoader {
    series: HashMap<String, TimeSeries>,
}

impl InMemorySeriesLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: TimeSeries) -> Self {
        self.series.insert(series.series_id.clone(), series);
        self
    }

    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.series_id.clone(), series);
    }
}

#[async_trait::async_trait]
impl SeriesLoader for InMemorySeriesLoader {
    async fn load(&self, series_id: &str) -> Result<TimeSeries, LoadError> {
        self.series
            .get(series_id)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(series_id.to_string()))
    }
}
