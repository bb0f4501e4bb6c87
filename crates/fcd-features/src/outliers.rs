//! Outlier detection for raw series.
//!
//! Two methods:
//! - `RollingZScore` (default): a point is an outlier when it deviates from
//!   the mean of the trailing observed window by more than `k` standard
//!   deviations. Window and `k` are configurable.
//! - `IqrFences`: classic Tukey fences at `Q1 - 1.5*IQR` / `Q3 + 1.5*IQR`
//!   over the whole observed series.
//!
//! Indices in the report refer to positions in the full series (missing
//! points included), so callers can line findings up with timestamps.

use fcd_schemas::TimeSeries;
use serde::{Deserialize, Serialize};

/// Detection method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    RollingZScore,
    IqrFences,
}

impl OutlierMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutlierMethod::RollingZScore => "rolling_z_score",
            OutlierMethod::IqrFences => "iqr_fences",
        }
    }
}

/// Outlier detection tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    pub method: OutlierMethod,
    /// Standard-deviation multiplier for `RollingZScore`.
    pub k: f64,
    /// Trailing window length for `RollingZScore`.
    pub window: usize,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            method: OutlierMethod::RollingZScore,
            k: 3.0,
            window: 7,
        }
    }
}

/// Detection output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    pub count: usize,
    /// Positions in the full series, ascending.
    pub indices: Vec<usize>,
    pub method: OutlierMethod,
}

/// Detect outliers in `series` according to `config`.
///
/// A series with fewer than 3 observed points never reports outliers;
/// there is not enough context to call anything anomalous.
pub fn detect_outliers(series: &TimeSeries, config: &OutlierConfig) -> OutlierReport {
    let observed: Vec<(usize, f64)> = series
        .points
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.value.map(|v| (i, v)))
        .collect();

    let indices = if observed.len() < 3 {
        Vec::new()
    } else {
        match config.method {
            OutlierMethod::RollingZScore => rolling_z_score(&observed, config.k, config.window),
            OutlierMethod::IqrFences => iqr_fences(&observed),
        }
    };

    OutlierReport {
        count: indices.len(),
        indices,
        method: config.method,
    }
}

fn rolling_z_score(observed: &[(usize, f64)], k: f64, window: usize) -> Vec<usize> {
    let window = window.max(2);
    let mut out = Vec::new();

    for pos in 0..observed.len() {
        // Trailing window of observed values, excluding the point itself.
        let start = pos.saturating_sub(window);
        let prior: Vec<f64> = observed[start..pos].iter().map(|(_, v)| *v).collect();
        if prior.len() < 2 {
            continue;
        }

        let mean = prior.iter().sum::<f64>() / prior.len() as f64;
        let var = prior.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / prior.len() as f64;
        let sigma = var.sqrt();

        let (idx, value) = observed[pos];
        let deviation = (value - mean).abs();

        // Degenerate flat window: any real deviation is anomalous.
        let is_outlier = if sigma < 1e-9 {
            deviation > 1e-9
        } else {
            deviation > k * sigma
        };

        if is_outlier {
            out.push(idx);
        }
    }

    out
}

fn iqr_fences(observed: &[(usize, f64)]) -> Vec<usize> {
    let mut values: Vec<f64> = observed.iter().map(|(_, v)| *v).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = percentile(&values, 0.25);
    let q3 = percentile(&values, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    observed
        .iter()
        .filter(|(_, v)| *v < lower || *v > upper)
        .map(|(i, _)| *i)
        .collect()
}

/// Linear-interpolated percentile over a sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
