//! Data-quality scoring for raw series.
//!
//! Produces a [`DataQualityReport`] covering:
//! - completeness (non-missing fraction)
//! - outlier ratio (outliers / observed points)
//! - gap count (maximal runs of consecutive missing points)
//!
//! The composite score is a fixed, documented weighting:
//!
//! ```text
//! score = 0.5 * completeness
//!       + 0.3 * (1 - outlier_ratio)
//!       + 0.2 * gap_score          where gap_score = 1 / (1 + gap_count)
//! ```
//!
//! This module does **not** mutate the series or decide whether a forecast
//! may run; callers read the score and act on it.

use fcd_schemas::TimeSeries;
use serde::{Deserialize, Serialize};

use crate::outliers::{detect_outliers, OutlierConfig};

/// Weight on the non-missing fraction.
pub const WEIGHT_COMPLETENESS: f64 = 0.5;
/// Weight on (1 - outlier ratio).
pub const WEIGHT_OUTLIERS: f64 = 0.3;
/// Weight on the gap score.
pub const WEIGHT_GAPS: f64 = 0.2;

/// Composite data-quality report for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// Composite score in [0, 1]; higher is better.
    pub score: f64,
    /// Fraction of points with a value.
    pub completeness: f64,
    /// Outliers divided by observed points (0 when nothing observed).
    pub outlier_ratio: f64,
    /// Number of maximal runs of consecutive missing points.
    pub gap_count: usize,
    /// Observed (non-missing) point count.
    pub observed_points: usize,
    /// Total point count.
    pub total_points: usize,
}

/// Assess data quality for `series` using `outlier_config` for the outlier
/// component.
pub fn assess_data_quality(series: &TimeSeries, outlier_config: &OutlierConfig) -> DataQualityReport {
    let total_points = series.len();
    let observed_points = series.points.iter().filter(|p| p.value.is_some()).count();
    let completeness = series.completeness();

    let outlier_report = detect_outliers(series, outlier_config);
    let outlier_ratio = if observed_points == 0 {
        0.0
    } else {
        outlier_report.count as f64 / observed_points as f64
    };

    let gap_count = count_gaps(series);
    let gap_score = 1.0 / (1.0 + gap_count as f64);

    let score = (WEIGHT_COMPLETENESS * completeness
        + WEIGHT_OUTLIERS * (1.0 - outlier_ratio)
        + WEIGHT_GAPS * gap_score)
        .clamp(0.0, 1.0);

    DataQualityReport {
        score,
        completeness,
        outlier_ratio,
        gap_count,
        observed_points,
        total_points,
    }
}

/// A gap is a maximal run of consecutive missing points.
fn count_gaps(series: &TimeSeries) -> usize {
    let mut gaps = 0;
    let mut in_gap = false;
    for p in &series.points {
        match p.value {
            None if !in_gap => {
                gaps += 1;
                in_gap = true;
            }
            None => {}
            Some(_) => in_gap = false,
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fcd_schemas::SeriesPoint;

    fn series(values: Vec<Option<f64>>) -> TimeSeries {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| SeriesPoint {
                ts: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                value,
            })
            .collect();
        TimeSeries::new("test", points)
    }

    #[test]
    fn clean_series_scores_one() {
        let s = series((0..20).map(|i| Some(10.0 + (i % 2) as f64)).collect());
        let report = assess_data_quality(&s, &OutlierConfig::default());
        assert_eq!(report.gap_count, 0);
        assert_eq!(report.outlier_ratio, 0.0);
        assert!((report.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_runs_count_as_single_gaps() {
        let s = series(vec![
            Some(1.0),
            None,
            None,
            Some(2.0),
            None,
            Some(3.0),
            Some(4.0),
        ]);
        let report = assess_data_quality(&s, &OutlierConfig::default());
        assert_eq!(report.gap_count, 2);
        assert_eq!(report.observed_points, 4);
        assert!(report.score < 1.0);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let s = series(vec![None, None, None]);
        let report = assess_data_quality(&s, &OutlierConfig::default());
        assert!(report.score >= 0.0 && report.score <= 1.0);
        assert_eq!(report.completeness, 0.0);
    }
}
