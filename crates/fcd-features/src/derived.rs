//! Derived per-point features: lags, moving averages, seasonal buckets.
//!
//! All generators return one entry per input point, aligned by index with
//! the source series. A feature is `None` when it cannot be computed yet
//! (lag reaches before the series start, moving-average window not fully
//! populated) or when a required source point is missing.

use std::collections::BTreeMap;

use chrono::Datelike;
use fcd_schemas::TimeSeries;
use serde::{Deserialize, Serialize};

/// Per-point lag features: for each requested lag `k`, the value `k` steps
/// earlier, or `None` when out of range or missing.
pub fn lag_features(series: &TimeSeries, lags: &[u32]) -> Vec<BTreeMap<u32, Option<f64>>> {
    series
        .points
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut row = BTreeMap::new();
            for &lag in lags {
                let value = i
                    .checked_sub(lag as usize)
                    .and_then(|j| series.points[j].value);
                row.insert(lag, value);
            }
            row
        })
        .collect()
}

/// Per-point trailing moving averages: for each requested window `w`, the
/// mean of the last `w` values ending at the point, or `None` until the
/// window is fully populated with observed values.
pub fn moving_average_features(series: &TimeSeries, windows: &[u32]) -> Vec<BTreeMap<u32, Option<f64>>> {
    series
        .points
        .iter()
        .enumerate()
        .map(|(i, _)| {
            let mut row = BTreeMap::new();
            for &w in windows {
                let w_usize = w as usize;
                let value = if w_usize == 0 || i + 1 < w_usize {
                    None
                } else {
                    let window = &series.points[i + 1 - w_usize..=i];
                    let values: Vec<f64> = window.iter().filter_map(|p| p.value).collect();
                    if values.len() == w_usize {
                        Some(values.iter().sum::<f64>() / w_usize as f64)
                    } else {
                        None
                    }
                };
                row.insert(w, value);
            }
            row
        })
        .collect()
}

/// Calendar bucket for one point, for downstream seasonal-pattern analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalFeature {
    /// 0 = Monday .. 6 = Sunday.
    pub day_of_week: u32,
    /// 1 = January .. 12 = December.
    pub month_of_year: u32,
    pub value: Option<f64>,
}

/// Per-point seasonal buckets derived from each point's timestamp.
pub fn seasonal_features(series: &TimeSeries) -> Vec<SeasonalFeature> {
    series
        .points
        .iter()
        .map(|p| SeasonalFeature {
            day_of_week: p.ts.weekday().num_days_from_monday(),
            month_of_year: p.ts.month(),
            value: p.value,
        })
        .collect()
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
                // 2023-11-13 is a Monday.
                ts: Utc.timestamp_opt(1_699_833_600 + i as i64 * 86_400, 0).unwrap(),
                value,
            })
            .collect();
        TimeSeries::new("test", points)
    }

    #[test]
    fn lags_are_none_before_series_start() {
        let s = series(vec![Some(1.0), Some(2.0), Some(3.0)]);
        let rows = lag_features(&s, &[1, 2]);

        assert_eq!(rows[0][&1], None);
        assert_eq!(rows[0][&2], None);
        assert_eq!(rows[1][&1], Some(1.0));
        assert_eq!(rows[2][&1], Some(2.0));
        assert_eq!(rows[2][&2], Some(1.0));
    }

    #[test]
    fn lag_through_missing_point_is_none() {
        let s = series(vec![Some(1.0), None, Some(3.0)]);
        let rows = lag_features(&s, &[1]);
        assert_eq!(rows[2][&1], None);
    }

    #[test]
    fn moving_average_waits_for_full_window() {
        let s = series(vec![Some(2.0), Some(4.0), Some(6.0), Some(8.0)]);
        let rows = moving_average_features(&s, &[3]);

        assert_eq!(rows[0][&3], None);
        assert_eq!(rows[1][&3], None);
        assert_eq!(rows[2][&3], Some(4.0));
        assert_eq!(rows[3][&3], Some(6.0));
    }

    #[test]
    fn moving_average_skips_windows_with_missing_values() {
        let s = series(vec![Some(2.0), None, Some(6.0), Some(8.0), Some(10.0)]);
        let rows = moving_average_features(&s, &[3]);
        assert_eq!(rows[2][&3], None);
        assert_eq!(rows[3][&3], None);
        assert_eq!(rows[4][&3], Some(8.0));
    }

    #[test]
    fn seasonal_buckets_follow_the_calendar() {
        let s = series(vec![Some(1.0), Some(2.0)]);
        let feats = seasonal_features(&s);
        assert_eq!(feats[0].day_of_week, 0); // Monday
        assert_eq!(feats[1].day_of_week, 1); // Tuesday
        assert_eq!(feats[0].month_of_year, 11);
    }
}
