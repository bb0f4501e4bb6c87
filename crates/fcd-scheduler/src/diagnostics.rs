//! On-demand series diagnostics: data quality, outliers, feature
//! summaries, a backtest summary, and advisory recommendations.
//!
//! Capabilities that cannot run (backtest on a too-short series) surface
//! an explicit `insufficient_data` status — an absent check never reads as
//! a passing one.

use std::collections::BTreeMap;

use fcd_backtest::{BacktestConfig, BacktestEngine, BacktestError, BacktestReport};
use fcd_config::EngineConfig;
use fcd_features::{
    assess_data_quality, detect_outliers, lag_features, moving_average_features, seasonal_features,
    DataQualityReport, OutlierReport,
};
use fcd_schemas::{ModelKind, TimeSeries};
use serde::{Deserialize, Serialize};

/// Lags summarized in the diagnostics payload.
const SUMMARY_LAGS: [u32; 3] = [1, 7, 28];
/// Moving-average windows summarized in the diagnostics payload.
const SUMMARY_WINDOWS: [u32; 2] = [7, 28];

/// Coverage summary of the derived feature generators: how many points
/// carry each feature, plus the per-weekday mean for seasonal analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    /// lag -> count of points where the lag feature is defined.
    pub lag_coverage: BTreeMap<u32, usize>,
    /// window -> count of points where the moving average is defined.
    pub moving_average_coverage: BTreeMap<u32, usize>,
    /// day-of-week (0 = Monday) -> mean observed value.
    pub weekday_means: BTreeMap<u32, f64>,
}

/// Everything the diagnostics endpoint returns for one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDiagnostics {
    pub series_id: String,
    pub total_points: usize,
    pub data_quality: DataQualityReport,
    pub outliers: OutlierReport,
    pub features: FeatureSummary,
    /// "ok" | "insufficient_data" | "no_models"
    pub backtest_status: String,
    pub backtest: Option<BacktestReport>,
    pub recommendations: Vec<String>,
}

/// Build the full diagnostics payload. CPU-bound; callers run it off the
/// async path.
pub fn assemble_diagnostics(series: &TimeSeries, config: &EngineConfig) -> SeriesDiagnostics {
    let data_quality = assess_data_quality(series, &config.outliers);
    let outliers = detect_outliers(series, &config.outliers);
    let features = summarize_features(series);

    let observed = series.observed();
    let backtest_config = BacktestConfig {
        fold_count: config.backtest_fold_count,
        horizon: 7,
        min_train_len: config.backtest_min_train_len,
        models: ModelKind::constituents().to_vec(),
        model_cfg: config.model.clone(),
    };
    let (backtest_status, backtest) = match BacktestEngine::new(backtest_config).run(&observed) {
        Ok(report) => ("ok".to_string(), Some(report)),
        Err(BacktestError::InsufficientData { .. }) => ("insufficient_data".to_string(), None),
        Err(BacktestError::NoModels) => ("no_models".to_string(), None),
    };

    let recommendations = recommend(&data_quality, &outliers, backtest_status.as_str(), backtest.as_ref(), config);

    SeriesDiagnostics {
        series_id: series.series_id.clone(),
        total_points: series.len(),
        data_quality,
        outliers,
        features,
        backtest_status,
        backtest,
        recommendations,
    }
}

fn summarize_features(series: &TimeSeries) -> FeatureSummary {
    let lag_rows = lag_features(series, &SUMMARY_LAGS);
    let ma_rows = moving_average_features(series, &SUMMARY_WINDOWS);
    let seasonal = seasonal_features(series);

    let mut lag_coverage = BTreeMap::new();
    for &lag in &SUMMARY_LAGS {
        let defined = lag_rows
            .iter()
            .filter(|row| row.get(&lag).copied().flatten().is_some())
            .count();
        lag_coverage.insert(lag, defined);
    }

    let mut moving_average_coverage = BTreeMap::new();
    for &w in &SUMMARY_WINDOWS {
        let defined = ma_rows
            .iter()
            .filter(|row| row.get(&w).copied().flatten().is_some())
            .count();
        moving_average_coverage.insert(w, defined);
    }

    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for feat in &seasonal {
        if let Some(v) = feat.value {
            let entry = sums.entry(feat.day_of_week).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    let weekday_means = sums
        .into_iter()
        .map(|(dow, (sum, n))| (dow, sum / n as f64))
        .collect();

    FeatureSummary {
        lag_coverage,
        moving_average_coverage,
        weekday_means,
    }
}

fn recommend(
    quality: &DataQualityReport,
    outliers: &OutlierReport,
    backtest_status: &str,
    backtest: Option<&BacktestReport>,
    config: &EngineConfig,
) -> Vec<String> {
    let mut out = Vec::new();

    if quality.score < 0.8 {
        out.push(format!(
            "data quality score {:.2} is below 0.80; review missing points ({} gaps) before trusting forecasts",
            quality.score, quality.gap_count
        ));
    }
    if outliers.count > 0 {
        out.push(format!(
            "{} outlier(s) detected via {}; consider cleansing before model fitting",
            outliers.count,
            outliers.method.as_str()
        ));
    }

    match (backtest_status, backtest) {
        ("ok", Some(report)) => {
            if let Some(best) = report.best_model {
                out.push(format!(
                    "backtest selected {best} as the best model over {} fold(s)",
                    report.folds.len()
                ));
            }
            for (kind, agg) in &report.per_model {
                if let Some(m) = agg.mean_mape {
                    if m > config.mape_alert_threshold {
                        out.push(format!(
                            "model {kind} backtests at MAPE {:.1}% (threshold {:.1}%); treat its forecasts with caution",
                            m, config.mape_alert_threshold
                        ));
                    }
                }
            }
        }
        // Explicit marker: a backtest that could not run is reported, not
        // silently skipped.
        (status, _) => out.push(format!(
            "backtest unavailable ({status}); accuracy-based model selection not performed"
        )),
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fcd_schemas::SeriesPoint;

    fn daily_series(values: Vec<Option<f64>>) -> TimeSeries {
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| SeriesPoint {
                ts: Utc.timestamp_opt(1_700_000_000 + i as i64 * 86_400, 0).unwrap(),
                value,
            })
            .collect();
        TimeSeries::new("diag", points)
    }

    #[test]
    fn short_series_reports_insufficient_backtest_explicitly() {
        let series = daily_series((0..8).map(|i| Some(10.0 + i as f64)).collect());
        let diag = assemble_diagnostics(&series, &EngineConfig::default());

        assert_eq!(diag.backtest_status, "insufficient_data");
        assert!(diag.backtest.is_none());
        assert!(diag
            .recommendations
            .iter()
            .any(|r| r.contains("backtest unavailable (insufficient_data)")));
    }

    #[test]
    fn long_series_gets_a_backtest_summary() {
        let series = daily_series(
            (0..80)
                .map(|i| Some(100.0 + 2.0 * i as f64 + ((i * 11 % 5) as f64)))
                .collect(),
        );
        let diag = assemble_diagnostics(&series, &EngineConfig::default());

        assert_eq!(diag.backtest_status, "ok");
        let report = diag.backtest.unwrap();
        assert!(report.best_model.is_some());
        assert!(!report.folds.is_empty());
    }

    #[test]
    fn feature_summary_counts_defined_points() {
        let series = daily_series((0..40).map(|i| Some(i as f64)).collect());
        let diag = assemble_diagnostics(&series, &EngineConfig::default());

        // lag 1 defined for points 1..39
        assert_eq!(diag.features.lag_coverage[&1], 39);
        assert_eq!(diag.features.lag_coverage[&28], 12);
        // 7-point MA defined from index 6 on
        assert_eq!(diag.features.moving_average_coverage[&7], 34);
        assert_eq!(diag.features.weekday_means.len(), 7);
    }
}
