//! fcd-features
//!
//! Feature engineering over a raw [`fcd_schemas::TimeSeries`]:
//! - data-quality scoring (`quality`)
//! - outlier detection (`outliers`)
//! - lag / moving-average / seasonal feature generation (`derived`)
//!
//! This crate is a leaf: it reads series, produces reports and feature
//! vectors, and never touches jobs, models, or I/O.

pub mod derived;
pub mod outliers;
pub mod quality;

pub use derived::{lag_features, moving_average_features, seasonal_features, SeasonalFeature};
pub use outliers::{detect_outliers, OutlierConfig, OutlierMethod, OutlierReport};
pub use quality::{assess_data_quality, DataQualityReport};
