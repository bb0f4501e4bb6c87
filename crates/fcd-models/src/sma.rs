//! Simple moving average: the mean of the trailing `window` observations,
//! held flat across the horizon.

use std::collections::BTreeMap;

use fcd_schemas::{ForecastSeries, ModelKind};

use crate::{
    check_finite, forecast_series, residual_sigma, Diagnostics, FitError, FittedForecaster,
    Forecaster,
};

pub struct SmaForecaster {
    window: usize,
}

impl SmaForecaster {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Forecaster for SmaForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Sma
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn FittedForecaster>, FitError> {
        if self.window == 0 {
            return Err(FitError::BadConfig("sma window must be >= 1".to_string()));
        }
        check_finite(values)?;
        if values.len() < self.window {
            return Err(FitError::InsufficientData {
                needed: self.window,
                actual: values.len(),
            });
        }

        let mean = values[values.len() - self.window..].iter().sum::<f64>() / self.window as f64;

        // One-step-ahead residuals over the fit range drive the intervals.
        let mut residuals = Vec::new();
        for i in self.window..values.len() {
            let pred = values[i - self.window..i].iter().sum::<f64>() / self.window as f64;
            residuals.push(values[i] - pred);
        }

        Ok(Box::new(FittedSma {
            window: self.window,
            mean,
            sigma: residual_sigma(&residuals),
            n_obs: values.len(),
        }))
    }
}

#[derive(Debug)]
struct FittedSma {
    window: usize,
    mean: f64,
    sigma: f64,
    n_obs: usize,
}

impl FittedForecaster for FittedSma {
    fn kind(&self) -> ModelKind {
        ModelKind::Sma
    }

    fn predict(&self, horizon: u32) -> ForecastSeries {
        forecast_series(
            ModelKind::Sma,
            vec![self.mean; horizon as usize],
            self.sigma,
        )
    }

    fn diagnose(&self) -> Diagnostics {
        let mut params = BTreeMap::new();
        params.insert("window".to_string(), self.window as f64);
        params.insert("mean".to_string(), self.mean);
        params.insert("residual_sigma".to_string(), self.sigma);
        params.insert("n_obs".to_string(), self.n_obs as f64);
        Diagnostics {
            model: ModelKind::Sma,
            params,
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_trailing_mean_held_flat() {
        let fitted = SmaForecaster::new(3)
            .fit(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let fs = fitted.predict(4);
        assert_eq!(fs.points.len(), 4);
        for p in &fs.points {
            assert!((p.value - 5.0).abs() < 1e-12); // mean of [4,5,6]
        }
    }

    #[test]
    fn series_shorter_than_window_is_rejected() {
        let err = SmaForecaster::new(7).fit(&[1.0, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            FitError::InsufficientData {
                needed: 7,
                actual: 3
            }
        );
    }

    #[test]
    fn zero_window_is_a_config_error() {
        assert!(matches!(
            SmaForecaster::new(0).fit(&[1.0]).unwrap_err(),
            FitError::BadConfig(_)
        ));
    }

    #[test]
    fn diagnostics_expose_window_and_mean() {
        let fitted = SmaForecaster::new(2).fit(&[2.0, 4.0]).unwrap();
        let d = fitted.diagnose();
        assert_eq!(d.params["window"], 2.0);
        assert_eq!(d.params["mean"], 3.0);
    }
}
