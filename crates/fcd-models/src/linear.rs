//! Ordinary least squares trend line over the time index, with linear
//! extrapolation across the horizon.

use std::collections::BTreeMap;

use fcd_schemas::{ForecastSeries, ModelKind};

use crate::{
    check_finite, forecast_series, residual_sigma, Diagnostics, FitError, FittedForecaster,
    Forecaster,
};

pub struct LinearForecaster;

impl Forecaster for LinearForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn fit(&self, values: &[f64]) -> Result<Box<dyn FittedForecaster>, FitError> {
        check_finite(values)?;
        if values.len() < 2 {
            return Err(FitError::InsufficientData {
                needed: 2,
                actual: values.len(),
            });
        }

        let n = values.len() as f64;
        let t_mean = (values.len() - 1) as f64 / 2.0;
        let y_mean = values.iter().sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (t, y) in values.iter().enumerate() {
            let dt = t as f64 - t_mean;
            sxx += dt * dt;
            sxy += dt * (y - y_mean);
        }
        if sxx.abs() < 1e-12 {
            return Err(FitError::Singular("time index has zero variance".to_string()));
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * t_mean;

        let residuals: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(t, y)| y - (intercept + slope * t as f64))
            .collect();

        Ok(Box::new(FittedLinear {
            slope,
            intercept,
            n_obs: values.len(),
            sigma: residual_sigma(&residuals),
        }))
    }
}

#[derive(Debug)]
struct FittedLinear {
    slope: f64,
    intercept: f64,
    n_obs: usize,
    sigma: f64,
}

impl FittedForecaster for FittedLinear {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn predict(&self, horizon: u32) -> ForecastSeries {
        let last_t = (self.n_obs - 1) as f64;
        let points: Vec<f64> = (1..=horizon as usize)
            .map(|h| self.intercept + self.slope * (last_t + h as f64))
            .collect();
        forecast_series(ModelKind::Linear, points, self.sigma)
    }

    fn diagnose(&self) -> Diagnostics {
        let mut params = BTreeMap::new();
        params.insert("slope".to_string(), self.slope);
        params.insert("intercept".to_string(), self.intercept);
        params.insert("residual_sigma".to_string(), self.sigma);
        params.insert("n_obs".to_string(), self.n_obs as f64);
        Diagnostics {
            model: ModelKind::Linear,
            params,
            notes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line_extrapolates_exactly() {
        let values: Vec<f64> = (0..10).map(|t| 3.0 + 2.0 * t as f64).collect();
        let fitted = LinearForecaster.fit(&values).unwrap();

        let d = fitted.diagnose();
        assert!((d.params["slope"] - 2.0).abs() < 1e-9);
        assert!((d.params["intercept"] - 3.0).abs() < 1e-9);

        let fs = fitted.predict(2);
        assert!((fs.points[0].value - 23.0).abs() < 1e-9); // t = 10
        assert!((fs.points[1].value - 25.0).abs() < 1e-9); // t = 11
    }

    #[test]
    fn single_point_is_insufficient() {
        assert_eq!(
            LinearForecaster.fit(&[4.2]).unwrap_err(),
            FitError::InsufficientData { needed: 2, actual: 1 }
        );
    }

    #[test]
    fn infinite_value_is_rejected() {
        assert!(matches!(
            LinearForecaster.fit(&[1.0, f64::INFINITY]).unwrap_err(),
            FitError::NonFinite { index: 1 }
        ));
    }
}
