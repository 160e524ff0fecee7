use serde::{Deserialize, Serialize};

use super::Predictor;
use crate::error::{Result, UpscaleError};

/// Ordinary linear regression: `intercept + Σ coefficient·covariate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub covariates: Vec<String>,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn validate(&self) -> Result<()> {
        if self.coefficients.len() != self.covariates.len() {
            return Err(UpscaleError::InvalidModel(format!(
                "linear model has {} coefficients for {} covariates",
                self.coefficients.len(),
                self.covariates.len()
            )));
        }
        Ok(())
    }
}

impl Predictor for LinearModel {
    fn covariates(&self) -> &[String] {
        &self.covariates
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept + self.coefficients.iter().zip(row).map(|(b, x)| b * x).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_only_when_all_covariates_zero() {
        let m = LinearModel {
            covariates: vec!["a".into(), "b".into()],
            intercept: 3.5,
            coefficients: vec![2.0, -1.0],
        };
        assert_eq!(m.predict_row(&[0.0, 0.0]), 3.5);
        assert_eq!(m.predict_row(&[1.0, 4.0]), 1.5);
    }

    #[test]
    fn nan_covariate_propagates() {
        let m = LinearModel { covariates: vec!["a".into()], intercept: 0.0, coefficients: vec![1.0] };
        assert!(m.predict_row(&[f64::NAN]).is_nan());
    }
}
