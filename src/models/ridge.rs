use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array1, ArrayView1};

use super::traits::{Model, ModelFactory};
use crate::config::ModelParams;
use crate::dataset::Sample;
use crate::error::{EmulatorError, Result};

/// Closed-form ridge regression with an unpenalised intercept.
#[derive(Debug, Clone)]
pub struct RidgeModel {
    alpha: f64,
    /// Intercept followed by one weight per feature.
    coefficients: Option<Array1<f64>>,
}

impl RidgeModel {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            coefficients: None,
        }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }
}

impl Model for RidgeModel {
    fn fit(&mut self, samples: &[&Sample]) -> Result<()> {
        let width = samples
            .first()
            .map(|s| s.features().len())
            .ok_or_else(|| EmulatorError::Model("cannot fit on an empty sample set".into()))?;

        if let Some(bad) = samples.iter().find(|s| s.features().len() != width) {
            return Err(EmulatorError::InvalidSample(format!(
                "expected {} features, got {}",
                width,
                bad.features().len()
            )));
        }

        let design = DMatrix::from_fn(samples.len(), width + 1, |i, j| {
            if j == 0 {
                1.0
            } else {
                samples[i].features()[j - 1]
            }
        });
        let targets = DVector::from_iterator(samples.len(), samples.iter().map(|s| s.target()));

        let mut gram = design.transpose() * &design;
        for i in 1..=width {
            gram[(i, i)] += self.alpha;
        }
        let rhs = design.transpose() * targets;

        let solution = gram
            .cholesky()
            .ok_or_else(|| EmulatorError::Model("normal equations are not positive definite".into()))?
            .solve(&rhs);

        self.coefficients = Some(solution.iter().copied().collect::<Array1<f64>>());
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        let coefficients = self.coefficients.as_ref().ok_or(EmulatorError::NotTrained)?;
        if features.len() + 1 != coefficients.len() {
            return Err(EmulatorError::InvalidSample(format!(
                "expected {} features, got {}",
                coefficients.len() - 1,
                features.len()
            )));
        }
        Ok(coefficients[0] + coefficients.slice(s![1..]).dot(&ArrayView1::from(features)))
    }
}

impl ModelFactory for RidgeModel {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self::ModelType> {
        if params.alpha.is_nan() || params.alpha <= 0.0 {
            return Err(EmulatorError::invalid_config("ridge alpha must be positive"));
        }
        Ok(Self::new(params.alpha))
    }
}
