use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{EmulatorError, Result};

/// A single stream item: a feature vector and its regression target.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    features: Vec<f64>,
    target: f64,
}

impl Sample {
    pub fn new(features: Vec<f64>, target: f64) -> Self {
        Self { features, target }
    }

    pub fn features(&self) -> &[f64] {
        &self.features
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

/// Pre-processed features and targets, one row per stream item.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    targets: Array1<f64>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, targets: Array1<f64>) -> Result<Self> {
        if features.nrows() != targets.len() {
            return Err(EmulatorError::invalid_config(format!(
                "dataset has {} feature rows but {} targets",
                features.nrows(),
                targets.len()
            )));
        }
        Ok(Self { features, targets })
    }

    /// Builds a dataset from row-major feature vectors.
    pub fn from_rows(rows: Vec<Vec<f64>>, targets: Vec<f64>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|row| row.len() != n_cols) {
            return Err(EmulatorError::invalid_config(format!(
                "row {} has {} features, expected {}",
                bad,
                rows[bad].len(),
                n_cols
            )));
        }

        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|e| EmulatorError::invalid_config(e.to_string()))?;
        Self::new(features, Array1::from_vec(targets))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn features_at(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    pub fn target_at(&self, index: usize) -> f64 {
        self.targets[index]
    }

    /// Materialises stream item `index` as an owned sample.
    pub fn sample(&self, index: usize) -> Sample {
        Sample::new(self.features.row(index).to_vec(), self.targets[index])
    }
}
