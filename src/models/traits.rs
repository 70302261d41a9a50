use crate::config::ModelParams;
use crate::dataset::Sample;
use crate::error::Result;

/// An incremental regressor trained against the current cache contents.
///
/// `fit` may be called many times with snapshots that differ by a single
/// sample; implementations retrain from the snapshot they are given.
pub trait Model {
    fn fit(&mut self, samples: &[&Sample]) -> Result<()>;

    /// Fails with `NotTrained` until `fit` has succeeded once.
    fn predict(&self, features: &[f64]) -> Result<f64>;

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn fit(&mut self, samples: &[&Sample]) -> Result<()> {
        (**self).fit(samples)
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        (**self).predict(features)
    }

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        (**self).predict_batch(rows)
    }
}

pub trait ModelFactory {
    type ModelType: Model;

    fn create(params: &ModelParams) -> Result<Self::ModelType>;
}
