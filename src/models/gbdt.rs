use super::traits::{Model, ModelFactory};
use crate::config::ModelParams;
use crate::dataset::Sample;
use crate::error::{EmulatorError, Result};
use gbdt::{config::Config as GBDTConfig, decision_tree::{Data, DataVec}, gradient_boost::GBDT};

/// Gradient boosted regression trees, retrained from scratch on every fit.
pub struct GbdtModel {
    model: Option<GBDT>,
    config: GBDTConfig,
    feature_size: usize,
}

impl Model for GbdtModel {
    fn fit(&mut self, samples: &[&Sample]) -> Result<()> {
        let feature_size = samples
            .first()
            .map(|s| s.features().len())
            .ok_or_else(|| EmulatorError::Model("cannot fit on an empty sample set".into()))?;

        let mut train_data = prepare_data(samples, feature_size)?;

        self.config.set_feature_size(feature_size);
        let mut gbdt = GBDT::new(&self.config);
        gbdt.fit(&mut train_data);

        self.model = Some(gbdt);
        self.feature_size = feature_size;
        Ok(())
    }

    fn predict(&self, features: &[f64]) -> Result<f64> {
        Ok(self.predict_batch(&[features.to_vec()])?[0])
    }

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self.model.as_ref().ok_or(EmulatorError::NotTrained)?;

        let test_data = rows
            .iter()
            .map(|row| {
                check_width(row, self.feature_size)?;
                Ok(Data::new_test_data(to_f32(row), None))
            })
            .collect::<Result<DataVec>>()?;

        Ok(model
            .predict(&test_data)
            .into_iter()
            .map(f64::from)
            .collect())
    }
}

impl ModelFactory for GbdtModel {
    type ModelType = Self;

    fn create(params: &ModelParams) -> Result<Self::ModelType> {
        if params.iterations == 0 || params.max_depth == 0 {
            return Err(EmulatorError::invalid_config(
                "gbdt needs at least one iteration and a positive depth",
            ));
        }
        if params.learning_rate.is_nan() || params.learning_rate <= 0.0 {
            return Err(EmulatorError::invalid_config("gbdt learning rate must be positive"));
        }

        let mut config = GBDTConfig::new();
        config.set_iterations(params.iterations);
        config.set_max_depth(params.max_depth);
        config.set_shrinkage(params.learning_rate as f32);
        config.set_loss("SquaredError");
        // Subsampling would make refits on the same store diverge.
        config.set_data_sample_ratio(1.0);
        config.set_feature_sample_ratio(1.0);

        Ok(Self {
            model: None,
            config,
            feature_size: 0,
        })
    }
}

// Helper functions
fn prepare_data(samples: &[&Sample], feature_size: usize) -> Result<DataVec> {
    samples
        .iter()
        .map(|sample| {
            check_width(sample.features(), feature_size)?;
            Ok(Data::new_training_data(
                to_f32(sample.features()),
                1.0,
                sample.target() as f32,
                None,
            ))
        })
        .collect()
}

fn check_width(features: &[f64], expected: usize) -> Result<()> {
    if features.len() != expected {
        return Err(EmulatorError::InvalidSample(format!(
            "expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    Ok(())
}

fn to_f32(features: &[f64]) -> Vec<f32> {
    features.iter().map(|&v| v as f32).collect()
}
