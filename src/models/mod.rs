pub mod gbdt;
pub mod ridge;
pub mod traits;

pub use gbdt::GbdtModel;
pub use ridge::RidgeModel;
pub use traits::{Model, ModelFactory};

use crate::config::{ModelKind, ModelParams};
use crate::error::Result;

/// Builds the regressor named by `params.kind`.
pub fn build_model(params: &ModelParams) -> Result<Box<dyn Model + Send>> {
    Ok(match params.kind {
        ModelKind::Gbdt => Box::new(GbdtModel::create(params)?),
        ModelKind::Ridge => Box::new(RidgeModel::create(params)?),
    })
}
