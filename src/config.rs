use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::selection::{Boxes, BoxesParams, NeighborPolicy, Reservoir, SelectionStrategy, TieBreak};

/// One experiment run: cache sizes, selection policy and regressor.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub experiment: ExperimentParams,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub model_params: ModelParams,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ExperimentParams {
    /// Cache capacity and length of the admission stream.
    pub dataset_len: usize,
    /// Size of the held-out evaluation segment.
    pub test_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    Reservoir {
        #[serde(default)]
        seed: u64,
    },
    Boxes {
        dimension: usize,
        divisions: usize,
        distance: f64,
        #[serde(default)]
        bounds: Vec<(f64, f64)>,
        #[serde(default)]
        neighbors: NeighborPolicy,
        #[serde(default)]
        tie_break: TieBreak,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Gbdt,
    Ridge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub kind: ModelKind,
    pub learning_rate: f64,
    pub iterations: usize,
    pub max_depth: u32,
    /// Ridge penalty.
    pub alpha: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            kind: ModelKind::Gbdt,
            learning_rate: 0.1,
            iterations: 50,
            max_depth: 3,
            alpha: 1e-3,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config")?;
        Ok(config)
    }

    /// Builds the configured strategy; Boxes takes `dataset_len` as its capacity.
    pub fn build_strategy(&self) -> crate::Result<SelectionStrategy> {
        Ok(match &self.strategy {
            StrategyConfig::Reservoir { seed } => Reservoir::new(*seed).into(),
            StrategyConfig::Boxes {
                dimension,
                divisions,
                distance,
                bounds,
                neighbors,
                tie_break,
            } => Boxes::new(BoxesParams {
                dimension: *dimension,
                divisions: *divisions,
                distance: *distance,
                capacity: self.experiment.dataset_len,
                bounds: bounds.clone(),
                neighbors: *neighbors,
                tie_break: *tie_break,
            })?
            .into(),
        })
    }
}
