pub mod config;
pub mod dataset;
pub mod emulator;
pub mod error;
pub mod metrics;
pub mod models;
pub mod selection;
pub mod store;

pub use config::Config;
pub use dataset::{Dataset, Sample};
pub use emulator::{EmulatorState, OnlineEmulator, StepEvent, StepObserver};
pub use error::{Component, EmulatorError, Result};
pub use metrics::{AccuracyRecord, MetricsRecorder};
pub use models::{build_model, GbdtModel, Model, ModelFactory, RidgeModel};
pub use selection::{Boxes, BoxesParams, Reservoir, SelectionDecision, SelectionStrategy};
pub use store::{SampleStore, SlotId};
