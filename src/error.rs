use std::fmt;

use thiserror::Error;

use crate::emulator::EmulatorState;

/// The component of a run that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Selection,
    Model,
    Metrics,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selection => write!(f, "selection strategy"),
            Self::Model => write!(f, "model"),
            Self::Metrics => write!(f, "metrics recorder"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Sample store is full (capacity {capacity})")]
    CapacityExceeded { capacity: usize },

    #[error("Slot {slot} is outside the store (capacity {capacity})")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("Slot {0} is already occupied")]
    SlotOccupied(usize),

    #[error("Slot {0} is vacant")]
    SlotVacant(usize),

    #[error("Model has not been trained")]
    NotTrained,

    #[error("Model error: {0}")]
    Model(String),

    #[error("Length mismatch: {predictions} predictions vs {actuals} actuals")]
    LengthMismatch { predictions: usize, actuals: usize },

    #[error("Cannot compute metrics over an empty batch")]
    EmptyInput,

    #[error("Run has not finished (state: {state:?})")]
    NotFinished { state: EmulatorState },

    #[error("Run already started (state: {state:?})")]
    AlreadyStarted { state: EmulatorState },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Selection state out of sync with the store: {0}")]
    InconsistentState(String),

    #[error("Step {step} failed in {component}: {source}")]
    StepFailed {
        component: Component,
        step: usize,
        #[source]
        source: Box<EmulatorError>,
    },
}

impl EmulatorError {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn at_step(self, component: Component, step: usize) -> Self {
        Self::StepFailed {
            component,
            step,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmulatorError>;
