//! Cache admission policies.
//!
//! A strategy sees every stream item exactly once and decides whether it
//! enters the [`SampleStore`], possibly displacing a current occupant. Both
//! variants apply their decision to the store themselves and report it back
//! as a [`SelectionDecision`].

pub mod boxes;
pub mod reservoir;

pub use boxes::{BoxGrid, Boxes, BoxesParams, NeighborPolicy, TieBreak};
pub use reservoir::Reservoir;

use crate::dataset::Sample;
use crate::error::Result;
use crate::store::{SampleStore, SlotId};

/// Outcome of offering one sample to a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionDecision {
    /// The sample was discarded.
    Reject,
    /// The sample took a previously free slot.
    AdmitNew(SlotId),
    /// The sample displaced `evicted` from `slot`.
    Replace { slot: SlotId, evicted: Sample },
}

impl SelectionDecision {
    pub fn is_reject(&self) -> bool {
        matches!(self, Self::Reject)
    }

    /// True when the store contents changed.
    pub fn is_admitted(&self) -> bool {
        !self.is_reject()
    }
}

/// The two supported selection policies.
#[derive(Debug)]
pub enum SelectionStrategy {
    Reservoir(Reservoir),
    Boxes(Boxes),
}

impl SelectionStrategy {
    pub fn offer(&mut self, sample: Sample, store: &mut SampleStore) -> Result<SelectionDecision> {
        match self {
            Self::Reservoir(reservoir) => reservoir.offer(sample, store),
            Self::Boxes(boxes) => boxes.offer(sample, store),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reservoir(_) => "reservoir",
            Self::Boxes(_) => "boxes",
        }
    }

    /// Capacity the strategy was built for, if it carries one.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Reservoir(_) => None,
            Self::Boxes(boxes) => Some(boxes.params().capacity),
        }
    }

    /// Number of leading feature columns the strategy inspects.
    pub fn dimension(&self) -> Option<usize> {
        match self {
            Self::Reservoir(_) => None,
            Self::Boxes(boxes) => Some(boxes.params().dimension),
        }
    }
}

impl From<Reservoir> for SelectionStrategy {
    fn from(reservoir: Reservoir) -> Self {
        Self::Reservoir(reservoir)
    }
}

impl From<Boxes> for SelectionStrategy {
    fn from(boxes: Boxes) -> Self {
        Self::Boxes(boxes)
    }
}
