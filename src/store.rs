use std::collections::BTreeSet;
use std::fmt;

use crate::dataset::Sample;
use crate::error::{EmulatorError, Result};

/// Stable position of a sample inside a [`SampleStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-capacity cache of admitted training samples.
///
/// The store has no eviction policy of its own: callers decide which slot to
/// vacate and the store only enforces `len() <= capacity()`.
#[derive(Debug, Clone)]
pub struct SampleStore {
    slots: Vec<Option<Sample>>,
    free: BTreeSet<usize>,
}

impl SampleStore {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EmulatorError::invalid_config("store capacity must be positive"));
        }
        Ok(Self {
            slots: vec![None; capacity],
            free: (0..capacity).collect(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.capacity() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == self.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Inserts into the lowest free slot.
    pub fn admit(&mut self, sample: Sample) -> Result<SlotId> {
        let slot = *self.free.iter().next().ok_or(EmulatorError::CapacityExceeded {
            capacity: self.capacity(),
        })?;
        self.admit_at(SlotId(slot), sample)?;
        Ok(SlotId(slot))
    }

    pub fn admit_at(&mut self, slot: SlotId, sample: Sample) -> Result<()> {
        if self.is_full() {
            return Err(EmulatorError::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        let capacity = self.capacity();
        let entry = self.slots.get_mut(slot.0).ok_or(EmulatorError::SlotOutOfRange {
            slot: slot.0,
            capacity,
        })?;
        if entry.is_some() {
            return Err(EmulatorError::SlotOccupied(slot.0));
        }
        *entry = Some(sample);
        self.free.remove(&slot.0);
        Ok(())
    }

    /// Removes the sample at `slot` and hands ownership back to the caller.
    pub fn evict(&mut self, slot: SlotId) -> Result<Sample> {
        let capacity = self.capacity();
        let entry = self.slots.get_mut(slot.0).ok_or(EmulatorError::SlotOutOfRange {
            slot: slot.0,
            capacity,
        })?;
        let sample = entry.take().ok_or(EmulatorError::SlotVacant(slot.0))?;
        self.free.insert(slot.0);
        Ok(sample)
    }

    /// Evicts the occupant of `slot` and admits `sample` in its place.
    pub fn replace(&mut self, slot: SlotId, sample: Sample) -> Result<Sample> {
        let evicted = self.evict(slot)?;
        self.admit_at(slot, sample)?;
        Ok(evicted)
    }

    pub fn get(&self, slot: SlotId) -> Option<&Sample> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &Sample)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.as_ref().map(|s| (SlotId(i), s)))
    }

    /// Snapshot of the stored samples in slot order.
    pub fn contents(&self) -> Vec<&Sample> {
        self.slots.iter().flatten().collect()
    }
}
