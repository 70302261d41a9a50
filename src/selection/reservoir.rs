use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::SelectionDecision;
use crate::dataset::Sample;
use crate::error::Result;
use crate::store::{SampleStore, SlotId};

/// Uniform reservoir sampling (Algorithm R).
///
/// After `n` offers the store holds each of those `n` samples with
/// probability `capacity / n`, without knowing the stream length up front.
#[derive(Debug)]
pub struct Reservoir {
    seed: u64,
    seen: usize,
    rng: StdRng,
}

impl Reservoir {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            seen: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of samples offered so far.
    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn offer(&mut self, sample: Sample, store: &mut SampleStore) -> Result<SelectionDecision> {
        self.seen += 1;

        if self.seen <= store.capacity() {
            let slot = SlotId(self.seen - 1);
            store.admit_at(slot, sample)?;
            return Ok(SelectionDecision::AdmitNew(slot));
        }

        let j = self.rng.gen_range(0..self.seen);
        if j < store.capacity() {
            let slot = SlotId(j);
            let evicted = store.replace(slot, sample)?;
            Ok(SelectionDecision::Replace { slot, evicted })
        } else {
            Ok(SelectionDecision::Reject)
        }
    }
}
