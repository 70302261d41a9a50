//! Density-aware retention over a fixed grid in feature space.
//!
//! Each of the first `dimension` feature columns is split into `divisions`
//! equal intervals between fixed bounds. A sample that is closer than
//! `distance` to something already kept nearby is redundant and rejected.
//! A novel sample is admitted while room remains. Once the store is full it
//! displaces the least novel occupant of its own cell, or of the most crowded
//! cell when its own cell holds nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;

use super::SelectionDecision;
use crate::dataset::Sample;
use crate::error::{EmulatorError, Result};
use crate::store::{SampleStore, SlotId};

/// Which occupied cells are searched for near duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborPolicy {
    /// Only the cell the sample falls into.
    #[default]
    SameCell,
    /// The sample's cell and every cell touching it, diagonals included.
    Adjacent,
}

/// Which cell loses a sample when several are equally crowded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Lexicographically smallest cell coordinate.
    #[default]
    LowestCell,
    /// Lexicographically largest cell coordinate.
    HighestCell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxesParams {
    pub dimension: usize,
    pub divisions: usize,
    pub distance: f64,
    pub capacity: usize,
    /// Per-dimension `(lower, upper)`; empty means `[0, 1]` everywhere.
    pub bounds: Vec<(f64, f64)>,
    pub neighbors: NeighborPolicy,
    pub tie_break: TieBreak,
}

impl Default for BoxesParams {
    fn default() -> Self {
        Self {
            dimension: 3,
            divisions: 3,
            distance: 0.05,
            capacity: 100,
            bounds: Vec::new(),
            neighbors: NeighborPolicy::default(),
            tie_break: TieBreak::default(),
        }
    }
}

pub type CellCoord = Vec<usize>;

/// Sparse occupancy map from grid cell to the slots whose samples lie in it.
#[derive(Debug, Clone)]
pub struct BoxGrid {
    divisions: usize,
    bounds: Vec<(f64, f64)>,
    cells: BTreeMap<CellCoord, BTreeSet<SlotId>>,
    slot_cells: HashMap<SlotId, CellCoord>,
}

impl BoxGrid {
    pub fn new(divisions: usize, bounds: Vec<(f64, f64)>) -> Self {
        Self {
            divisions,
            bounds,
            cells: BTreeMap::new(),
            slot_cells: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.bounds.len()
    }

    /// Grid coordinate of a feature vector. Values outside the bounds land
    /// in the edge cells.
    pub fn cell_of(&self, features: &[f64]) -> Result<CellCoord> {
        if features.len() < self.dimension() {
            return Err(EmulatorError::InvalidSample(format!(
                "expected at least {} features, got {}",
                self.dimension(),
                features.len()
            )));
        }

        self.bounds
            .iter()
            .zip(features)
            .map(|(&(lower, upper), &x)| {
                if !x.is_finite() {
                    return Err(EmulatorError::InvalidSample(format!(
                        "non-finite feature value {}",
                        x
                    )));
                }
                let scaled = (x - lower) / (upper - lower) * self.divisions as f64;
                Ok((scaled.floor().max(0.0) as usize).min(self.divisions - 1))
            })
            .collect()
    }

    pub fn insert(&mut self, cell: CellCoord, slot: SlotId) {
        self.cells.entry(cell.clone()).or_default().insert(slot);
        self.slot_cells.insert(slot, cell);
    }

    /// Forgets `slot`, returning the cell it occupied.
    pub fn remove(&mut self, slot: SlotId) -> Option<CellCoord> {
        let cell = self.slot_cells.remove(&slot)?;
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(&slot);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
        Some(cell)
    }

    pub fn population(&self, cell: &[usize]) -> usize {
        self.cells.get(cell).map_or(0, BTreeSet::len)
    }

    pub fn members(&self, cell: &[usize]) -> impl Iterator<Item = SlotId> + '_ {
        self.cells.get(cell).into_iter().flatten().copied()
    }

    pub fn cell_of_slot(&self, slot: SlotId) -> Option<&CellCoord> {
        self.slot_cells.get(&slot)
    }

    /// Total number of tracked slots across all cells.
    pub fn occupancy(&self) -> usize {
        self.slot_cells.len()
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    fn neighborhood(&self, cell: &[usize], policy: NeighborPolicy) -> Vec<SlotId> {
        match policy {
            NeighborPolicy::SameCell => self.members(cell).collect(),
            NeighborPolicy::Adjacent => self
                .cells
                .iter()
                .filter(|(other, _)| {
                    other.iter().zip(cell).all(|(&a, &b)| a.abs_diff(b) <= 1)
                })
                .flat_map(|(_, members)| members.iter().copied())
                .collect(),
        }
    }

    fn most_crowded(&self, tie_break: TieBreak) -> Option<CellCoord> {
        let max = self.cells.values().map(BTreeSet::len).max()?;
        let mut tied = self
            .cells
            .iter()
            .filter(|(_, members)| members.len() == max)
            .map(|(cell, _)| cell);
        let chosen = match tie_break {
            TieBreak::LowestCell => tied.next(),
            TieBreak::HighestCell => tied.last(),
        };
        chosen.cloned()
    }
}

#[derive(Debug)]
pub struct Boxes {
    params: BoxesParams,
    grid: BoxGrid,
}

impl Boxes {
    pub fn new(mut params: BoxesParams) -> Result<Self> {
        if params.dimension == 0 {
            return Err(EmulatorError::invalid_config("boxes dimension must be positive"));
        }
        if params.divisions == 0 {
            return Err(EmulatorError::invalid_config("boxes divisions must be positive"));
        }
        if params.capacity == 0 {
            return Err(EmulatorError::invalid_config("boxes capacity must be positive"));
        }
        if !params.distance.is_finite() || params.distance < 0.0 {
            return Err(EmulatorError::invalid_config(format!(
                "boxes distance must be a non-negative number, got {}",
                params.distance
            )));
        }

        if params.bounds.is_empty() {
            params.bounds = vec![(0.0, 1.0); params.dimension];
        }
        if params.bounds.len() != params.dimension {
            return Err(EmulatorError::invalid_config(format!(
                "{} bounds given for {} dimensions",
                params.bounds.len(),
                params.dimension
            )));
        }
        if let Some((lower, upper)) = params
            .bounds
            .iter()
            .find(|(lower, upper)| !(lower.is_finite() && upper.is_finite() && lower < upper))
        {
            return Err(EmulatorError::invalid_config(format!(
                "invalid bounds [{}, {}]",
                lower, upper
            )));
        }

        let grid = BoxGrid::new(params.divisions, params.bounds.clone());
        Ok(Self { params, grid })
    }

    pub fn params(&self) -> &BoxesParams {
        &self.params
    }

    pub fn grid(&self) -> &BoxGrid {
        &self.grid
    }

    pub fn offer(&mut self, sample: Sample, store: &mut SampleStore) -> Result<SelectionDecision> {
        let cell = self.grid.cell_of(sample.features())?;

        if let Some(nearest) = self.nearest_distance(&cell, &sample, store) {
            if nearest < self.params.distance {
                return Ok(SelectionDecision::Reject);
            }
        }

        if !store.is_full() {
            let slot = store.admit(sample)?;
            self.grid.insert(cell, slot);
            return Ok(SelectionDecision::AdmitNew(slot));
        }

        // Zero distance never evicts: the store keeps its first `capacity` samples.
        if self.params.distance == 0.0 {
            return Ok(SelectionDecision::Reject);
        }

        let victim = if self.grid.population(&cell) > 0 {
            self.least_novel(&cell, Some(&sample), store)?
        } else {
            let victim_cell = self.grid.most_crowded(self.params.tie_break).ok_or_else(|| {
                EmulatorError::InconsistentState("store is full but the grid tracks no samples".into())
            })?;
            self.least_novel(&victim_cell, None, store)?
        };

        let evicted = store.replace(victim, sample)?;
        self.grid.remove(victim);
        self.grid.insert(cell, victim);
        Ok(SelectionDecision::Replace {
            slot: victim,
            evicted,
        })
    }

    fn distance_between(&self, a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b)
            .take(self.params.dimension)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn nearest_distance(&self, cell: &[usize], sample: &Sample, store: &SampleStore) -> Option<f64> {
        self.grid
            .neighborhood(cell, self.params.neighbors)
            .into_iter()
            .filter_map(|slot| store.get(slot))
            .map(|other| self.distance_between(sample.features(), other.features()))
            .min_by(f64::total_cmp)
    }

    /// The member of `cell` closest to its cellmates; lowest slot on ties.
    fn least_novel(
        &self,
        cell: &[usize],
        newcomer: Option<&Sample>,
        store: &SampleStore,
    ) -> Result<SlotId> {
        let members: Vec<(SlotId, &Sample)> = self
            .grid
            .members(cell)
            .filter_map(|slot| store.get(slot).map(|sample| (slot, sample)))
            .collect();

        members
            .iter()
            .map(|(slot, sample)| {
                let nearest = members
                    .iter()
                    .filter(|(other, _)| other != slot)
                    .map(|(_, other)| *other)
                    .chain(newcomer)
                    .map(|other| self.distance_between(sample.features(), other.features()))
                    .fold(f64::INFINITY, f64::min);
                (*slot, nearest)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(slot, _)| slot)
            .ok_or_else(|| EmulatorError::InconsistentState("victim cell has no stored samples".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(features: &[f64]) -> Sample {
        Sample::new(features.to_vec(), features[0])
    }

    fn boxes(dimension: usize, divisions: usize, distance: f64, capacity: usize) -> Boxes {
        Boxes::new(BoxesParams {
            dimension,
            divisions,
            distance,
            capacity,
            ..BoxesParams::default()
        })
        .unwrap()
    }

    fn targets(store: &SampleStore) -> Vec<f64> {
        store.contents().iter().map(|s| s.target()).collect()
    }

    #[test]
    fn test_identical_sample_is_rejected() {
        let mut strategy = boxes(2, 3, 0.1, 10);
        let mut store = SampleStore::new(10).unwrap();

        let first = strategy.offer(point(&[0.2, 0.2]), &mut store).unwrap();
        let second = strategy.offer(point(&[0.2, 0.2]), &mut store).unwrap();

        assert_eq!(first, SelectionDecision::AdmitNew(SlotId(0)));
        assert_eq!(second, SelectionDecision::Reject);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_admitted() {
        let mut strategy = boxes(2, 1, 0.5, 10);
        let mut store = SampleStore::new(10).unwrap();

        strategy.offer(point(&[0.0, 0.0]), &mut store).unwrap();
        let decision = strategy.offer(point(&[0.5, 0.0]), &mut store).unwrap();

        assert_eq!(decision, SelectionDecision::AdmitNew(SlotId(1)));
    }

    #[test]
    fn test_distance_below_threshold_is_rejected() {
        let mut strategy = boxes(2, 1, 0.5, 10);
        let mut store = SampleStore::new(10).unwrap();

        strategy.offer(point(&[0.0, 0.0]), &mut store).unwrap();
        let decision = strategy.offer(point(&[0.25, 0.25]), &mut store).unwrap();

        assert!(decision.is_reject());
    }

    #[test]
    fn test_empty_cell_always_admits() {
        let mut strategy = boxes(2, 2, 10.0, 10);
        let mut store = SampleStore::new(10).unwrap();

        strategy.offer(point(&[0.1, 0.1]), &mut store).unwrap();
        let decision = strategy.offer(point(&[0.9, 0.9]), &mut store).unwrap();

        assert_eq!(decision, SelectionDecision::AdmitNew(SlotId(1)));
        assert_eq!(strategy.grid().occupied_cells(), 2);
    }

    #[test]
    fn test_adjacent_policy_checks_neighbouring_cells() {
        let run = |neighbors| {
            let mut strategy = Boxes::new(BoxesParams {
                dimension: 2,
                divisions: 2,
                distance: 0.5,
                capacity: 10,
                neighbors,
                ..BoxesParams::default()
            })
            .unwrap();
            let mut store = SampleStore::new(10).unwrap();
            strategy.offer(point(&[0.45, 0.45]), &mut store).unwrap();
            strategy.offer(point(&[0.55, 0.55]), &mut store).unwrap()
        };

        assert!(run(NeighborPolicy::SameCell).is_admitted());
        assert!(run(NeighborPolicy::Adjacent).is_reject());
    }

    #[test]
    fn test_zero_distance_fills_then_never_evicts() {
        let mut strategy = boxes(1, 2, 0.0, 3);
        let mut store = SampleStore::new(3).unwrap();

        let values = [0.1, 0.1, 0.7, 0.2, 0.9, 0.3, 0.1];
        let decisions: Vec<SelectionDecision> = values
            .iter()
            .map(|&v| strategy.offer(point(&[v]), &mut store).unwrap())
            .collect();

        assert!(decisions[..3].iter().all(SelectionDecision::is_admitted));
        assert!(decisions[3..].iter().all(SelectionDecision::is_reject));
        assert_eq!(targets(&store), vec![0.1, 0.1, 0.7]);
    }

    #[test]
    fn test_full_store_evicts_from_most_crowded_cell() {
        let mut strategy = boxes(1, 2, 0.05, 3);
        let mut store = SampleStore::new(3).unwrap();

        for v in [0.0625, 0.125, 0.375] {
            strategy.offer(point(&[v]), &mut store).unwrap();
        }
        let decision = strategy.offer(point(&[0.75]), &mut store).unwrap();

        // 0.0625 and 0.125 are equally close to a cellmate; the lower slot goes.
        match decision {
            SelectionDecision::Replace { slot, evicted } => {
                assert_eq!(slot, SlotId(0));
                assert_eq!(evicted.target(), 0.0625);
            }
            other => panic!("expected replacement, got {:?}", other),
        }
        assert_eq!(strategy.grid().population(&[0]), 2);
        assert_eq!(strategy.grid().population(&[1]), 1);
        assert_eq!(strategy.grid().occupancy(), store.len());
    }

    #[test]
    fn test_own_cell_eviction_counts_newcomer_as_neighbour() {
        let mut strategy = boxes(1, 1, 0.1, 2);
        let mut store = SampleStore::new(2).unwrap();

        strategy.offer(point(&[0.0]), &mut store).unwrap();
        strategy.offer(point(&[0.5]), &mut store).unwrap();
        let decision = strategy.offer(point(&[0.75]), &mut store).unwrap();

        match decision {
            SelectionDecision::Replace { slot, evicted } => {
                assert_eq!(slot, SlotId(1));
                assert_eq!(evicted.target(), 0.5);
            }
            other => panic!("expected replacement, got {:?}", other),
        }
        assert_eq!(targets(&store), vec![0.0, 0.75]);
    }

    #[test]
    fn test_full_store_evicts_from_own_cell_before_crowded_cell() {
        let mut strategy = boxes(1, 2, 0.05, 3);
        let mut store = SampleStore::new(3).unwrap();

        for v in [0.1, 0.6, 0.8] {
            strategy.offer(point(&[v]), &mut store).unwrap();
        }
        let decision = strategy.offer(point(&[0.3]), &mut store).unwrap();

        // Cell 1 is more crowded, but the newcomer's own cell is occupied.
        match decision {
            SelectionDecision::Replace { slot, evicted } => {
                assert_eq!(slot, SlotId(0));
                assert_eq!(evicted.target(), 0.1);
            }
            other => panic!("expected replacement, got {:?}", other),
        }
        assert_eq!(targets(&store), vec![0.3, 0.6, 0.8]);
        assert_eq!(strategy.grid().population(&[0]), 1);
        assert_eq!(strategy.grid().population(&[1]), 2);
    }

    #[test]
    fn test_desynced_grid_is_inconsistent_state() {
        let mut strategy = boxes(1, 2, 0.05, 1);
        let mut store = SampleStore::new(1).unwrap();
        store.admit(point(&[0.2])).unwrap();

        assert!(matches!(
            strategy.offer(point(&[0.7]), &mut store),
            Err(EmulatorError::InconsistentState(_))
        ));
    }

    #[test]
    fn test_tie_break_selects_cell() {
        let run = |tie_break| {
            let mut strategy = Boxes::new(BoxesParams {
                dimension: 1,
                divisions: 4,
                distance: 0.01,
                capacity: 2,
                tie_break,
                ..BoxesParams::default()
            })
            .unwrap();
            let mut store = SampleStore::new(2).unwrap();
            strategy.offer(point(&[0.1]), &mut store).unwrap();
            strategy.offer(point(&[0.9]), &mut store).unwrap();
            match strategy.offer(point(&[0.4]), &mut store).unwrap() {
                SelectionDecision::Replace { evicted, .. } => evicted.target(),
                other => panic!("expected replacement, got {:?}", other),
            }
        };

        assert_eq!(run(TieBreak::LowestCell), 0.1);
        assert_eq!(run(TieBreak::HighestCell), 0.9);
    }

    #[test]
    fn test_cell_of_clamps_out_of_range_values() {
        let strategy = boxes(2, 4, 0.1, 10);
        assert_eq!(strategy.grid().cell_of(&[-3.0, 7.0]).unwrap(), vec![0, 3]);
        assert_eq!(strategy.grid().cell_of(&[1.0, 0.5]).unwrap(), vec![3, 2]);
    }

    #[test]
    fn test_cell_of_rejects_bad_samples() {
        let strategy = boxes(3, 4, 0.1, 10);
        assert!(matches!(
            strategy.grid().cell_of(&[0.1, 0.2]),
            Err(EmulatorError::InvalidSample(_))
        ));
        assert!(matches!(
            strategy.grid().cell_of(&[0.1, f64::NAN, 0.2]),
            Err(EmulatorError::InvalidSample(_))
        ));
    }

    #[test]
    fn test_custom_bounds_shift_cells() {
        let strategy = Boxes::new(BoxesParams {
            dimension: 1,
            divisions: 4,
            bounds: vec![(-2.0, 2.0)],
            ..BoxesParams::default()
        })
        .unwrap();
        assert_eq!(strategy.grid().cell_of(&[0.5]).unwrap(), vec![2]);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let bad = [
            BoxesParams { divisions: 0, ..BoxesParams::default() },
            BoxesParams { dimension: 0, ..BoxesParams::default() },
            BoxesParams { capacity: 0, ..BoxesParams::default() },
            BoxesParams { distance: -0.1, ..BoxesParams::default() },
            BoxesParams { distance: f64::NAN, ..BoxesParams::default() },
            BoxesParams { bounds: vec![(0.0, 1.0)], ..BoxesParams::default() },
            BoxesParams { dimension: 1, bounds: vec![(1.0, 1.0)], ..BoxesParams::default() },
        ];
        for params in bad {
            assert!(matches!(
                Boxes::new(params),
                Err(EmulatorError::InvalidConfiguration(_))
            ));
        }
    }
}
