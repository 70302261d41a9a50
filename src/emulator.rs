//! Stream replay and online accuracy measurement.
//!
//! A run replays the first `dataset_len + test_len` items of a dataset in two
//! strict phases:
//!
//! * admission: items `[0, dataset_len)` are offered one at a time to the
//!   selection strategy, and the model is refit on the store contents after
//!   every offer;
//! * evaluation: once admission is over, the model predicts every item of the
//!   held-out segment `[dataset_len, dataset_len + test_len)` and a single
//!   [`AccuracyRecord`] is recorded with `step == dataset_len`.
//!
//! Held-out items are never offered to the strategy.

use std::ops::Range;

use tracing::{debug, info, instrument};

use crate::dataset::Dataset;
use crate::error::{Component, EmulatorError, Result};
use crate::metrics::{AccuracyRecord, MetricsRecorder};
use crate::models::Model;
use crate::selection::{SelectionDecision, SelectionStrategy};
use crate::store::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulatorState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Position in the admission stream. Only moves forward.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamCursor {
    position: usize,
}

impl StreamCursor {
    pub fn position(&self) -> usize {
        self.position
    }

    fn advance(&mut self) -> usize {
        let current = self.position;
        self.position += 1;
        current
    }
}

/// A step boundary reported to a [`StepObserver`].
#[derive(Debug)]
pub enum StepEvent<'a> {
    /// One sample was offered and the model refit.
    Admission {
        step: usize,
        decision: &'a SelectionDecision,
        store_len: usize,
    },
    /// The held-out segment was scored after the last admission step.
    Evaluation {
        store_len: usize,
        record: &'a AccuracyRecord,
    },
}

/// Callback invoked at every step boundary.
pub trait StepObserver {
    fn on_step(&mut self, event: &StepEvent<'_>);
}

impl<F> StepObserver for F
where
    F: FnMut(&StepEvent<'_>),
{
    fn on_step(&mut self, event: &StepEvent<'_>) {
        self(event)
    }
}

pub struct OnlineEmulator<M> {
    model: M,
    strategy: SelectionStrategy,
    store: SampleStore,
    dataset: Dataset,
    dataset_len: usize,
    test_range: Range<usize>,
    cursor: StreamCursor,
    recorder: MetricsRecorder,
    observer: Option<Box<dyn StepObserver + Send>>,
    state: EmulatorState,
}

impl<M: Model> OnlineEmulator<M> {
    /// Validates the run parameters; nothing is offered until `start`.
    pub fn new(
        model: M,
        strategy: SelectionStrategy,
        dataset: Dataset,
        dataset_len: usize,
        test_len: usize,
    ) -> Result<Self> {
        if dataset_len == 0 || test_len == 0 {
            return Err(EmulatorError::invalid_config(format!(
                "dataset_len and test_len must be positive (got {} and {})",
                dataset_len, test_len
            )));
        }
        let run_len = dataset_len.checked_add(test_len).ok_or_else(|| {
            EmulatorError::invalid_config(format!(
                "dataset_len {} plus test_len {} overflows",
                dataset_len, test_len
            ))
        })?;
        if dataset.len() < run_len {
            return Err(EmulatorError::invalid_config(format!(
                "dataset has {} items, run needs {}",
                dataset.len(),
                run_len
            )));
        }
        if let Some(capacity) = strategy.capacity() {
            if capacity != dataset_len {
                return Err(EmulatorError::invalid_config(format!(
                    "{} strategy built for capacity {}, run uses {}",
                    strategy.name(),
                    capacity,
                    dataset_len
                )));
            }
        }
        if let Some(dimension) = strategy.dimension() {
            if dimension > dataset.n_features() {
                return Err(EmulatorError::invalid_config(format!(
                    "{} strategy considers {} dimensions but the dataset has {} features",
                    strategy.name(),
                    dimension,
                    dataset.n_features()
                )));
            }
        }

        Ok(Self {
            model,
            strategy,
            store: SampleStore::new(dataset_len)?,
            dataset,
            dataset_len,
            test_range: dataset_len..run_len,
            cursor: StreamCursor::default(),
            recorder: MetricsRecorder::new(),
            observer: None,
            state: EmulatorState::Idle,
        })
    }

    pub fn with_observer(mut self, observer: impl StepObserver + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> EmulatorState {
        self.state
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn cursor(&self) -> StreamCursor {
        self.cursor
    }

    /// Runs the whole replay. A second call is rejected with `AlreadyStarted`.
    #[instrument(skip(self), fields(strategy = self.strategy.name(), dataset_len = self.dataset_len, test_len = self.test_range.len()))]
    pub fn start(&mut self) -> Result<()> {
        if self.state != EmulatorState::Idle {
            return Err(EmulatorError::AlreadyStarted { state: self.state });
        }

        info!("Starting online emulation");
        self.state = EmulatorState::Running;
        let outcome = self.admit_all().and_then(|()| self.evaluate());
        match outcome {
            Ok(()) => {
                self.state = EmulatorState::Completed;
                let summary = self.recorder.summary();
                info!(?summary, "Online emulation completed");
                Ok(())
            }
            Err(err) => {
                self.state = EmulatorState::Failed;
                info!(error = %err, "Online emulation failed");
                Err(err)
            }
        }
    }

    pub fn get_accuracies(&self) -> Result<&[AccuracyRecord]> {
        match self.state {
            EmulatorState::Completed => Ok(self.recorder.records()),
            state => Err(EmulatorError::NotFinished { state }),
        }
    }

    fn admit_all(&mut self) -> Result<()> {
        while self.cursor.position() < self.dataset_len {
            let index = self.cursor.advance();
            let step = index + 1;
            let sample = self.dataset.sample(index);

            let decision = self
                .strategy
                .offer(sample, &mut self.store)
                .map_err(|e| e.at_step(Component::Selection, step))?;

            self.model
                .fit(&self.store.contents())
                .map_err(|e| e.at_step(Component::Model, step))?;

            debug!(
                step,
                admitted = decision.is_admitted(),
                cached = self.store.len(),
                "Admission step complete"
            );

            if let Some(observer) = self.observer.as_mut() {
                observer.on_step(&StepEvent::Admission {
                    step,
                    decision: &decision,
                    store_len: self.store.len(),
                });
            }
        }
        Ok(())
    }

    fn evaluate(&mut self) -> Result<()> {
        let step = self.dataset_len;
        let test_rows: Vec<Vec<f64>> = self
            .test_range
            .clone()
            .map(|i| self.dataset.features_at(i).to_vec())
            .collect();
        let actuals: Vec<f64> = self
            .test_range
            .clone()
            .map(|i| self.dataset.target_at(i))
            .collect();

        let predictions = self
            .model
            .predict_batch(&test_rows)
            .map_err(|e| e.at_step(Component::Model, step))?;
        let record = *self
            .recorder
            .record(step, &predictions, &actuals)
            .map_err(|e| e.at_step(Component::Metrics, step))?;

        debug!(step, r2 = record.r2, mae = record.mae, nmae = record.nmae, "Evaluation complete");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_step(&StepEvent::Evaluation {
                store_len: self.store.len(),
                record: &record,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;
    use crate::models::RidgeModel;
    use crate::selection::{Boxes, BoxesParams, Reservoir};

    fn dataset(n: usize) -> Dataset {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64 / n as f64]).collect();
        let targets: Vec<f64> = (0..n).map(|i| 2.0 * i as f64 / n as f64).collect();
        Dataset::from_rows(rows, targets).unwrap()
    }

    /// Fails on the nth fit call.
    struct FailingModel {
        fits: usize,
        fail_at: usize,
    }

    impl Model for FailingModel {
        fn fit(&mut self, _samples: &[&Sample]) -> Result<()> {
            self.fits += 1;
            if self.fits == self.fail_at {
                return Err(EmulatorError::Model("boom".into()));
            }
            Ok(())
        }

        fn predict(&self, _features: &[f64]) -> Result<f64> {
            Ok(0.0)
        }
    }

    #[test]
    fn test_rejects_short_dataset() {
        let result = OnlineEmulator::new(
            RidgeModel::new(1e-3),
            Reservoir::new(0).into(),
            dataset(10),
            8,
            5,
        );
        assert!(matches!(result, Err(EmulatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rejects_zero_lengths() {
        for (dataset_len, test_len) in [(0, 5), (5, 0)] {
            let result = OnlineEmulator::new(
                RidgeModel::new(1e-3),
                Reservoir::new(0).into(),
                dataset(20),
                dataset_len,
                test_len,
            );
            assert!(matches!(result, Err(EmulatorError::InvalidConfiguration(_))));
        }
    }

    #[test]
    fn test_rejects_overflowing_lengths() {
        let result = OnlineEmulator::new(
            RidgeModel::new(1e-3),
            Reservoir::new(0).into(),
            dataset(20),
            usize::MAX,
            1,
        );
        assert!(matches!(result, Err(EmulatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_cursor_advances_through_admission_stream() {
        let mut emulator = OnlineEmulator::new(
            RidgeModel::new(1e-3),
            Reservoir::new(0).into(),
            dataset(12),
            6,
            4,
        )
        .unwrap();

        emulator.start().unwrap();
        assert_eq!(emulator.cursor().position(), 6);
        assert_eq!(emulator.store().len(), 6);

        let records = emulator.get_accuracies().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, 6);
    }

    #[test]
    fn test_model_failure_reports_component_and_step() {
        let model = FailingModel { fits: 0, fail_at: 3 };
        let mut emulator =
            OnlineEmulator::new(model, Reservoir::new(0).into(), dataset(20), 10, 5).unwrap();

        let err = emulator.start().unwrap_err();
        match err {
            EmulatorError::StepFailed {
                component, step, ..
            } => {
                assert_eq!(component, Component::Model);
                assert_eq!(step, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(emulator.state(), EmulatorState::Failed);
        assert!(matches!(
            emulator.get_accuracies(),
            Err(EmulatorError::NotFinished {
                state: EmulatorState::Failed
            })
        ));
        assert_eq!(emulator.cursor().position(), 3);
    }

    #[test]
    fn test_selection_failure_reports_component_and_step() {
        let mut rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64 / 20.0]).collect();
        rows[3][0] = f64::NAN;
        let targets: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let data = Dataset::from_rows(rows, targets).unwrap();

        let boxes = Boxes::new(BoxesParams {
            dimension: 1,
            divisions: 2,
            distance: 0.01,
            capacity: 10,
            ..BoxesParams::default()
        })
        .unwrap();
        let mut emulator =
            OnlineEmulator::new(RidgeModel::new(1e-3), boxes.into(), data, 10, 5).unwrap();

        match emulator.start().unwrap_err() {
            EmulatorError::StepFailed {
                component,
                step,
                source,
            } => {
                assert_eq!(component, Component::Selection);
                assert_eq!(step, 4);
                assert!(matches!(*source, EmulatorError::InvalidSample(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(emulator.state(), EmulatorState::Failed);
        assert_eq!(emulator.store().len(), 3);
        assert!(matches!(
            emulator.get_accuracies(),
            Err(EmulatorError::NotFinished {
                state: EmulatorState::Failed
            })
        ));
    }
}
