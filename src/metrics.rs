use serde::Serialize;
use tracing::warn;

use crate::error::{EmulatorError, Result};

/// Accuracy of the model over the held-out segment, tagged with the step it
/// was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracyRecord {
    pub step: usize,
    pub r2: f64,
    pub mae: f64,
    /// MAE over the range of the actuals; `NaN` when the range is zero but
    /// the predictions are not exact.
    pub nmae: f64,
}

/// Mean of each metric over a run. NaN entries are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccuracySummary {
    pub steps: usize,
    pub r2: f64,
    pub mae: f64,
    pub nmae: f64,
}

#[derive(Debug, Default)]
pub struct MetricsRecorder {
    records: Vec<AccuracyRecord>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: usize, predictions: &[f64], actuals: &[f64]) -> Result<&AccuracyRecord> {
        let record = compute_metrics(step, predictions, actuals)?;
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn records(&self) -> &[AccuracyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> AccuracySummary {
        AccuracySummary {
            steps: self.records.len(),
            r2: mean_defined(self.records.iter().map(|r| r.r2)),
            mae: mean_defined(self.records.iter().map(|r| r.mae)),
            nmae: mean_defined(self.records.iter().map(|r| r.nmae)),
        }
    }
}

fn compute_metrics(step: usize, predictions: &[f64], actuals: &[f64]) -> Result<AccuracyRecord> {
    if predictions.len() != actuals.len() {
        return Err(EmulatorError::LengthMismatch {
            predictions: predictions.len(),
            actuals: actuals.len(),
        });
    }
    if actuals.is_empty() {
        return Err(EmulatorError::EmptyInput);
    }

    let n = actuals.len() as f64;
    let mean = actuals.iter().sum::<f64>() / n;
    let ss_res: f64 = actuals
        .iter()
        .zip(predictions)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actuals.iter().map(|a| (a - mean).powi(2)).sum();

    let mae = actuals
        .iter()
        .zip(predictions)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;

    let max = actuals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = actuals.iter().copied().fold(f64::INFINITY, f64::min);
    let range = max - min;

    // Constant actuals: ss_tot can round to a tiny non-zero value, so the
    // guard keys off the range instead.
    let r2 = if range == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    };

    let nmae = if range == 0.0 {
        if mae == 0.0 {
            0.0
        } else {
            warn!(step, mae, "NMAE undefined: actuals have zero range");
            f64::NAN
        }
    } else {
        mae / range
    };

    Ok(AccuracyRecord { step, r2, mae, nmae })
}

fn mean_defined(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
