//! Model evaluation: accuracy, F1 and per-sample losses

use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use super::metrics;
use crate::core::config::AccuracyAverage;
use crate::engine::model::check_rows;
use crate::engine::{Model, Topology};
use crate::error::{EwcError, Result};
use crate::neural::trainer::batch_ranges;

/// Binary predictions above this value count as positive
pub const BINARY_THRESHOLD: f32 = 0.5;

/// How targets are encoded, decided once from their column count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Single 0/1 column
    Binary,
    /// One-hot over `n` columns
    Multiclass(usize),
}

impl OutputMode {
    pub fn from_targets(targets: &Array2<f32>) -> Result<Self> {
        match targets.ncols() {
            0 => Err(EwcError::config("targets have zero columns")),
            1 => Ok(OutputMode::Binary),
            n => Ok(OutputMode::Multiclass(n)),
        }
    }
}

/// F1 as a percentage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum F1Score {
    Binary(f32),
    PerClass(Vec<f32>),
}

/// Percent-scaled scores for one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub mode: OutputMode,
    /// 0 to 100
    pub accuracy: f32,
    pub f1: F1Score,
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "accuracy {:.2}%", self.accuracy)?;
        match &self.f1 {
            F1Score::Binary(score) => write!(f, ", F1 {:.2}%", score),
            F1Score::PerClass(scores) => {
                let parts: Vec<String> = scores.iter().map(|s| format!("{:.2}", s)).collect();
                write!(f, ", F1 per class [{}]", parts.join(", "))
            }
        }
    }
}

/// Score `model` on a labelled set with a single forward pass.
///
/// Takes the model by shared reference; parameters and optimizer state are
/// not touched, so repeated calls give identical results.
pub fn evaluate<T: Topology>(
    model: &Model<T>,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    average: AccuracyAverage,
) -> Result<EvaluationResult> {
    let mode = OutputMode::from_targets(targets)?;
    check_rows(inputs, targets)?;
    if inputs.nrows() == 0 {
        return Err(EwcError::config("cannot evaluate an empty dataset"));
    }
    let pred = model.predict(inputs)?;
    if pred.dim() != targets.dim() {
        return Err(EwcError::config(format!(
            "predictions {:?} do not match targets {:?}",
            pred.dim(),
            targets.dim()
        )));
    }
    let bad = metrics::non_finite_count(&pred);
    if bad > 0 {
        warn!("{} of {} predictions are not finite", bad, pred.len());
    }

    let result = match mode {
        OutputMode::Binary => {
            let labels = metrics::threshold(&pred, BINARY_THRESHOLD);
            let truth = metrics::threshold(targets, BINARY_THRESHOLD);
            let correct = labels
                .iter()
                .zip(truth.iter())
                .filter(|(p, t)| p == t)
                .count();
            let accuracy = correct as f32 / labels.len() as f32 * 100.0;
            let f1 = metrics::binary_f1(labels.column(0), truth.column(0)) * 100.0;
            EvaluationResult { mode, accuracy, f1: F1Score::Binary(f1) }
        }
        OutputMode::Multiclass(num_classes) => {
            let labels = metrics::argmax_rows(&pred);
            let truth = metrics::argmax_rows(targets);
            let accuracy =
                metrics::multiclass_accuracy(&labels, &truth, num_classes, average) * 100.0;
            let f1 = metrics::multiclass_f1(&labels, &truth, num_classes)
                .into_iter()
                .map(|s| s * 100.0)
                .collect();
            EvaluationResult { mode, accuracy, f1: F1Score::PerClass(f1) }
        }
    };
    debug!("Evaluated {} rows: {}", inputs.nrows(), result);
    Ok(result)
}

/// Unreduced loss for every row, in input order, computed batch by batch.
pub fn get_loss<T: Topology>(
    model: &Model<T>,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    batch_size: usize,
) -> Result<Array1<f32>> {
    check_rows(inputs, targets)?;
    let mut losses = Array1::zeros(inputs.nrows());
    for range in batch_ranges(inputs.nrows(), batch_size)? {
        let x = inputs.slice(s![range.clone(), ..]).to_owned();
        let y = targets.slice(s![range.clone(), ..]).to_owned();
        let pred = model.predict(&x)?;
        let per_sample = model.loss_fn().per_sample(&pred, &y)?;
        losses.slice_mut(s![range]).assign(&per_sample);
    }
    Ok(losses)
}

/// Indices of the `k` largest losses, highest first
pub fn high_loss_indices(losses: &Array1<f32>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..losses.len()).collect();
    order.sort_by(|&a, &b| losses[b].total_cmp(&losses[a]));
    order.truncate(k);
    order
}
