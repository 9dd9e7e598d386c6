//! Mini-batch training loop with optional EWC regularization

use std::ops::Range;

use ndarray::{s, Array2};
use serde::Serialize;
use tracing::{debug, info};

use super::ewc::{self, ImportanceSnapshot};
use crate::core::config::TrainingConfig;
use crate::engine::model::check_rows;
use crate::engine::{Model, Topology};
use crate::error::{EwcError, Result};

/// Observer for per-epoch progress. Has no effect on training.
pub trait ProgressSink {
    fn on_epoch(&mut self, epoch: usize, total: usize, loss: f32);
}

/// Logs progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_epoch(&mut self, epoch: usize, total: usize, loss: f32) {
        info!("Epoch {}/{} loss: {:.6}", epoch, total, loss);
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_epoch(&mut self, _epoch: usize, _total: usize, _loss: f32) {}
}

/// EWC term applied while training a later task
#[derive(Debug, Clone, Copy)]
pub struct Regularization<'a> {
    pub snapshot: &'a ImportanceSnapshot,
    /// Relatedness of the new task to the anchored one; scales the pull
    pub similarity: f32,
}

/// Outcome of one call to [`train`]
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub epochs: usize,
    /// Optimizer steps taken during this call
    pub steps: u64,
    /// Combined loss of the last batch of every epoch
    pub epoch_losses: Vec<f32>,
}

impl TrainReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

/// Contiguous batch boundaries in dataset order. The last batch may be short.
pub fn batch_ranges(len: usize, batch_size: usize) -> Result<Vec<Range<usize>>> {
    if batch_size == 0 {
        return Err(EwcError::config("batch size must be at least 1"));
    }
    Ok((0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect())
}

/// Train for exactly `config.epochs` passes of `config.batch_size` rows.
///
/// Each batch minimises
/// `loss + penalty_weight * penalty * similarity` when a regularization is
/// supplied, otherwise the plain mean loss. One optimizer step per batch.
pub fn train<T: Topology>(
    model: &mut Model<T>,
    inputs: &Array2<f32>,
    targets: &Array2<f32>,
    config: &TrainingConfig,
    regularization: Option<Regularization<'_>>,
    progress: &mut dyn ProgressSink,
) -> Result<TrainReport> {
    config.validate()?;
    check_rows(inputs, targets)?;
    if inputs.nrows() == 0 {
        return Err(EwcError::config("cannot train on an empty dataset"));
    }
    if let Some(reg) = &regularization {
        config.check_similarity(reg.similarity)?;
    }

    let batches = batch_ranges(inputs.nrows(), config.batch_size)?;
    let start_steps = model.step_count();
    let mut epoch_losses = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let mut last_loss = 0.0;
        for range in &batches {
            let x = inputs.slice(s![range.clone(), ..]).to_owned();
            let y = targets.slice(s![range.clone(), ..]).to_owned();
            let (base, mut grads) = model.loss_and_gradients(&x, &y)?;

            let mut loss = base;
            if let Some(reg) = &regularization {
                let coefficient = config.penalty_weight * reg.similarity;
                let ewc_loss = ewc::penalty(model.parameters(), reg.snapshot, config.penalty_reduction)?;
                let ewc_grads =
                    ewc::penalty_gradient(model.parameters(), reg.snapshot, config.penalty_reduction)?;
                grads.scaled_add(coefficient, &ewc_grads)?;
                loss = base + coefficient * ewc_loss;
                debug!("batch {:?}: base={:.6}, ewc={:.6e}", range, base, ewc_loss);
            }
            EwcError::check_finite(loss, format!("epoch {} batch {:?}", epoch + 1, range))?;
            if !grads.is_finite() {
                return Err(EwcError::Numeric {
                    context: format!("gradients at epoch {} batch {:?}", epoch + 1, range),
                    value: grads.l2_norm(),
                });
            }

            model.zero_grad();
            model.backward(&grads)?;
            model.step()?;
            last_loss = loss;
        }
        progress.on_epoch(epoch + 1, config.epochs, last_loss);
        epoch_losses.push(last_loss);
    }

    Ok(TrainReport {
        epochs: config.epochs,
        steps: model.step_count() - start_steps,
        epoch_losses,
    })
}
