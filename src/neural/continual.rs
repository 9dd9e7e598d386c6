//! Task-sequence driver: train, consolidate, move to the next task

use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;
use tracing::info;

use super::ewc::{self, ImportanceSnapshot, SnapshotStats};
use super::trainer::{self, ProgressSink, Regularization, TrainReport};
use crate::core::config::TrainingConfig;
use crate::engine::{Model, Topology};
use crate::error::Result;
use crate::eval::{self, EvaluationResult};

/// A labelled dataset for one task in the sequence
#[derive(Debug, Clone)]
pub struct Task {
    pub name: String,
    pub inputs: Array2<f32>,
    pub targets: Array2<f32>,
}

impl Task {
    pub fn new(name: impl Into<String>, inputs: Array2<f32>, targets: Array2<f32>) -> Self {
        Self { name: name.into(), inputs, targets }
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.nrows() == 0
    }
}

/// What happened while learning one task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task: String,
    /// False for the first task, which has nothing to consolidate against
    pub regularized: bool,
    pub similarity: Option<f32>,
    pub training: TrainReport,
    pub snapshot: SnapshotStats,
}

/// Learns a sequence of tasks, consolidating after each one.
///
/// Holds only the most recent snapshot. Consolidation builds a fresh
/// snapshot and swaps the handle; the previous one is dropped, never merged.
pub struct ContinualLearner<T: Topology> {
    model: Model<T>,
    config: TrainingConfig,
    snapshot: Option<Arc<ImportanceSnapshot>>,
    use_ewc: bool,
}

impl<T: Topology> ContinualLearner<T> {
    pub fn new(model: Model<T>, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { model, config, snapshot: None, use_ewc: true })
    }

    /// Disable consolidation, e.g. to measure forgetting without EWC.
    pub fn without_ewc(mut self) -> Self {
        self.use_ewc = false;
        self
    }

    pub fn model(&self) -> &Model<T> {
        &self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Option<Arc<ImportanceSnapshot>> {
        self.snapshot.clone()
    }

    /// Train on `task` (regularized by the current snapshot, if any), then
    /// replace the snapshot with one estimated on this task's data.
    pub fn learn_task(
        &mut self,
        task: &Task,
        similarity: f32,
        progress: &mut dyn ProgressSink,
    ) -> Result<TaskReport> {
        let current = if self.use_ewc { self.snapshot.clone() } else { None };
        let regularization = current
            .as_deref()
            .map(|snapshot| Regularization { snapshot, similarity });
        info!(
            "Learning task '{}' ({} samples, ewc={})",
            task.name,
            task.len(),
            regularization.is_some()
        );

        let training = trainer::train(
            &mut self.model,
            &task.inputs,
            &task.targets,
            &self.config,
            regularization,
            progress,
        )?;

        let fresh = ewc::estimate(
            &self.model,
            &task.inputs,
            &task.targets,
            self.config.fisher_batch_size,
        )?;
        let stats = fresh.stats();
        self.snapshot = Some(Arc::new(fresh));

        Ok(TaskReport {
            task: task.name.clone(),
            regularized: regularization.is_some(),
            similarity: regularization.map(|r| r.similarity),
            training,
            snapshot: stats,
        })
    }

    /// Score the current model on every task, in order.
    pub fn evaluate_tasks(&self, tasks: &[Task]) -> Result<Vec<EvaluationResult>> {
        tasks
            .iter()
            .map(|task| {
                eval::evaluate(&self.model, &task.inputs, &task.targets, self.config.accuracy_average)
            })
            .collect()
    }
}
