//! EWC Classifier
//!
//! Trains a neural network classifier across a sequence of tasks while
//! limiting catastrophic forgetting with Elastic Weight Consolidation.
//!
//! ## Features
//!
//! - **Importance Estimation**: diagonal Fisher information from averaged squared gradients
//! - **Quadratic Penalty**: pulls important parameters toward the previous task's optimum
//! - **Similarity Scaling**: penalty strength follows a caller-supplied task similarity
//! - **Evaluation**: binary and multiclass accuracy, per-class F1, per-sample losses
//! - **Self-contained Engine**: dense networks with explicit backprop and Adam
//!
//! ## Usage
//!
//! ```ignore
//! let config = TrainingConfig::default();
//! let net = Mlp::new(&[4, 16, 1], Activation::Relu, Activation::Sigmoid, config.seed)?;
//! let mut learner = ContinualLearner::new(Model::new(net, Loss::BinaryCrossEntropy, &config), config)?;
//! learner.learn_task(&task_a, 1.0, &mut TracingProgress)?;
//! learner.learn_task(&task_b, 0.7, &mut TracingProgress)?;
//! let scores = learner.evaluate_tasks(&[task_a, task_b])?;
//! ```

pub mod core;
pub mod data;
pub mod engine;
pub mod error;
pub mod eval;
pub mod neural;

// Re-exports
pub use crate::core::config::{AccuracyAverage, PenaltyReduction, TrainingConfig};
pub use data::{SyntheticConfig, SyntheticTaskGenerator};
pub use engine::{Activation, Loss, Mlp, Model, Topology};
pub use error::{EwcError, Result};
pub use eval::{column_f1, evaluate, get_loss, high_loss_indices, EvaluationResult, F1Score, OutputMode};
pub use neural::continual::{ContinualLearner, Task, TaskReport};
pub use neural::ewc::{estimate, penalty, ImportanceSnapshot};
pub use neural::trainer::{train, NullProgress, ProgressSink, Regularization, TracingProgress};
