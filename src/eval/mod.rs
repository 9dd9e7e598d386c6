//! Evaluation of trained models

pub mod evaluator;
pub mod metrics;

pub use evaluator::{evaluate, get_loss, high_loss_indices, EvaluationResult, F1Score, OutputMode};
pub use metrics::column_f1;
