//! Continual learning: EWC consolidation, training loop and task sequencing

pub mod continual;
pub mod ewc;
pub mod trainer;
