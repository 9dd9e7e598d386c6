//! Datasets for experiments

pub mod synthetic;

pub use synthetic::{rotation_similarity, SyntheticConfig, SyntheticTaskGenerator};
