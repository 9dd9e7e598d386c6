//! Configuration for training and consolidation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EwcError, Result};

/// How the per-element EWC terms are reduced to a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyReduction {
    /// Sum divided by the total number of parameter elements
    #[default]
    Mean,
    Sum,
}

/// Averaging used by multiclass accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyAverage {
    /// Fraction of rows whose predicted class matches the target
    #[default]
    Micro,
    /// Mean per-class recall over classes seen in predictions or targets
    Macro,
}

/// Main training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Adam learning rate
    pub learning_rate: f32,

    /// Adam first moment decay
    pub beta1: f32,

    /// Adam second moment decay
    pub beta2: f32,

    /// Adam denominator epsilon
    pub epsilon: f32,

    /// Strength of the EWC term relative to the task loss
    pub penalty_weight: f32,

    pub penalty_reduction: PenaltyReduction,

    /// Inclusive bounds accepted for the task similarity scalar
    pub similarity_range: (f32, f32),

    /// Full passes over the training set
    pub epochs: usize,

    /// Rows per training step
    pub batch_size: usize,

    /// Rows per gradient when estimating importance (1 = per-sample Fisher)
    pub fisher_batch_size: usize,

    pub accuracy_average: AccuracyAverage,

    /// Seed for weight initialisation and synthetic data
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.0001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            penalty_weight: 2000.0,
            penalty_reduction: PenaltyReduction::Mean,
            similarity_range: (0.0, 1.0),
            epochs: 10,
            batch_size: 32,
            fisher_batch_size: 1,
            accuracy_average: AccuracyAverage::Micro,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(EwcError::config("epochs must be at least 1"));
        }
        if self.batch_size == 0 || self.fisher_batch_size == 0 {
            return Err(EwcError::config("batch sizes must be at least 1"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(EwcError::config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.penalty_weight >= 0.0) {
            return Err(EwcError::config(format!(
                "penalty weight must be non-negative, got {}",
                self.penalty_weight
            )));
        }
        let (lo, hi) = self.similarity_range;
        if !(lo <= hi) {
            return Err(EwcError::config(format!(
                "similarity range [{}, {}] is empty",
                lo, hi
            )));
        }
        Ok(())
    }

    /// Rejects a similarity scalar outside `similarity_range`.
    pub fn check_similarity(&self, similarity: f32) -> Result<f32> {
        let (lo, hi) = self.similarity_range;
        if similarity.is_finite() && similarity >= lo && similarity <= hi {
            Ok(similarity)
        } else {
            Err(EwcError::config(format!(
                "similarity {} outside [{}, {}]",
                similarity, lo, hi
            )))
        }
    }
}
