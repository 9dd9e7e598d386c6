//! Adam optimizer with a fixed learning rate

use ndarray::{ArrayD, Zip};

use super::params::{Gradients, ParameterSet};
use crate::core::config::TrainingConfig;
use crate::error::{EwcError, Result};

/// Adam hyperparameters
#[derive(Clone, Debug)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            learning_rate: 0.0001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl From<&TrainingConfig> for AdamConfig {
    fn from(config: &TrainingConfig) -> Self {
        AdamConfig {
            learning_rate: config.learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            eps: config.epsilon,
        }
    }
}

/// Moment buffers for one parameter tensor
#[derive(Clone, Debug)]
struct MomentBuf {
    m: ArrayD<f32>,
    v: ArrayD<f32>,
}

/// Adaptive moment estimation. Bias correction uses the global step count.
#[derive(Clone, Debug)]
pub struct Adam {
    pub config: AdamConfig,
    bufs: Vec<MomentBuf>,
    step: u64,
}

impl Adam {
    /// Create optimizer state shaped after `params`.
    pub fn new(params: &ParameterSet, config: AdamConfig) -> Self {
        let bufs = params
            .iter()
            .map(|p| MomentBuf {
                m: ArrayD::zeros(p.value.raw_dim()),
                v: ArrayD::zeros(p.value.raw_dim()),
            })
            .collect();
        Self { config, bufs, step: 0 }
    }

    /// Apply one update to every parameter.
    pub fn step(&mut self, params: &mut ParameterSet, grads: &Gradients) -> Result<()> {
        if params.len() != self.bufs.len() || grads.len() != self.bufs.len() {
            return Err(EwcError::config(format!(
                "optimizer tracks {} tensors, got {} parameters and {} gradients",
                self.bufs.len(),
                params.len(),
                grads.len()
            )));
        }
        for ((p, (name, g)), buf) in params.iter().zip(grads.iter()).zip(self.bufs.iter()) {
            if p.name != name || p.value.shape() != g.shape() || buf.m.shape() != g.shape() {
                return Err(EwcError::config(format!(
                    "gradient {} {:?} does not match parameter {} {:?}",
                    name,
                    g.shape(),
                    p.name,
                    p.value.shape()
                )));
            }
        }

        self.step += 1;
        let AdamConfig { learning_rate: lr, beta1, beta2, eps } = self.config;
        let bc1_inv = 1.0 / (1.0 - beta1.powi(self.step as i32));
        let bc2_inv = 1.0 / (1.0 - beta2.powi(self.step as i32));

        for ((p, (_, g)), buf) in params.iter_mut().zip(grads.iter()).zip(self.bufs.iter_mut()) {
            Zip::from(&mut p.value)
                .and(g)
                .and(&mut buf.m)
                .and(&mut buf.v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m * bc1_inv;
                    let v_hat = *v * bc2_inv;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
        Ok(())
    }

    /// Number of updates applied so far
    pub fn step_count(&self) -> u64 {
        self.step
    }
}
