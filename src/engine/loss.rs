//! Loss functions with unreduced and mean-reduced forms

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EwcError, Result};

/// Probabilities are clamped to `[PROB_EPS, 1 - PROB_EPS]` before taking logs.
const PROB_EPS: f32 = 1e-7;

/// Supported losses.
///
/// `BinaryCrossEntropy` and `CrossEntropy` take probabilities (sigmoid or
/// softmax outputs), not logits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Loss {
    MeanSquared,
    BinaryCrossEntropy,
    CrossEntropy,
}

fn check_shapes(pred: &Array2<f32>, target: &Array2<f32>) -> Result<()> {
    if pred.dim() != target.dim() {
        return Err(EwcError::config(format!(
            "prediction {:?} and target {:?} differ in shape",
            pred.dim(),
            target.dim()
        )));
    }
    if pred.nrows() == 0 || pred.ncols() == 0 {
        return Err(EwcError::config("loss over an empty batch"));
    }
    Ok(())
}

impl Loss {
    /// One loss value per row. Element-wise losses are averaged over the
    /// columns of their row; cross entropy is summed over classes.
    pub fn per_sample(&self, pred: &Array2<f32>, target: &Array2<f32>) -> Result<Array1<f32>> {
        check_shapes(pred, target)?;
        let mut elementwise = pred.clone();
        match self {
            Loss::MeanSquared => {
                elementwise.zip_mut_with(target, |p, &t| *p = (*p - t).powi(2));
            }
            Loss::BinaryCrossEntropy => {
                elementwise.zip_mut_with(target, |p, &t| {
                    let q = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                    *p = -(t * q.ln() + (1.0 - t) * (1.0 - q).ln());
                });
            }
            Loss::CrossEntropy => {
                elementwise.zip_mut_with(target, |p, &t| {
                    *p = -t * p.clamp(PROB_EPS, 1.0).ln();
                });
                return Ok(elementwise.sum_axis(Axis(1)));
            }
        }
        let cols = pred.ncols() as f32;
        Ok(elementwise.sum_axis(Axis(1)) / cols)
    }

    /// Mean of `per_sample` over the batch
    pub fn reduced(&self, pred: &Array2<f32>, target: &Array2<f32>) -> Result<f32> {
        let per_sample = self.per_sample(pred, target)?;
        Ok(per_sample.sum() / per_sample.len() as f32)
    }

    /// Gradient of `reduced` with respect to `pred`
    pub fn gradient(&self, pred: &Array2<f32>, target: &Array2<f32>) -> Result<Array2<f32>> {
        check_shapes(pred, target)?;
        let rows = pred.nrows() as f32;
        let cols = pred.ncols() as f32;
        let mut grad = pred.clone();
        match self {
            Loss::MeanSquared => {
                let scale = 2.0 / (rows * cols);
                grad.zip_mut_with(target, |p, &t| *p = scale * (*p - t));
            }
            Loss::BinaryCrossEntropy => {
                let scale = 1.0 / (rows * cols);
                grad.zip_mut_with(target, |p, &t| {
                    let q = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
                    *p = scale * (q - t) / (q * (1.0 - q));
                });
            }
            Loss::CrossEntropy => {
                let scale = 1.0 / rows;
                grad.zip_mut_with(target, |p, &t| {
                    *p = -scale * t / p.clamp(PROB_EPS, 1.0);
                });
            }
        }
        Ok(grad)
    }
}
