//! Trainable model: topology, loss, optimizer state and gradient buffers

use ndarray::Array2;

use super::loss::Loss;
use super::optimizer::{Adam, AdamConfig};
use super::params::{Gradients, ParameterSet};
use super::topology::Topology;
use crate::core::config::TrainingConfig;
use crate::error::{EwcError, Result};

/// Everything one training run mutates, bundled explicitly
pub struct Model<T: Topology> {
    topology: T,
    loss: Loss,
    optimizer: Adam,
    grads: Gradients,
}

pub(crate) fn check_rows(inputs: &Array2<f32>, targets: &Array2<f32>) -> Result<()> {
    if inputs.nrows() != targets.nrows() {
        return Err(EwcError::config(format!(
            "{} input rows but {} target rows",
            inputs.nrows(),
            targets.nrows()
        )));
    }
    Ok(())
}

impl<T: Topology> Model<T> {
    pub fn new(topology: T, loss: Loss, config: &TrainingConfig) -> Self {
        let optimizer = Adam::new(topology.parameters(), AdamConfig::from(config));
        let grads = Gradients::zeros_like(topology.parameters());
        Self { topology, loss, optimizer, grads }
    }

    pub fn parameters(&self) -> &ParameterSet {
        self.topology.parameters()
    }

    /// Direct parameter access, bypassing the optimizer
    pub fn parameters_mut(&mut self) -> &mut ParameterSet {
        self.topology.parameters_mut()
    }

    pub fn loss_fn(&self) -> Loss {
        self.loss
    }

    /// Forward pass without touching gradients or optimizer state
    pub fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        self.topology.forward(inputs)
    }

    /// Mean loss over the batch and its parameter gradients. Does not
    /// accumulate into the model's buffers.
    pub fn loss_and_gradients(
        &self,
        inputs: &Array2<f32>,
        targets: &Array2<f32>,
    ) -> Result<(f32, Gradients)> {
        check_rows(inputs, targets)?;
        let pred = self.topology.forward(inputs)?;
        let loss = self.loss.reduced(&pred, targets)?;
        let grad_output = self.loss.gradient(&pred, targets)?;
        let grads = self.topology.backward(inputs, &grad_output)?;
        Ok((loss, grads))
    }

    /// Add `grads` into the accumulated gradient buffers.
    pub fn backward(&mut self, grads: &Gradients) -> Result<()> {
        self.grads.accumulate(grads)
    }

    pub fn zero_grad(&mut self) {
        self.grads.fill_zero();
    }

    /// One optimizer update from the accumulated gradients
    pub fn step(&mut self) -> Result<()> {
        self.optimizer.step(self.topology.parameters_mut(), &self.grads)
    }

    pub fn gradients(&self) -> &Gradients {
        &self.grads
    }

    pub fn step_count(&self) -> u64 {
        self.optimizer.step_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::topology::{Activation, Mlp};
    use ndarray::{arr1, arr2};

    fn linear_model() -> Model<Mlp> {
        let net = Mlp::from_layers(vec![(arr2(&[[0.5]]), arr1(&[0.0]), Activation::Identity)])
            .unwrap();
        Model::new(net, Loss::MeanSquared, &TrainingConfig::default())
    }

    #[test]
    fn test_gradients_are_not_accumulated_implicitly() {
        let model = linear_model();
        let x = arr2(&[[1.0f32], [2.0]]);
        let y = arr2(&[[1.0f32], [1.0]]);
        let (loss, grads) = model.loss_and_gradients(&x, &y).unwrap();
        // pred = [0.5, 1.0], errors = [-0.5, 0.0]
        assert!((loss - 0.125).abs() < 1e-6);
        assert!((grads.get("layer0.weight").unwrap()[[0, 0]] + 0.5).abs() < 1e-6);
        assert_eq!(model.gradients().l2_norm(), 0.0);
    }

    #[test]
    fn test_backward_step_and_zero_grad() {
        let mut model = linear_model();
        let x = arr2(&[[1.0f32]]);
        let y = arr2(&[[2.0f32]]);
        let (_, grads) = model.loss_and_gradients(&x, &y).unwrap();
        model.backward(&grads).unwrap();
        model.backward(&grads).unwrap();
        assert!((model.gradients().l2_norm() - 2.0 * grads.l2_norm()).abs() < 1e-5);

        let before = model.parameters().get("layer0.weight").unwrap().value[[0, 0]];
        model.step().unwrap();
        let after = model.parameters().get("layer0.weight").unwrap().value[[0, 0]];
        assert!(after > before);
        assert_eq!(model.step_count(), 1);

        model.zero_grad();
        assert_eq!(model.gradients().l2_norm(), 0.0);
    }

    #[test]
    fn test_row_mismatch() {
        let model = linear_model();
        let x = arr2(&[[1.0f32], [2.0]]);
        let y = arr2(&[[1.0f32]]);
        assert!(model.loss_and_gradients(&x, &y).is_err());
    }
}
