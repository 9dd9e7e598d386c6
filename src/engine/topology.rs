//! Network topologies with explicit reverse-mode gradients
//!
//! A topology owns its parameters and knows how to push inputs forward and
//! gradients backward. It never touches optimizer state.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::params::{Gradients, ParameterSet};
use crate::error::{EwcError, Result};

/// Differentiable function of a batch of row-major inputs
pub trait Topology {
    fn parameters(&self) -> &ParameterSet;

    fn parameters_mut(&mut self) -> &mut ParameterSet;

    /// Batch forward pass, `[rows, input_dim] -> [rows, output_dim]`
    fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>>;

    /// Gradient of a scalar loss with respect to every parameter, given the
    /// gradient of that loss with respect to the forward output.
    fn backward(&self, input: &Array2<f32>, grad_output: &Array2<f32>) -> Result<Gradients>;

    fn input_dim(&self) -> usize;

    fn output_dim(&self) -> usize;
}

/// Element-wise (or row-wise for softmax) layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
    /// Row-wise softmax, for one-hot multiclass outputs
    Softmax,
}

impl Activation {
    fn apply(&self, z: Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Identity => z,
            Activation::Relu => z.mapv_into(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_into(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Softmax => {
                let mut out = z;
                for mut row in out.rows_mut() {
                    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
                out
            }
        }
    }

    /// Maps `dL/dy` to `dL/dz` using the layer output `y`.
    fn backward(&self, output: &Array2<f32>, grad: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Identity => grad.clone(),
            Activation::Relu => {
                let mut dz = grad.clone();
                dz.zip_mut_with(output, |g, &y| {
                    if y <= 0.0 {
                        *g = 0.0;
                    }
                });
                dz
            }
            Activation::Sigmoid => {
                let mut dz = grad.clone();
                dz.zip_mut_with(output, |g, &y| *g *= y * (1.0 - y));
                dz
            }
            Activation::Softmax => {
                let mut dz = grad.clone();
                for (mut g_row, y_row) in dz.rows_mut().into_iter().zip(output.rows()) {
                    let dot = g_row.dot(&y_row);
                    g_row.zip_mut_with(&y_row, |g, &y| *g = y * (*g - dot));
                }
                dz
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Layer {
    inputs: usize,
    outputs: usize,
    activation: Activation,
}

/// Fully connected feed-forward network.
///
/// Parameters are named `layer{i}.weight` (`[inputs, outputs]`) and
/// `layer{i}.bias` (`[outputs]`).
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<Layer>,
    params: ParameterSet,
}

impl Mlp {
    /// Build a network with Xavier-normal weights and zero biases.
    ///
    /// `sizes` lists the width of every layer including input and output;
    /// `hidden` is applied after each hidden layer and `output` after the last.
    pub fn new(sizes: &[usize], hidden: Activation, output: Activation, seed: u64) -> Result<Self> {
        if sizes.len() < 2 || sizes.iter().any(|&s| s == 0) {
            return Err(EwcError::config(format!("invalid layer sizes {:?}", sizes)));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(sizes.len() - 1);
        let mut params = ParameterSet::new();

        for (i, pair) in sizes.windows(2).enumerate() {
            let (inputs, outputs) = (pair[0], pair[1]);
            let scale = (2.0 / (inputs + outputs) as f32).sqrt();
            let normal = Normal::new(0.0, scale)
                .map_err(|e| EwcError::config(format!("weight init: {}", e)))?;
            let weight = Array2::from_shape_fn((inputs, outputs), |_| normal.sample(&mut rng));
            let activation = if i == sizes.len() - 2 { output } else { hidden };

            params.push(format!("layer{}.weight", i), weight.into_dyn());
            params.push(format!("layer{}.bias", i), Array1::<f32>::zeros(outputs).into_dyn());
            layers.push(Layer { inputs, outputs, activation });
        }

        Ok(Self { layers, params })
    }

    /// Build a network from explicit `(weight, bias, activation)` triples.
    pub fn from_layers(spec: Vec<(Array2<f32>, Array1<f32>, Activation)>) -> Result<Self> {
        if spec.is_empty() {
            return Err(EwcError::config("network needs at least one layer"));
        }
        let mut layers = Vec::with_capacity(spec.len());
        let mut params = ParameterSet::new();
        let mut expected_inputs = spec[0].0.nrows();

        for (i, (weight, bias, activation)) in spec.into_iter().enumerate() {
            let (inputs, outputs) = weight.dim();
            if inputs != expected_inputs || bias.len() != outputs {
                return Err(EwcError::config(format!(
                    "layer {} has weight {:?} and bias {}, expected {} inputs",
                    i,
                    weight.dim(),
                    bias.len(),
                    expected_inputs
                )));
            }
            expected_inputs = outputs;
            params.push(format!("layer{}.weight", i), weight.into_dyn());
            params.push(format!("layer{}.bias", i), bias.into_dyn());
            layers.push(Layer { inputs, outputs, activation });
        }

        Ok(Self { layers, params })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    fn layer_params(&self, index: usize) -> Result<(ArrayView2<'_, f32>, ArrayView1<'_, f32>)> {
        let mut iter = self.params.iter().skip(index * 2);
        let (weight, bias) = match (iter.next(), iter.next()) {
            (Some(w), Some(b)) => (w, b),
            _ => return Err(EwcError::config(format!("missing parameters for layer {}", index))),
        };
        let w = weight
            .value
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|e| EwcError::config(format!("{}: {}", weight.name, e)))?;
        let b = bias
            .value
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| EwcError::config(format!("{}: {}", bias.name, e)))?;
        Ok((w, b))
    }

    /// Forward pass keeping every layer's output; element 0 is the input.
    fn forward_cached(&self, input: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        if input.ncols() != self.input_dim() {
            return Err(EwcError::config(format!(
                "input has {} columns, network expects {}",
                input.ncols(),
                self.input_dim()
            )));
        }
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.clone());
        for (i, layer) in self.layers.iter().enumerate() {
            let (w, b) = self.layer_params(i)?;
            let z = activations[i].dot(&w) + &b;
            activations.push(layer.activation.apply(z));
        }
        Ok(activations)
    }
}

impl Topology for Mlp {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        let mut activations = self.forward_cached(input)?;
        activations
            .pop()
            .ok_or_else(|| EwcError::config("network has no layers"))
    }

    fn backward(&self, input: &Array2<f32>, grad_output: &Array2<f32>) -> Result<Gradients> {
        let activations = self.forward_cached(input)?;
        let last = &activations[activations.len() - 1];
        if grad_output.dim() != last.dim() {
            return Err(EwcError::config(format!(
                "output gradient {:?} does not match output {:?}",
                grad_output.dim(),
                last.dim()
            )));
        }

        let mut parts = Vec::with_capacity(self.layers.len() * 2);
        let mut delta = grad_output.clone();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let dz = layer.activation.backward(&activations[i + 1], &delta);
            let (w, _) = self.layer_params(i)?;
            let dw = activations[i].t().dot(&dz);
            let db = dz.sum_axis(Axis(0));
            delta = dz.dot(&w.t());
            parts.push((format!("layer{}.bias", i), db.into_dyn()));
            parts.push((format!("layer{}.weight", i), dw.into_dyn()));
        }
        parts.reverse();
        Ok(Gradients::from_parts(parts))
    }

    fn input_dim(&self) -> usize {
        self.layers.first().map(|l| l.inputs).unwrap_or(0)
    }

    fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.outputs).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, arr2};

    fn scalar_loss(net: &Mlp, x: &Array2<f32>) -> f32 {
        // Weighted sum so the output gradient is not uniform.
        let out = net.forward(x).unwrap();
        out.indexed_iter()
            .map(|((r, c), v)| v * (1.0 + r as f32 + 0.5 * c as f32))
            .sum()
    }

    #[test]
    fn test_identity_layer_passes_through() {
        let net = Mlp::from_layers(vec![(arr2(&[[1.0]]), arr1(&[0.0]), Activation::Identity)])
            .unwrap();
        let x = arr2(&[[0.9f32], [0.3], [0.6]]);
        assert_eq!(net.forward(&x).unwrap(), x);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let net = Mlp::new(&[3, 5, 4], Activation::Relu, Activation::Softmax, 7).unwrap();
        let x = arr2(&[[0.1f32, -0.2, 0.3], [1.0, 2.0, -1.0]]);
        let out = net.forward(&x).unwrap();
        assert_eq!(out.dim(), (2, 4));
        for row in out.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        for output in [Activation::Sigmoid, Activation::Softmax, Activation::Identity] {
            let net = Mlp::new(&[3, 4, 2], Activation::Sigmoid, output, 11).unwrap();
            let x = arr2(&[[0.5f32, -1.0, 0.25], [0.1, 0.2, 0.3]]);
            let out = net.forward(&x).unwrap();
            let grad_out = Array2::from_shape_fn(out.dim(), |(r, c)| 1.0 + r as f32 + 0.5 * c as f32);
            let grads = net.backward(&x, &grad_out).unwrap();

            let eps = 1e-2f32;
            for (name, analytic) in grads.iter() {
                for (idx, &g) in analytic.indexed_iter() {
                    let mut plus = net.clone();
                    plus.parameters_mut().get_mut(name).unwrap().value[&idx] += eps;
                    let mut minus = net.clone();
                    minus.parameters_mut().get_mut(name).unwrap().value[&idx] -= eps;
                    let numeric = (scalar_loss(&plus, &x) - scalar_loss(&minus, &x)) / (2.0 * eps);
                    assert_abs_diff_eq!(g, numeric, epsilon = 2e-2);
                }
            }
        }
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(Mlp::new(&[3], Activation::Relu, Activation::Sigmoid, 0).is_err());
        assert!(Mlp::new(&[3, 0, 1], Activation::Relu, Activation::Sigmoid, 0).is_err());

        let net = Mlp::new(&[3, 1], Activation::Relu, Activation::Sigmoid, 0).unwrap();
        assert!(net.forward(&arr2(&[[1.0f32, 2.0]])).is_err());

        let bad = Mlp::from_layers(vec![
            (arr2(&[[1.0, 2.0]]), arr1(&[0.0, 0.0]), Activation::Relu),
            (arr2(&[[1.0]]), arr1(&[0.0]), Activation::Identity),
        ]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = Mlp::new(&[4, 8, 1], Activation::Relu, Activation::Sigmoid, 3).unwrap();
        let b = Mlp::new(&[4, 8, 1], Activation::Relu, Activation::Sigmoid, 3).unwrap();
        for (pa, pb) in a.parameters().iter().zip(b.parameters().iter()) {
            assert_eq!(pa.value, pb.value);
        }
        assert_eq!(a.depth(), 2);
        assert_eq!(a.parameters().element_count(), 4 * 8 + 8 + 8 + 1);
    }
}
