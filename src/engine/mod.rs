//! Differentiable computation engine: parameters, forward/backward passes,
//! losses and the Adam optimizer

pub mod loss;
pub mod model;
pub mod optimizer;
pub mod params;
pub mod topology;

pub use loss::Loss;
pub use model::Model;
pub use optimizer::{Adam, AdamConfig};
pub use params::{Gradients, Parameter, ParameterSet};
pub use topology::{Activation, Mlp, Topology};
