use serde::{Serialize, Deserialize};
use std::f64::consts::E;

use crate::error::TensorError;
use crate::math::tensor::Tensor3;

/// Element-wise nonlinearity applied between weighted layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLU,
    LeakyReLU { alpha: f64 },
    Sigmoid,
    Tanh,
    Identity,
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::Identity => x,
        }
    }

    /// Derivative evaluated at the pre-activation value `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::Identity => 1.0,
        }
    }

    pub fn forward(&self, input: &Tensor3) -> Tensor3 {
        input.map(|x| self.function(x))
    }

    /// Gradient w.r.t. the activation's input: `grad_output ⊙ σ'(input)`.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        input.zip_map(grad_output, |x, g| g * self.derivative(x))
    }
}
