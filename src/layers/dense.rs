use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::TensorError;
use crate::math::init::{he_normal, small_uniform};
use crate::math::tensor::{Shape, Tensor3};

/// Fully connected layer. The input is flattened channel-major, so a
/// `C×H×W` feature map feeds `C*H*W` inputs; the output is a `N×1×1` vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    /// Row-major `[out][in]`.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, rng: &mut StdRng) -> Linear {
        Linear {
            in_features,
            out_features,
            weights: he_normal(in_features * out_features, in_features, rng),
            biases: small_uniform(out_features, rng),
        }
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        if self.weights.len() != self.in_features * self.out_features
            || self.biases.len() != self.out_features
        {
            return Err(TensorError::InvalidDimensions(format!(
                "linear expects {} weights and {} biases, found {} and {}",
                self.in_features * self.out_features,
                self.out_features,
                self.weights.len(),
                self.biases.len()
            )));
        }
        Ok(())
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        if input.len() != self.in_features {
            return Err(TensorError::InvalidDimensions(format!(
                "linear layer expects {} inputs, got {} ({})",
                self.in_features,
                input.len(),
                input
            )));
        }
        Ok(Shape::vector(self.out_features))
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        let data = (0..self.out_features)
            .map(|o| {
                let row = &self.weights[o * self.in_features..(o + 1) * self.in_features];
                self.biases[o] + row.iter().zip(input.data.iter()).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect();
        Tensor3::from_data(out_shape, data)
    }

    /// Gradient w.r.t. the (unflattened) input: `Wᵀ · grad_output`.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        grad_output.ensure_shape(self.output_shape(input.shape)?)?;
        let mut grad_input = Tensor3::zeros(input.shape);
        for (o, &g) in grad_output.data.iter().enumerate() {
            if g == 0.0 {
                continue;
            }
            let row = &self.weights[o * self.in_features..(o + 1) * self.in_features];
            for (gi, w) in grad_input.data.iter_mut().zip(row.iter()) {
                *gi += w * g;
            }
        }
        Ok(grad_input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> Linear {
        Linear {
            in_features: 2,
            out_features: 2,
            weights: vec![1.0, 2.0, -1.0, 0.5],
            biases: vec![0.0, 1.0],
        }
    }

    #[test]
    fn forward_flattens_feature_map() {
        let input = Tensor3::from_data(Shape::new(2, 1, 1), vec![3.0, 4.0]).unwrap();
        let out = layer().forward(&input).unwrap();
        assert_eq!(out.shape, Shape::vector(2));
        assert_eq!(out.data, vec![11.0, 0.0]);
    }

    #[test]
    fn backward_is_transpose_product() {
        let input = Tensor3::zeros(Shape::new(1, 1, 2));
        let grad = Tensor3::from_data(Shape::vector(2), vec![1.0, 2.0]).unwrap();
        let gi = layer().backward(&input, &grad).unwrap();
        assert_eq!(gi.shape, Shape::new(1, 1, 2));
        assert_eq!(gi.data, vec![-1.0, 3.0]);
    }
}
