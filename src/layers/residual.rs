use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::activation::activation::ActivationFunction;
use crate::error::TensorError;
use crate::layers::conv2d::Conv2d;
use crate::math::tensor::{Shape, Tensor3};

/// Two 3×3 convolutions with an additive shortcut:
/// `relu(conv2(relu(conv1(x))) + shortcut(x))`.
///
/// The shortcut is a strided 1×1 convolution whenever the block changes the
/// channel count or the resolution, and the identity otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    pub conv1: Conv2d,
    pub conv2: Conv2d,
    pub downsample: Option<Conv2d>,
}

/// Intermediate values of one block evaluation.
struct Trace {
    h1: Tensor3,
    a1: Tensor3,
    pre: Tensor3,
}

impl BasicBlock {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, rng: &mut StdRng) -> BasicBlock {
        let conv1 = Conv2d::new(in_channels, out_channels, 3, stride, 1, rng);
        let conv2 = Conv2d::new(out_channels, out_channels, 3, 1, 1, rng);
        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Conv2d::new(in_channels, out_channels, 1, stride, 0, rng))
        } else {
            None
        };
        BasicBlock { conv1, conv2, downsample }
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        self.conv1.validate()?;
        self.conv2.validate()?;
        if let Some(ds) = &self.downsample {
            ds.validate()?;
        }
        Ok(())
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        let main = self.conv2.output_shape(self.conv1.output_shape(input)?)?;
        let shortcut = match &self.downsample {
            Some(ds) => ds.output_shape(input)?,
            None => input,
        };
        if shortcut != main {
            return Err(TensorError::ShapeMismatch { expected: main, got: shortcut });
        }
        Ok(main)
    }

    fn trace(&self, input: &Tensor3) -> Result<Trace, TensorError> {
        let relu = ActivationFunction::ReLU;
        let h1 = self.conv1.forward(input)?;
        let a1 = relu.forward(&h1);
        let h2 = self.conv2.forward(&a1)?;
        let shortcut = match &self.downsample {
            Some(ds) => ds.forward(input)?,
            None => input.clone(),
        };
        let pre = h2.zip_map(&shortcut, |a, b| a + b)?;
        Ok(Trace { h1, a1, pre })
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        let trace = self.trace(input)?;
        Ok(ActivationFunction::ReLU.forward(&trace.pre))
    }

    /// Recomputes the block's intermediates from `input`, then propagates
    /// `grad_output` through both branches and sums them.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        let relu = ActivationFunction::ReLU;
        let trace = self.trace(input)?;

        let grad_pre = relu.backward(&trace.pre, grad_output)?;
        let grad_a1 = self.conv2.backward(&trace.a1, &grad_pre)?;
        let grad_h1 = relu.backward(&trace.h1, &grad_a1)?;
        let mut grad_input = self.conv1.backward(input, &grad_h1)?;

        let grad_shortcut = match &self.downsample {
            Some(ds) => ds.backward(input, &grad_pre)?,
            None => grad_pre,
        };
        grad_input.accumulate(&grad_shortcut)?;
        Ok(grad_input)
    }
}
