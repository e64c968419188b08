use serde::{Deserialize, Serialize};
use std::fmt;

use crate::activation::activation::ActivationFunction;
use crate::error::TensorError;
use crate::layers::conv2d::Conv2d;
use crate::layers::dense::Linear;
use crate::layers::pool::{GlobalAvgPool, MaxPool2d};
use crate::layers::residual::BasicBlock;
use crate::math::tensor::{Shape, Tensor3};

/// The operation a layer performs, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Conv2d,
    Activation,
    MaxPool2d,
    GlobalAvgPool,
    Linear,
    Residual,
}

impl LayerKind {
    /// True for layers whose output is produced by a convolution, including
    /// residual blocks, which end in one.
    pub fn is_convolutional(self) -> bool {
        matches!(self, LayerKind::Conv2d | LayerKind::Residual)
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Conv2d => "Conv2d",
            LayerKind::Activation => "Activation",
            LayerKind::MaxPool2d => "MaxPool2d",
            LayerKind::GlobalAvgPool => "GlobalAvgPool",
            LayerKind::Linear => "Linear",
            LayerKind::Residual => "BasicBlock",
        };
        f.write_str(name)
    }
}

/// One step of a `Network`, with its trained parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Layer {
    Conv2d(Conv2d),
    Activation { function: ActivationFunction },
    MaxPool2d(MaxPool2d),
    GlobalAvgPool,
    Linear(Linear),
    Residual(BasicBlock),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Conv2d(_) => LayerKind::Conv2d,
            Layer::Activation { .. } => LayerKind::Activation,
            Layer::MaxPool2d(_) => LayerKind::MaxPool2d,
            Layer::GlobalAvgPool => LayerKind::GlobalAvgPool,
            Layer::Linear(_) => LayerKind::Linear,
            Layer::Residual(_) => LayerKind::Residual,
        }
    }

    pub fn validate(&self) -> Result<(), TensorError> {
        match self {
            Layer::Conv2d(conv) => conv.validate(),
            Layer::Linear(linear) => linear.validate(),
            Layer::Residual(block) => block.validate(),
            _ => Ok(()),
        }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        match self {
            Layer::Conv2d(conv) => conv.output_shape(input),
            Layer::Activation { .. } => Ok(input),
            Layer::MaxPool2d(pool) => pool.output_shape(input),
            Layer::GlobalAvgPool => GlobalAvgPool.output_shape(input),
            Layer::Linear(linear) => linear.output_shape(input),
            Layer::Residual(block) => block.output_shape(input),
        }
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        match self {
            Layer::Conv2d(conv) => conv.forward(input),
            Layer::Activation { function } => Ok(function.forward(input)),
            Layer::MaxPool2d(pool) => pool.forward(input),
            Layer::GlobalAvgPool => GlobalAvgPool.forward(input),
            Layer::Linear(linear) => linear.forward(input),
            Layer::Residual(block) => block.forward(input),
        }
    }

    /// Gradient w.r.t. this layer's input. `input` is the value the layer saw
    /// during the matching forward pass.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        match self {
            Layer::Conv2d(conv) => conv.backward(input, grad_output),
            Layer::Activation { function } => function.backward(input, grad_output),
            Layer::MaxPool2d(pool) => pool.backward(input, grad_output),
            Layer::GlobalAvgPool => GlobalAvgPool.backward(input, grad_output),
            Layer::Linear(linear) => linear.backward(input, grad_output),
            Layer::Residual(block) => block.backward(input, grad_output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_round_trip_through_tagged_json() {
        let layer = Layer::Activation { function: ActivationFunction::LeakyReLU { alpha: 0.01 } };
        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains("\"type\":\"Activation\""));
        let back: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind(), LayerKind::Activation);

        let pool: Layer = serde_json::from_str(r#"{"type":"GlobalAvgPool"}"#).unwrap();
        assert_eq!(pool.kind(), LayerKind::GlobalAvgPool);
    }
}
