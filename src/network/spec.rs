use rand::rngs::StdRng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{ModelError, TensorError};
use crate::layers::{BasicBlock, Conv2d, Layer, Linear, MaxPool2d};
use crate::math::tensor::Shape;
use crate::network::metadata::ModelMetadata;

fn default_stride() -> usize {
    1
}

/// Describes one layer in a network specification.
///
/// Input channel and feature counts are not stored: they are inferred from
/// the shape flowing out of the previous layer when the network is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerSpec {
    Conv2d {
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: usize,
    },
    Activation {
        function: ActivationFunction,
    },
    MaxPool2d {
        kernel_size: usize,
        stride: usize,
    },
    GlobalAvgPool,
    Linear {
        out_features: usize,
    },
    /// Residual basic block (two 3×3 convolutions plus shortcut).
    Residual {
        out_channels: usize,
        #[serde(default = "default_stride")]
        stride: usize,
    },
}

impl LayerSpec {
    /// Instantiates the layer for an input of shape `input`, drawing initial
    /// parameters from `rng`.
    pub fn build(&self, input: Shape, rng: &mut StdRng) -> Result<Layer, TensorError> {
        let layer = match *self {
            LayerSpec::Conv2d { out_channels, kernel_size, stride, padding } => Layer::Conv2d(
                Conv2d::new(input.channels, out_channels, kernel_size, stride, padding, rng),
            ),
            LayerSpec::Activation { function } => Layer::Activation { function },
            LayerSpec::MaxPool2d { kernel_size, stride } => {
                Layer::MaxPool2d(MaxPool2d::new(kernel_size, stride))
            }
            LayerSpec::GlobalAvgPool => Layer::GlobalAvgPool,
            LayerSpec::Linear { out_features } => {
                Layer::Linear(Linear::new(input.len(), out_features, rng))
            }
            LayerSpec::Residual { out_channels, stride } => {
                Layer::Residual(BasicBlock::new(input.channels, out_channels, stride, rng))
            }
        };
        layer.validate()?;
        Ok(layer)
    }
}

/// A named top-level group of layers (`features`, `layer4`, `head`, ...).
/// Layer names are `<block>.<index>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    pub name: String,
    pub layers: Vec<LayerSpec>,
}

impl BlockSpec {
    pub fn new(name: impl Into<String>, layers: Vec<LayerSpec>) -> BlockSpec {
        BlockSpec { name: name.into(), layers }
    }
}

/// A fully serializable description of a network architecture plus optional
/// metadata.
///
/// `NetworkSpec` can be saved to / loaded from JSON independently of the
/// weights; `Network::from_spec` turns it into a runnable model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as the model file stem.
    pub name: String,
    pub input_shape: Shape,
    /// Ordered list of blocks (input → output).
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

/// Names accepted by [`NetworkSpec::preset`].
pub const PRESETS: [&str; 4] = ["features", "residual", "plain", "dense"];

impl NetworkSpec {
    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<(), ModelError> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> Result<NetworkSpec, ModelError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Looks up one of the built-in architectures by name (see [`PRESETS`]).
    pub fn preset(name: &str, input_shape: Shape, num_classes: usize) -> Option<NetworkSpec> {
        match name {
            "features" => Some(NetworkSpec::sequential_features(input_shape, num_classes)),
            "residual" => Some(NetworkSpec::residual(input_shape, num_classes)),
            "plain" => Some(NetworkSpec::plain_conv(input_shape, num_classes)),
            "dense" => Some(NetworkSpec::dense_only(input_shape, num_classes)),
            _ => None,
        }
    }

    /// VGG-like: a `features` block of conv/ReLU/pool stages and a pooled
    /// linear `classifier` block.
    pub fn sequential_features(input_shape: Shape, num_classes: usize) -> NetworkSpec {
        NetworkSpec {
            name: "sequential_features".into(),
            input_shape,
            blocks: vec![
                BlockSpec::new("features", vec![
                    LayerSpec::Conv2d { out_channels: 8, kernel_size: 3, stride: 2, padding: 1 },
                    relu(),
                    LayerSpec::MaxPool2d { kernel_size: 2, stride: 2 },
                    LayerSpec::Conv2d { out_channels: 16, kernel_size: 3, stride: 1, padding: 1 },
                    relu(),
                    LayerSpec::MaxPool2d { kernel_size: 2, stride: 2 },
                ]),
                BlockSpec::new("classifier", vec![
                    LayerSpec::GlobalAvgPool,
                    LayerSpec::Linear { out_features: num_classes },
                ]),
            ],
            metadata: None,
        }
    }

    /// ResNet-like: strided stem, four residual stages `layer1`..`layer4`,
    /// pooled linear `fc` head.
    pub fn residual(input_shape: Shape, num_classes: usize) -> NetworkSpec {
        NetworkSpec {
            name: "residual".into(),
            input_shape,
            blocks: vec![
                BlockSpec::new("stem", vec![
                    LayerSpec::Conv2d { out_channels: 8, kernel_size: 3, stride: 2, padding: 1 },
                    relu(),
                    LayerSpec::MaxPool2d { kernel_size: 2, stride: 2 },
                ]),
                BlockSpec::new("layer1", vec![LayerSpec::Residual { out_channels: 8, stride: 1 }]),
                BlockSpec::new("layer2", vec![LayerSpec::Residual { out_channels: 12, stride: 2 }]),
                BlockSpec::new("layer3", vec![LayerSpec::Residual { out_channels: 16, stride: 2 }]),
                BlockSpec::new("layer4", vec![
                    LayerSpec::Residual { out_channels: 16, stride: 2 },
                    LayerSpec::Residual { out_channels: 16, stride: 1 },
                ]),
                BlockSpec::new("fc", vec![
                    LayerSpec::GlobalAvgPool,
                    LayerSpec::Linear { out_features: num_classes },
                ]),
            ],
            metadata: None,
        }
    }

    /// Convolutions without any conventionally named block.
    pub fn plain_conv(input_shape: Shape, num_classes: usize) -> NetworkSpec {
        NetworkSpec {
            name: "plain_conv".into(),
            input_shape,
            blocks: vec![
                BlockSpec::new("body", vec![
                    LayerSpec::Conv2d { out_channels: 6, kernel_size: 3, stride: 2, padding: 1 },
                    relu(),
                    LayerSpec::Conv2d { out_channels: 12, kernel_size: 3, stride: 2, padding: 1 },
                    relu(),
                ]),
                BlockSpec::new("head", vec![
                    LayerSpec::GlobalAvgPool,
                    LayerSpec::Linear { out_features: num_classes },
                ]),
            ],
            metadata: None,
        }
    }

    /// A multilayer perceptron over the flattened image; has no spatial
    /// layer at all.
    pub fn dense_only(input_shape: Shape, num_classes: usize) -> NetworkSpec {
        NetworkSpec {
            name: "dense_only".into(),
            input_shape,
            blocks: vec![BlockSpec::new("head", vec![
                LayerSpec::Linear { out_features: 16 },
                LayerSpec::Activation { function: ActivationFunction::Tanh },
                LayerSpec::Linear { out_features: num_classes },
            ])],
            metadata: None,
        }
    }
}

fn relu() -> LayerSpec {
    LayerSpec::Activation { function: ActivationFunction::ReLU }
}
