use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::tensor::Shape;

/// Errors raised by tensor construction and element-wise arithmetic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    #[error("data length {got} does not match shape {shape} ({expected} elements)")]
    LengthMismatch { shape: Shape, expected: usize, got: usize },

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
}

/// Errors raised while running a classifier forward or backward.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("input tensor has shape {got}, classifier expects {expected}")]
    InputShape { expected: Shape, got: Shape },

    #[error("layer '{layer}' failed: {source}")]
    Layer {
        layer: String,
        #[source]
        source: TensorError,
    },

    #[error("target class {class} is out of range for {num_classes} classes")]
    TargetClassOutOfRange { class: usize, num_classes: usize },

    #[error("backward seed has {got} entries, classifier produces {expected} scores")]
    SeedLength { expected: usize, got: usize },

    #[error("backward called without a recorded forward pass")]
    MissingForward,

    #[error("classifier produced no scores")]
    EmptyScores,

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Errors raised while building, loading or saving a `Network`.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid network spec: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Failures of the explanation engine.
///
/// `NoSpatialLayerFound` and `InstrumentationFailure` are recoverable: the
/// engine answers them with input-gradient saliency. `Evaluation` means the
/// classifier itself could not run and is surfaced to the caller, as is a
/// `Visualization` failure to encode the original image.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExplainError {
    #[error("no convolutional layer with spatial output was found")]
    NoSpatialLayerFound,

    #[error("instrumentation of layer '{layer}' failed: {reason}")]
    InstrumentationFailure { layer: String, reason: String },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error(transparent)]
    Visualization(#[from] VisualizationError),
}

impl ExplainError {
    /// True when the fallback saliency path should be tried instead.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExplainError::NoSpatialLayerFound | ExplainError::InstrumentationFailure { .. }
        )
    }
}

/// Which step of visualization composition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationStage {
    Resize,
    ColorMap,
    Blend,
    Encode,
}

impl fmt::Display for VisualizationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisualizationStage::Resize => "resize",
            VisualizationStage::ColorMap => "color map",
            VisualizationStage::Blend => "blend",
            VisualizationStage::Encode => "encode",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{stage} step failed: {message}")]
pub struct VisualizationError {
    pub stage: VisualizationStage,
    pub message: String,
}

impl VisualizationError {
    pub fn new(stage: VisualizationStage, message: impl Into<String>) -> Self {
        VisualizationError { stage, message: message.into() }
    }
}

/// Errors raised while turning uploaded bytes into a model input.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero width or height")]
    EmptyImage,

    #[error("model expects {0} input channels; only 3-channel RGB input is supported")]
    UnsupportedChannels(usize),

    #[error("invalid normalization: {0}")]
    InvalidNormalization(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while diagnosing one image.
///
/// Explanation problems never show up here; they degrade the visualization
/// instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnoseError {
    #[error("prediction failed: {0}")]
    Prediction(#[from] EvalError),

    #[error(transparent)]
    Visualization(#[from] VisualizationError),
}
