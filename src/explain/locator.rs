use serde::Serialize;
use tracing::debug;

use crate::layers::layer::LayerKind;
use crate::math::tensor::Shape;
use crate::network::classifier::{Classifier, LayerId, LayerInfo};

/// Block holding a sequential feature extractor (VGG-style models).
pub const FEATURE_BLOCK: &str = "features";
/// Block holding the final residual stage (ResNet-style models).
pub const FINAL_RESIDUAL_STAGE: &str = "layer4";

/// Structural families the locator knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureKind {
    SequentialFeatures,
    Residual,
    Generic,
}

impl ArchitectureKind {
    /// Classifies a layer listing once; `features` wins over `layer4`.
    pub fn classify(layers: &[LayerInfo]) -> ArchitectureKind {
        if layers.iter().any(|l| l.block == FEATURE_BLOCK) {
            ArchitectureKind::SequentialFeatures
        } else if layers.iter().any(|l| l.block == FINAL_RESIDUAL_STAGE) {
            ArchitectureKind::Residual
        } else {
            ArchitectureKind::Generic
        }
    }
}

/// The layer chosen for instrumentation. Refers to the layer by id; the
/// classifier keeps ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetLayer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub output_shape: Shape,
    /// Which rule selected it.
    pub architecture: ArchitectureKind,
}

impl TargetLayer {
    fn from_info(info: &LayerInfo, architecture: ArchitectureKind) -> TargetLayer {
        TargetLayer {
            id: info.id,
            name: info.name.clone(),
            kind: info.kind,
            output_shape: info.output_shape,
            architecture,
        }
    }
}

/// Picks the layer whose activations best summarize learned spatial
/// features:
///
/// 1. the last layer of the `features` block,
/// 2. else the last layer of the `layer4` stage,
/// 3. else the last convolution anywhere, residual blocks included.
///
/// Candidates without a spatial output are skipped. Returns `None` when no
/// rule yields one. Only inspects structure; nothing is evaluated.
pub fn locate<C>(classifier: &C) -> Option<TargetLayer>
where
    C: Classifier + ?Sized,
{
    let layers = classifier.layers();
    let architecture = ArchitectureKind::classify(&layers);

    let named_block = match architecture {
        ArchitectureKind::SequentialFeatures => Some(FEATURE_BLOCK),
        ArchitectureKind::Residual => Some(FINAL_RESIDUAL_STAGE),
        ArchitectureKind::Generic => None,
    };

    if let Some(block) = named_block {
        let last = layers.iter().filter(|l| l.block == block).last();
        match last {
            Some(info) if info.output_shape.is_spatial() => {
                debug!(layer = %info.name, ?architecture, "target layer located");
                return Some(TargetLayer::from_info(info, architecture));
            }
            Some(info) => {
                debug!(layer = %info.name, shape = %info.output_shape, "named block ends without spatial output");
            }
            None => {}
        }
    }

    // single pass, the final match wins
    let mut found = None;
    for info in &layers {
        if info.kind.is_convolutional() && info.output_shape.is_spatial() {
            found = Some(info);
        }
    }

    match found {
        Some(info) => {
            debug!(layer = %info.name, "target layer located by convolution scan");
            Some(TargetLayer::from_info(info, ArchitectureKind::Generic))
        }
        None => {
            debug!("no spatial convolution found");
            None
        }
    }
}
