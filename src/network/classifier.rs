use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EvalError;
use crate::instrument::registry::HookRegistry;
use crate::layers::layer::LayerKind;
use crate::math::tensor::{ImageTensor, Shape};
use crate::network::context::EvalContext;

/// Position of a layer in a classifier's evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub usize);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static description of one layer, as enumerated by a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerInfo {
    pub id: LayerId,
    /// Dotted path, e.g. `features.4` or `layer4.1`.
    pub name: String,
    /// Name of the top-level block the layer belongs to.
    pub block: String,
    pub kind: LayerKind,
    pub output_shape: Shape,
}

/// Capabilities the explanation engine needs from a model.
///
/// Implementations are shared read-only between requests. All per-request
/// state (recorded inputs, gradients, the instrumentation session) lives in
/// the caller's [`EvalContext`]; hooks are looked up in [`Classifier::hooks`]
/// and fired only for the context's session.
pub trait Classifier: Send + Sync {
    fn input_shape(&self) -> Shape;

    fn num_classes(&self) -> usize;

    /// Every layer in definition order.
    fn layers(&self) -> Vec<LayerInfo>;

    /// Runs the model on `input`, recording whatever `backward` will need in
    /// `ctx`, and returns one raw score per class.
    fn forward(&self, input: &ImageTensor, ctx: &mut EvalContext) -> Result<Vec<f64>, EvalError>;

    /// Propagates `seed` (the gradient w.r.t. the class scores) back through
    /// the pass recorded in `ctx`. Gradients w.r.t. the input are added to
    /// `ctx`'s gradient buffer when the context requires them.
    fn backward(&self, ctx: &mut EvalContext, seed: &[f64]) -> Result<(), EvalError>;

    fn hooks(&self) -> &HookRegistry;

    /// Layers belonging to the top-level block called `block`.
    fn block(&self, block: &str) -> Vec<LayerInfo> {
        self.layers().into_iter().filter(|layer| layer.block == block).collect()
    }
}
