pub mod classifier;
pub mod context;
pub mod metadata;
pub mod network;
pub mod spec;

pub use classifier::{Classifier, LayerId, LayerInfo};
pub use context::{EvalContext, GradientBuffer};
pub use metadata::{ModelMetadata, Normalization};
pub use network::{NamedLayer, Network};
pub use spec::{BlockSpec, LayerSpec, NetworkSpec};
