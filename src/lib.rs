pub mod math;
pub mod activation;
pub mod layers;
pub mod instrument;
pub mod network;
pub mod explain;
pub mod visual;
pub mod preprocess;
pub mod diagnose;
pub mod config;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::tensor::{ImageTensor, Shape, Tensor3};
pub use activation::activation::ActivationFunction;
pub use layers::layer::{Layer, LayerKind};
pub use instrument::registry::{HookRegistry, InstrumentationScope};
pub use network::classifier::{Classifier, LayerId, LayerInfo};
pub use network::context::EvalContext;
pub use network::network::Network;
pub use network::spec::NetworkSpec;
pub use explain::cam::ClassActivationMap;
pub use explain::engine::{explain, saliency, AttributionMethod, Explanation};
pub use explain::locator::{locate, TargetLayer};
pub use visual::compose::{compose, VisualizationBundle};
pub use visual::encode::EncodedImage;
pub use diagnose::{diagnose, predict, Diagnosis, ExplainTarget, Prediction};
pub use config::{ExplainConfig, ServerConfig};
pub use error::{DiagnoseError, EvalError, ExplainError, VisualizationError};
