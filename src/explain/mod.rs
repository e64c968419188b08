pub mod cam;
pub mod capture;
pub mod engine;
pub mod fallback;
pub mod locator;

pub use cam::ClassActivationMap;
pub use capture::{capture, Capture, CapturedTensors};
pub use engine::{explain, saliency, AttributionMethod, Explanation};
pub use fallback::input_gradient_saliency;
pub use locator::{locate, ArchitectureKind, TargetLayer};
