pub mod conv2d;
pub mod dense;
pub mod layer;
pub mod pool;
pub mod residual;

pub use conv2d::Conv2d;
pub use dense::Linear;
pub use layer::{Layer, LayerKind};
pub use pool::{GlobalAvgPool, MaxPool2d};
pub use residual::BasicBlock;
