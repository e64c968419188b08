pub mod colormap;
pub mod compose;
pub mod encode;
pub mod resize;

pub use colormap::ColorMapKind;
pub use compose::{blend, compose, render, RenderedLayers, VisualizationBundle};
pub use encode::EncodedImage;
pub use resize::Interpolation;
