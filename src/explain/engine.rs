use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExplainConfig;
use crate::error::ExplainError;
use crate::explain::cam::{self, ClassActivationMap};
use crate::explain::capture::capture;
use crate::explain::fallback::input_gradient_saliency;
use crate::explain::locator::locate;
use crate::math::tensor::ImageTensor;
use crate::network::classifier::Classifier;
use crate::visual::compose::{compose, VisualizationBundle};

/// Which technique produced a saliency map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    GradCam,
    InputGradient,
}

/// A saliency map together with how and for which class it was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub map: ClassActivationMap,
    pub method: AttributionMethod,
    pub target_class: usize,
    /// Layer the map was taken from; `None` for input-gradient maps.
    pub layer: Option<String>,
}

fn grad_cam<C>(classifier: &C, image: &ImageTensor, target_class: Option<usize>) -> Result<Explanation, ExplainError>
where
    C: Classifier + ?Sized,
{
    let layer = locate(classifier).ok_or(ExplainError::NoSpatialLayerFound)?;
    debug!(layer = %layer.name, architecture = ?layer.architecture, shape = %layer.output_shape, "target layer selected");

    let captured = capture(classifier, &layer, image, target_class)?;
    let map = cam::build(&captured.tensors)?;
    Ok(Explanation {
        map,
        method: AttributionMethod::GradCam,
        target_class: captured.target_class,
        layer: Some(layer.name),
    })
}

/// Computes a saliency map for `image`.
///
/// Grad-CAM on the located layer when possible; when no layer qualifies or
/// instrumentation yields nothing, input-gradient saliency instead.
/// Evaluation failures are returned as they are.
pub fn saliency<C>(classifier: &C, image: &ImageTensor, target_class: Option<usize>) -> Result<Explanation, ExplainError>
where
    C: Classifier + ?Sized,
{
    match grad_cam(classifier, image, target_class) {
        Ok(explanation) => Ok(explanation),
        Err(err) if err.is_recoverable() => {
            warn!(reason = %err, "Grad-CAM unavailable, falling back to input-gradient saliency");
            let (map, target_class) = input_gradient_saliency(classifier, image, target_class)?;
            Ok(Explanation { map, method: AttributionMethod::InputGradient, target_class, layer: None })
        }
        Err(err) => Err(err),
    }
}

/// Explains `image` and renders the result over `original`.
///
/// `predicted_class` pins the explained class; `None` explains the top class.
/// A rendering failure yields an original-only bundle; only an original that
/// cannot be encoded is an error.
pub fn explain<C>(
    classifier: &C,
    image: &ImageTensor,
    original: &RgbImage,
    predicted_class: Option<usize>,
    config: &ExplainConfig,
) -> Result<(Explanation, VisualizationBundle), ExplainError>
where
    C: Classifier + ?Sized,
{
    let explanation = saliency(classifier, image, predicted_class)?;
    info!(
        method = ?explanation.method,
        target_class = explanation.target_class,
        map_height = explanation.map.height(),
        map_width = explanation.map.width(),
        "explanation computed"
    );

    let bundle = compose(original, &explanation.map, config)?;
    Ok((explanation, bundle))
}
