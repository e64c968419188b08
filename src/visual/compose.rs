use image::{Rgb, RgbImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ExplainConfig;
use crate::error::{VisualizationError, VisualizationStage};
use crate::explain::cam::ClassActivationMap;
use crate::visual::colormap::{check_values, colorize};
use crate::visual::encode::EncodedImage;
use crate::visual::resize::resize_map;

/// The images returned for one diagnosis.
///
/// `heatmap` and `overlay` are both present or both absent. When absent,
/// `failure` says which composition step gave up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationBundle {
    pub original: EncodedImage,
    pub heatmap: Option<EncodedImage>,
    pub overlay: Option<EncodedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<VisualizationError>,
}

impl VisualizationBundle {
    /// A bundle carrying only the original image.
    pub fn original_only(original: EncodedImage, failure: Option<VisualizationError>) -> Self {
        VisualizationBundle { original, heatmap: None, overlay: None, failure }
    }

    pub fn is_degraded(&self) -> bool {
        self.heatmap.is_none() || self.overlay.is_none()
    }
}

/// Heatmap and overlay at the original image's resolution.
#[derive(Debug, Clone)]
pub struct RenderedLayers {
    pub heatmap: RgbImage,
    pub overlay: RgbImage,
}

fn mix(original: u8, heat: u8, alpha: f64) -> u8 {
    ((1.0 - alpha) * f64::from(original) + alpha * f64::from(heat))
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Per-pixel `(1 - alpha) * original + alpha * heatmap`.
pub fn blend(original: &RgbImage, heatmap: &RgbImage, alpha: f64) -> Result<RgbImage, VisualizationError> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(VisualizationError::new(
            VisualizationStage::Blend,
            format!("alpha {} is outside [0, 1]", alpha),
        ));
    }
    if original.dimensions() != heatmap.dimensions() {
        return Err(VisualizationError::new(
            VisualizationStage::Blend,
            format!(
                "original is {:?} but heatmap is {:?}",
                original.dimensions(),
                heatmap.dimensions()
            ),
        ));
    }

    Ok(RgbImage::from_fn(original.width(), original.height(), |x, y| {
        let o = original.get_pixel(x, y);
        let h = heatmap.get_pixel(x, y);
        Rgb([mix(o[0], h[0], alpha), mix(o[1], h[1], alpha), mix(o[2], h[2], alpha)])
    }))
}

/// Resizes, colors and blends `map` over `original`.
pub fn render(
    original: &RgbImage,
    map: &ClassActivationMap,
    config: &ExplainConfig,
) -> Result<RenderedLayers, VisualizationError> {
    let (width, height) = original.dimensions();
    // checked before resampling, which clamps
    check_values(map.values())?;
    let resized = resize_map(map, width, height, config.interpolation)?;
    let heatmap = colorize(&resized, width, height, config.colormap)?;
    let overlay = blend(original, &heatmap, config.alpha)?;
    Ok(RenderedLayers { heatmap, overlay })
}

/// Builds the response images.
///
/// Any failure after the original is encoded degrades to an original-only
/// bundle. Errors only when the original itself cannot be encoded.
pub fn compose(
    original: &RgbImage,
    map: &ClassActivationMap,
    config: &ExplainConfig,
) -> Result<VisualizationBundle, VisualizationError> {
    let encoded_original = EncodedImage::png(original)?;

    let layers = render(original, map, config).and_then(|layers| -> Result<_, VisualizationError> {
        Ok((EncodedImage::png(&layers.heatmap)?, EncodedImage::png(&layers.overlay)?))
    });

    match layers {
        Ok((heatmap, overlay)) => {
            debug!(
                width = original.width(),
                height = original.height(),
                map_height = map.height(),
                map_width = map.width(),
                "visualization composed"
            );
            Ok(VisualizationBundle {
                original: encoded_original,
                heatmap: Some(heatmap),
                overlay: Some(overlay),
                failure: None,
            })
        }
        Err(err) => {
            warn!(stage = %err.stage, error = %err, "returning original image without heatmap");
            Ok(VisualizationBundle::original_only(encoded_original, Some(err)))
        }
    }
}
