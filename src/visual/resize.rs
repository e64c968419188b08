use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::error::{VisualizationError, VisualizationStage};
use crate::explain::cam::ClassActivationMap;

/// How a coarse map is stretched to image resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
        }
    }
}

/// Resizes `map` to `width × height`, returning row-major values in [0, 1].
pub fn resize_map(
    map: &ClassActivationMap,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> Result<Vec<f64>, VisualizationError> {
    if width == 0 || height == 0 {
        return Err(VisualizationError::new(
            VisualizationStage::Resize,
            format!("cannot resize to an empty {}x{} image", width, height),
        ));
    }

    let (src_w, src_h) = (map.width() as u32, map.height() as u32);
    let data: Vec<f32> = map.values().iter().map(|&v| v as f32).collect();
    let source: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(src_w, src_h, data)
        .ok_or_else(|| {
            VisualizationError::new(
                VisualizationStage::Resize,
                format!("map values do not fill a {}x{} buffer", src_w, src_h),
            )
        })?;

    let resized = if (src_w, src_h) == (width, height) {
        source
    } else {
        imageops::resize(&source, width, height, interpolation.filter())
    };

    Ok(resized
        .into_raw()
        .into_iter()
        .map(|v| f64::from(v).clamp(0.0, 1.0))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> ClassActivationMap {
        ClassActivationMap::from_raw_parts(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap()
    }

    #[test]
    fn output_has_requested_resolution() {
        let values = resize_map(&checker(), 9, 5, Interpolation::Bilinear).unwrap();
        assert_eq!(values.len(), 45);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn nearest_keeps_original_levels() {
        let values = resize_map(&checker(), 4, 4, Interpolation::Nearest).unwrap();
        assert!(values.iter().all(|&v| v == 0.0 || v == 1.0));
        assert_eq!(values[0], 0.0);
        assert_eq!(values[3], 1.0);
    }

    #[test]
    fn same_size_is_identity() {
        let values = resize_map(&checker(), 2, 2, Interpolation::Bilinear).unwrap();
        assert_eq!(values, vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = resize_map(&checker(), 0, 4, Interpolation::Nearest).unwrap_err();
        assert_eq!(err.stage, VisualizationStage::Resize);
    }
}
