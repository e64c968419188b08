use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{VisualizationError, VisualizationStage};

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A PNG image as a `data:image/png;base64,...` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

fn encode_error(err: impl fmt::Display) -> VisualizationError {
    VisualizationError::new(VisualizationStage::Encode, err.to_string())
}

impl EncodedImage {
    pub fn png(image: &RgbImage) -> Result<Self, VisualizationError> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
            .map_err(encode_error)?;
        Ok(EncodedImage(format!("{}{}", PNG_DATA_URI_PREFIX, STANDARD.encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Raw PNG bytes behind the URI.
    pub fn png_bytes(&self) -> Result<Vec<u8>, VisualizationError> {
        let payload = self
            .0
            .strip_prefix(PNG_DATA_URI_PREFIX)
            .ok_or_else(|| encode_error("not a PNG data URI"))?;
        STANDARD.decode(payload).map_err(encode_error)
    }

    pub fn decode(&self) -> Result<RgbImage, VisualizationError> {
        let bytes = self.png_bytes()?;
        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(encode_error)?;
        Ok(image.to_rgb8())
    }
}

impl fmt::Display for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
