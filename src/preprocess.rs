//! Image preprocessing for classifier input.
//!
//! Uploaded bytes (PNG/JPEG/BMP/GIF) are decoded to RGB, resized to the
//! model's input size, scaled to [0, 1] and normalized per channel. The
//! decoded RGB image is kept alongside the tensor so explanations can be
//! drawn over what the user actually sent.

use image::imageops::FilterType;
use image::RgbImage;

use crate::error::PreprocessError;
use crate::math::tensor::{ImageTensor, Shape, Tensor3};
use crate::network::metadata::Normalization;

/// Model input plus the full-resolution RGB image it came from.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub tensor: ImageTensor,
    pub original: RgbImage,
}

/// Decodes image bytes to 8-bit RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PreprocessError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    Ok(image)
}

/// Resizes `image` to the spatial size of `shape` (bilinear), scales to
/// [0, 1] and applies `(x - mean[c]) / std[c]`.
pub fn to_tensor(
    image: &RgbImage,
    shape: Shape,
    normalization: &Normalization,
) -> Result<ImageTensor, PreprocessError> {
    if shape.channels != 3 {
        return Err(PreprocessError::UnsupportedChannels(shape.channels));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::EmptyImage);
    }
    normalization.validate().map_err(PreprocessError::InvalidNormalization)?;

    let (width, height) = (shape.width as u32, shape.height as u32);
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        image::imageops::resize(image, width, height, FilterType::Triangle)
    };

    Ok(Tensor3::from_fn(shape, |c, y, x| {
        let value = f64::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0;
        (value - normalization.mean[c]) / normalization.std[c]
    }))
}

/// Decodes `bytes` and prepares them for a model with input `shape`.
pub fn prepare(
    bytes: &[u8],
    shape: Shape,
    normalization: &Normalization,
) -> Result<PreparedImage, PreprocessError> {
    let original = decode_rgb(bytes)?;
    let tensor = to_tensor(&original, shape, normalization)?;
    Ok(PreparedImage { tensor, original })
}
