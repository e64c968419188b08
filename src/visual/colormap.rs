use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{VisualizationError, VisualizationStage};

/// Slack allowed outside [0, 1] before a value counts as corrupt.
const RANGE_TOLERANCE: f64 = 1e-9;

/// Perceptually ordered ramps from low (dark/blue) to high (bright/red).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMapKind {
    /// Blue → cyan → yellow → red.
    #[default]
    Jet,
    /// Black → red → yellow → white.
    Hot,
}

// (position, intensity) control points per channel
type Segments = [&'static [(f64, f64)]; 3];

const JET: Segments = [
    &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)],
    &[(0.0, 0.0), (0.125, 0.0), (0.375, 1.0), (0.64, 1.0), (0.91, 0.0), (1.0, 0.0)],
    &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)],
];

const HOT: Segments = [
    &[(0.0, 0.0416), (0.365079, 1.0), (1.0, 1.0)],
    &[(0.0, 0.0), (0.365079, 0.0), (0.746032, 1.0), (1.0, 1.0)],
    &[(0.0, 0.0), (0.746032, 0.0), (1.0, 1.0)],
];

fn interpolate(points: &[(f64, f64)], v: f64) -> f64 {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if v <= x1 {
            return y0 + (y1 - y0) * (v - x0) / (x1 - x0);
        }
    }
    points.last().map(|&(_, y)| y).unwrap_or(0.0)
}

fn to_u8(intensity: f64) -> u8 {
    (intensity * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Rejects values that are not finite or fall outside [0, 1].
pub fn check_values(values: &[f64]) -> Result<(), VisualizationError> {
    match values
        .iter()
        .position(|v| !v.is_finite() || *v < -RANGE_TOLERANCE || *v > 1.0 + RANGE_TOLERANCE)
    {
        Some(index) => Err(VisualizationError::new(
            VisualizationStage::ColorMap,
            format!("value {} at index {} is outside [0, 1]", values[index], index),
        )),
        None => Ok(()),
    }
}

impl ColorMapKind {
    fn segments(self) -> &'static Segments {
        match self {
            ColorMapKind::Jet => &JET,
            ColorMapKind::Hot => &HOT,
        }
    }

    /// Color of a single value in [0, 1].
    pub fn color(self, value: f64) -> Result<Rgb<u8>, VisualizationError> {
        check_values(&[value])?;
        let v = value.clamp(0.0, 1.0);
        let [r, g, b] = self.segments();
        Ok(Rgb([
            to_u8(interpolate(r, v)),
            to_u8(interpolate(g, v)),
            to_u8(interpolate(b, v)),
        ]))
    }
}

/// Colors a row-major `width × height` grid of values.
pub fn colorize(
    values: &[f64],
    width: u32,
    height: u32,
    kind: ColorMapKind,
) -> Result<RgbImage, VisualizationError> {
    if values.len() != width as usize * height as usize {
        return Err(VisualizationError::new(
            VisualizationStage::ColorMap,
            format!("{} values cannot fill a {}x{} image", values.len(), width, height),
        ));
    }
    check_values(values)?;

    let mut image = RgbImage::new(width, height);
    for (pixel, &value) in image.pixels_mut().zip(values.iter()) {
        *pixel = kind.color(value)?;
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jet_runs_from_blue_to_red() {
        let low = ColorMapKind::Jet.color(0.0).unwrap();
        let high = ColorMapKind::Jet.color(1.0).unwrap();
        assert_eq!(low, Rgb([0, 0, 128]));
        assert_eq!(high, Rgb([128, 0, 0]));
        let mid = ColorMapKind::Jet.color(0.5).unwrap();
        assert!(mid[1] > mid[2]);
    }

    #[test]
    fn hot_runs_from_dark_to_white() {
        let low = ColorMapKind::Hot.color(0.0).unwrap();
        assert!(low[0] < 16 && low[1] == 0 && low[2] == 0);
        assert_eq!(ColorMapKind::Hot.color(1.0).unwrap(), Rgb([255, 255, 255]));
    }

    #[test]
    fn red_channel_of_hot_is_monotonic() {
        let reds: Vec<u8> = (0..=20)
            .map(|i| ColorMapKind::Hot.color(i as f64 / 20.0).unwrap()[0])
            .collect();
        assert!(reds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn corrupt_values_are_rejected() {
        let err = colorize(&[0.1, f64::NAN, 0.3, 0.4], 2, 2, ColorMapKind::Jet).unwrap_err();
        assert_eq!(err.stage, VisualizationStage::ColorMap);
        assert!(ColorMapKind::Hot.color(1.5).is_err());
        assert!(colorize(&[0.0; 3], 2, 2, ColorMapKind::Jet).is_err());
    }
}
