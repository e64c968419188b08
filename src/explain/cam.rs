use serde::Serialize;

use crate::error::{ExplainError, TensorError};
use crate::explain::capture::CapturedTensors;

/// A 2D saliency map with values in [0, 1], stored row-major.
///
/// Built maps have minimum 0 and maximum 1, or are all zero when nothing
/// contributed positively to the target class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassActivationMap {
    height: usize,
    width: usize,
    values: Vec<f64>,
}

/// Shifts `values` so the minimum is 0, then scales so the maximum is 1 when
/// the shifted maximum is positive. Constant input becomes all zero.
pub fn normalize_unit_interval(values: &mut [f64]) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return;
    }
    for v in values.iter_mut() {
        *v -= min;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        for v in values.iter_mut() {
            *v /= max;
        }
    }
}

impl ClassActivationMap {
    /// Normalizes `raw` into a map.
    pub fn from_raw(height: usize, width: usize, mut raw: Vec<f64>) -> Result<Self, TensorError> {
        check_len(height, width, raw.len())?;
        normalize_unit_interval(&mut raw);
        Ok(ClassActivationMap { height, width, values: raw })
    }

    /// Wraps values as they are, without normalizing. For maps produced
    /// elsewhere; rendering validates the value range.
    pub fn from_raw_parts(height: usize, width: usize, values: Vec<f64>) -> Result<Self, TensorError> {
        check_len(height, width, values.len())?;
        Ok(ClassActivationMap { height, width, values })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, y: usize, x: usize) -> f64 {
        self.values[y * self.width + x]
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

fn check_len(height: usize, width: usize, len: usize) -> Result<(), TensorError> {
    if height == 0 || width == 0 || height * width != len {
        return Err(TensorError::InvalidDimensions(format!(
            "{} values cannot form a {}x{} map",
            len, height, width
        )));
    }
    Ok(())
}

/// Grad-CAM: weights each activation channel by the spatial mean of its
/// gradient, sums the weighted channels, keeps the positive part and
/// normalizes. The map has the activations' spatial resolution.
pub fn build(captured: &CapturedTensors) -> Result<ClassActivationMap, ExplainError> {
    let CapturedTensors { activations, gradients } = captured;
    activations
        .ensure_shape(gradients.shape)
        .map_err(|err| ExplainError::InstrumentationFailure {
            layer: "captured tensors".into(),
            reason: err.to_string(),
        })?;

    let shape = activations.shape;
    let plane = shape.plane();
    let mut raw = vec![0.0; plane];

    for c in 0..shape.channels {
        let grad = gradients.channel(c);
        let weight = grad.iter().sum::<f64>() / plane as f64;
        if weight == 0.0 {
            continue;
        }
        for (r, a) in raw.iter_mut().zip(activations.channel(c)) {
            *r += weight * a;
        }
    }

    for r in raw.iter_mut() {
        if *r < 0.0 {
            *r = 0.0;
        }
    }

    ClassActivationMap::from_raw(shape.height, shape.width, raw).map_err(|err| {
        ExplainError::InstrumentationFailure { layer: "captured tensors".into(), reason: err.to_string() }
    })
}
