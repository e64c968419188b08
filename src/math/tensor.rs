use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TensorError;

/// Channel-major shape of a single (batch size 1) feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(channels: usize, height: usize, width: usize) -> Shape {
        Shape { channels, height, width }
    }

    /// Shape of a flat vector of `len` values (`len × 1 × 1`).
    pub fn vector(len: usize) -> Shape {
        Shape { channels: len, height: 1, width: 1 }
    }

    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of positions in one channel plane.
    pub fn plane(&self) -> usize {
        self.height * self.width
    }

    /// True when both spatial axes are larger than one.
    pub fn is_spatial(&self) -> bool {
        self.height > 1 && self.width > 1
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Dense C×H×W array stored channel-major in a single `Vec<f64>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor3 {
    pub shape: Shape,
    pub data: Vec<f64>,
}

/// One preprocessed image, batch size 1.
pub type ImageTensor = Tensor3;

impl Tensor3 {
    pub fn zeros(shape: Shape) -> Tensor3 {
        Tensor3::filled(shape, 0.0)
    }

    pub fn filled(shape: Shape, value: f64) -> Tensor3 {
        Tensor3 { shape, data: vec![value; shape.len()] }
    }

    pub fn from_data(shape: Shape, data: Vec<f64>) -> Result<Tensor3, TensorError> {
        if data.len() != shape.len() {
            return Err(TensorError::LengthMismatch {
                shape,
                expected: shape.len(),
                got: data.len(),
            });
        }
        Ok(Tensor3 { shape, data })
    }

    /// Builds a tensor by evaluating `f(channel, y, x)` at every position.
    pub fn from_fn<F>(shape: Shape, mut f: F) -> Tensor3
    where
        F: FnMut(usize, usize, usize) -> f64,
    {
        let mut data = Vec::with_capacity(shape.len());
        for c in 0..shape.channels {
            for y in 0..shape.height {
                for x in 0..shape.width {
                    data.push(f(c, y, x));
                }
            }
        }
        Tensor3 { shape, data }
    }

    #[inline]
    pub fn index(&self, c: usize, y: usize, x: usize) -> usize {
        (c * self.shape.height + y) * self.shape.width + x
    }

    #[inline]
    pub fn at(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[self.index(c, y, x)]
    }

    #[inline]
    pub fn at_mut(&mut self, c: usize, y: usize, x: usize) -> &mut f64 {
        let idx = self.index(c, y, x);
        &mut self.data[idx]
    }

    /// Values of one channel plane (`height * width` entries).
    pub fn channel(&self, c: usize) -> &[f64] {
        let plane = self.shape.plane();
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn map<F>(&self, functor: F) -> Tensor3
    where
        F: Fn(f64) -> f64,
    {
        Tensor3 {
            shape: self.shape,
            data: self.data.iter().map(|&x| functor(x)).collect(),
        }
    }

    /// Element-wise combination of two same-shape tensors.
    pub fn zip_map<F>(&self, other: &Tensor3, functor: F) -> Result<Tensor3, TensorError>
    where
        F: Fn(f64, f64) -> f64,
    {
        self.ensure_shape(other.shape)?;
        Ok(Tensor3 {
            shape: self.shape,
            data: self.data.iter().zip(other.data.iter()).map(|(&a, &b)| functor(a, b)).collect(),
        })
    }

    /// Adds `other` into `self` in place.
    pub fn accumulate(&mut self, other: &Tensor3) -> Result<(), TensorError> {
        self.ensure_shape(other.shape)?;
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    pub fn ensure_shape(&self, expected: Shape) -> Result<(), TensorError> {
        if self.shape != expected {
            return Err(TensorError::ShapeMismatch { expected, got: self.shape });
        }
        Ok(())
    }
}
