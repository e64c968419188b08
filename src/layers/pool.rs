use serde::{Deserialize, Serialize};

use crate::error::TensorError;
use crate::math::tensor::{Shape, Tensor3};

/// Max pooling without padding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxPool2d {
    pub kernel_size: usize,
    pub stride: usize,
}

impl MaxPool2d {
    pub fn new(kernel_size: usize, stride: usize) -> MaxPool2d {
        MaxPool2d { kernel_size, stride }
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        if self.kernel_size == 0
            || self.stride == 0
            || input.height < self.kernel_size
            || input.width < self.kernel_size
        {
            return Err(TensorError::InvalidDimensions(format!(
                "max pool {}x{} / {} does not fit input {}",
                self.kernel_size, self.kernel_size, self.stride, input
            )));
        }
        Ok(Shape::new(
            input.channels,
            (input.height - self.kernel_size) / self.stride + 1,
            (input.width - self.kernel_size) / self.stride + 1,
        ))
    }

    /// Position of the first maximum inside the window of output `(oy, ox)`.
    fn argmax(&self, input: &Tensor3, c: usize, oy: usize, ox: usize) -> (usize, usize) {
        let (y0, x0) = (oy * self.stride, ox * self.stride);
        let mut best = (y0, x0);
        let mut best_val = input.at(c, y0, x0);
        for y in y0..y0 + self.kernel_size {
            for x in x0..x0 + self.kernel_size {
                let v = input.at(c, y, x);
                if v > best_val {
                    best_val = v;
                    best = (y, x);
                }
            }
        }
        best
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        Ok(Tensor3::from_fn(out_shape, |c, oy, ox| {
            let (y, x) = self.argmax(input, c, oy, ox);
            input.at(c, y, x)
        }))
    }

    /// Routes each output gradient to the window position that won the max.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        grad_output.ensure_shape(out_shape)?;
        let mut grad_input = Tensor3::zeros(input.shape);
        for c in 0..out_shape.channels {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let (y, x) = self.argmax(input, c, oy, ox);
                    *grad_input.at_mut(c, y, x) += grad_output.at(c, oy, ox);
                }
            }
        }
        Ok(grad_input)
    }
}

/// Averages every channel plane down to a single value (`C×H×W → C×1×1`).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalAvgPool;

impl GlobalAvgPool {
    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        if input.plane() == 0 {
            return Err(TensorError::InvalidDimensions(format!(
                "global average pool over empty input {}",
                input
            )));
        }
        Ok(Shape::vector(input.channels))
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        let plane = input.shape.plane() as f64;
        let data = (0..input.shape.channels)
            .map(|c| input.channel(c).iter().sum::<f64>() / plane)
            .collect();
        Tensor3::from_data(out_shape, data)
    }

    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        grad_output.ensure_shape(self.output_shape(input.shape)?)?;
        let plane = input.shape.plane() as f64;
        Ok(Tensor3::from_fn(input.shape, |c, _, _| grad_output.data[c] / plane))
    }
}
