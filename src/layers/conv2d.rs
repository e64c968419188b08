use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::TensorError;
use crate::math::init::{he_normal, small_uniform};
use crate::math::tensor::{Shape, Tensor3};

/// 2D convolution with square kernels, symmetric zero padding and a single
/// stride for both axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    /// Kernel weights laid out as `[out][in][ky][kx]`.
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut StdRng,
    ) -> Conv2d {
        let fan_in = in_channels * kernel_size * kernel_size;
        Conv2d {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            weights: he_normal(out_channels * fan_in, fan_in, rng),
            biases: small_uniform(out_channels, rng),
        }
    }

    /// Checks that the parameter vectors match the declared geometry.
    pub fn validate(&self) -> Result<(), TensorError> {
        let expected = self.out_channels * self.in_channels * self.kernel_size * self.kernel_size;
        if self.weights.len() != expected || self.biases.len() != self.out_channels {
            return Err(TensorError::InvalidDimensions(format!(
                "conv2d expects {} weights and {} biases, found {} and {}",
                expected,
                self.out_channels,
                self.weights.len(),
                self.biases.len()
            )));
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(TensorError::InvalidDimensions(
                "conv2d kernel size and stride must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn output_shape(&self, input: Shape) -> Result<Shape, TensorError> {
        if input.channels != self.in_channels {
            return Err(TensorError::ShapeMismatch {
                expected: Shape::new(self.in_channels, input.height, input.width),
                got: input,
            });
        }
        let padded_h = input.height + 2 * self.padding;
        let padded_w = input.width + 2 * self.padding;
        if self.stride == 0 || padded_h < self.kernel_size || padded_w < self.kernel_size {
            return Err(TensorError::InvalidDimensions(format!(
                "kernel {}x{} with stride {} does not fit input {}",
                self.kernel_size, self.kernel_size, self.stride, input
            )));
        }
        Ok(Shape::new(
            self.out_channels,
            (padded_h - self.kernel_size) / self.stride + 1,
            (padded_w - self.kernel_size) / self.stride + 1,
        ))
    }

    #[inline]
    fn weight(&self, o: usize, i: usize, ky: usize, kx: usize) -> f64 {
        self.weights[((o * self.in_channels + i) * self.kernel_size + ky) * self.kernel_size + kx]
    }

    /// Input coordinate read by output position `out` at kernel offset `k`,
    /// or `None` when it lands in the zero padding.
    #[inline]
    fn source(&self, out: usize, k: usize, limit: usize) -> Option<usize> {
        let pos = (out * self.stride + k) as isize - self.padding as isize;
        if pos < 0 || pos as usize >= limit {
            None
        } else {
            Some(pos as usize)
        }
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        let mut output = Tensor3::zeros(out_shape);

        for o in 0..self.out_channels {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let mut sum = self.biases[o];
                    for i in 0..self.in_channels {
                        for ky in 0..self.kernel_size {
                            let Some(iy) = self.source(oy, ky, input.shape.height) else { continue };
                            for kx in 0..self.kernel_size {
                                let Some(ix) = self.source(ox, kx, input.shape.width) else { continue };
                                sum += self.weight(o, i, ky, kx) * input.at(i, iy, ix);
                            }
                        }
                    }
                    *output.at_mut(o, oy, ox) = sum;
                }
            }
        }

        Ok(output)
    }

    /// Gradient w.r.t. the input, given the gradient w.r.t. the output.
    ///
    /// Weight gradients are never needed for explanation, so none are computed.
    pub fn backward(&self, input: &Tensor3, grad_output: &Tensor3) -> Result<Tensor3, TensorError> {
        let out_shape = self.output_shape(input.shape)?;
        grad_output.ensure_shape(out_shape)?;
        let mut grad_input = Tensor3::zeros(input.shape);

        for o in 0..self.out_channels {
            for oy in 0..out_shape.height {
                for ox in 0..out_shape.width {
                    let g = grad_output.at(o, oy, ox);
                    if g == 0.0 {
                        continue;
                    }
                    for i in 0..self.in_channels {
                        for ky in 0..self.kernel_size {
                            let Some(iy) = self.source(oy, ky, input.shape.height) else { continue };
                            for kx in 0..self.kernel_size {
                                let Some(ix) = self.source(ox, kx, input.shape.width) else { continue };
                                *grad_input.at_mut(i, iy, ix) += self.weight(o, i, ky, kx) * g;
                            }
                        }
                    }
                }
            }
        }

        Ok(grad_input)
    }
}
