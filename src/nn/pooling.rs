//! Pooling layers.

use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::Tensor;

/// Maximum over one axis of its input.
///
/// The default axis is 1, which for the `[T, outsize]` output of a
/// [`Conv1d`](crate::nn::Conv1d) takes the strongest filter per step.
/// Use `with_axis(0)` to pool over time instead.
#[derive(Debug, Clone, Copy)]
pub struct MaxPooling {
    axis: isize,
}

impl MaxPooling {
    pub fn new() -> Self {
        Self { axis: 1 }
    }

    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn axis(&self) -> isize {
        self.axis
    }
}

impl Default for MaxPooling {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for MaxPooling {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("MaxPooling", inputs, 1)?;
        Ok(vec![inputs[0].max_axis(self.axis)])
    }

    fn parameters(&self) -> Vec<Tensor> {
        Vec::new()
    }

    fn input_arity(&self) -> usize {
        1
    }

    fn output_arity(&self) -> usize {
        1
    }
}
