//! Module implementing a 1D convolution over sequences of feature vectors.

use crate::nn::activations::Activation;
use crate::nn::init;
use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::{GraphContext, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Configuration for Conv1d layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1dConfig {
    /// Features per time step of the input.
    pub insize: usize,
    /// Number of filters (features per output step).
    pub outsize: usize,
    /// Number of time steps covered by one filter.
    pub window: usize,
    /// Step between consecutive windows.
    pub stride: usize,
    pub activation: Activation,
}

impl Conv1dConfig {
    /// Creates Conv1d configuration with stride 1 and sigmoid activation.
    pub fn new(insize: usize, outsize: usize, window: usize) -> Self {
        Self {
            insize,
            outsize,
            window,
            stride: 1,
            activation: Activation::default(),
        }
    }

    /// Sets convolution stride.
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
}

/// 1D convolutional layer.
///
/// Applies `window`-wide filters to an input of shape `[T, insize]`.
/// Output tensor has shape `[(T - window) / stride + 1, outsize]`.
///
/// # Example
///
/// ```rust,ignore
/// use asgnet::nn::{Conv1d, Conv1dConfig, Module};
///
/// let conv = Conv1d::new(&context, "conv1", Conv1dConfig::new(8, 16, 3).with_stride(2), &mut rng)?;
/// let output = conv.forward(&[sentence])?;
/// ```
pub struct Conv1d {
    /// Symbolic descriptor for the weight tensor `[outsize, insize, window]`.
    pub weight: Tensor,
    /// Symbolic descriptor for bias `[outsize]`.
    pub bias: Tensor,
    /// Layer configuration.
    pub config: Conv1dConfig,
}

impl Conv1d {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: Conv1dConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        init::require_positive("insize", config.insize)?;
        init::require_positive("outsize", config.outsize)?;
        init::require_positive("window", config.window)?;
        init::require_positive("stride", config.stride)?;

        let weight = init::uniform_fan_in(&[config.outsize, config.insize, config.window], config.insize, rng);
        let bias = init::zeros(&[config.outsize]);

        Ok(Self {
            weight: Tensor::new_parameter(context, &format!("{}.W", name), weight),
            bias: Tensor::new_parameter(context, &format!("{}.b", name), bias),
            config,
        })
    }
}

impl Module for Conv1d {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Conv1d", inputs, 1)?;
        let conv = inputs[0].conv1d(&self.weight, &self.bias, self.config.stride);
        Ok(vec![self.config.activation.apply(&conv)])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn input_arity(&self) -> usize {
        1
    }

    fn output_arity(&self) -> usize {
        1
    }
}
