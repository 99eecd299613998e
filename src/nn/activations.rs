//! Activation functions: the `Activation` selector used by the layers and
//! parameter-free activation modules for use inside combinators.

use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Elementwise (or, for `Softmax`, last-axis) nonlinearity applied by a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Sigmoid,
    Tanh,
    ReLU,
    Softmax,
    Identity,
}

impl Activation {
    /// Adds the activation to the graph.
    pub fn apply(self, x: &Tensor) -> Tensor {
        match self {
            Activation::Sigmoid => x.sigmoid(),
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.relu(),
            Activation::Softmax => x.softmax(),
            Activation::Identity => x.clone(),
        }
    }
}

// --- ReLU ---

/// ReLU activation layer, `max(0, x)`. Has no trainable parameters.
pub struct ReLU;

impl ReLU {
    pub fn new() -> Self {
        ReLU {}
    }
}

impl Default for ReLU {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ReLU {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("ReLU", inputs, 1)?;
        Ok(vec![inputs[0].relu()])
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

// --- Sigmoid ---

/// Sigmoid activation layer, `1 / (1 + exp(-x))`.
pub struct Sigmoid;

impl Sigmoid {
    pub fn new() -> Self {
        Sigmoid {}
    }
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Sigmoid {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Sigmoid", inputs, 1)?;
        Ok(vec![inputs[0].sigmoid()])
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

// --- Tanh ---

/// Hyperbolic tangent activation layer.
pub struct Tanh;

impl Tanh {
    pub fn new() -> Self {
        Tanh {}
    }
}

impl Default for Tanh {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Tanh {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Tanh", inputs, 1)?;
        Ok(vec![inputs[0].tanh()])
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
