//! Module defining the core `Module` trait shared by every layer, cell and
//! composite in the crate, together with the model-level error type.

use crate::tensor::Tensor;
use thiserror::Error;

/// Structural errors raised while building or applying models.
///
/// Every one of them is reported before any graph node for the offending
/// call is created. Shape problems inside a model are not reported here;
/// they surface from shape inference or the backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Arity mismatch in {context}: expected {expected}, got {actual}.")]
    ArityMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Malformed tree: {0}")]
    MalformedTree(String),

    #[error("Sequence length mismatch: sequence {index} has {actual} steps, expected {expected}.")]
    SequenceLengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Missing initial state: a custom recurrence model needs at least one initial state.")]
    MissingInitialState,

    #[error("Missing option '{0}'.")]
    MissingOption(&'static str),

    #[error("Invalid option '{option}': {reason}")]
    InvalidOption { option: &'static str, reason: String },
}

impl ModelError {
    pub(crate) fn arity(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        ModelError::ArityMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }
}

/// Common interface for all layers and models.
///
/// In the graph-based architecture a `Module` is any component that adds a
/// fixed pattern of operations and parameters to the graph. `forward` is
/// pure: it never keeps state between calls, recurrent state is passed in
/// and returned explicitly.
pub trait Module {
    /// Performs a "symbolic" forward pass, building the corresponding part of the graph.
    ///
    /// Takes exactly `input_arity()` tensors and returns exactly
    /// `output_arity()` tensors.
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError>;

    /// Returns all trainable parameters (as symbolic tensors) that belong to
    /// this module, in a stable order.
    fn parameters(&self) -> Vec<Tensor>;

    /// Number of tensors `forward` expects.
    fn input_arity(&self) -> usize;

    /// Number of tensors `forward` returns.
    fn output_arity(&self) -> usize;
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        (**self).forward(inputs)
    }

    fn parameters(&self) -> Vec<Tensor> {
        (**self).parameters()
    }

    fn input_arity(&self) -> usize {
        (**self).input_arity()
    }

    fn output_arity(&self) -> usize {
        (**self).output_arity()
    }
}

/// Rejects an input list whose length differs from `expected`.
pub(crate) fn check_inputs(module: &str, inputs: &[Tensor], expected: usize) -> Result<(), ModelError> {
    if inputs.len() != expected {
        return Err(ModelError::arity(format!("{} inputs", module), expected, inputs.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::GraphContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_check_inputs() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let x = Tensor::new_input(&ctx, "x");

        assert!(check_inputs("Perceptron", &[x.clone()], 1).is_ok());
        assert_eq!(
            check_inputs("Perceptron", &[x.clone(), x], 1),
            Err(ModelError::ArityMismatch {
                context: "Perceptron inputs".to_string(),
                expected: 1,
                actual: 2,
            })
        );
    }
}
