//! Combinators that build larger models out of smaller ones.
//!
//! - [`Chain`]: serial composition, outputs of the first feed the second.
//! - [`Parallel`]: members side by side over consecutive input slices.
//! - [`Concat`]: joins several inputs into one tensor.

use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::Tensor;

/// Serial composition: output `i` of `first` becomes input `i` of `second`.
pub struct Chain<A: Module, B: Module> {
    first: A,
    second: B,
}

impl<A: Module, B: Module> Chain<A, B> {
    /// Fails with `ArityMismatch` unless `first.output_arity() == second.input_arity()`.
    pub fn new(first: A, second: B) -> Result<Self, ModelError> {
        if first.output_arity() != second.input_arity() {
            return Err(ModelError::arity(
                "Chain link",
                second.input_arity(),
                first.output_arity(),
            ));
        }
        Ok(Self { first, second })
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

impl<A: Module, B: Module> Module for Chain<A, B> {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        let intermediate = self.first.forward(inputs)?;
        self.second.forward(&intermediate)
    }

    fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.first.parameters();
        params.extend(self.second.parameters());
        params
    }

    fn input_arity(&self) -> usize {
        self.first.input_arity()
    }

    fn output_arity(&self) -> usize {
        self.second.output_arity()
    }
}

/// Members applied side by side.
///
/// Member `j` receives the next `input_arity()` tensors of the input list;
/// the outputs of all members are concatenated in member order.
pub struct Parallel {
    members: Vec<Box<dyn Module>>,
}

impl Parallel {
    pub fn new(members: Vec<Box<dyn Module>>) -> Self {
        Self { members }
    }

    /// Appends another member.
    pub fn with(mut self, member: impl Module + 'static) -> Self {
        self.members.push(Box::new(member));
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Module for Parallel {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Parallel", inputs, self.input_arity())?;

        let mut outputs = Vec::with_capacity(self.output_arity());
        let mut offset = 0;
        for member in &self.members {
            let arity = member.input_arity();
            outputs.extend(member.forward(&inputs[offset..offset + arity])?);
            offset += arity;
        }
        Ok(outputs)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.members.iter().flat_map(|m| m.parameters()).collect()
    }

    fn input_arity(&self) -> usize {
        self.members.iter().map(|m| m.input_arity()).sum()
    }

    fn output_arity(&self) -> usize {
        self.members.iter().map(|m| m.output_arity()).sum()
    }
}

/// Joins `count` inputs into a single tensor along `axis`.
#[derive(Debug, Clone, Copy)]
pub struct Concat {
    count: usize,
    axis: isize,
}

impl Concat {
    /// Concatenation along the last axis.
    pub fn new(count: usize) -> Self {
        Self { count, axis: -1 }
    }

    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn axis(&self) -> isize {
        self.axis
    }
}

impl Module for Concat {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Concat", inputs, self.count)?;
        let joined = Tensor::concat(inputs, self.axis).ok_or_else(|| ModelError::arity("Concat inputs", 1, 0))?;
        Ok(vec![joined])
    }

    fn parameters(&self) -> Vec<Tensor> {
        Vec::new()
    }

    fn input_arity(&self) -> usize {
        self.count
    }

    fn output_arity(&self) -> usize {
        1
    }
}

/// Fluent composition helpers available on every sized module.
pub trait ModuleExt: Module + Sized {
    /// `self` followed by `next`; see [`Chain::new`].
    fn then<N: Module>(self, next: N) -> Result<Chain<Self, N>, ModelError> {
        Chain::new(self, next)
    }
}

impl<M: Module + Sized> ModuleExt for M {}
