//! Initial values for layer parameters.

use crate::nn::module::ModelError;
use ndarray::{ArrayD, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

/// Values drawn uniformly from `[low, high)`. A degenerate range yields `low` everywhere.
pub fn uniform<R: Rng + ?Sized>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> ArrayD<f32> {
    if !(low < high) {
        return ArrayD::from_elem(IxDyn(shape), low);
    }
    ArrayD::random_using(IxDyn(shape), Uniform::new(low, high), rng)
}

/// Uniform in `±1/sqrt(fan_in)`.
pub fn uniform_fan_in<R: Rng + ?Sized>(shape: &[usize], fan_in: usize, rng: &mut R) -> ArrayD<f32> {
    let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
    uniform(shape, -bound, bound, rng)
}

pub fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}

/// Uses an explicitly supplied value after checking its shape, or draws one with `init`.
pub(crate) fn explicit_or_else(
    option: &'static str,
    value: Option<ArrayD<f32>>,
    shape: &[usize],
    init: impl FnOnce() -> ArrayD<f32>,
) -> Result<ArrayD<f32>, ModelError> {
    match value {
        Some(v) if v.shape() != shape => Err(ModelError::InvalidOption {
            option,
            reason: format!("expected shape {:?}, got {:?}", shape, v.shape()),
        }),
        Some(v) => Ok(v),
        None => Ok(init()),
    }
}

pub(crate) fn require_positive(option: &'static str, value: usize) -> Result<(), ModelError> {
    if value == 0 {
        return Err(ModelError::InvalidOption {
            option,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}
