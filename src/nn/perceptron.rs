//! Fully connected layers: `Perceptron` and its softmax-output variant.

use crate::nn::activations::Activation;
use crate::nn::init;
use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::{GraphContext, Tensor};
use ndarray::ArrayD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Configuration for [`Perceptron`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptronConfig {
    /// Number of input features.
    pub insize: usize,
    /// Number of output features.
    pub outsize: usize,
    /// Output nonlinearity.
    pub activation: Activation,
    /// Explicit initial weights `[insize, outsize]`.
    pub weights: Option<ArrayD<f32>>,
    /// Explicit initial bias `[outsize]`.
    pub bias: Option<ArrayD<f32>>,
}

impl PerceptronConfig {
    pub fn new(insize: usize, outsize: usize) -> Self {
        Self {
            insize,
            outsize,
            activation: Activation::default(),
            weights: None,
            bias: None,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_weights(mut self, weights: ArrayD<f32>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_bias(mut self, bias: ArrayD<f32>) -> Self {
        self.bias = Some(bias);
        self
    }
}

/// Fully connected layer, `activation(x·W + b)`.
///
/// The layer owns symbolic handles for its weights and bias; their values
/// live in the `GraphContext`. Unless given explicitly, `W` is drawn
/// uniformly from `±1/sqrt(insize)` and `b` starts at zero.
pub struct Perceptron {
    /// Symbolic descriptor for the weight tensor `[insize, outsize]`.
    pub weights: Tensor,
    /// Symbolic descriptor for the bias `[outsize]`.
    pub bias: Tensor,
    activation: Activation,
}

impl Perceptron {
    /// Creates a new layer, registering `{name}.W` and `{name}.b` in the graph.
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: PerceptronConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        init::require_positive("insize", config.insize)?;
        init::require_positive("outsize", config.outsize)?;

        let w_shape = [config.insize, config.outsize];
        let w = init::explicit_or_else("weights", config.weights, &w_shape, || {
            init::uniform_fan_in(&w_shape, config.insize, rng)
        })?;
        let b = init::explicit_or_else("bias", config.bias, &[config.outsize], || {
            init::zeros(&[config.outsize])
        })?;

        Ok(Self {
            weights: Tensor::new_parameter(context, &format!("{}.W", name), w),
            bias: Tensor::new_parameter(context, &format!("{}.b", name), b),
            activation: config.activation,
        })
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }
}

impl Module for Perceptron {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("Perceptron", inputs, 1)?;
        let z = &inputs[0].dot(&self.weights) + &self.bias;
        Ok(vec![self.activation.apply(&z)])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weights.clone(), self.bias.clone()]
    }

    fn input_arity(&self) -> usize {
        1
    }

    fn output_arity(&self) -> usize {
        1
    }
}

/// Configuration for [`SoftmaxLayer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxLayerConfig {
    pub insize: usize,
    pub outsize: usize,
    /// Explicit initial weights `[insize, outsize]`.
    pub weights: Option<ArrayD<f32>>,
    /// Explicit initial bias `[outsize]`.
    pub bias: Option<ArrayD<f32>>,
}

impl SoftmaxLayerConfig {
    pub fn new(insize: usize, outsize: usize) -> Self {
        Self {
            insize,
            outsize,
            weights: None,
            bias: None,
        }
    }

    pub fn with_weights(mut self, weights: ArrayD<f32>) -> Self {
        self.weights = Some(weights);
        self
    }

    pub fn with_bias(mut self, bias: ArrayD<f32>) -> Self {
        self.bias = Some(bias);
        self
    }
}

/// Softmax output layer, `softmax(x·W + b)`.
///
/// Parameters are named `{name}.W_softmax` and `{name}.b_softmax`; unless
/// given explicitly the bias starts uniform in `[0, 1)`.
pub struct SoftmaxLayer {
    pub weights: Tensor,
    pub bias: Tensor,
}

impl SoftmaxLayer {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: SoftmaxLayerConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let SoftmaxLayerConfig {
            insize,
            outsize,
            weights,
            bias,
        } = config;
        init::require_positive("insize", insize)?;
        init::require_positive("outsize", outsize)?;

        let w = init::explicit_or_else("weights", weights, &[insize, outsize], || {
            init::uniform_fan_in(&[insize, outsize], insize, rng)
        })?;
        let b = init::explicit_or_else("bias", bias, &[outsize], || init::uniform(&[outsize], 0.0, 1.0, rng))?;

        Ok(Self {
            weights: Tensor::new_parameter(context, &format!("{}.W_softmax", name), w),
            bias: Tensor::new_parameter(context, &format!("{}.b_softmax", name), b),
        })
    }
}

impl Module for SoftmaxLayer {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("SoftmaxLayer", inputs, 1)?;
        let z = &inputs[0].dot(&self.weights) + &self.bias;
        Ok(vec![z.softmax()])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weights.clone(), self.bias.clone()]
    }

    fn input_arity(&self) -> usize {
        1
    }

    fn output_arity(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::cpu_backend::CpuBackend;
    use crate::runtime::session::Session;
    use ndarray::{arr1, arr2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn setup() -> (Rc<RefCell<GraphContext>>, StdRng) {
        (Rc::new(RefCell::new(GraphContext::new())), StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_perceptron_initialisation() {
        let (ctx, mut rng) = setup();
        let layer = Perceptron::new(&ctx, "fc", PerceptronConfig::new(4, 3), &mut rng).unwrap();

        let ctx_ref = ctx.borrow();
        let w = ctx_ref.parameter_value(layer.weights.node_id).unwrap();
        let b = ctx_ref.parameter_value(layer.bias.node_id).unwrap();
        assert_eq!(w.shape(), &[4, 3]);
        assert!(w.iter().all(|v| v.abs() <= 0.5));
        assert_eq!(b, &init::zeros(&[3]));
        assert_eq!(layer.weights.name().as_deref(), Some("fc.W"));
        assert_eq!(layer.activation(), Activation::Sigmoid);
    }

    #[test]
    fn test_perceptron_forward_values() {
        let (ctx, mut rng) = setup();
        let config = PerceptronConfig::new(2, 2)
            .with_activation(Activation::Identity)
            .with_weights(arr2(&[[1.0, 0.0], [0.0, 2.0]]).into_dyn())
            .with_bias(arr1(&[1.0, 1.0]).into_dyn());
        let layer = Perceptron::new(&ctx, "fc", config, &mut rng).unwrap();

        let x = Tensor::new_input(&ctx, "x");
        let y = layer.forward(&[x]).unwrap().remove(0);

        let session = Session::new(CpuBackend::new(), &ctx);
        let feeds = HashMap::from([("x".to_string(), arr1(&[3.0, 4.0]).into_dyn())]);
        assert_eq!(session.eval(&y, &feeds).unwrap(), arr1(&[4.0, 9.0]).into_dyn());
    }

    #[test]
    fn test_perceptron_rejects_bad_weights() {
        let (ctx, mut rng) = setup();
        let config = PerceptronConfig::new(2, 3).with_weights(init::zeros(&[3, 2]));
        assert!(matches!(
            Perceptron::new(&ctx, "fc", config, &mut rng),
            Err(ModelError::InvalidOption { option: "weights", .. })
        ));
        assert!(Perceptron::new(&ctx, "fc", PerceptronConfig::new(0, 3), &mut rng).is_err());
    }

    #[test]
    fn test_softmax_layer_outputs_distribution() {
        let (ctx, mut rng) = setup();
        let layer = SoftmaxLayer::new(&ctx, "out", SoftmaxLayerConfig::new(3, 4), &mut rng).unwrap();
        let bias = ctx.borrow().parameter_value(layer.bias.node_id).unwrap().clone();
        assert!(bias.iter().all(|v| (0.0..1.0).contains(v)));

        let x = Tensor::new_input(&ctx, "x");
        let y = layer.forward(&[x]).unwrap().remove(0);

        let session = Session::new(CpuBackend::new(), &ctx);
        let feeds = HashMap::from([("x".to_string(), arr1(&[0.5, -1.0, 2.0]).into_dyn())]);
        let probs = session.eval(&y, &feeds).unwrap();
        assert_eq!(probs.shape(), &[4]);
        assert!((probs.sum() - 1.0).abs() < 1e-5);
        assert_eq!(layer.parameters().len(), 2);
    }

    #[test]
    fn test_softmax_layer_explicit_weights() {
        let (ctx, mut rng) = setup();
        let config = SoftmaxLayerConfig::new(2, 2)
            .with_weights(arr2(&[[1.0, 0.0], [0.0, 1.0]]).into_dyn())
            .with_bias(arr1(&[0.0, 0.0]).into_dyn());
        let layer = SoftmaxLayer::new(&ctx, "out", config, &mut rng).unwrap();
        assert_eq!(layer.weights.name().as_deref(), Some("out.W_softmax"));

        let x = Tensor::new_input(&ctx, "x");
        let y = layer.forward(&[x]).unwrap().remove(0);
        let session = Session::new(CpuBackend::new(), &ctx);
        let feeds = HashMap::from([("x".to_string(), arr1(&[1.0, 1.0]).into_dyn())]);
        let probs = session.eval(&y, &feeds).unwrap();
        assert!((probs[[0]] - 0.5).abs() < 1e-6);
        assert!((probs[[1]] - 0.5).abs() < 1e-6);

        let bad = SoftmaxLayerConfig::new(2, 2).with_bias(init::zeros(&[3]));
        assert!(matches!(
            SoftmaxLayer::new(&ctx, "out", bad, &mut rng),
            Err(ModelError::InvalidOption { option: "bias", .. })
        ));
    }
}
