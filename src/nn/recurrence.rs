//! Single-step recurrence cells for use with `RecurrentNet`.
//!
//! A cell maps the inputs of one time step plus the previous state(s) to the
//! next state(s). The inputs always come first, the states last.

use crate::nn::activations::Activation;
use crate::nn::init;
use crate::nn::module::{check_inputs, ModelError, Module};
use crate::tensor::{GraphContext, Tensor};
use ndarray::ArrayD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Configuration for [`SimpleRecurrence`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRecurrenceConfig {
    pub insize: usize,
    pub outsize: usize,
    pub activation: Activation,
    /// Explicit input weights `[insize, outsize]`.
    pub weights: Option<ArrayD<f32>>,
    /// Explicit bias `[outsize]`.
    pub bias: Option<ArrayD<f32>>,
    /// Explicit recurrent weights `[outsize, outsize]`.
    pub recurrent_weights: Option<ArrayD<f32>>,
}

impl SimpleRecurrenceConfig {
    pub fn new(insize: usize, outsize: usize) -> Self {
        Self {
            insize,
            outsize,
            activation: Activation::default(),
            weights: None,
            bias: None,
            recurrent_weights: None,
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

    pub fn with_recurrent_weights(mut self, recurrent_weights: ArrayD<f32>) -> Self {
        self.recurrent_weights = Some(recurrent_weights);
        self
    }
}

/// Elman-style cell: inputs `[x_t, h_tm1]`, output `activation(x_t·W + b + h_tm1·W_h)`.
pub struct SimpleRecurrence {
    pub weights: Tensor,
    pub bias: Tensor,
    pub recurrent_weights: Tensor,
    activation: Activation,
}

impl SimpleRecurrence {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: SimpleRecurrenceConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let SimpleRecurrenceConfig {
            insize,
            outsize,
            activation,
            weights,
            bias,
            recurrent_weights,
        } = config;
        init::require_positive("insize", insize)?;
        init::require_positive("outsize", outsize)?;

        let w = init::explicit_or_else("weights", weights, &[insize, outsize], || {
            init::uniform_fan_in(&[insize, outsize], insize, rng)
        })?;
        let b = init::explicit_or_else("bias", bias, &[outsize], || init::zeros(&[outsize]))?;
        let w_h = init::explicit_or_else("recurrent_weights", recurrent_weights, &[outsize, outsize], || {
            init::uniform_fan_in(&[outsize, outsize], outsize, rng)
        })?;

        Ok(Self {
            weights: Tensor::new_parameter(context, &format!("{}.W", name), w),
            bias: Tensor::new_parameter(context, &format!("{}.b", name), b),
            recurrent_weights: Tensor::new_parameter(context, &format!("{}.W_h", name), w_h),
            activation,
        })
    }
}

impl Module for SimpleRecurrence {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("SimpleRecurrence", inputs, 2)?;
        let (x_t, h_tm1) = (&inputs[0], &inputs[1]);

        let z = &x_t.dot(&self.weights) + &self.bias;
        let m = h_tm1.dot(&self.recurrent_weights);
        Ok(vec![self.activation.apply(&(&z + &m))])
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weights.clone(), self.bias.clone(), self.recurrent_weights.clone()]
    }

    fn input_arity(&self) -> usize {
        2
    }

    fn output_arity(&self) -> usize {
        1
    }
}

/// Gates of an [`LstmRecurrence`], in parameter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LstmGate {
    Input,
    Forget,
    Candidate,
    Output,
}

impl LstmGate {
    /// Names of the gate's input weights, recurrent weights and bias.
    fn parameter_names(self) -> [&'static str; 3] {
        match self {
            LstmGate::Input => ["Wi", "Ui", "bi"],
            LstmGate::Forget => ["Wf", "Uf", "bf"],
            LstmGate::Candidate => ["Wc", "Uc", "bc"],
            LstmGate::Output => ["Wo", "Uo", "bo"],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GateWeights {
    weights: Option<ArrayD<f32>>,
    recurrent_weights: Option<ArrayD<f32>>,
    bias: Option<ArrayD<f32>>,
}

/// Configuration for [`LstmRecurrence`]. Any gate parameter left unset is
/// drawn at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmRecurrenceConfig {
    pub insize: usize,
    pub outsize: usize,
    gates: [GateWeights; 4],
}

impl LstmRecurrenceConfig {
    pub fn new(insize: usize, outsize: usize) -> Self {
        Self {
            insize,
            outsize,
            gates: Default::default(),
        }
    }

    /// Explicit input weights `[insize, outsize]` for `gate`.
    pub fn with_weights(mut self, gate: LstmGate, weights: ArrayD<f32>) -> Self {
        self.gates[gate as usize].weights = Some(weights);
        self
    }

    /// Explicit recurrent weights `[outsize, outsize]` for `gate`.
    pub fn with_recurrent_weights(mut self, gate: LstmGate, recurrent_weights: ArrayD<f32>) -> Self {
        self.gates[gate as usize].recurrent_weights = Some(recurrent_weights);
        self
    }

    /// Explicit bias `[outsize]` for `gate`.
    pub fn with_bias(mut self, gate: LstmGate, bias: ArrayD<f32>) -> Self {
        self.gates[gate as usize].bias = Some(bias);
        self
    }
}

/// One LSTM gate: input weights, recurrent weights and bias.
struct Gate {
    w: Tensor,
    u: Tensor,
    b: Tensor,
}

impl Gate {
    fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        gate: LstmGate,
        (insize, outsize): (usize, usize),
        explicit: GateWeights,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let [w_name, u_name, b_name] = gate.parameter_names();
        let w = init::explicit_or_else(w_name, explicit.weights, &[insize, outsize], || {
            init::uniform_fan_in(&[insize, outsize], insize, rng)
        })?;
        let u = init::explicit_or_else(u_name, explicit.recurrent_weights, &[outsize, outsize], || {
            init::uniform_fan_in(&[outsize, outsize], outsize, rng)
        })?;
        let b = init::explicit_or_else(b_name, explicit.bias, &[outsize], || init::zeros(&[outsize]))?;
        Ok(Self {
            w: Tensor::new_parameter(context, &format!("{}.{}", name, w_name), w),
            u: Tensor::new_parameter(context, &format!("{}.{}", name, u_name), u),
            b: Tensor::new_parameter(context, &format!("{}.{}", name, b_name), b),
        })
    }

    fn pre_activation(&self, x_t: &Tensor, h_tm1: &Tensor) -> Tensor {
        let xw = x_t.dot(&self.w);
        let hu = h_tm1.dot(&self.u);
        &(&xw + &hu) + &self.b
    }
}

/// LSTM cell: inputs `[x_t, h_tm1, c_tm1]`, outputs `[h_t, c_t]`.
///
/// ```text
/// i = sigmoid(x·Wi + h·Ui + bi)     f = sigmoid(x·Wf + h·Uf + bf)
/// c̃ = tanh(x·Wc + h·Uc + bc)        o = sigmoid(x·Wo + h·Uo + bo)
/// c_t = i*c̃ + f*c_tm1               h_t = o*tanh(c_t)
/// ```
pub struct LstmRecurrence {
    input: Gate,
    forget: Gate,
    candidate: Gate,
    output: Gate,
}

impl LstmRecurrence {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: LstmRecurrenceConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let LstmRecurrenceConfig { insize, outsize, gates } = config;
        init::require_positive("insize", insize)?;
        init::require_positive("outsize", outsize)?;

        let [input, forget, candidate, output] = gates;
        let sizes = (insize, outsize);
        Ok(Self {
            input: Gate::new(context, name, LstmGate::Input, sizes, input, rng)?,
            forget: Gate::new(context, name, LstmGate::Forget, sizes, forget, rng)?,
            candidate: Gate::new(context, name, LstmGate::Candidate, sizes, candidate, rng)?,
            output: Gate::new(context, name, LstmGate::Output, sizes, output, rng)?,
        })
    }

    fn gates(&self) -> [&Gate; 4] {
        [&self.input, &self.forget, &self.candidate, &self.output]
    }
}

impl Module for LstmRecurrence {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        check_inputs("LstmRecurrence", inputs, 3)?;
        let (x_t, h_tm1, c_tm1) = (&inputs[0], &inputs[1], &inputs[2]);

        let i = self.input.pre_activation(x_t, h_tm1).sigmoid();
        let c_tilde = self.candidate.pre_activation(x_t, h_tm1).tanh();
        let f = self.forget.pre_activation(x_t, h_tm1).sigmoid();
        let c_t = &(&i * &c_tilde) + &(&f * c_tm1);
        let o = self.output.pre_activation(x_t, h_tm1).sigmoid();
        let h_t = &o * &c_t.tanh();

        Ok(vec![h_t, c_t])
    }

    /// `[Wi, Wf, Wc, Wo, Ui, Uf, Uc, Uo, bi, bf, bc, bo]`
    fn parameters(&self) -> Vec<Tensor> {
        let gates = self.gates();
        let mut params: Vec<Tensor> = gates.iter().map(|g| g.w.clone()).collect();
        params.extend(gates.iter().map(|g| g.u.clone()));
        params.extend(gates.iter().map(|g| g.b.clone()));
        params
    }

    fn input_arity(&self) -> usize {
        3
    }

    fn output_arity(&self) -> usize {
        2
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

    fn sigmoid(x: f32) -> f32 {
        1.0 / (1.0 + (-x).exp())
    }

    #[test]
    fn test_simple_recurrence_step() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let mut rng = StdRng::seed_from_u64(0);
        let config = SimpleRecurrenceConfig::new(2, 1)
            .with_weights(arr2(&[[1.0], [1.0]]).into_dyn())
            .with_bias(arr1(&[0.5]).into_dyn())
            .with_recurrent_weights(arr2(&[[2.0]]).into_dyn());
        let cell = SimpleRecurrence::new(&ctx, "rnn", config, &mut rng).unwrap();

        let x = Tensor::new_input(&ctx, "x");
        let h = Tensor::new_input(&ctx, "h");
        let out = cell.forward(&[x, h]).unwrap();
        assert_eq!(out.len(), cell.output_arity());

        let session = Session::new(CpuBackend::new(), &ctx);
        let feeds = HashMap::from([
            ("x".to_string(), arr1(&[1.0, 2.0]).into_dyn()),
            ("h".to_string(), arr1(&[-1.0]).into_dyn()),
        ]);
        let value = session.eval(&out[0], &feeds).unwrap();
        assert!((value[[0]] - sigmoid(1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_simple_recurrence_parameter_order() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let cell =
            SimpleRecurrence::new(&ctx, "rnn", SimpleRecurrenceConfig::new(3, 2), &mut StdRng::seed_from_u64(0)).unwrap();
        let names: Vec<_> = cell.parameters().iter().filter_map(|p| p.name()).collect();
        assert_eq!(names, vec!["rnn.W", "rnn.b", "rnn.W_h"]);
    }

    #[test]
    fn test_lstm_parameters_and_shapes() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let config = LstmRecurrenceConfig::new(3, 2);
        let cell = LstmRecurrence::new(&ctx, "lstm", config, &mut StdRng::seed_from_u64(0)).unwrap();

        let names: Vec<_> = cell.parameters().iter().filter_map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "lstm.Wi", "lstm.Wf", "lstm.Wc", "lstm.Wo", "lstm.Ui", "lstm.Uf", "lstm.Uc", "lstm.Uo", "lstm.bi",
                "lstm.bf", "lstm.bc", "lstm.bo"
            ]
        );
        let ctx_ref = ctx.borrow();
        assert_eq!(ctx_ref.parameter_value(cell.input.u.node_id).unwrap().shape(), &[2, 2]);
        assert_eq!(ctx_ref.parameter_value(cell.output.w.node_id).unwrap().shape(), &[3, 2]);
    }

    #[test]
    fn test_lstm_step_with_zero_weights() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let config = LstmRecurrenceConfig::new(2, 2);
        let cell = LstmRecurrence::new(&ctx, "lstm", config, &mut StdRng::seed_from_u64(0)).unwrap();
        for p in cell.parameters() {
            let shape = ctx.borrow().parameter_value(p.node_id).unwrap().shape().to_vec();
            ctx.borrow_mut().set_parameter_value(p.node_id, init::zeros(&shape)).unwrap();
        }

        let x = Tensor::new_input(&ctx, "x");
        let h = Tensor::new_input(&ctx, "h");
        let c = Tensor::new_input(&ctx, "c");
        let out = cell.forward(&[x, h, c]).unwrap();

        // All gates are 0.5 and the candidate is 0: c_t = 0.5*c, h_t = 0.5*tanh(c_t).
        let session = Session::new(CpuBackend::new(), &ctx);
        let feeds = HashMap::from([
            ("x".to_string(), arr1(&[1.0, 1.0]).into_dyn()),
            ("h".to_string(), arr1(&[1.0, 1.0]).into_dyn()),
            ("c".to_string(), arr1(&[2.0, -4.0]).into_dyn()),
        ]);
        let values = session.run(&[&out[0], &out[1]], &feeds).unwrap();
        assert_eq!(values[1], arr1(&[1.0, -2.0]).into_dyn());
        assert!((values[0][[0]] - 0.5 * 1.0f32.tanh()).abs() < 1e-6);
        assert!((values[0][[1]] - 0.5 * (-2.0f32).tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_lstm_explicit_gate_weights() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let mut rng = StdRng::seed_from_u64(0);
        let forget_bias = arr1(&[1.0, -1.0]).into_dyn();
        let config = LstmRecurrenceConfig::new(3, 2)
            .with_bias(LstmGate::Forget, forget_bias.clone())
            .with_recurrent_weights(LstmGate::Output, init::zeros(&[2, 2]));
        let cell = LstmRecurrence::new(&ctx, "lstm", config, &mut rng).unwrap();

        let ctx_ref = ctx.borrow();
        assert_eq!(ctx_ref.parameter_value(cell.forget.b.node_id).unwrap(), &forget_bias);
        assert_eq!(ctx_ref.parameter_value(cell.output.u.node_id).unwrap(), &init::zeros(&[2, 2]));
        assert_eq!(ctx_ref.parameter_value(cell.input.b.node_id).unwrap(), &init::zeros(&[2]));
    }

    #[test]
    fn test_lstm_rejects_misshaped_gate_weights() {
        let ctx = Rc::new(RefCell::new(GraphContext::new()));
        let mut rng = StdRng::seed_from_u64(0);
        let config = LstmRecurrenceConfig::new(3, 2).with_weights(LstmGate::Candidate, init::zeros(&[2, 3]));
        assert!(matches!(
            LstmRecurrence::new(&ctx, "lstm", config, &mut rng),
            Err(ModelError::InvalidOption { option: "Wc", .. })
        ));
    }
}
