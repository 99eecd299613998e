//! Sequence recurrence: a recurrent network threading carried state through
//! one recurrence model, left to right over a time axis.
//!
//! The model takes `m` per-step inputs followed by `s` states and returns
//! `s` new states. The network owns the initial states as parameters and
//! returns, per state, the history of values after each step (the initial
//! state is not part of the history).

use crate::nn::init;
use crate::nn::module::{ModelError, Module};
use crate::nn::recurrence::{SimpleRecurrence, SimpleRecurrenceConfig};
use crate::tensor::{GraphContext, Tensor};
use ndarray::ArrayD;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// Initial value(s) of the carried state.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialState {
    /// One state tensor, treated as a one-element list.
    Single(ArrayD<f32>),
    Many(Vec<ArrayD<f32>>),
}

impl InitialState {
    pub fn into_vec(self) -> Vec<ArrayD<f32>> {
        match self {
            InitialState::Single(state) => vec![state],
            InitialState::Many(states) => states,
        }
    }
}

impl From<ArrayD<f32>> for InitialState {
    fn from(state: ArrayD<f32>) -> Self {
        InitialState::Single(state)
    }
}

impl From<Vec<ArrayD<f32>>> for InitialState {
    fn from(states: Vec<ArrayD<f32>>) -> Self {
        InitialState::Many(states)
    }
}

/// Configuration for [`RecurrentNet`].
///
/// Either a custom model together with its initial state, or the sizes of
/// the default `SimpleRecurrence` cell (whose state then defaults to zeros).
#[derive(Default)]
pub struct RecurrentNetConfig {
    pub model: Option<Box<dyn Module>>,
    pub initial_state: Option<InitialState>,
    pub insize: Option<usize>,
    pub outsize: Option<usize>,
}

impl RecurrentNetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Module + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    pub fn with_initial_state(mut self, initial_state: impl Into<InitialState>) -> Self {
        self.initial_state = Some(initial_state.into());
        self
    }

    pub fn with_sizes(mut self, insize: usize, outsize: usize) -> Self {
        self.insize = Some(insize);
        self.outsize = Some(outsize);
        self
    }
}

/// Recurrent neural network over sequences of tensors.
pub struct RecurrentNet {
    name: String,
    model: Box<dyn Module>,
    initial_states: Vec<Tensor>,
    step_inputs: usize,
}

impl RecurrentNet {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: RecurrentNetConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let RecurrentNetConfig {
            model,
            initial_state,
            insize,
            outsize,
        } = config;

        let (model, states): (Box<dyn Module>, Vec<ArrayD<f32>>) = match model {
            Some(model) => {
                if insize.is_some() || outsize.is_some() {
                    log::warn!("{}: 'insize'/'outsize' are ignored when a model is given", name);
                }
                let states = initial_state.ok_or(ModelError::MissingInitialState)?.into_vec();
                (model, states)
            }
            None => {
                let insize = insize.ok_or(ModelError::MissingOption("insize"))?;
                let outsize = outsize.ok_or(ModelError::MissingOption("outsize"))?;
                let cell = SimpleRecurrence::new(
                    context,
                    &format!("{}.cell", name),
                    SimpleRecurrenceConfig::new(insize, outsize),
                    rng,
                )?;
                let states = initial_state.map_or_else(|| vec![init::zeros(&[outsize])], InitialState::into_vec);
                (Box::new(cell) as Box<dyn Module>, states)
            }
        };
        if states.is_empty() {
            return Err(ModelError::MissingInitialState);
        }

        let state_count = states.len();
        if model.output_arity() != state_count {
            return Err(ModelError::arity("recurrence model outputs", state_count, model.output_arity()));
        }
        if model.input_arity() < state_count {
            return Err(ModelError::arity("recurrence model inputs", state_count, model.input_arity()));
        }
        let step_inputs = model.input_arity() - state_count;

        let initial_states = states
            .into_iter()
            .enumerate()
            .map(|(i, state)| Tensor::new_parameter(context, &format!("{}.h0_{}", name, i), state))
            .collect();

        log::debug!(
            "{}: recurrent net with {} input stream(s) and {} state(s)",
            name,
            step_inputs,
            state_count
        );

        Ok(Self {
            name: name.to_string(),
            model,
            initial_states,
            step_inputs,
        })
    }

    /// Number of carried states `s`.
    pub fn state_count(&self) -> usize {
        self.initial_states.len()
    }

    /// Number of per-step input streams `m`.
    pub fn input_count(&self) -> usize {
        self.step_inputs
    }

    pub fn initial_states(&self) -> &[Tensor] {
        &self.initial_states
    }

    pub fn model(&self) -> &dyn Module {
        self.model.as_ref()
    }

    /// Initial states followed by the model's parameters.
    pub fn parameters(&self) -> Vec<Tensor> {
        let mut params = self.initial_states.clone();
        params.extend(self.model.parameters());
        params
    }

    /// Runs the model over `sequences` (one per input stream, all of the
    /// same length) and returns the history of every state.
    pub fn unroll(&self, sequences: &[Vec<Tensor>]) -> Result<Vec<Vec<Tensor>>, ModelError> {
        if sequences.len() != self.step_inputs {
            return Err(ModelError::arity("input sequences", self.step_inputs, sequences.len()));
        }
        let steps = sequences.first().map_or(0, Vec::len);
        if let Some((index, seq)) = sequences.iter().enumerate().find(|(_, s)| s.len() != steps) {
            return Err(ModelError::SequenceLengthMismatch {
                index,
                expected: steps,
                actual: seq.len(),
            });
        }

        self.run(steps, |t| sequences.iter().map(|seq| seq[t].clone()).collect())
    }

    /// Runs a model without per-step inputs for `steps` steps.
    pub fn unroll_steps(&self, steps: usize) -> Result<Vec<Vec<Tensor>>, ModelError> {
        if self.step_inputs != 0 {
            return Err(ModelError::arity("input sequences", self.step_inputs, 0));
        }
        self.run(steps, |_| Vec::new())
    }

    fn run(&self, steps: usize, inputs_at: impl Fn(usize) -> Vec<Tensor>) -> Result<Vec<Vec<Tensor>>, ModelError> {
        let state_count = self.state_count();
        let mut histories: Vec<Vec<Tensor>> = (0..state_count).map(|_| Vec::with_capacity(steps)).collect();
        let mut current = self.initial_states.clone();

        for t in 0..steps {
            let mut inputs = inputs_at(t);
            inputs.extend(current.iter().cloned());

            let next = self.model.forward(&inputs)?;
            if next.len() != state_count {
                return Err(ModelError::arity("recurrence model outputs", state_count, next.len()));
            }
            log::trace!("{}: step {}", self.name, t);

            for (history, state) in histories.iter_mut().zip(&next) {
                history.push(state.clone());
            }
            current = next;
        }

        log::debug!("{}: unrolled {} step(s)", self.name, steps);
        Ok(histories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::recurrence::{LstmRecurrence, LstmRecurrenceConfig};
    use ndarray::arr1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn context() -> Rc<RefCell<GraphContext>> {
        Rc::new(RefCell::new(GraphContext::new()))
    }

    #[test]
    fn test_default_model_and_zero_state() {
        let ctx = context();
        let net = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_sizes(3, 4), &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(net.state_count(), 1);
        assert_eq!(net.input_count(), 1);
        let h0 = &net.initial_states()[0];
        assert_eq!(h0.name().as_deref(), Some("rnn.h0_0"));
        assert_eq!(ctx.borrow().parameter_value(h0.node_id).unwrap(), &init::zeros(&[4]));

        let names: Vec<_> = net.parameters().iter().filter_map(|p| p.name()).collect();
        assert_eq!(names, vec!["rnn.h0_0", "rnn.cell.W", "rnn.cell.b", "rnn.cell.W_h"]);
    }

    #[test]
    fn test_custom_model_requires_state() {
        let ctx = context();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = LstmRecurrence::new(&ctx, "lstm", LstmRecurrenceConfig::new(2, 2), &mut rng).unwrap();
        assert!(matches!(
            RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_model(cell), &mut rng),
            Err(ModelError::MissingInitialState)
        ));

        let cell = LstmRecurrence::new(&ctx, "lstm", LstmRecurrenceConfig::new(2, 2), &mut rng).unwrap();
        let config = RecurrentNetConfig::new().with_model(cell).with_initial_state(Vec::<ArrayD<f32>>::new());
        assert!(matches!(
            RecurrentNet::new(&ctx, "rnn", config, &mut rng),
            Err(ModelError::MissingInitialState)
        ));
    }

    #[test]
    fn test_state_count_must_match_model() {
        let ctx = context();
        let mut rng = StdRng::seed_from_u64(1);
        let cell = LstmRecurrence::new(&ctx, "lstm", LstmRecurrenceConfig::new(2, 2), &mut rng).unwrap();
        let config = RecurrentNetConfig::new()
            .with_model(cell)
            .with_initial_state(arr1(&[0.0f32, 0.0]).into_dyn());
        assert!(matches!(
            RecurrentNet::new(&ctx, "rnn", config, &mut rng),
            Err(ModelError::ArityMismatch { expected: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn test_missing_sizes() {
        let ctx = context();
        let config = RecurrentNetConfig {
            insize: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            RecurrentNet::new(&ctx, "rnn", config, &mut StdRng::seed_from_u64(1)),
            Err(ModelError::MissingOption("outsize"))
        ));
    }

    #[test]
    fn test_unroll_threads_state() {
        let ctx = context();
        let net = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_sizes(2, 2), &mut StdRng::seed_from_u64(1))
            .unwrap();
        let xs: Vec<Tensor> = (0..3).map(|t| Tensor::new_input(&ctx, &format!("x_{}", t))).collect();

        let histories = net.unroll(&[xs]).unwrap();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].len(), 3);

        assert!(matches!(net.unroll(&[]), Err(ModelError::ArityMismatch { .. })));
        assert!(matches!(net.unroll_steps(2), Err(ModelError::ArityMismatch { .. })));
    }
}
