//! Integration tests for the sequence recurrence engine.

use asgnet::asg::NodeType;
use asgnet::nn::{
    InitialState, LstmRecurrence, LstmRecurrenceConfig, ModelError, Module, RecurrentNet, RecurrentNetConfig,
};
use asgnet::runtime::backend::RuntimeError;
use asgnet::runtime::cpu_backend::CpuBackend;
use asgnet::runtime::session::Session;
use asgnet::tensor::{GraphContext, Tensor};

use ndarray::{arr1, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

fn setup() -> (Rc<RefCell<GraphContext>>, StdRng) {
    let _ = env_logger::builder().is_test(true).try_init();
    (Rc::new(RefCell::new(GraphContext::new())), StdRng::seed_from_u64(42))
}

fn literals(ctx: &Rc<RefCell<GraphContext>>, prefix: &str, values: &[f32]) -> Vec<Tensor> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Tensor::new_literal(ctx, arr1(&[v]).into_dyn(), &format!("{}_{}", prefix, i)))
        .collect()
}

/// Sums all of its inputs into one new state and counts its invocations.
struct CountingSum {
    arity: usize,
    calls: Rc<Cell<usize>>,
}

impl CountingSum {
    fn new(arity: usize) -> (Self, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Self {
                arity,
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl Module for CountingSum {
    fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>, ModelError> {
        self.calls.set(self.calls.get() + 1);
        let mut total = inputs[0].clone();
        for x in &inputs[1..] {
            total = &total + x;
        }
        Ok(vec![total])
    }

    fn parameters(&self) -> Vec<Tensor> {
        Vec::new()
    }

    fn input_arity(&self) -> usize {
        self.arity
    }

    fn output_arity(&self) -> usize {
        1
    }
}

fn feeds(names: &[&str], value: &ArrayD<f32>) -> HashMap<String, ArrayD<f32>> {
    names.iter().map(|n| (n.to_string(), value.clone())).collect()
}

#[test]
fn test_empty_sequence_never_calls_model() {
    let (ctx, mut rng) = setup();
    let (model, calls) = CountingSum::new(2);
    let config = RecurrentNetConfig::new()
        .with_model(model)
        .with_initial_state(arr1(&[0.0f32]).into_dyn());
    let net = RecurrentNet::new(&ctx, "rnn", config, &mut rng).unwrap();

    let histories = net.unroll(&[Vec::new()]).unwrap();
    assert_eq!(histories.len(), 1);
    assert!(histories[0].is_empty());
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_history_follows_stepwise_application() {
    let (ctx, mut rng) = setup();
    let (model, calls) = CountingSum::new(2);
    let config = RecurrentNetConfig::new()
        .with_model(model)
        .with_initial_state(arr1(&[0.5f32]).into_dyn());
    let net = RecurrentNet::new(&ctx, "rnn", config, &mut rng).unwrap();
    let xs = literals(&ctx, "x", &[1.0, 2.0, 3.0]);

    let histories = net.unroll(&[xs.clone()]).unwrap();
    assert_eq!(calls.get(), 3);

    // Step t adds x_t to the previous state (the initial state at t = 0).
    let graph = ctx.borrow().main_graph().clone();
    let mut previous = net.initial_states()[0].node_id;
    for (t, h) in histories[0].iter().enumerate() {
        assert_eq!(graph.get_node(h.node_id).unwrap().node_type, NodeType::Add(xs[t].node_id, previous));
        previous = h.node_id;
    }

    let session = Session::new(CpuBackend::new(), &ctx);
    let outputs: Vec<&Tensor> = histories[0].iter().collect();
    let values: Vec<f32> = session
        .run(&outputs, &HashMap::new())
        .unwrap()
        .iter()
        .map(|v| v[[0]])
        .collect();
    assert_eq!(values, vec![1.5, 3.5, 6.5]);
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    let run = || {
        let (ctx, mut rng) = setup();
        let net = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_sizes(3, 4), &mut rng).unwrap();
        let xs: Vec<Tensor> = (0..4).map(|t| Tensor::new_input(&ctx, &format!("x{}", t))).collect();
        let histories = net.unroll(&[xs]).unwrap();

        let session = Session::new(CpuBackend::new(), &ctx);
        let outputs: Vec<&Tensor> = histories[0].iter().collect();
        let input = ArrayD::from_shape_vec(IxDyn(&[3]), vec![0.3, -0.7, 1.1]).unwrap();
        session.run(&outputs, &feeds(&["x0", "x1", "x2", "x3"], &input)).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.len(), 4);
    assert_eq!(first, second);
}

#[test]
fn test_default_recurrence_has_zero_initial_state() {
    let (ctx, mut rng) = setup();
    let net = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_sizes(2, 5), &mut rng).unwrap();

    assert_eq!(net.state_count(), 1);
    let h0 = ctx.borrow().parameter_value(net.initial_states()[0].node_id).unwrap().clone();
    assert_eq!(h0, ArrayD::<f32>::zeros(IxDyn(&[5])));
    assert_eq!(net.parameters()[0].node_id, net.initial_states()[0].node_id);
    assert_eq!(net.parameters().len(), 4);

    let x = Tensor::new_input(&ctx, "x");
    let histories = net.unroll(&[vec![x]]).unwrap();
    let session = Session::new(CpuBackend::new(), &ctx);
    let h1 = session
        .eval(&histories[0][0], &feeds(&["x"], &ArrayD::ones(IxDyn(&[2]))))
        .unwrap();
    assert_eq!(h1.shape(), &[5]);
}

#[test]
fn test_lstm_threads_two_states() {
    let (ctx, mut rng) = setup();
    let cell = LstmRecurrence::new(&ctx, "lstm", LstmRecurrenceConfig::new(3, 2), &mut rng).unwrap();
    let initial = InitialState::Many(vec![ArrayD::zeros(IxDyn(&[2])), ArrayD::zeros(IxDyn(&[2]))]);
    let config = RecurrentNetConfig::new().with_model(cell).with_initial_state(initial);
    let net = RecurrentNet::new(&ctx, "seq", config, &mut rng).unwrap();

    assert_eq!(net.state_count(), 2);
    assert_eq!(net.input_count(), 1);
    let names: Vec<_> = net.parameters().iter().take(3).filter_map(|p| p.name()).collect();
    assert_eq!(names, vec!["seq.h0_0", "seq.h0_1", "lstm.Wi"]);

    let xs: Vec<Tensor> = (0..3).map(|t| Tensor::new_input(&ctx, &format!("x{}", t))).collect();
    let histories = net.unroll(&[xs]).unwrap();
    assert_eq!(histories.len(), 2);
    assert!(histories.iter().all(|h| h.len() == 3));

    let session = Session::new(CpuBackend::new(), &ctx);
    let input = ArrayD::from_elem(IxDyn(&[3]), 0.5);
    let values = session
        .run(&[&histories[0][2], &histories[1][2]], &feeds(&["x0", "x1", "x2"], &input))
        .unwrap();
    assert_eq!(values[0].shape(), &[2]);
    assert_eq!(values[1].shape(), &[2]);
    // |h| < 1 because h = o * tanh(c) with o in (0, 1).
    assert!(values[0].iter().all(|v| v.abs() < 1.0));
}

#[test]
fn test_sequence_length_mismatch_is_checked_first() {
    let (ctx, mut rng) = setup();
    let (model, calls) = CountingSum::new(3);
    let config = RecurrentNetConfig::new()
        .with_model(model)
        .with_initial_state(arr1(&[0.0f32]).into_dyn());
    let net = RecurrentNet::new(&ctx, "rnn", config, &mut rng).unwrap();
    assert_eq!(net.input_count(), 2);

    let xs = literals(&ctx, "x", &[1.0, 2.0, 3.0]);
    let ys = literals(&ctx, "y", &[1.0, 2.0]);
    assert_eq!(
        net.unroll(&[xs, ys]).unwrap_err(),
        ModelError::SequenceLengthMismatch {
            index: 1,
            expected: 3,
            actual: 2
        }
    );
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_custom_model_without_state_is_rejected() {
    let (ctx, mut rng) = setup();
    let (model, _) = CountingSum::new(2);
    let result = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_model(model), &mut rng);
    assert!(matches!(result, Err(ModelError::MissingInitialState)));
}

#[test]
fn test_stateless_steps() {
    let (ctx, mut rng) = setup();
    let (model, calls) = CountingSum::new(1);
    let config = RecurrentNetConfig::new()
        .with_model(model)
        .with_initial_state(arr1(&[1.0f32]).into_dyn());
    let net = RecurrentNet::new(&ctx, "counter", config, &mut rng).unwrap();

    let histories = net.unroll_steps(4).unwrap();
    assert_eq!(histories[0].len(), 4);
    assert_eq!(calls.get(), 4);
}

#[test]
fn test_shape_error_inside_cell_surfaces_at_evaluation() {
    let (ctx, mut rng) = setup();
    let net = RecurrentNet::new(&ctx, "rnn", RecurrentNetConfig::new().with_sizes(3, 4), &mut rng).unwrap();
    let xs: Vec<Tensor> = (0..2).map(|t| Tensor::new_input(&ctx, &format!("x{}", t))).collect();

    // Unrolling does not look at shapes.
    let histories = net.unroll(&[xs]).unwrap();
    assert_eq!(histories[0].len(), 2);

    let session = Session::new(CpuBackend::new(), &ctx);
    let result = session.eval(&histories[0][1], &feeds(&["x0", "x1"], &arr1(&[1.0, 2.0]).into_dyn()));
    assert!(matches!(result, Err(RuntimeError::ShapeError(_))));
}
