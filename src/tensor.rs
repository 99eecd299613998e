//! Module defining `Tensor` and `GraphContext`.
//!
//! A `Tensor` is not a data container. It is a lightweight handle (a
//! "symbolic variable") that names one node of the Abstract Semantic Graph.
//! Every operation on tensors (`+`, `dot`, `concat`, ...) appends a node to
//! the graph and returns a new handle; existing values are never mutated.
//!
//! `GraphContext` owns the graph under construction together with the
//! current values of all trainable parameters.

use crate::asg::{Asg, AsgError, AsgResult, NodeId, NodeType};
use ndarray::ArrayD;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

/// Owns the graph being built and the values of its parameters.
///
/// Wrapped in `Rc<RefCell<>>` so that any number of `Tensor` handles can
/// share it.
#[derive(Debug, Clone)]
pub struct GraphContext {
    main_graph: Asg,
    parameters: HashMap<NodeId, ArrayD<f32>>,
}

impl GraphContext {
    /// Creates a new, empty graph context.
    pub fn new() -> Self {
        Self {
            main_graph: Asg::new(0),
            parameters: HashMap::new(),
        }
    }

    /// Mutable access to the main graph for building it.
    pub fn main_graph_mut(&mut self) -> &mut Asg {
        &mut self.main_graph
    }

    /// Immutable access to the main graph.
    pub fn main_graph(&self) -> &Asg {
        &self.main_graph
    }

    /// Current value of the parameter node `id`.
    pub fn parameter_value(&self, id: NodeId) -> Option<&ArrayD<f32>> {
        self.parameters.get(&id)
    }

    /// Replaces the value of a parameter. The new value must keep the shape
    /// the parameter was created with.
    pub fn set_parameter_value(&mut self, id: NodeId, value: ArrayD<f32>) -> AsgResult<()> {
        let current = self.parameters.get_mut(&id).ok_or(AsgError::NotAParameter(id))?;
        if current.shape() != value.shape() {
            return Err(AsgError::ParameterShapeMismatch {
                id,
                expected: current.shape().to_vec(),
                actual: value.shape().to_vec(),
            });
        }
        *current = value;
        Ok(())
    }

    /// All parameter values keyed by node id.
    pub fn parameter_values(&self) -> &HashMap<NodeId, ArrayD<f32>> {
        &self.parameters
    }
}

impl Default for GraphContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbolic handle for a node in the computation graph (ASG).
///
/// Holds no data: only the node id and a shared reference to the
/// `GraphContext` the node lives in.
#[derive(Debug, Clone)]
pub struct Tensor {
    /// ID of the ASG node represented by this tensor.
    pub node_id: NodeId,
    /// Shared reference to the context the graph is built in.
    pub context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    /// Creates a new "input" node. Inputs are fed by name at run time.
    pub fn new_input(context: &Rc<RefCell<GraphContext>>, name: &str) -> Self {
        let mut ctx = context.borrow_mut();
        let graph = ctx.main_graph_mut();

        let node_id = graph.add_node(
            Some(name.to_string()),
            NodeType::Input {
                name: name.to_string(),
            },
        );
        graph.inputs.push(node_id);

        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    /// Creates a new trainable parameter holding `value`.
    ///
    /// The value is stored in the context; its shape is recorded on the node
    /// so that shape inference does not need it to be supplied again.
    pub fn new_parameter(context: &Rc<RefCell<GraphContext>>, name: &str, value: ArrayD<f32>) -> Self {
        let mut ctx = context.borrow_mut();
        let node_id = ctx.main_graph_mut().add_node(
            Some(name.to_string()),
            NodeType::Parameter {
                name: name.to_string(),
            },
        );
        if let Some(node) = ctx.main_graph_mut().nodes.get_mut(&node_id) {
            node.shape = Some(value.shape().to_vec());
        }
        ctx.parameters.insert(node_id, value);

        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    /// Creates a constant node embedding `data` directly in the graph.
    pub fn new_literal(context: &Rc<RefCell<GraphContext>>, data: ArrayD<f32>, name: &str) -> Self {
        let node_id = context
            .borrow_mut()
            .main_graph_mut()
            .add_node(Some(name.to_string()), NodeType::Literal(data));
        Self {
            node_id,
            context: Rc::clone(context),
        }
    }

    /// Name given to the node at creation, if any.
    pub fn name(&self) -> Option<String> {
        let ctx = self.context.borrow();
        ctx.main_graph().get_node(self.node_id).ok().and_then(|node| node.name.clone())
    }

    fn derive(&self, node_type: NodeType) -> Self {
        let node_id = self.context.borrow_mut().main_graph_mut().add_node(None, node_type);
        Self {
            node_id,
            context: Rc::clone(&self.context),
        }
    }

    fn assert_same_context(&self, other: &Tensor) {
        debug_assert!(
            Rc::ptr_eq(&self.context, &other.context),
            "tensors from different graph contexts cannot be combined"
        );
    }

    // --- Math ---

    pub fn dot(&self, other: &Tensor) -> Self {
        self.assert_same_context(other);
        self.derive(NodeType::MatrixMultiply(self.node_id, other.node_id))
    }

    // --- Activations ---

    pub fn sigmoid(&self) -> Self {
        self.derive(NodeType::Sigmoid(self.node_id))
    }

    pub fn tanh(&self) -> Self {
        self.derive(NodeType::Tanh(self.node_id))
    }

    pub fn relu(&self) -> Self {
        self.derive(NodeType::ReLU(self.node_id))
    }

    pub fn softmax(&self) -> Self {
        self.derive(NodeType::Softmax(self.node_id))
    }

    // --- Structural ---

    /// Selects entry `index` along the leading axis, dropping that axis.
    pub fn row(&self, index: usize) -> Self {
        self.derive(NodeType::Select {
            input: self.node_id,
            index,
        })
    }

    /// Splits the first `count` entries along the leading axis into separate tensors.
    pub fn unstack(&self, count: usize) -> Vec<Tensor> {
        (0..count).map(|i| self.row(i)).collect()
    }

    /// Maximum over `axis`; negative values count from the last axis.
    pub fn max_axis(&self, axis: isize) -> Self {
        self.derive(NodeType::MaxAxis {
            input: self.node_id,
            axis,
        })
    }

    /// Cross-correlation of a `[T, C_in]` sequence with a `[C_out, C_in, W]` kernel.
    pub fn conv1d(&self, weight: &Tensor, bias: &Tensor, stride: usize) -> Self {
        self.assert_same_context(weight);
        self.assert_same_context(bias);
        self.derive(NodeType::Conv1d {
            input: self.node_id,
            weight: weight.node_id,
            bias: bias.node_id,
            stride,
        })
    }

    /// Joins tensors along an existing axis. Returns `None` for an empty list.
    pub fn concat(tensors: &[Tensor], axis: isize) -> Option<Tensor> {
        let first = tensors.first()?;
        tensors.iter().for_each(|t| first.assert_same_context(t));
        Some(first.derive(NodeType::Concat {
            inputs: tensors.iter().map(|t| t.node_id).collect(),
            axis,
        }))
    }

    /// Joins equally shaped tensors along a new leading axis.
    /// Returns `None` for an empty list.
    pub fn stack(tensors: &[Tensor]) -> Option<Tensor> {
        let first = tensors.first()?;
        tensors.iter().for_each(|t| first.assert_same_context(t));
        Some(first.derive(NodeType::Stack {
            inputs: tensors.iter().map(|t| t.node_id).collect(),
        }))
    }
}

// Operator overloads for the `&a + &b` syntax.

impl Add<&Tensor> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Self::Output {
        self.assert_same_context(rhs);
        self.derive(NodeType::Add(self.node_id, rhs.node_id))
    }
}

impl Sub<&Tensor> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        self.assert_same_context(rhs);
        self.derive(NodeType::Subtract(self.node_id, rhs.node_id))
    }
}

impl Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        self.assert_same_context(rhs);
        self.derive(NodeType::Multiply(self.node_id, rhs.node_id))
    }
}
