//! ASG: Abstract Semantic Graph
//!
//! The graph is append-only. Tensor handles only ever refer to nodes that
//! already exist, so node ids double as a valid construction order.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Node identifier
pub type NodeId = usize;
/// Graph identifier
pub type AsgId = usize;
/// Tensor shape
pub type Shape = Vec<usize>;

pub type AsgResult<T> = std::result::Result<T, AsgError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsgError {
    #[error("Node with ID {0} not found")]
    NodeNotFound(NodeId),
    #[error("Node {0} is not a parameter")]
    NotAParameter(NodeId),
    #[error("Parameter {id} has shape {expected:?}, refusing a value of shape {actual:?}")]
    ParameterShapeMismatch { id: NodeId, expected: Shape, actual: Shape },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id (duplicates the HashMap key for convenience)
    pub id: NodeId,
    pub name: Option<String>,
    pub node_type: NodeType,
    pub shape: Option<Shape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeType {
    // Data
    Input { name: String },
    Parameter { name: String },
    Literal(ArrayD<f32>),

    // Binary, element-wise with broadcasting
    Add(NodeId, NodeId),
    Subtract(NodeId, NodeId),
    Multiply(NodeId, NodeId),
    // Vector x matrix or matrix x matrix
    MatrixMultiply(NodeId, NodeId),

    // Unary
    Sigmoid(NodeId),
    Tanh(NodeId),
    ReLU(NodeId),
    Softmax(NodeId), // over the last axis

    // Structural
    Concat { inputs: Vec<NodeId>, axis: isize },
    Stack { inputs: Vec<NodeId> },           // new leading axis
    Select { input: NodeId, index: usize },  // along axis 0, drops the axis
    MaxAxis { input: NodeId, axis: isize },

    // Sequence convolution: input [T, C_in], weight [C_out, C_in, W], bias [C_out]
    Conv1d { input: NodeId, weight: NodeId, bias: NodeId, stride: usize },
}

impl NodeType {
    /// Ids of the nodes this node reads, in operand order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeType::Input { .. } | NodeType::Parameter { .. } | NodeType::Literal(_) => vec![],
            NodeType::Add(a, b)
            | NodeType::Subtract(a, b)
            | NodeType::Multiply(a, b)
            | NodeType::MatrixMultiply(a, b) => vec![*a, *b],
            NodeType::Sigmoid(a) | NodeType::Tanh(a) | NodeType::ReLU(a) | NodeType::Softmax(a) => {
                vec![*a]
            }
            NodeType::Concat { inputs, .. } | NodeType::Stack { inputs } => inputs.clone(),
            NodeType::Select { input, .. } | NodeType::MaxAxis { input, .. } => vec![*input],
            NodeType::Conv1d { input, weight, bias, .. } => vec![*input, *weight, *bias],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub id: AsgId,
    pub nodes: HashMap<NodeId, Node>,
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

impl Asg {
    pub fn new(id: AsgId) -> Self {
        Self { id, nodes: HashMap::new(), inputs: vec![], outputs: vec![] }
    }

    pub fn add_node(&mut self, name: Option<String>, node_type: NodeType) -> NodeId {
        let new_id = self.nodes.len();

        // Literal shapes are known up front
        let shape = match &node_type {
            NodeType::Literal(arr) => Some(arr.shape().to_vec()),
            _ => None,
        };

        self.nodes.insert(new_id, Node { id: new_id, name, node_type, shape });
        new_id
    }

    pub fn set_outputs(&mut self, outputs: Vec<NodeId>) {
        self.outputs = outputs;
    }

    pub fn set_output(&mut self, output: NodeId) {
        self.set_outputs(vec![output]);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_node(&self, id: NodeId) -> AsgResult<&Node> {
        self.nodes.get(&id).ok_or(AsgError::NodeNotFound(id))
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> AsgResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(AsgError::NodeNotFound(id))
    }
}
