//! Module for shape inference.
//!
//! Traverses the computation graph and determines the shape of the output
//! tensor for each node based on its input shapes and operation type.

use crate::asg::{Asg, AsgError, Node, NodeId, NodeType, Shape};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeInferenceError {
    #[error("Graph error: {0}")]
    AsgError(#[from] AsgError),

    #[error("Incompatible shapes for operation '{op}': left operand {shape1:?}, right operand {shape2:?}. \
             Ensure dimensions are compatible for broadcasting or matrix multiplication.")]
    IncompatibleShapes {
        op: String,
        shape1: Shape,
        shape2: Shape,
    },

    #[error("Shape information missing for node {0}. \
             This may mean the node has not been processed by shape inference yet.")]
    MissingShapeInfo(NodeId),

    #[error("Initial shape not specified for '{0}'. \
             Add the shape to the initial_shapes HashMap when calling ShapeInference::run().")]
    MissingInitialShape(String),

    #[error("Invalid tensor rank for node {node_id}: expected {expected}D, got {actual}D. \
             Check input data dimensions.")]
    InvalidRank {
        node_id: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("Axis {axis} is out of range for a {rank}D tensor at node {node_id}.")]
    InvalidAxis { node_id: NodeId, axis: isize, rank: usize },

    #[error("Index {index} is out of bounds for leading dimension {len} at node {node_id}.")]
    IndexOutOfBounds { node_id: NodeId, index: usize, len: usize },

    #[error("Matrix multiplication error: incompatible inner dimensions {0} and {1}.")]
    MatmulDimensionError(usize, usize),

    #[error("The graph contains a cycle through node {0}.")]
    CyclicGraph(NodeId),
}

type Result<T> = std::result::Result<T, ShapeInferenceError>;

/// Structure that performs shape inference for ASG.
pub struct ShapeInference;

impl ShapeInference {
    /// Runs the shape inference process for the graph.
    ///
    /// Fills in the `shape` field of every node reachable from the graph
    /// outputs. Parameter and literal nodes already carry their shapes.
    ///
    /// # Arguments
    /// * `asg` - Mutable reference to the graph to analyze.
    /// * `initial_shapes` - Shapes of the `Input` nodes, keyed by input name.
    pub fn run(asg: &mut Asg, initial_shapes: &HashMap<String, Shape>) -> Result<()> {
        let sorted_nodes = Self::topological_sort(asg)?;

        for node_id in sorted_nodes {
            let node = asg.get_node(node_id)?;
            let shape = Self::infer_node_shape(asg, node, initial_shapes)?;
            asg.get_node_mut(node_id)?.shape = Some(shape);
        }

        Ok(())
    }

    /// Main shape inference logic for a single node.
    fn infer_node_shape(asg: &Asg, node: &Node, initial_shapes: &HashMap<String, Shape>) -> Result<Shape> {
        match &node.node_type {
            NodeType::Input { name } => initial_shapes
                .get(name)
                .cloned()
                .ok_or_else(|| ShapeInferenceError::MissingInitialShape(name.clone())),

            NodeType::Parameter { .. } | NodeType::Literal(_) => {
                node.shape.clone().ok_or(ShapeInferenceError::MissingShapeInfo(node.id))
            }

            NodeType::Add(l, r) | NodeType::Subtract(l, r) | NodeType::Multiply(l, r) => {
                let ls = Self::get_shape(asg, *l)?;
                let rs = Self::get_shape(asg, *r)?;
                broadcast_shapes(&ls, &rs).ok_or_else(|| ShapeInferenceError::IncompatibleShapes {
                    op: format!("{:?}", node.node_type),
                    shape1: ls,
                    shape2: rs,
                })
            }

            NodeType::MatrixMultiply(l, r) => {
                let ls = Self::get_shape(asg, *l)?;
                let rs = Self::get_shape(asg, *r)?;
                if rs.len() != 2 {
                    return Err(ShapeInferenceError::InvalidRank {
                        node_id: *r,
                        expected: 2,
                        actual: rs.len(),
                    });
                }
                match ls.as_slice() {
                    [k] if *k == rs[0] => Ok(vec![rs[1]]),
                    [m, k] if *k == rs[0] => Ok(vec![*m, rs[1]]),
                    [k] | [_, k] => Err(ShapeInferenceError::MatmulDimensionError(*k, rs[0])),
                    _ => Err(ShapeInferenceError::InvalidRank {
                        node_id: *l,
                        expected: 2,
                        actual: ls.len(),
                    }),
                }
            }

            NodeType::Sigmoid(a) | NodeType::Tanh(a) | NodeType::ReLU(a) | NodeType::Softmax(a) => {
                Self::get_shape(asg, *a)
            }

            NodeType::Concat { inputs, axis } => {
                let shapes = inputs
                    .iter()
                    .map(|id| Self::get_shape(asg, *id))
                    .collect::<Result<Vec<_>>>()?;
                let first = shapes.first().cloned().unwrap_or_default();
                let ax = resolve_axis(*axis, first.len()).ok_or(ShapeInferenceError::InvalidAxis {
                    node_id: node.id,
                    axis: *axis,
                    rank: first.len(),
                })?;
                let mut out = first.clone();
                out[ax] = 0;
                for shape in &shapes {
                    let compatible = shape.len() == first.len()
                        && shape.iter().zip(&first).enumerate().all(|(i, (a, b))| i == ax || a == b);
                    if !compatible {
                        return Err(ShapeInferenceError::IncompatibleShapes {
                            op: "Concat".to_string(),
                            shape1: first,
                            shape2: shape.clone(),
                        });
                    }
                    out[ax] += shape[ax];
                }
                Ok(out)
            }

            NodeType::Stack { inputs } => {
                let shapes = inputs
                    .iter()
                    .map(|id| Self::get_shape(asg, *id))
                    .collect::<Result<Vec<_>>>()?;
                let first = shapes.first().cloned().unwrap_or_default();
                if let Some(other) = shapes.iter().find(|s| **s != first) {
                    return Err(ShapeInferenceError::IncompatibleShapes {
                        op: "Stack".to_string(),
                        shape1: first,
                        shape2: other.clone(),
                    });
                }
                let mut out = vec![shapes.len()];
                out.extend(first);
                Ok(out)
            }

            NodeType::Select { input, index } => {
                let shape = Self::get_shape(asg, *input)?;
                match shape.split_first() {
                    Some((len, rest)) if index < len => Ok(rest.to_vec()),
                    Some((len, _)) => Err(ShapeInferenceError::IndexOutOfBounds {
                        node_id: node.id,
                        index: *index,
                        len: *len,
                    }),
                    None => Err(ShapeInferenceError::InvalidRank {
                        node_id: *input,
                        expected: 1,
                        actual: 0,
                    }),
                }
            }

            NodeType::MaxAxis { input, axis } => {
                let mut shape = Self::get_shape(asg, *input)?;
                let ax = resolve_axis(*axis, shape.len()).ok_or(ShapeInferenceError::InvalidAxis {
                    node_id: node.id,
                    axis: *axis,
                    rank: shape.len(),
                })?;
                shape.remove(ax);
                Ok(shape)
            }

            NodeType::Conv1d { input, weight, bias, stride } => {
                let is = Self::get_shape(asg, *input)?;
                let ws = Self::get_shape(asg, *weight)?;
                let bs = Self::get_shape(asg, *bias)?;
                if is.len() != 2 {
                    return Err(ShapeInferenceError::InvalidRank { node_id: *input, expected: 2, actual: is.len() });
                }
                if ws.len() != 3 {
                    return Err(ShapeInferenceError::InvalidRank { node_id: *weight, expected: 3, actual: ws.len() });
                }
                let (steps, channels) = (is[0], is[1]);
                let (out_channels, in_channels, window) = (ws[0], ws[1], ws[2]);
                if channels != in_channels || window == 0 || steps < window || *stride == 0 {
                    return Err(ShapeInferenceError::IncompatibleShapes {
                        op: "Conv1d".to_string(),
                        shape1: is,
                        shape2: ws,
                    });
                }
                if bs != vec![out_channels] {
                    return Err(ShapeInferenceError::IncompatibleShapes {
                        op: "Conv1d bias".to_string(),
                        shape1: vec![out_channels],
                        shape2: bs,
                    });
                }
                Ok(vec![(steps - window) / stride + 1, out_channels])
            }
        }
    }

    fn get_shape(asg: &Asg, node_id: NodeId) -> Result<Shape> {
        asg.get_node(node_id)?
            .shape
            .clone()
            .ok_or(ShapeInferenceError::MissingShapeInfo(node_id))
    }

    /// Orders the nodes reachable from `asg.outputs` so that every node comes
    /// after its operands.
    ///
    /// Iterative, so that long unrolled graphs cannot exhaust the stack.
    pub fn topological_sort(asg: &Asg) -> Result<Vec<NodeId>> {
        let mut sorted = Vec::new();
        let mut done = HashSet::new();
        let mut on_path = HashSet::new();

        for &output_id in &asg.outputs {
            if done.contains(&output_id) {
                continue;
            }
            // (node, operands already pushed)
            let mut stack = vec![(output_id, false)];
            while let Some((node_id, expanded)) = stack.pop() {
                if expanded {
                    on_path.remove(&node_id);
                    if done.insert(node_id) {
                        sorted.push(node_id);
                    }
                    continue;
                }
                if done.contains(&node_id) {
                    continue;
                }
                if !on_path.insert(node_id) {
                    return Err(ShapeInferenceError::CyclicGraph(node_id));
                }
                stack.push((node_id, true));
                for operand in asg.get_node(node_id)?.node_type.operands().into_iter().rev() {
                    if on_path.contains(&operand) {
                        return Err(ShapeInferenceError::CyclicGraph(operand));
                    }
                    if !done.contains(&operand) {
                        stack.push((operand, false));
                    }
                }
            }
        }
        Ok(sorted)
    }
}

/// Numpy-style broadcast of two shapes, or `None` if they are incompatible.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Shape> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

/// Maps a possibly negative axis onto `0..rank`.
pub fn resolve_axis(axis: isize, rank: usize) -> Option<usize> {
    let resolved = if axis < 0 { axis + rank as isize } else { axis };
    (0..rank as isize).contains(&resolved).then_some(resolved as usize)
}
