//! Module implementing the CPU backend for ASG execution.
//!
//! This backend walks the computation graph (ASG) in topological order and
//! executes each node with `ndarray`.

use super::backend::{Backend, Memo, RuntimeError};
use crate::analysis::shape_inference::{broadcast_shapes, resolve_axis, ShapeInference};
use crate::asg::{Asg, AsgId, NodeId, NodeType};
use ndarray::{ArrayD, ArrayView2, Axis, Ix1, Ix2, Ix3, IxDyn};
use std::collections::HashMap;

/// Execution context for a single graph on the CPU.
struct ExecutionContext<'a> {
    asg: &'a Asg,
    /// Values computed so far, keyed by (AsgId, NodeId).
    memo: Memo<ArrayD<f32>>,
}

impl<'a> ExecutionContext<'a> {
    fn new(asg: &'a Asg, initial_memo: Memo<ArrayD<f32>>) -> Self {
        Self {
            asg,
            memo: initial_memo,
        }
    }

    fn value(&mut self, node_id: NodeId) -> Result<ArrayD<f32>, RuntimeError> {
        self.evaluate_node(self.asg.id, node_id)
    }

    /// Computes the value of one node, reading operands from the memo.
    fn evaluate_node(&mut self, asg_id: AsgId, node_id: NodeId) -> Result<ArrayD<f32>, RuntimeError> {
        if let Some(value) = self.memo.get(&(asg_id, node_id)) {
            return Ok(value.clone());
        }

        let asg = self.asg;
        let node = asg
            .nodes
            .get(&node_id)
            .ok_or(RuntimeError::NodeNotFound(node_id, asg_id))?;

        let result = match &node.node_type {
            // Inputs and parameters must be bound by the caller
            NodeType::Input { name } => {
                return Err(RuntimeError::MissingInput(name.clone(), node.id));
            }
            NodeType::Parameter { name } => {
                return Err(RuntimeError::MissingParameter(name.clone(), node.id));
            }
            NodeType::Literal(value) => Ok(value.clone()),

            NodeType::Add(l, r) | NodeType::Subtract(l, r) | NodeType::Multiply(l, r) | NodeType::MatrixMultiply(l, r) => {
                let lhs = self.value(*l)?;
                let rhs = self.value(*r)?;
                match &node.node_type {
                    NodeType::Add(_, _) => op_elementwise("Add", &lhs, &rhs, |a, b| a + b),
                    NodeType::Subtract(_, _) => op_elementwise("Subtract", &lhs, &rhs, |a, b| a - b),
                    NodeType::Multiply(_, _) => op_elementwise("Multiply", &lhs, &rhs, |a, b| a * b),
                    NodeType::MatrixMultiply(_, _) => op_matmul(&lhs, &rhs),
                    _ => unreachable!(),
                }
            }

            NodeType::Sigmoid(op) | NodeType::Tanh(op) | NodeType::ReLU(op) | NodeType::Softmax(op) => {
                let operand = self.value(*op)?;
                match &node.node_type {
                    NodeType::Sigmoid(_) => Ok(operand.mapv(|x| 1.0 / (1.0 + (-x).exp()))),
                    NodeType::Tanh(_) => Ok(operand.mapv(f32::tanh)),
                    NodeType::ReLU(_) => Ok(operand.mapv(|x| x.max(0.0))),
                    NodeType::Softmax(_) => op_softmax(operand),
                    _ => unreachable!(),
                }
            }

            NodeType::Concat { inputs, axis } => {
                let values = inputs.iter().map(|id| self.value(*id)).collect::<Result<Vec<_>, _>>()?;
                op_concat(&values, *axis)
            }

            NodeType::Stack { inputs } => {
                let values = inputs.iter().map(|id| self.value(*id)).collect::<Result<Vec<_>, _>>()?;
                op_stack(&values)
            }

            NodeType::Select { input, index } => {
                let operand = self.value(*input)?;
                op_select(&operand, *index)
            }

            NodeType::MaxAxis { input, axis } => {
                let operand = self.value(*input)?;
                op_max_axis(&operand, *axis)
            }

            NodeType::Conv1d { input, weight, bias, stride } => {
                let input_val = self.value(*input)?;
                let weight_val = self.value(*weight)?;
                let bias_val = self.value(*bias)?;
                op_conv1d(&input_val, &weight_val, &bias_val, *stride)
            }
        }?;

        self.memo.insert((asg_id, node_id), result.clone());
        Ok(result)
    }
}

pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CpuBackend {
    type DeviceData = ArrayD<f32>;

    fn load_data(
        &self,
        asg: &Asg,
        data: HashMap<NodeId, ArrayD<f32>>,
    ) -> Result<Memo<Self::DeviceData>, RuntimeError> {
        Ok(data.into_iter().map(|(id, value)| ((asg.id, id), value)).collect())
    }

    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError> {
        let sorted_nodes = ShapeInference::topological_sort(main_asg)
            .map_err(|e| RuntimeError::AnalysisError(e.to_string()))?;

        let mut context = ExecutionContext::new(main_asg, initial_memo);
        for node_id in sorted_nodes {
            context.evaluate_node(main_asg.id, node_id)?;
        }

        let mut results = Vec::with_capacity(main_asg.outputs.len());
        for output_node_id in &main_asg.outputs {
            let result = context
                .memo
                .get(&(main_asg.id, *output_node_id))
                .ok_or(RuntimeError::NodeNotFound(*output_node_id, main_asg.id))?
                .clone();
            results.push(result);
        }
        Ok((results, context.memo))
    }

    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<ArrayD<f32>>, RuntimeError> {
        Ok(device_data.to_vec())
    }
}

fn op_elementwise(
    op: &str,
    lhs: &ArrayD<f32>,
    rhs: &ArrayD<f32>,
    f: impl Fn(f32, f32) -> f32,
) -> Result<ArrayD<f32>, RuntimeError> {
    let shape = broadcast_shapes(lhs.shape(), rhs.shape()).ok_or_else(|| {
        RuntimeError::ShapeError(format!(
            "Incompatible shapes for {}: {:?} and {:?}",
            op,
            lhs.shape(),
            rhs.shape()
        ))
    })?;
    let broadcast_err = || RuntimeError::ShapeError(format!("Cannot broadcast operands of {} to {:?}", op, shape));
    let l = lhs.broadcast(IxDyn(&shape)).ok_or_else(broadcast_err)?;
    let r = rhs.broadcast(IxDyn(&shape)).ok_or_else(broadcast_err)?;
    Ok(ndarray::Zip::from(&l).and(&r).map_collect(|&a, &b| f(a, b)))
}

fn op_matmul(lhs: &ArrayD<f32>, rhs: &ArrayD<f32>) -> Result<ArrayD<f32>, RuntimeError> {
    let b = rhs
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| RuntimeError::ShapeError(format!("RHS is not a 2D matrix: {}", e)))?;
    let inner = lhs.shape().last().copied().unwrap_or(0);
    if lhs.ndim() == 0 || inner != b.shape()[0] {
        return Err(RuntimeError::ShapeError(format!(
            "Incompatible matmul shapes: {:?} and {:?}",
            lhs.shape(),
            rhs.shape()
        )));
    }

    match lhs.ndim() {
        1 => {
            let a = lhs
                .view()
                .into_dimensionality::<Ix1>()
                .map_err(|e| RuntimeError::ShapeError(e.to_string()))?;
            Ok(a.dot(&b).into_dyn())
        }
        2 => {
            let a = lhs
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|e| RuntimeError::ShapeError(e.to_string()))?;
            Ok(a.dot(&b).into_dyn())
        }
        n => Err(RuntimeError::ShapeError(format!(
            "Matmul supports 1D or 2D left operands, got {}D",
            n
        ))),
    }
}

fn op_softmax(mut a: ArrayD<f32>) -> Result<ArrayD<f32>, RuntimeError> {
    if a.ndim() == 0 {
        return Err(RuntimeError::ShapeError("Softmax of a scalar".to_string()));
    }
    let last_axis = Axis(a.ndim() - 1);
    for mut lane in a.lanes_mut(last_axis) {
        let max_val = lane.iter().fold(f32::NEG_INFINITY, |max, &val| max.max(val));
        lane.mapv_inplace(|x| (x - max_val).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|x| x / sum);
    }
    Ok(a)
}

fn op_concat(values: &[ArrayD<f32>], axis: isize) -> Result<ArrayD<f32>, RuntimeError> {
    let rank = values.first().map(|v| v.ndim()).unwrap_or(0);
    let ax = resolve_axis(axis, rank)
        .ok_or_else(|| RuntimeError::ShapeError(format!("Concat axis {} out of range for rank {}", axis, rank)))?;
    let views: Vec<_> = values.iter().map(|v| v.view()).collect();
    ndarray::concatenate(Axis(ax), &views).map_err(|e| RuntimeError::ShapeError(format!("Concat: {}", e)))
}

fn op_stack(values: &[ArrayD<f32>]) -> Result<ArrayD<f32>, RuntimeError> {
    let views: Vec<_> = values.iter().map(|v| v.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|e| RuntimeError::ShapeError(format!("Stack: {}", e)))
}

fn op_select(a: &ArrayD<f32>, index: usize) -> Result<ArrayD<f32>, RuntimeError> {
    let len = a.shape().first().copied().unwrap_or(0);
    if index >= len {
        return Err(RuntimeError::ShapeError(format!(
            "Index {} out of bounds for leading dimension of {:?}",
            index,
            a.shape()
        )));
    }
    Ok(a.index_axis(Axis(0), index).to_owned())
}

fn op_max_axis(a: &ArrayD<f32>, axis: isize) -> Result<ArrayD<f32>, RuntimeError> {
    let ax = resolve_axis(axis, a.ndim())
        .ok_or_else(|| RuntimeError::ShapeError(format!("Max axis {} out of range for {:?}", axis, a.shape())))?;
    if a.len_of(Axis(ax)) == 0 {
        return Err(RuntimeError::ShapeError(format!("Max over empty axis {} of {:?}", ax, a.shape())));
    }
    Ok(a.fold_axis(Axis(ax), f32::NEG_INFINITY, |max, &x| max.max(x)))
}

/// 1D convolution (cross-correlation) over a sequence.
/// Input: [T, C_in], Weight: [C_out, C_in, W], Bias: [C_out] -> [T_out, C_out]
fn op_conv1d(
    input: &ArrayD<f32>,
    weight: &ArrayD<f32>,
    bias: &ArrayD<f32>,
    stride: usize,
) -> Result<ArrayD<f32>, RuntimeError> {
    let x: ArrayView2<f32> = input
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| RuntimeError::ShapeError(format!("Conv1d input: {}", e)))?;
    let w = weight
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| RuntimeError::ShapeError(format!("Conv1d weight: {}", e)))?;
    let b = bias
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|e| RuntimeError::ShapeError(format!("Conv1d bias: {}", e)))?;

    let (steps, in_channels) = x.dim();
    let (out_channels, weight_in_channels, window) = w.dim();

    if in_channels != weight_in_channels || b.len() != out_channels {
        return Err(RuntimeError::ShapeError(format!(
            "Conv1d: input {:?}, weight {:?}, bias {:?} do not agree",
            input.shape(),
            weight.shape(),
            bias.shape()
        )));
    }
    if stride == 0 || window == 0 || steps < window {
        return Err(RuntimeError::ShapeError(format!(
            "Conv1d: window {} with stride {} does not fit {} steps",
            window, stride, steps
        )));
    }

    let out_steps = (steps - window) / stride + 1;
    let mut output = ndarray::Array2::<f32>::zeros((out_steps, out_channels));
    for t in 0..out_steps {
        let start = t * stride;
        for o in 0..out_channels {
            let mut sum = b[o];
            for c in 0..in_channels {
                for k in 0..window {
                    sum += x[[start + k, c]] * w[[o, c, k]];
                }
            }
            output[[t, o]] = sum;
        }
    }
    Ok(output.into_dyn())
}
