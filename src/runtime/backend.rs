//! Module defining the abstract interface (trait) for execution backends.

use crate::asg::{Asg, AsgId, NodeId};
use ndarray::ArrayD;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while executing a graph.
/// Shared by all backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Node with ID {0} not found in graph {1}. Check that the graph was built correctly and all nodes exist.")]
    NodeNotFound(NodeId, AsgId),

    #[error("Tensor shape error: {0}. Check the dimensions of the input tensors.")]
    ShapeError(String),

    #[error("Missing value for input '{0}' (node ID: {1}). Add it to the feeds passed to the session.")]
    MissingInput(String, NodeId),

    #[error("Missing value for parameter '{0}' (node ID: {1}). The parameter was not created through this context.")]
    MissingParameter(String, NodeId),

    #[error("Graph analysis failed: {0}")]
    AnalysisError(String),
}

/// Cache of already computed node values.
/// The key is (AsgId, NodeId).
pub type Memo<T> = HashMap<(AsgId, NodeId), T>;

/// Common interface for an execution backend.
///
/// Any structure implementing this trait can take an ASG plus the values of
/// its inputs and parameters, and compute the graph outputs.
pub trait Backend {
    /// Device-specific representation of a tensor value.
    type DeviceData: std::fmt::Debug + Clone;

    /// Moves host values onto the device, keyed for the given graph.
    fn load_data(
        &self,
        asg: &Asg,
        data: HashMap<NodeId, ArrayD<f32>>,
    ) -> Result<Memo<Self::DeviceData>, RuntimeError>;

    /// Executes the graph, using and extending the memo.
    ///
    /// # Returns
    /// A tuple of:
    /// 1. The values of `main_asg.outputs`, in order.
    /// 2. The final memo with every intermediate value.
    fn run(
        &self,
        main_asg: &Asg,
        initial_memo: Memo<Self::DeviceData>,
    ) -> Result<(Vec<Self::DeviceData>, Memo<Self::DeviceData>), RuntimeError>;

    /// Copies results back to the host.
    fn retrieve_data(&self, device_data: &[Self::DeviceData]) -> Result<Vec<ArrayD<f32>>, RuntimeError>;
}
