//! Binds a graph context to a backend and evaluates tensors.
//!
//! A `Session` collects the values a graph needs (named input feeds plus the
//! parameter values stored in the `GraphContext`), hands them to the backend
//! and returns the requested outputs as host arrays.

use super::backend::{Backend, RuntimeError};
use crate::analysis::shape_inference::ShapeInference;
use crate::asg::NodeType;
use crate::tensor::{GraphContext, Tensor};
use ndarray::ArrayD;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub struct Session<B: Backend> {
    backend: B,
    context: Rc<RefCell<GraphContext>>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, context: &Rc<RefCell<GraphContext>>) -> Self {
        Self {
            backend,
            context: Rc::clone(context),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Evaluates `outputs` with the given input feeds (keyed by input name).
    ///
    /// Only the nodes the outputs depend on are bound and executed, so
    /// unrelated inputs may be left unfed.
    pub fn run(
        &self,
        outputs: &[&Tensor],
        feeds: &HashMap<String, ArrayD<f32>>,
    ) -> Result<Vec<ArrayD<f32>>, RuntimeError> {
        let mut graph = self.context.borrow().main_graph().clone();
        graph.set_outputs(outputs.iter().map(|t| t.node_id).collect());

        let order = ShapeInference::topological_sort(&graph)
            .map_err(|e| RuntimeError::AnalysisError(e.to_string()))?;

        let mut data = HashMap::new();
        {
            let ctx = self.context.borrow();
            for node_id in order {
                let node = graph
                    .get_node(node_id)
                    .map_err(|_| RuntimeError::NodeNotFound(node_id, graph.id))?;
                match &node.node_type {
                    NodeType::Input { name } => {
                        let value = feeds
                            .get(name)
                            .ok_or_else(|| RuntimeError::MissingInput(name.clone(), node_id))?;
                        data.insert(node_id, value.clone());
                    }
                    NodeType::Parameter { name } => {
                        let value = ctx
                            .parameter_value(node_id)
                            .ok_or_else(|| RuntimeError::MissingParameter(name.clone(), node_id))?;
                        data.insert(node_id, value.clone());
                    }
                    _ => {}
                }
            }
        }
        log::trace!("session binding {} values for {} outputs", data.len(), outputs.len());

        let memo = self.backend.load_data(&graph, data)?;
        let (results, _) = self.backend.run(&graph, memo)?;
        self.backend.retrieve_data(&results)
    }

    /// Evaluates a single tensor.
    pub fn eval(&self, output: &Tensor, feeds: &HashMap<String, ArrayD<f32>>) -> Result<ArrayD<f32>, RuntimeError> {
        let mut values = self.run(&[output], feeds)?;
        values
            .pop()
            .ok_or(RuntimeError::NodeNotFound(output.node_id, self.context.borrow().main_graph().id))
    }
}
