//! # Graph Analysis Module
//!
//! Analysis passes that process the ASG before execution.
//!
//! ## Available Passes
//!
//! - [`ShapeInference`](shape_inference::ShapeInference): Propagates tensor shapes
//!   through the graph, detecting shape mismatches before runtime. It also
//!   provides the topological order used by the backends.
//!
//! ```text
//! ASG (untyped) -> Shape Inference -> ASG (with shapes)
//! ```
//!
//! The recursive and recurrent engines never look at shapes; a composition
//! model that receives children of the wrong shape is reported here (or by
//! the backend at run time), not by the engine.
//!
//! ## Example
//!
//! ```ignore
//! use asgnet::analysis::shape_inference::ShapeInference;
//!
//! let mut graph = context.borrow().main_graph().clone();
//! graph.set_output(root.node_id);
//!
//! let shapes = HashMap::from([("leaf_0".to_string(), vec![8])]);
//! ShapeInference::run(&mut graph, &shapes)?;
//! ```

pub mod shape_inference;
