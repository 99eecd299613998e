//! # asgnet: structured neural networks on an Abstract Semantic Graph
//!
//! **asgnet** builds neural-network computations by composing small,
//! independently parameterized models into larger structures. Every
//! operation appends a node to a lazily evaluated **Abstract Semantic Graph
//! (ASG)**; nothing is computed until a backend runs the graph.
//!
//! Two engines apply one sub-model repeatedly:
//! - [`nn::RecursiveNet`] over a tree, bottom-up, producing every node's value;
//! - [`nn::RecurrentNet`] over a sequence, threading carried state forward.
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::collections::HashMap;
//! use std::rc::Rc;
//! use asgnet::nn::{RecurrentNet, RecurrentNetConfig};
//! use asgnet::runtime::{cpu_backend::CpuBackend, session::Session};
//! use asgnet::tensor::{GraphContext, Tensor};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // 1. Create graph context
//! let context = Rc::new(RefCell::new(GraphContext::new()));
//! let mut rng = StdRng::seed_from_u64(0);
//!
//! // 2. Build a recurrent network with the default cell
//! let config = RecurrentNetConfig::new().with_sizes(3, 8);
//! let rnn = RecurrentNet::new(&context, "rnn", config, &mut rng).unwrap();
//!
//! // 3. Unroll it over symbolic inputs
//! let xs: Vec<Tensor> = (0..5).map(|t| Tensor::new_input(&context, &format!("x{}", t))).collect();
//! let history = rnn.unroll(&[xs]).unwrap();
//!
//! // 4. Evaluate the last hidden state
//! let feeds: HashMap<String, _> = (0..5)
//!     .map(|t| (format!("x{}", t), ndarray::ArrayD::<f32>::ones(ndarray::IxDyn(&[3]))))
//!     .collect();
//! let session = Session::new(CpuBackend::new(), &context);
//! let h_last = session.eval(&history[0][4], &feeds).unwrap();
//! assert_eq!(h_last.shape(), &[8]);
//! ```

// Declare public modules that constitute the core library API.
pub mod analysis;
pub mod asg;
pub mod nn;
pub mod runtime;
pub mod tensor;
