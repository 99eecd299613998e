//! # Neural Network Module
//!
//! Building blocks for structured networks. Every layer is a constructor
//! that adds a fixed pattern of nodes (operations and parameters) to the ASG
//! and implements [`Module`].
//!
//! ## Engines
//! - [`RecursiveNet`]: applies a composition model bottom-up over a
//!   [`TreeStructure`], returning the value of every node.
//! - [`RecurrentNet`]: applies a recurrence model over sequences, threading
//!   carried state and returning its history.
//!
//! ## Layers and cells
//! - [`Perceptron`], [`SoftmaxLayer`]: fully connected layers
//! - [`SimpleRecurrence`], [`LstmRecurrence`]: recurrence cells
//! - [`Conv1d`], [`MaxPooling`]: convolution over sequences and pooling
//! - [`ReLU`], [`Sigmoid`], [`Tanh`]: parameter-free activations
//!
//! ## Combinators
//! - [`Chain`] / [`ModuleExt::then`], [`Parallel`], [`Concat`]
//!
//! ## Example
//!
//! ```ignore
//! use asgnet::nn::{RecursiveNet, RecursiveNetConfig, TreeStructure};
//! use asgnet::tensor::{GraphContext, Tensor};
//!
//! let ctx = Rc::new(RefCell::new(GraphContext::new()));
//! let net = RecursiveNet::new(&ctx, "tree", RecursiveNetConfig::new().with_insize(50), &mut rng)?;
//!
//! let words: Vec<Tensor> = (0..4).map(|i| Tensor::new_input(&ctx, &format!("w{}", i))).collect();
//! let tree = TreeStructure::new(4, vec![vec![1, 2], vec![4, 3], vec![0, 5]])?;
//! let nodes = net.compose_stream(&tree, &words)?;
//! let sentence = nodes.root();
//! ```

pub mod activations;
pub mod combinators;
pub mod conv;
pub mod init;
pub mod module;
pub mod perceptron;
pub mod pooling;
pub mod recurrence;
pub mod recurrent;
pub mod recursive;

pub use activations::{Activation, ReLU, Sigmoid, Tanh};
pub use combinators::{Chain, Concat, ModuleExt, Parallel};
pub use conv::{Conv1d, Conv1dConfig};
pub use perceptron::{Perceptron, PerceptronConfig, SoftmaxLayer, SoftmaxLayerConfig};
pub use pooling::MaxPooling;
pub use recurrence::{LstmGate, LstmRecurrence, LstmRecurrenceConfig, SimpleRecurrence, SimpleRecurrenceConfig};
pub use recurrent::{InitialState, RecurrentNet, RecurrentNetConfig};
pub use recursive::{NodeBuffer, RecursiveNet, RecursiveNetConfig, TreeStructure};

// Base trait
pub use module::{ModelError, Module};
