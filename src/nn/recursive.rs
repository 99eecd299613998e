//! Tree composition: a recursive network applying one composition model
//! bottom-up over a tree.
//!
//! The tree is a flat, index-addressed arena. Leaves are numbered
//! `0..L` left to right, internal nodes `L..L+I` in evaluation order, and
//! row `i` of the [`TreeStructure`] lists the children of node `L + i`:
//!
//! ```text
//! leaf_count = 4, rows = [[1, 2], [4, 3], [0, 5]]
//!
//!       6
//!      / \
//!     /   5
//!    /   / \
//!   /   4   \
//!  /   / \   \
//! 0   1   2   3
//! ```
//!
//! A composition model with `k` outputs and `n * k` inputs runs `k` value
//! streams side by side (for example a vector and a matrix per node) over an
//! `n`-ary tree. Its inputs are grouped by stream: the `n` children of stream
//! 0 in row order, then the `n` children of stream 1, and so on.

use crate::nn::combinators::{Concat, ModuleExt};
use crate::nn::module::{ModelError, Module};
use crate::nn::perceptron::{Perceptron, PerceptronConfig};
use crate::tensor::{GraphContext, Tensor};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::ops::Index;
use std::rc::Rc;

/// Validated composition order of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStructure {
    leaf_count: usize,
    arity: usize,
    rows: Vec<Vec<usize>>,
}

impl TreeStructure {
    /// Builds a tree whose arity is the width of its first row (2 when there
    /// are no internal nodes).
    pub fn new(leaf_count: usize, rows: Vec<Vec<usize>>) -> Result<Self, ModelError> {
        let arity = rows.first().map_or(2, |row| row.len());
        Self::with_arity(leaf_count, arity, rows)
    }

    /// Builds a tree where every internal node has exactly `arity` children.
    ///
    /// Fails with `MalformedTree` if a row has the wrong width or refers to a
    /// node that is not evaluated before it.
    pub fn with_arity(leaf_count: usize, arity: usize, rows: Vec<Vec<usize>>) -> Result<Self, ModelError> {
        if arity == 0 {
            return Err(ModelError::MalformedTree("internal nodes need at least one child".to_string()));
        }
        for (i, row) in rows.iter().enumerate() {
            let node = leaf_count + i;
            if row.len() != arity {
                return Err(ModelError::MalformedTree(format!(
                    "node {} has {} children, expected {}",
                    node,
                    row.len(),
                    arity
                )));
            }
            if let Some(&child) = row.iter().find(|&&child| child >= node) {
                return Err(ModelError::MalformedTree(format!(
                    "node {} refers to child {} which is not evaluated before it",
                    node, child
                )));
            }
        }
        Ok(Self { leaf_count, arity, rows })
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn internal_count(&self) -> usize {
        self.rows.len()
    }

    /// Total number of nodes, `L + I`.
    pub fn node_count(&self) -> usize {
        self.leaf_count + self.rows.len()
    }

    /// Number of children per internal node.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Children of node `id`, or `None` for leaves and unknown ids.
    pub fn children(&self, id: usize) -> Option<&[usize]> {
        id.checked_sub(self.leaf_count)
            .and_then(|i| self.rows.get(i))
            .map(Vec::as_slice)
    }

    /// Child lists of the internal nodes in evaluation order.
    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }
}

/// Values of every node of a tree for one stream, leaves first.
#[derive(Debug, Clone)]
pub struct NodeBuffer {
    values: Vec<Tensor>,
    leaf_count: usize,
}

impl NodeBuffer {
    fn with_leaves(leaves: &[Tensor], capacity: usize) -> Self {
        let mut values = Vec::with_capacity(capacity);
        values.extend_from_slice(leaves);
        Self {
            values,
            leaf_count: leaves.len(),
        }
    }

    fn push(&mut self, value: Tensor) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Tensor> {
        self.values.get(id)
    }

    pub fn leaves(&self) -> &[Tensor] {
        &self.values[..self.leaf_count]
    }

    pub fn internal(&self) -> &[Tensor] {
        &self.values[self.leaf_count..]
    }

    /// Value of the last evaluated node.
    pub fn root(&self) -> Option<&Tensor> {
        self.values.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.values.iter()
    }

    /// All node values stacked along a new leading axis, `[L + I, ...]`.
    pub fn stacked(&self) -> Option<Tensor> {
        Tensor::stack(&self.values)
    }

    pub fn into_vec(self) -> Vec<Tensor> {
        self.values
    }
}

impl Index<usize> for NodeBuffer {
    type Output = Tensor;

    fn index(&self, id: usize) -> &Tensor {
        &self.values[id]
    }
}

impl<'a> IntoIterator for &'a NodeBuffer {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Configuration for [`RecursiveNet`]: either a custom composition model or
/// the size of the node vectors for the default one.
#[derive(Default)]
pub struct RecursiveNetConfig {
    pub comp_model: Option<Box<dyn Module>>,
    pub insize: Option<usize>,
}

impl RecursiveNetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comp_model(mut self, comp_model: impl Module + 'static) -> Self {
        self.comp_model = Some(Box::new(comp_model));
        self
    }

    pub fn with_insize(mut self, insize: usize) -> Self {
        self.insize = Some(insize);
        self
    }
}

/// Recursive neural network over [`TreeStructure`]s.
///
/// Parameters are exactly those of the composition model.
pub struct RecursiveNet {
    name: String,
    comp_model: Box<dyn Module>,
    streams: usize,
    children: usize,
}

impl RecursiveNet {
    /// Builds the network. Without a custom model the composition is the
    /// concatenation of two children fed through a sigmoid
    /// `Perceptron(2 * insize -> insize)` named `{name}.comp`.
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        config: RecursiveNetConfig,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let comp_model: Box<dyn Module> = match (config.comp_model, config.insize) {
            (Some(model), insize) => {
                if insize.is_some() {
                    log::warn!(
                        "{}: both 'comp_model' and 'insize' are set, using 'comp_model'",
                        name
                    );
                }
                model
            }
            (None, Some(insize)) => {
                let perceptron = Perceptron::new(
                    context,
                    &format!("{}.comp", name),
                    PerceptronConfig::new(2 * insize, insize),
                    rng,
                )?;
                Box::new(Concat::new(2).then(perceptron)?)
            }
            (None, None) => return Err(ModelError::MissingOption("comp_model or insize")),
        };

        let streams = comp_model.output_arity();
        let inputs = comp_model.input_arity();
        if streams == 0 {
            return Err(ModelError::arity("composition model outputs", 1, 0));
        }
        if inputs == 0 || inputs % streams != 0 {
            // Nearest multiple of the stream count for a binary or wider tree.
            let expected = streams * inputs.div_ceil(streams).max(2);
            return Err(ModelError::arity(
                "composition model inputs (a positive multiple of its outputs)",
                expected,
                inputs,
            ));
        }
        let children = inputs / streams;

        log::debug!(
            "{}: recursive net with {} stream(s), {} children per node, {} parameter(s)",
            name,
            streams,
            children,
            comp_model.parameters().len()
        );

        Ok(Self {
            name: name.to_string(),
            comp_model,
            streams,
            children,
        })
    }

    /// Number of value streams `k`.
    pub fn streams(&self) -> usize {
        self.streams
    }

    /// Number of children `n` each composition takes.
    pub fn children_per_node(&self) -> usize {
        self.children
    }

    pub fn comp_model(&self) -> &dyn Module {
        self.comp_model.as_ref()
    }

    pub fn parameters(&self) -> Vec<Tensor> {
        self.comp_model.parameters()
    }

    /// Evaluates every node of `tree` and returns one buffer per stream.
    ///
    /// `leaves[j]` holds the `L` leaf values of stream `j`. All structural
    /// checks happen before the composition model is first applied.
    pub fn compose(&self, tree: &TreeStructure, leaves: &[Vec<Tensor>]) -> Result<Vec<NodeBuffer>, ModelError> {
        if leaves.len() != self.streams {
            return Err(ModelError::arity("leaf streams", self.streams, leaves.len()));
        }
        // A tree without internal nodes never invokes the model.
        if tree.internal_count() > 0 && tree.arity() != self.children {
            return Err(ModelError::arity("tree arity", self.children, tree.arity()));
        }
        if let Some((j, stream)) = leaves.iter().enumerate().find(|(_, s)| s.len() != tree.leaf_count()) {
            return Err(ModelError::MalformedTree(format!(
                "leaf stream {} has {} values, the tree has {} leaves",
                j,
                stream.len(),
                tree.leaf_count()
            )));
        }

        let mut buffers: Vec<NodeBuffer> = leaves
            .iter()
            .map(|stream| NodeBuffer::with_leaves(stream, tree.node_count()))
            .collect();

        for (i, row) in tree.rows().iter().enumerate() {
            let inputs: Vec<Tensor> = buffers
                .iter()
                .flat_map(|buffer| row.iter().map(move |&child| buffer[child].clone()))
                .collect();

            let outputs = self.comp_model.forward(&inputs)?;
            if outputs.len() != self.streams {
                return Err(ModelError::arity("composition model outputs", self.streams, outputs.len()));
            }
            log::trace!("{}: composed node {} from {:?}", self.name, tree.leaf_count() + i, row);

            for (buffer, value) in buffers.iter_mut().zip(outputs) {
                buffer.push(value);
            }
        }

        log::debug!(
            "{}: composed {} internal node(s) over {} leaves",
            self.name,
            tree.internal_count(),
            tree.leaf_count()
        );
        Ok(buffers)
    }

    /// Single-stream convenience for `compose`.
    pub fn compose_stream(&self, tree: &TreeStructure, leaves: &[Tensor]) -> Result<NodeBuffer, ModelError> {
        let mut buffers = self.compose(tree, &[leaves.to_vec()])?;
        buffers
            .pop()
            .ok_or_else(|| ModelError::arity("leaf streams", self.streams, 1))
    }
}
