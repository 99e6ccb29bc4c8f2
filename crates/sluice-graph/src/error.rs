//! Graph error types.

use thiserror::Error;

use crate::node::{NodeBuilderError, NodeId};

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised while building or querying a [`Graph`](crate::Graph).
///
/// All of these indicate a malformed input graph rather than a condition a
/// caller is expected to recover from.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node references an input that is not part of the graph.
    #[error("node `{node}` references unknown input {input}")]
    DanglingInput {
        /// Primary output name of the offending node.
        node: String,
        /// The missing input handle.
        input: NodeId,
    },

    /// The handle does not belong to this graph.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// The graph contains a dependency cycle.
    #[error("graph contains a cycle through node {0}")]
    Cycle(NodeId),

    /// A name has no registered type.
    #[error("no type registered for `{0}`")]
    MissingType(String),

    /// A frame type declares the same column twice.
    #[error("duplicate column `{0}` in frame type")]
    DuplicateColumn(String),

    /// A node has fewer input names than input nodes.
    #[error("node has {inputs} inputs but only {names} input names")]
    ArityMismatch {
        /// Number of input nodes.
        inputs: usize,
        /// Number of input names.
        names: usize,
    },

    /// A node was expected to produce at least one output.
    #[error("node {0} has no outputs")]
    NoOutput(NodeId),

    /// A node could not be built.
    #[error("invalid node: {0}")]
    InvalidNode(String),
}

impl From<NodeBuilderError> for GraphError {
    fn from(err: NodeBuilderError) -> Self {
        Self::InvalidNode(err.to_string())
    }
}
