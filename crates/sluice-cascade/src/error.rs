//! Cascade error types.

use sluice_graph::{FeatureIndices, GraphError, NodeId, ValueType};
use thiserror::Error;

/// Type-erased error returned by trainers and node evaluators.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for cascade operations.
pub type CascadeResult<T> = Result<T, CascadeError>;

/// Errors raised by the cascade engine.
///
/// Rewrites either succeed completely or fail with one of these before any
/// plan is returned; there is no partially rewritten output.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// A node kind that cannot take part in the given stage was reached.
    #[error("cannot {stage} through {kind} node {node}")]
    UnsupportedNode {
        /// Offending node.
        node: NodeId,
        /// Its kind name.
        kind: &'static str,
        /// Stage that rejected it.
        stage: &'static str,
    },

    /// A combiner cannot rebuild a value of this type.
    #[error("no combiner reconstructs values of type {ty}")]
    CombinerShape {
        /// The original feature block type.
        ty: ValueType,
    },

    /// The two tiers do not recompose into the original columns.
    #[error("combined columns {actual:?} do not match original columns {expected:?}")]
    ColumnMismatch {
        /// Columns of the original block.
        expected: Vec<String>,
        /// Columns produced by the combiner.
        actual: Vec<String>,
    },

    /// A value has a different type than the operation requires.
    #[error("`{name}` has type {actual}, expected {expected}")]
    UnexpectedType {
        /// Name of the value.
        name: String,
        /// Required shape.
        expected: &'static str,
        /// Actual type.
        actual: ValueType,
    },

    /// The cascade artifact lacks a required entry.
    #[error("cascade artifact is missing `{0}`")]
    MissingArtifactKey(&'static str),

    /// The artifact has no score for a model input group.
    #[error("cascade artifact has no score for feature group {indices}")]
    MissingFeatureGroup {
        /// Indices of the group.
        indices: FeatureIndices,
    },

    /// Configuration is out of range.
    #[error("invalid cascade config: {0}")]
    InvalidConfig(String),

    /// A feature matrix has inconsistent dimensions.
    #[error("matrix shape error: {0}")]
    MatrixShape(String),

    /// Too few rows to split into training and validation sets.
    #[error("cannot split {rows} rows into training and validation sets")]
    InsufficientRows {
        /// Number of rows available.
        rows: usize,
    },

    /// The trainer failed.
    #[error("training failed: {0}")]
    Training(#[source] BoxedError),

    /// A node failed during plan interpretation.
    #[error("node {node} failed: {message}")]
    Evaluation {
        /// The failing node.
        node: NodeId,
        /// Error message.
        message: String,
    },

    /// A plan read a name that was never bound.
    #[error("no value bound to `{0}`")]
    MissingBinding(String),

    /// The graph is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Artifact I/O failed.
    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
