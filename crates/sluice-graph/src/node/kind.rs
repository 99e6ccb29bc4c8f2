//! The closed node taxonomy.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use super::NodeId;
use crate::error::GraphResult;
use crate::model::ModelNode;
use crate::types::FrameType;

/// Elementwise array operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BinaryOp {
    /// Elementwise sum.
    Add,
    /// Left minus right.
    Subtract,
    /// Elementwise product.
    Multiply,
    /// Left divided by right.
    Divide,
}

/// String transformation applied to every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StringTransform {
    /// Lowercases each string.
    Lower,
    /// Splits each string into tokens.
    Split,
    /// Strips a fixed character set from each string.
    RemoveChars,
}

/// Whether a selection or concatenation works on frames or column sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableShape {
    /// Tabular frame with typed columns.
    Frame,
    /// Column set sharing one element type.
    ColumnSet,
}

/// Matrix layout of a stacking combiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackLayout {
    /// Compressed sparse rows.
    Sparse,
    /// Row-major vector of vectors.
    Dense,
}

/// How a probability threshold resolves rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThresholdPolicy {
    /// `p >= t` resolves the row as positive.
    #[default]
    SingleSided,
    /// Additionally, `p <= 1 - t` resolves the row as negative.
    Symmetric,
}

/// Vocabulary vectorizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerParams {
    /// Number of vocabulary entries, and of output columns.
    pub vocabulary: usize,
    /// Inclusive n-gram range.
    pub ngram_range: (usize, usize),
    /// Whether counts are tf-idf weighted.
    pub tfidf: bool,
    /// Gate whose unresolved rows are the only rows to vectorize.
    pub row_gate: Option<NodeId>,
}

/// Hash join against a static right-hand table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashJoinParams {
    /// Key columns shared by both sides.
    pub join_cols: Vec<String>,
    /// Name of the right-hand table.
    pub right_table: String,
    /// Columns of the left-hand input.
    pub left_type: FrameType,
    /// Non-key columns contributed by the right-hand table.
    pub right_type: FrameType,
    /// Gate whose unresolved rows are the only rows to join.
    pub row_gate: Option<NodeId>,
}

impl HashJoinParams {
    /// Output frame: left columns followed by right columns.
    pub fn output_type(&self) -> GraphResult<FrameType> {
        self.left_type.concat(&self.right_type)
    }
}

/// An opaque block of external code with declared inputs and outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlueBlock {
    /// Source of the block, opaque to the engine.
    pub code: String,
    /// Whether the outputs depend functionally and losslessly on the inputs.
    pub pure: bool,
}

impl GlueBlock {
    /// Creates a glue block.
    pub fn new(code: impl Into<String>, pure: bool) -> Self {
        Self {
            code: code.into(),
            pure,
        }
    }
}

/// Closed set of node variants.
///
/// Every traversal matches on this enum exhaustively, so adding a variant is
/// a compile error at each site that has to decide what to do with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    /// Program input.
    Input,
    /// Program output.
    Output,
    /// Elementwise arithmetic over arrays.
    ArrayBinop { op: BinaryOp },
    /// Elementwise string transformation.
    StringOp { op: StringTransform },
    /// Count or tf-idf vocabulary vectorizer.
    Vectorizer(VectorizerParams),
    /// Hash join of the left input against a static table.
    HashJoin(HashJoinParams),
    /// Typed column selection over one or more inputs.
    ColumnSelect { shape: TableShape, columns: Vec<String> },
    /// Column-wise concatenation.
    Concat { shape: TableShape },
    /// Array reshape.
    Reshape { dims: Vec<i64> },
    /// Frame to dense matrix materialization.
    ToDenseMatrix,
    /// Horizontal stack of sparse matrices.
    StackSparse,
    /// Horizontal stack of dense matrices.
    StackDense,
    /// Passthrough.
    Identity,
    /// Opaque external code.
    Glue(GlueBlock),
    /// Model prediction or training.
    Model(ModelNode),
    /// Probability threshold gate over small-model probabilities.
    ThresholdGate {
        threshold: f64,
        policy: ThresholdPolicy,
        /// Report the probability instead of a class for resolved rows.
        report_probability: bool,
    },
    /// Resolves the `k` rows with the highest probability.
    TopKGate { k: usize },
    /// Returns the small-model result when the single row is resolved.
    PointEarlyExit,
    /// Per-row stack of more- and less-important blocks for unresolved rows.
    CascadeStack { layout: StackLayout },
    /// Per-row column selection of more- and less-important frames for
    /// unresolved rows.
    CascadeColumnSelect { columns: Vec<String> },
    /// Merges small-model results with big-model results by the gate mask.
    CombinePredictions,
}

impl NodeKind {
    /// Snake-case variant name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Returns the model parameters of a model node.
    pub fn as_model(&self) -> Option<&ModelNode> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Returns the join parameters of a hash-join node.
    pub fn as_hash_join(&self) -> Option<&HashJoinParams> {
        match self {
            Self::HashJoin(join) => Some(join),
            _ => None,
        }
    }
}
