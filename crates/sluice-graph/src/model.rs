//! Model nodes and their input attribution.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

use crate::node::NodeId;

/// What a model node does with its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ModelOp {
    /// Predict class labels.
    Predict,
    /// Predict positive-class probabilities.
    PredictProba,
    /// Fit a model on `(x, y)`.
    Train,
}

/// Parameters of a model node.
///
/// The node's first graph input is the feature block `x`; a training node
/// has the labels `y` as its second input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelNode {
    /// Name the model is bound to in the program.
    pub model: String,
    /// Operation performed.
    pub op: ModelOp,
    /// Attribution of the flat feature vector to upstream nodes.
    pub inputs: ModelInputs,
}

impl ModelNode {
    /// Creates a model node description.
    pub fn new(model: impl Into<String>, op: ModelOp, inputs: ModelInputs) -> Self {
        Self {
            model: model.into(),
            op,
            inputs,
        }
    }

    /// Whether this node trains rather than serves.
    pub fn is_training(&self) -> bool {
        self.op == ModelOp::Train
    }
}

/// Where one upstream node's features land in the model's feature vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSlot {
    /// A contiguous half-open column range.
    Range {
        /// First column.
        start: usize,
        /// One past the last column.
        end: usize,
    },
    /// Named columns and their positions.
    Named(Vec<(String, usize)>),
}

impl InputSlot {
    /// Projects the slot onto its column indices.
    pub fn indices(&self) -> FeatureIndices {
        match self {
            Self::Range { start, end } => FeatureIndices::Range(*start, *end),
            Self::Named(columns) => {
                FeatureIndices::Columns(columns.iter().map(|(_, index)| *index).collect())
            }
        }
    }
}

/// Column indices of a feature group.
///
/// This is the identifier under which importances and costs are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureIndices {
    /// Half-open range `start..end`.
    Range(usize, usize),
    /// Explicit column positions.
    Columns(Vec<usize>),
}

impl FeatureIndices {
    /// Returns every column position covered by the group.
    pub fn columns(&self) -> Vec<usize> {
        match self {
            Self::Range(start, end) => (*start..*end).collect(),
            Self::Columns(columns) => columns.clone(),
        }
    }

    /// Number of columns in the group.
    pub fn width(&self) -> usize {
        match self {
            Self::Range(start, end) => end.saturating_sub(*start),
            Self::Columns(columns) => columns.len(),
        }
    }
}

impl fmt::Display for FeatureIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range(start, end) => write!(f, "{start}..{end}"),
            Self::Columns(columns) => write!(f, "{columns:?}"),
        }
    }
}

/// One upstream feature group of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInput {
    /// The node producing the group.
    pub node: NodeId,
    /// Where its features land.
    pub slot: InputSlot,
}

/// Ordered, immutable attribution of a model's feature vector to graph nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelInputs(Vec<ModelInput>);

impl ModelInputs {
    /// Creates the attribution from `(node, slot)` pairs.
    pub fn new(inputs: impl IntoIterator<Item = (NodeId, InputSlot)>) -> Self {
        Self(
            inputs
                .into_iter()
                .map(|(node, slot)| ModelInput { node, slot })
                .collect(),
        )
    }

    /// Iterates over the groups in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelInput> {
        self.0.iter()
    }

    /// Iterates over `(node, indices)` pairs.
    pub fn groups(&self) -> impl Iterator<Item = (NodeId, FeatureIndices)> + '_ {
        self.0.iter().map(|input| (input.node, input.slot.indices()))
    }

    /// Returns the slot of `node`, if it feeds the model.
    pub fn slot(&self, node: NodeId) -> Option<&InputSlot> {
        self.0.iter().find(|input| input.node == node).map(|input| &input.slot)
    }

    /// Keeps only the groups produced by nodes accepted by `keep`.
    pub fn retain(&self, mut keep: impl FnMut(NodeId) -> bool) -> Self {
        Self(self.0.iter().filter(|input| keep(input.node)).cloned().collect())
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the model has no attributed inputs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
