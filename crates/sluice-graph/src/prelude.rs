//! Prelude module for convenient imports.
//!
//! ```rust
//! use sluice_graph::prelude::*;
//! ```

pub use crate::backend::{Backend, CompiledProgram, PlanPrinter};
pub use crate::env::TypeEnv;
pub use crate::error::{GraphError, GraphResult};
pub use crate::graph::Graph;
pub use crate::join::JoinRoots;
pub use crate::model::{FeatureIndices, InputSlot, ModelInputs, ModelNode, ModelOp};
pub use crate::node::{
    GlueBlock, HashJoinParams, Node, NodeBuilder, NodeId, NodeKind, NodeOutput, StackLayout,
    TableShape, ThresholdPolicy, VectorizerParams,
};
pub use crate::types::{Column, ColumnSetType, FrameType, ScalarKind, ValueType};
