#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod backend;
mod env;
mod error;
mod graph;
mod join;
mod model;
pub mod node;
mod types;

#[doc(hidden)]
pub mod prelude;

pub use backend::{Backend, CompiledProgram, PlanPrinter};
pub use env::TypeEnv;
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
pub use join::JoinRoots;
pub use model::{FeatureIndices, InputSlot, ModelInput, ModelInputs, ModelNode, ModelOp};
pub use node::{Node, NodeBuilder, NodeId, NodeKind, NodeOutput};
pub use types::{Column, ColumnSetType, FrameType, ScalarKind, ValueType};

/// Tracing target for graph operations.
pub const TRACING_TARGET: &str = "sluice_graph";
