#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod artifact;
mod collect;
mod config;
mod cost;
mod error;
mod extract;
mod gate;
mod importance;
mod interpret;
mod matrix;
mod partition;
mod rewrite;
mod score;

#[cfg(test)]
mod fixtures;

#[doc(hidden)]
pub mod prelude;

pub use artifact::{CascadeArtifact, ModelSlot};
pub use collect::{Collector, NARROW_HELPER};
pub use config::{CascadeConfig, CascadeConfigBuilder, CascadeConfigBuilderError, GateConfig};
pub use cost::CostModel;
pub use error::{BoxedError, CascadeError, CascadeResult};
pub use extract::{Extractor, RowGate, Tier};
pub use gate::{GateOutcome, GatePolicy};
pub use importance::{CascadeTrainer, TrainingData, feature_importances};
pub use interpret::{NodeEvaluator, PlanInterpreter, Value};
pub use matrix::{CsrMatrix, DenseMatrix, FeatureMatrix};
pub use partition::{FeatureGroup, Partition, partition};
pub use rewrite::{ARTIFACT_BINDING, BIG_MODEL, SMALL_MODEL, eval_cascade, train_cascade};
pub use score::FeatureScores;

/// Tracing target for cascade operations.
pub const TRACING_TARGET: &str = "sluice_cascade";
