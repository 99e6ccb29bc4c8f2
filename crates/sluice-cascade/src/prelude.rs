//! Prelude module for convenient imports.
//!
//! ```rust
//! use sluice_cascade::prelude::*;
//! ```

pub use crate::artifact::{CascadeArtifact, ModelSlot};
pub use crate::config::{CascadeConfig, GateConfig};
pub use crate::error::{BoxedError, CascadeError, CascadeResult};
pub use crate::gate::GatePolicy;
pub use crate::importance::{CascadeTrainer, TrainingData};
pub use crate::interpret::{NodeEvaluator, PlanInterpreter, Value};
pub use crate::matrix::{CsrMatrix, DenseMatrix, FeatureMatrix};
pub use crate::rewrite::{eval_cascade, train_cascade};
