//! Cascade configuration.

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use sluice_graph::node::ThresholdPolicy;

use crate::error::{CascadeError, CascadeResult};

/// Gate selected by a [`CascadeConfig`].
///
/// Threshold and top-K gating are mutually exclusive: setting `top_k`
/// selects top-K gating and the threshold is ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateConfig {
    /// Resolve rows whose probability clears `threshold`.
    Threshold {
        /// Confidence threshold in `(0, 1)`.
        threshold: f64,
        /// How the threshold is applied.
        policy: ThresholdPolicy,
    },
    /// Resolve the `k` most confident rows.
    TopK {
        /// Number of rows to resolve.
        k: usize,
    },
}

/// Configuration of the training and serving rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(
    name = "CascadeConfigBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct CascadeConfig {
    /// Share of the total feature cost the important tier may spend.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-budget-fraction",
            env = "CASCADE_BUDGET_FRACTION",
            default_value_t = default_budget_fraction()
        )
    )]
    #[serde(default = "default_budget_fraction")]
    #[builder(default = "default_budget_fraction()")]
    pub budget_fraction: f64,

    /// Probability a row needs for the small model to resolve it.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-threshold",
            env = "CASCADE_THRESHOLD",
            default_value_t = default_threshold()
        )
    )]
    #[serde(default = "default_threshold")]
    #[builder(default = "default_threshold()")]
    pub threshold: f64,

    /// How the threshold is applied.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-threshold-policy",
            env = "CASCADE_THRESHOLD_POLICY",
            default_value_t = ThresholdPolicy::SingleSided
        )
    )]
    #[serde(default)]
    #[builder(default)]
    pub threshold_policy: ThresholdPolicy,

    /// Resolve exactly this many rows per batch instead of thresholding.
    #[cfg_attr(feature = "config", arg(long = "cascade-top-k", env = "CASCADE_TOP_K"))]
    #[serde(default)]
    #[builder(default)]
    pub top_k: Option<usize>,

    /// Whether requests arrive in batches. Point requests get an early exit.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-batch-mode",
            env = "CASCADE_BATCH_MODE",
            default_value_t = true,
            action = clap::ArgAction::Set
        )
    )]
    #[serde(default = "default_batch_mode")]
    #[builder(default = "default_batch_mode()")]
    pub batch_mode: bool,

    /// Glue statements whose outputs are expensive to compute.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-costly-statements",
            env = "CASCADE_COSTLY_STATEMENTS",
            value_delimiter = ','
        )
    )]
    #[serde(default)]
    #[builder(default)]
    pub costly_statements: Vec<String>,

    /// Per-row cost assigned to each costly statement.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-costly-statement-cost",
            env = "CASCADE_COSTLY_STATEMENT_COST",
            default_value_t = default_costly_statement_cost()
        )
    )]
    #[serde(default = "default_costly_statement_cost")]
    #[builder(default = "default_costly_statement_cost()")]
    pub costly_statement_cost: f64,

    /// Share of training rows held out to measure importance.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "cascade-validation-fraction",
            env = "CASCADE_VALIDATION_FRACTION",
            default_value_t = default_validation_fraction()
        )
    )]
    #[serde(default = "default_validation_fraction")]
    #[builder(default = "default_validation_fraction()")]
    pub validation_fraction: f64,

    /// Seed of the validation split and the column shuffles.
    #[cfg_attr(
        feature = "config",
        arg(long = "cascade-seed", env = "CASCADE_SEED", default_value_t = default_seed())
    )]
    #[serde(default = "default_seed")]
    #[builder(default = "default_seed()")]
    pub seed: u64,
}

fn default_budget_fraction() -> f64 {
    0.5
}

fn default_threshold() -> f64 {
    0.8
}

fn default_batch_mode() -> bool {
    true
}

fn default_costly_statement_cost() -> f64 {
    1.0
}

fn default_validation_fraction() -> f64 {
    0.25
}

fn default_seed() -> u64 {
    42
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            budget_fraction: default_budget_fraction(),
            threshold: default_threshold(),
            threshold_policy: ThresholdPolicy::default(),
            top_k: None,
            batch_mode: default_batch_mode(),
            costly_statements: Vec::new(),
            costly_statement_cost: default_costly_statement_cost(),
            validation_fraction: default_validation_fraction(),
            seed: default_seed(),
        }
    }
}

impl CascadeConfig {
    /// Starts building a configuration from the defaults.
    pub fn builder() -> CascadeConfigBuilder {
        CascadeConfigBuilder::default()
    }

    /// Returns the gate this configuration selects.
    pub fn gate(&self) -> GateConfig {
        match self.top_k {
            Some(k) => GateConfig::TopK { k },
            None => GateConfig::Threshold {
                threshold: self.threshold,
                policy: self.threshold_policy,
            },
        }
    }

    /// Checks every field range.
    ///
    /// Configurations that bypass the builder, such as deserialized or
    /// command-line ones, are checked here before a rewrite starts.
    pub fn validate(&self) -> CascadeResult<()> {
        check_ranges(
            self.budget_fraction,
            self.threshold,
            self.top_k,
            self.costly_statement_cost,
            self.validation_fraction,
        )
        .map_err(CascadeError::InvalidConfig)
    }
}

impl CascadeConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        check_ranges(
            self.budget_fraction.unwrap_or_else(default_budget_fraction),
            self.threshold.unwrap_or_else(default_threshold),
            self.top_k.flatten(),
            self.costly_statement_cost
                .unwrap_or_else(default_costly_statement_cost),
            self.validation_fraction
                .unwrap_or_else(default_validation_fraction),
        )
    }
}

fn check_ranges(
    budget_fraction: f64,
    threshold: f64,
    top_k: Option<usize>,
    costly_statement_cost: f64,
    validation_fraction: f64,
) -> Result<(), String> {
    if !(budget_fraction > 0.0 && budget_fraction <= 1.0) {
        return Err(format!("budget_fraction must be in (0, 1], got {budget_fraction}"));
    }
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(format!("threshold must be in (0, 1), got {threshold}"));
    }
    if top_k == Some(0) {
        return Err("top_k must be at least 1".into());
    }
    if !(costly_statement_cost.is_finite() && costly_statement_cost >= 0.0) {
        return Err(format!(
            "costly_statement_cost must be finite and non-negative, got {costly_statement_cost}"
        ));
    }
    if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
        return Err(format!(
            "validation_fraction must be in (0, 1), got {validation_fraction}"
        ));
    }
    Ok(())
}

impl From<CascadeConfigBuilderError> for CascadeError {
    fn from(err: CascadeConfigBuilderError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
