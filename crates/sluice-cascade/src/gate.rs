//! Confidence gates over small-model probabilities.

use sluice_graph::node::ThresholdPolicy;
use sluice_graph::NodeKind;

use crate::config::GateConfig;

/// Per-row decision of a gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    /// Whether the small model's result stands for each row.
    pub resolved: Vec<bool>,
    /// Small-model result per row. Unresolved rows carry the raw probability
    /// and are overwritten by the big model.
    pub predictions: Vec<f64>,
}

impl GateOutcome {
    /// Number of rows left for the big model.
    pub fn unresolved(&self) -> usize {
        self.resolved.iter().filter(|resolved| !**resolved).count()
    }
}

/// Gate applied to positive-class probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GatePolicy {
    /// Resolve rows whose probability clears a threshold.
    Threshold {
        /// Confidence threshold in `(0, 1)`.
        threshold: f64,
        /// Single-sided or symmetric.
        policy: ThresholdPolicy,
        /// Report the probability instead of the class for resolved rows.
        report_probability: bool,
    },
    /// Resolve the `k` rows with the highest probability.
    TopK {
        /// Number of rows to resolve.
        k: usize,
    },
}

impl GatePolicy {
    /// Creates the gate selected by `config`.
    ///
    /// `report_probability` is set when the rewritten model predicts
    /// probabilities rather than classes.
    pub fn from_config(config: GateConfig, report_probability: bool) -> Self {
        match config {
            GateConfig::Threshold { threshold, policy } => Self::Threshold {
                threshold,
                policy,
                report_probability,
            },
            GateConfig::TopK { k } => Self::TopK { k },
        }
    }

    /// Recovers the policy of a gate node.
    pub fn from_kind(kind: &NodeKind) -> Option<Self> {
        match kind {
            NodeKind::ThresholdGate {
                threshold,
                policy,
                report_probability,
            } => Some(Self::Threshold {
                threshold: *threshold,
                policy: *policy,
                report_probability: *report_probability,
            }),
            NodeKind::TopKGate { k } => Some(Self::TopK { k: *k }),
            _ => None,
        }
    }

    /// Node kind of a gate applying this policy.
    pub fn to_kind(self) -> NodeKind {
        match self {
            Self::Threshold {
                threshold,
                policy,
                report_probability,
            } => NodeKind::ThresholdGate {
                threshold,
                policy,
                report_probability,
            },
            Self::TopK { k } => NodeKind::TopKGate { k },
        }
    }

    /// Decides every row.
    pub fn decide(&self, probabilities: &[f64]) -> GateOutcome {
        match *self {
            Self::Threshold {
                threshold,
                policy,
                report_probability,
            } => {
                let mut resolved = Vec::with_capacity(probabilities.len());
                let mut predictions = Vec::with_capacity(probabilities.len());
                for &p in probabilities {
                    let class = if p >= threshold {
                        Some(1.0)
                    } else if policy == ThresholdPolicy::Symmetric && p <= 1.0 - threshold {
                        Some(0.0)
                    } else {
                        None
                    };
                    resolved.push(class.is_some());
                    predictions.push(match class {
                        Some(class) if !report_probability => class,
                        _ => p,
                    });
                }
                GateOutcome {
                    resolved,
                    predictions,
                }
            }
            Self::TopK { k } => {
                let mut ranked: Vec<usize> = (0..probabilities.len()).collect();
                ranked.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));
                let mut resolved = vec![false; probabilities.len()];
                for &row in ranked.iter().take(k) {
                    resolved[row] = true;
                }
                GateOutcome {
                    resolved,
                    predictions: probabilities.to_vec(),
                }
            }
        }
    }
}
