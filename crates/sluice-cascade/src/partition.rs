//! Budgeted split of feature groups into two tiers.

use std::collections::HashSet;

use sluice_graph::{FeatureIndices, ModelInputs, NodeId};

use crate::error::{CascadeError, CascadeResult};
use crate::score::FeatureScores;

/// Tracing target for partitioning.
pub const TRACING_TARGET: &str = "sluice_cascade::partition";

/// A group stops the greedy pass when its efficiency falls below this
/// fraction of the running average.
const EFFICIENCY_DROP: f64 = 5.0;

/// A model input group with its scores.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureGroup {
    /// Node producing the group.
    pub node: NodeId,
    /// Group indices in the model's feature vector.
    pub indices: FeatureIndices,
    /// Permutation importance.
    pub importance: f64,
    /// Per-row cost.
    pub cost: f64,
}

impl FeatureGroup {
    /// Importance per unit of cost; free groups are infinitely efficient.
    pub fn efficiency(&self) -> f64 {
        if self.cost == 0.0 {
            f64::INFINITY
        } else {
            self.importance / self.cost
        }
    }
}

/// The two tiers, each in efficiency order.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Cheap, important groups the small model sees.
    pub more: Vec<FeatureGroup>,
    /// Everything else.
    pub less: Vec<FeatureGroup>,
    /// Cost budget of the important tier.
    pub budget: f64,
}

impl Partition {
    /// Nodes of the important tier.
    pub fn more_nodes(&self) -> HashSet<NodeId> {
        self.more.iter().map(|group| group.node).collect()
    }

    /// Nodes of the less important tier.
    pub fn less_nodes(&self) -> HashSet<NodeId> {
        self.less.iter().map(|group| group.node).collect()
    }

    /// Whether one tier is empty, so no cascade can be built.
    pub fn is_degenerate(&self) -> bool {
        self.more.is_empty() || self.less.is_empty()
    }
}

/// Splits the groups of `inputs` into an important tier within budget and
/// the rest.
///
/// Groups are ranked by descending efficiency (stable, so ties keep
/// declaration order). The greedy pass stops at the first group whose
/// efficiency is below a fifth of the running average efficiency of the
/// costed groups taken so far, and skips any group that would push the
/// tier's cost over `budget_fraction` of the total. Free groups are then
/// added unconditionally.
pub fn partition(
    inputs: &ModelInputs,
    importances: &FeatureScores,
    costs: &FeatureScores,
    budget_fraction: f64,
) -> CascadeResult<Partition> {
    let mut ranked = Vec::with_capacity(inputs.len());
    for (node, indices) in inputs.groups() {
        let importance = importances
            .get(&indices)
            .ok_or_else(|| CascadeError::MissingFeatureGroup {
                indices: indices.clone(),
            })?;
        let cost = costs
            .get(&indices)
            .ok_or_else(|| CascadeError::MissingFeatureGroup {
                indices: indices.clone(),
            })?;
        ranked.push(FeatureGroup {
            node,
            indices,
            importance,
            cost,
        });
    }
    ranked.sort_by(|a, b| b.efficiency().total_cmp(&a.efficiency()));

    let total_cost: f64 = ranked.iter().map(|group| group.cost).sum();
    let budget = budget_fraction * total_cost;
    let mut taken = vec![false; ranked.len()];
    let mut current_cost = 0.0;
    let mut current_importance = 0.0;

    for (position, group) in ranked.iter().enumerate() {
        let average = if current_cost == 0.0 {
            0.0
        } else {
            current_importance / current_cost
        };
        if group.efficiency() < average / EFFICIENCY_DROP {
            tracing::debug!(
                target: TRACING_TARGET,
                node = %group.node,
                efficiency = group.efficiency(),
                average,
                "efficiency dropped, stopping",
            );
            break;
        }
        if current_cost + group.cost <= budget {
            taken[position] = true;
            if group.cost > 0.0 {
                current_importance += group.importance;
                current_cost += group.cost;
            }
        }
    }
    for (position, group) in ranked.iter().enumerate() {
        if group.cost == 0.0 {
            taken[position] = true;
        }
    }

    let (more, less): (Vec<_>, Vec<_>) = ranked
        .into_iter()
        .zip(taken)
        .partition(|(_, taken)| *taken);
    let more: Vec<_> = more.into_iter().map(|(group, _)| group).collect();
    let less: Vec<_> = less.into_iter().map(|(group, _)| group).collect();

    tracing::info!(
        target: TRACING_TARGET,
        more_important = more.len(),
        less_important = less.len(),
        budget,
        spent = current_cost,
        "feature groups partitioned",
    );
    Ok(Partition { more, less, budget })
}
