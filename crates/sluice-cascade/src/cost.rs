//! Per-row cost model.

use std::collections::HashSet;

use sluice_graph::{Graph, ModelInputs, Node, NodeKind};

use crate::config::CascadeConfig;
use crate::error::CascadeResult;
use crate::score::FeatureScores;

/// Assigns a per-row serving cost to feature-producing nodes.
///
/// Glue blocks are free unless one of their outputs is declared costly, in
/// which case they cost the configured statement cost. Every other node
/// reports its own estimate.
#[derive(Debug, Clone)]
pub struct CostModel {
    costly_statements: HashSet<String>,
    costly_statement_cost: f64,
}

impl CostModel {
    /// Creates a cost model from the cost annotation of `config`.
    pub fn new(config: &CascadeConfig) -> Self {
        Self {
            costly_statements: config.costly_statements.iter().cloned().collect(),
            costly_statement_cost: config.costly_statement_cost,
        }
    }

    /// Per-row cost of `node`.
    pub fn node_cost(&self, node: &Node) -> f64 {
        match node.kind() {
            NodeKind::Glue(_) => {
                let costly = node
                    .output_names()
                    .any(|name| self.costly_statements.contains(name));
                if costly {
                    self.costly_statement_cost
                } else {
                    0.0
                }
            }
            _ => node.cost(),
        }
    }

    /// Cost of every feature group of a model, keyed by group indices.
    pub fn indices_to_costs(
        &self,
        graph: &Graph,
        inputs: &ModelInputs,
    ) -> CascadeResult<FeatureScores> {
        let mut costs = FeatureScores::new();
        for (node, indices) in inputs.groups() {
            costs.insert(indices, self.node_cost(graph.node(node)?));
        }
        Ok(costs)
    }
}
