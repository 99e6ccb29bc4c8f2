//! Cascade rewrites of an execution plan.
//!
//! [`train_cascade`] replaces a training node with a big and a small model
//! trained on the two feature tiers. [`eval_cascade`] replaces a prediction
//! node with the serving cascade: the small model runs on the important
//! tier, a gate resolves confident rows, and only unresolved rows compute
//! the remaining features and reach the big model.

mod serve;
mod train;

use std::collections::HashSet;

use sluice_graph::node::StackLayout;
use sluice_graph::{
    Graph, GraphError, JoinRoots, ModelNode, Node, NodeId, NodeOutput, TypeEnv, ValueType,
};

pub use self::serve::eval_cascade;
pub use self::train::train_cascade;
use crate::collect::{Collector, dependency_order};
use crate::error::{CascadeError, CascadeResult};
use crate::extract::{Extractor, RowGate, Tier};

/// Tracing target for plan rewrites.
pub const TRACING_TARGET: &str = "sluice_cascade::rewrite";

/// Model name of the cascade's full-feature model.
pub const BIG_MODEL: &str = "big_model";

/// Model name of the cascade's important-tier model.
pub const SMALL_MODEL: &str = "small_model";

/// Name the rewritten program binds the cascade artifact to.
pub const ARTIFACT_BINDING: &str = "cascade";

/// First model node in `plan` accepted by `matches`.
fn find_model(
    graph: &Graph,
    plan: &[NodeId],
    matches: impl Fn(&ModelNode) -> bool,
) -> CascadeResult<Option<(NodeId, Node, ModelNode)>> {
    for &id in plan {
        let node = graph.node(id)?;
        if let Some(model) = node.kind().as_model()
            && matches(model)
        {
            return Ok(Some((id, node.clone(), model.clone())));
        }
    }
    Ok(None)
}

/// The feature matrix input of a model node.
fn feature_input(node: &Node, id: NodeId) -> CascadeResult<(NodeId, String)> {
    match (node.inputs().first(), node.input_names().first()) {
        (Some(&input), Some(name)) => Ok((input, name.clone())),
        _ => Err(GraphError::InvalidNode(format!("model {id} has no feature input")).into()),
    }
}

fn model_output(node: &Node, id: NodeId) -> CascadeResult<NodeOutput> {
    node.output()
        .cloned()
        .ok_or_else(|| GraphError::NoOutput(id).into())
}

/// Extracts one tier of the subgraph under `head` and collects what it
/// needs. Returns the tier's head and its ordered block.
fn tier_block(
    graph: &mut Graph,
    env: &mut TypeEnv,
    head: NodeId,
    tier: Tier,
    selected: &HashSet<NodeId>,
    gate: Option<&RowGate>,
) -> CascadeResult<Option<(NodeId, Vec<NodeId>)>> {
    let mut roots = JoinRoots::new();
    let mut extractor = Extractor::new(graph, env, &mut roots, selected, tier);
    if let Some(gate) = gate {
        extractor = extractor.with_gate(gate);
    }
    let Some(tier_head) = extractor.extract(head)? else {
        return Ok(None);
    };

    let mut roots = JoinRoots::new();
    let mut collector = Collector::new(graph, env, &mut roots);
    if let Some(gate) = gate {
        collector = collector.with_gate(gate);
    }
    let block = collector.collect(tier_head)?;
    Ok(Some((tier_head, block)))
}

/// Nodes computing the model's features in the original plan.
fn original_features(
    graph: &mut Graph,
    env: &mut TypeEnv,
    head: NodeId,
) -> CascadeResult<HashSet<NodeId>> {
    let mut roots = JoinRoots::new();
    let block = Collector::new(graph, env, &mut roots).collect(head)?;
    Ok(block.into_iter().collect())
}

/// How the two tiers are put back together into the model's features.
#[derive(Debug, Clone, PartialEq)]
enum Reassembly {
    /// Horizontal matrix stack, important tier first.
    Stack(StackLayout),
    /// Frame column selection in this order.
    Columns(Vec<String>),
}

impl Reassembly {
    /// Chooses the reassembly for a feature block of type `original.ty`.
    ///
    /// Frames must recompose into exactly the original column set.
    fn for_block(
        graph: &Graph,
        more: NodeId,
        less: NodeId,
        original: &NodeOutput,
    ) -> CascadeResult<Self> {
        match &original.ty {
            ValueType::SparseMatrix => Ok(Self::Stack(StackLayout::Sparse)),
            ty if ty.is_dense_matrix() => Ok(Self::Stack(StackLayout::Dense)),
            ValueType::Frame(frame) => {
                let mut columns = Vec::new();
                for tier in [more, less] {
                    let output = graph.primary_output(tier)?;
                    columns.extend(output.ty.column_names().into_iter().map(str::to_owned));
                }
                let mut actual = columns.clone();
                actual.sort();
                let mut expected: Vec<String> = frame.column_names().map(str::to_owned).collect();
                expected.sort();
                if actual != expected {
                    return Err(CascadeError::ColumnMismatch { expected, actual });
                }
                Ok(Self::Columns(columns))
            }
            ty => Err(CascadeError::CombinerShape { ty: ty.clone() }),
        }
    }

    /// Type of the reassembled block.
    fn output_type(&self, original: &ValueType) -> ValueType {
        match (self, original.as_frame()) {
            (Self::Columns(columns), Some(frame)) => ValueType::Frame(frame.select(columns)),
            _ => original.clone(),
        }
    }
}

/// Drops `removed` from `plan` and puts `replacement` where `model` was.
///
/// Removed nodes something in the new plan still reads are restored ahead
/// of their first reader.
fn splice(
    graph: &Graph,
    plan: Vec<NodeId>,
    model: NodeId,
    removed: &HashSet<NodeId>,
    replacement: Vec<NodeId>,
) -> CascadeResult<Vec<NodeId>> {
    graph.validate()?;
    let mut kept: Vec<NodeId> = plan.into_iter().filter(|id| !removed.contains(id)).collect();
    let index = kept
        .iter()
        .position(|&id| id == model)
        .ok_or(CascadeError::Graph(GraphError::UnknownNode(model)))?;
    kept.splice(index..=index, replacement);
    dependency_order(graph, &kept, removed)
}
