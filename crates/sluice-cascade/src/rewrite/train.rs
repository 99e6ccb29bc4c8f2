use sluice_graph::node::{GlueBlock, StackLayout, TableShape};
use sluice_graph::{Graph, GraphError, ModelNode, Node, NodeId, NodeKind, NodeOutput, TypeEnv};

use super::{
    ARTIFACT_BINDING, BIG_MODEL, Reassembly, SMALL_MODEL, TRACING_TARGET, feature_input,
    find_model, model_output, original_features, splice, tier_block,
};
use crate::artifact::{CascadeArtifact, ModelSlot};
use crate::config::CascadeConfig;
use crate::cost::CostModel;
use crate::error::CascadeResult;
use crate::extract::Tier;
use crate::importance::{CascadeTrainer, TrainingData, feature_importances};
use crate::partition::partition;

/// Rewrites the first training node of `plan` into a trained cascade.
///
/// Feature importances are measured on `data`, costs come from the graph,
/// and both are recorded in `artifact`. The training node is replaced by
/// the important tier's block, the other tier's block, a combiner that
/// rebuilds the original features, the big model trained on them, the small
/// model trained on the important tier alone, and two glue blocks storing
/// both models in the artifact.
///
/// Returns `plan` unchanged if it has no training node or if the partition
/// leaves a tier empty.
pub fn train_cascade<T: CascadeTrainer>(
    graph: &mut Graph,
    env: &mut TypeEnv,
    plan: Vec<NodeId>,
    artifact: &mut CascadeArtifact,
    trainer: &T,
    data: &TrainingData,
    config: &CascadeConfig,
) -> CascadeResult<Vec<NodeId>> {
    config.validate()?;
    let Some((id, node, model)) = find_model(graph, &plan, ModelNode::is_training)? else {
        tracing::debug!(target: TRACING_TARGET, "no training node, plan unchanged");
        return Ok(plan);
    };
    let (x, x_name) = feature_input(&node, id)?;
    let (y, y_name) = labels_input(&node, id)?;
    let output = model_output(&node, id)?;

    let importances = feature_importances(data, trainer, &model.inputs, config)?;
    let costs = CostModel::new(config).indices_to_costs(graph, &model.inputs)?;
    let split = partition(&model.inputs, &importances, &costs, config.budget_fraction)?;
    artifact.record_scores(importances, costs, config.budget_fraction);
    if split.is_degenerate() {
        tracing::warn!(
            target: TRACING_TARGET,
            model = %id,
            more_important = split.more.len(),
            less_important = split.less.len(),
            "feature tier is empty, training without a cascade",
        );
        return Ok(plan);
    }

    let more = tier_block(graph, env, x, Tier::More, &split.more_nodes(), None)?;
    let less = tier_block(graph, env, x, Tier::Less, &split.less_nodes(), None)?;
    let (Some((more_head, more_block)), Some((less_head, less_block))) = (more, less) else {
        tracing::warn!(
            target: TRACING_TARGET,
            model = %id,
            "feature tier unreachable from the model input, training without a cascade",
        );
        return Ok(plan);
    };

    let features = graph.primary_output(x)?.clone();
    let combiner = combine(graph, env, more_head, less_head, &features)?;

    let big = graph.add(
        env,
        node.to_builder()
            .with_kind(NodeKind::Model(ModelNode {
                model: BIG_MODEL.to_owned(),
                ..model.clone()
            }))
            .with_inputs(vec![combiner, y])
            .with_input_names(vec![x_name, y_name.clone()]),
    )?;
    let more_name = graph.primary_output(more_head)?.name.clone();
    let small_output = format!("small_{}", output.name);
    let small = graph.add(
        env,
        node.to_builder()
            .with_kind(NodeKind::Model(ModelNode {
                model: SMALL_MODEL.to_owned(),
                ..model
            }))
            .with_inputs(vec![more_head, y])
            .with_input_names(vec![more_name, y_name])
            .with_outputs(vec![NodeOutput::new(small_output.clone(), output.ty.clone())]),
    )?;
    let store_big = store(graph, env, ModelSlot::BigModel, big, &output.name)?;
    let store_small = store(graph, env, ModelSlot::SmallModel, small, &small_output)?;

    let removed = original_features(graph, env, x)?;
    let mut replacement = more_block;
    replacement.extend(less_block);
    replacement.extend([combiner, big, small, store_big, store_small]);
    let inserted = replacement.len();
    let plan = splice(graph, plan, id, &removed, replacement)?;

    tracing::info!(
        target: TRACING_TARGET,
        model = %id,
        removed = removed.len(),
        inserted,
        "training cascade inserted",
    );
    Ok(plan)
}

fn labels_input(node: &Node, id: NodeId) -> CascadeResult<(NodeId, String)> {
    match (node.inputs().get(1), node.input_names().get(1)) {
        (Some(&input), Some(name)) => Ok((input, name.clone())),
        _ => Err(GraphError::InvalidNode(format!("training node {id} has no label input")).into()),
    }
}

/// Rebuilds the model's features from both tiers under the original name.
fn combine(
    graph: &mut Graph,
    env: &mut TypeEnv,
    more: NodeId,
    less: NodeId,
    features: &NodeOutput,
) -> CascadeResult<NodeId> {
    let reassembly = Reassembly::for_block(graph, more, less, features)?;
    let ty = reassembly.output_type(&features.ty);
    let kind = match reassembly {
        Reassembly::Stack(StackLayout::Sparse) => NodeKind::StackSparse,
        Reassembly::Stack(StackLayout::Dense) => NodeKind::StackDense,
        Reassembly::Columns(columns) => NodeKind::ColumnSelect {
            shape: TableShape::Frame,
            columns,
        },
    };
    let more_name = graph.primary_output(more)?.name.clone();
    let less_name = graph.primary_output(less)?.name.clone();
    let builder = Node::builder(kind)
        .with_input(more, more_name)
        .with_input(less, less_name)
        .with_output(features.name.clone(), ty);
    Ok(graph.add(env, builder)?)
}

/// Glue writing a trained model into the artifact binding.
fn store(
    graph: &mut Graph,
    env: &mut TypeEnv,
    slot: ModelSlot,
    model: NodeId,
    name: &str,
) -> CascadeResult<NodeId> {
    let code = format!("{ARTIFACT_BINDING}[\"{}\"] = {name}", slot.as_ref());
    let builder =
        Node::builder(NodeKind::Glue(GlueBlock::new(code, false))).with_input(model, name);
    Ok(graph.add(env, builder)?)
}
