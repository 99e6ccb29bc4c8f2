use sluice_graph::{Graph, ModelNode, ModelOp, Node, NodeId, NodeKind, TypeEnv, ValueType};

use super::{
    BIG_MODEL, Reassembly, SMALL_MODEL, TRACING_TARGET, feature_input, find_model, model_output,
    original_features, splice, tier_block,
};
use crate::artifact::CascadeArtifact;
use crate::config::CascadeConfig;
use crate::error::CascadeResult;
use crate::extract::{RowGate, Tier};
use crate::gate::GatePolicy;
use crate::partition::partition;

/// Rewrites the first prediction node of `plan` into a serving cascade.
///
/// The important tier's block feeds the small model, whose probabilities
/// pass through the configured gate. The other tier's block is narrowed to
/// the rows the gate leaves unresolved; a combiner rebuilds their features
/// for the big model, and the two models' results are merged back into the
/// original output. Outside batch mode an early exit after the gate skips
/// everything else for a resolved single row.
///
/// The artifact must hold importances, costs and both models; it is checked
/// before the graph is touched. Returns `plan` unchanged if it has no
/// prediction node or if the partition leaves a tier empty.
pub fn eval_cascade(
    graph: &mut Graph,
    env: &mut TypeEnv,
    plan: Vec<NodeId>,
    artifact: &CascadeArtifact,
    config: &CascadeConfig,
) -> CascadeResult<Vec<NodeId>> {
    config.validate()?;
    artifact.validate_for_serving()?;
    let Some((id, node, model)) = find_model(graph, &plan, |model| !model.is_training())? else {
        tracing::debug!(target: TRACING_TARGET, "no prediction node, plan unchanged");
        return Ok(plan);
    };
    let (x, x_name) = feature_input(&node, id)?;
    let output = model_output(&node, id)?;

    artifact.validate_inputs(&model.inputs)?;
    let split = partition(
        &model.inputs,
        artifact.feature_importances()?,
        artifact.indices_to_costs()?,
        config.budget_fraction,
    )?;
    if split.is_degenerate() {
        tracing::warn!(
            target: TRACING_TARGET,
            model = %id,
            more_important = split.more.len(),
            less_important = split.less.len(),
            "feature tier is empty, serving without a cascade",
        );
        return Ok(plan);
    }

    let Some((more_head, more_block)) =
        tier_block(graph, env, x, Tier::More, &split.more_nodes(), None)?
    else {
        tracing::warn!(
            target: TRACING_TARGET,
            model = %id,
            "important tier unreachable from the model input, serving without a cascade",
        );
        return Ok(plan);
    };

    let more_name = graph.primary_output(more_head)?.name.clone();
    let probabilities = format!("small__proba_{}", output.name);
    let small = graph.add(
        env,
        Node::builder(NodeKind::Model(ModelNode {
            model: SMALL_MODEL.to_owned(),
            op: ModelOp::PredictProba,
            inputs: model.inputs.clone(),
        }))
        .with_input(more_head, more_name.clone())
        .with_output(probabilities.clone(), ValueType::doubles()),
    )?;

    let policy = GatePolicy::from_config(config.gate(), model.op == ModelOp::PredictProba);
    let predictions = format!("small_preds_{}", output.name);
    let mask = format!("small_mask_{}", output.name);
    let gate = graph.add(
        env,
        Node::builder(policy.to_kind())
            .with_input(small, probabilities)
            .with_output(predictions.clone(), ValueType::doubles())
            .with_output(mask.clone(), ValueType::mask()),
    )?;
    let row_gate = RowGate {
        node: gate,
        mask: mask.clone(),
    };

    let early_exit = if config.batch_mode {
        None
    } else {
        let builder = Node::builder(NodeKind::PointEarlyExit)
            .with_input(gate, predictions.clone())
            .with_input_name(mask.clone());
        Some(graph.add(env, builder)?)
    };

    let Some((less_head, less_block)) = tier_block(
        graph,
        env,
        x,
        Tier::Less,
        &split.less_nodes(),
        Some(&row_gate),
    )?
    else {
        tracing::warn!(
            target: TRACING_TARGET,
            model = %id,
            "less important tier unreachable from the model input, serving without a cascade",
        );
        return Ok(plan);
    };

    let features = graph.primary_output(x)?.clone();
    let reassembly = Reassembly::for_block(graph, more_head, less_head, &features)?;
    let ty = reassembly.output_type(&features.ty);
    let kind = match reassembly {
        Reassembly::Stack(layout) => NodeKind::CascadeStack { layout },
        Reassembly::Columns(columns) => NodeKind::CascadeColumnSelect { columns },
    };
    let less_name = graph.primary_output(less_head)?.name.clone();
    let combiner = graph.add(
        env,
        Node::builder(kind)
            .with_input(more_head, more_name)
            .with_input(less_head, less_name)
            .with_input(gate, mask.clone())
            .with_output(x_name.clone(), ty),
    )?;

    let big = graph.add(
        env,
        node.to_builder()
            .with_kind(NodeKind::Model(ModelNode {
                model: BIG_MODEL.to_owned(),
                ..model
            }))
            .with_inputs(vec![combiner])
            .with_input_names(vec![x_name]),
    )?;
    let combined = graph.add(
        env,
        Node::builder(NodeKind::CombinePredictions)
            .with_input(gate, predictions)
            .with_input_name(mask)
            .with_input(big, output.name.clone())
            .with_output(output.name.clone(), output.ty.clone()),
    )?;

    let removed = original_features(graph, env, x)?;
    let mut replacement = more_block;
    replacement.extend([small, gate]);
    replacement.extend(early_exit);
    replacement.extend(less_block);
    replacement.extend([combiner, big, combined]);
    let inserted = replacement.len();
    let plan = splice(graph, plan, id, &removed, replacement)?;

    tracing::info!(
        target: TRACING_TARGET,
        model = %id,
        removed = removed.len(),
        inserted,
        batch_mode = config.batch_mode,
        "serving cascade inserted",
    );
    Ok(plan)
}
