//! Reference execution of rewritten plans.
//!
//! Cascade nodes are evaluated here; every other node is handed to a
//! [`NodeEvaluator`] supplied by the host.

use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};
use sluice_graph::{Graph, Node, NodeId, NodeKind};

use crate::error::{BoxedError, CascadeError, CascadeResult};
use crate::gate::GatePolicy;

/// Tracing target for plan interpretation.
pub const TRACING_TARGET: &str = "sluice_cascade::interpret";

/// A value bound to a name while a plan runs.
#[derive(Debug, Clone, PartialEq, From, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// One number per row.
    Floats(Vec<f64>),
    /// One flag per row.
    Mask(Vec<bool>),
    /// Anything the host evaluator produces.
    Opaque(serde_json::Value),
}

impl Value {
    /// Returns the numbers of a float value.
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Floats(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the flags of a mask value.
    pub fn as_mask(&self) -> Option<&[bool]> {
        match self {
            Self::Mask(values) => Some(values),
            _ => None,
        }
    }
}

/// Evaluates the nodes a [`PlanInterpreter`] does not handle itself.
pub trait NodeEvaluator {
    /// Computes the outputs of `node` from the values of its input names,
    /// in output order.
    fn evaluate(
        &mut self,
        id: NodeId,
        node: &Node,
        inputs: &[&Value],
    ) -> Result<Vec<Value>, BoxedError>;
}

/// Runs a plan over a graph.
#[derive(Debug, Clone, Copy)]
pub struct PlanInterpreter<'g> {
    graph: &'g Graph,
}

impl<'g> PlanInterpreter<'g> {
    /// Creates an interpreter over `graph`.
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Runs `plan` and returns the value bound to `result`.
    ///
    /// `bindings` must bind every name the plan's input nodes produce. A
    /// point early exit whose single row is resolved returns the small
    /// model's result immediately.
    pub fn run<E: NodeEvaluator>(
        &self,
        plan: &[NodeId],
        mut bindings: HashMap<String, Value>,
        evaluator: &mut E,
        result: &str,
    ) -> CascadeResult<Value> {
        for &id in plan {
            let node = self.graph.node(id)?;
            match node.kind() {
                NodeKind::Input => {
                    let mut names = node.output_names();
                    if let Some(missing) = names.find(|name| !bindings.contains_key(*name)) {
                        return Err(CascadeError::MissingBinding(missing.to_owned()));
                    }
                }
                NodeKind::ThresholdGate { .. } | NodeKind::TopKGate { .. } => {
                    let Some(policy) = GatePolicy::from_kind(node.kind()) else {
                        continue;
                    };
                    let outcome = policy.decide(floats(&bindings, node, 0)?);
                    tracing::debug!(
                        target: TRACING_TARGET,
                        node = %id,
                        rows = outcome.resolved.len(),
                        unresolved = outcome.unresolved(),
                        "gate decided",
                    );
                    let [predictions, resolved] = node.outputs() else {
                        return Err(evaluation(id, "gate must bind predictions and a mask"));
                    };
                    bindings.insert(predictions.name.clone(), outcome.predictions.into());
                    bindings.insert(resolved.name.clone(), outcome.resolved.into());
                }
                NodeKind::PointEarlyExit => {
                    let predictions = floats(&bindings, node, 0)?;
                    if let [true] = mask(&bindings, node, 1)? {
                        tracing::debug!(target: TRACING_TARGET, node = %id, "row resolved early");
                        return Ok(Value::Floats(predictions.to_vec()));
                    }
                }
                NodeKind::CombinePredictions => {
                    let merged = combine(
                        id,
                        floats(&bindings, node, 0)?,
                        mask(&bindings, node, 1)?,
                        floats(&bindings, node, 2)?,
                    )?;
                    for output in node.outputs() {
                        bindings.insert(output.name.clone(), Value::Floats(merged.clone()));
                    }
                }
                _ => {
                    let values = {
                        let inputs = node
                            .input_names()
                            .iter()
                            .map(|name| lookup(&bindings, name))
                            .collect::<CascadeResult<Vec<_>>>()?;
                        evaluator
                            .evaluate(id, node, &inputs)
                            .map_err(|err| evaluation(id, err))?
                    };
                    if values.len() != node.outputs().len() {
                        return Err(evaluation(
                            id,
                            format!(
                                "{} values for {} outputs",
                                values.len(),
                                node.outputs().len()
                            ),
                        ));
                    }
                    for (output, value) in node.outputs().iter().zip(values) {
                        bindings.insert(output.name.clone(), value);
                    }
                }
            }
        }

        bindings
            .remove(result)
            .ok_or_else(|| CascadeError::MissingBinding(result.to_owned()))
    }
}

/// Small-model results for resolved rows, big-model results in order for
/// the rest.
fn combine(
    id: NodeId,
    small: &[f64],
    resolved: &[bool],
    big: &[f64],
) -> CascadeResult<Vec<f64>> {
    if small.len() != resolved.len() {
        return Err(evaluation(
            id,
            format!("{} predictions for {} mask rows", small.len(), resolved.len()),
        ));
    }
    let mut big_rows = big.iter();
    let mut merged = Vec::with_capacity(small.len());
    for (&prediction, &resolved) in small.iter().zip(resolved) {
        if resolved {
            merged.push(prediction);
        } else {
            let Some(&prediction) = big_rows.next() else {
                return Err(evaluation(id, "big model returned too few rows"));
            };
            merged.push(prediction);
        }
    }
    if big_rows.next().is_some() {
        return Err(evaluation(id, "big model returned too many rows"));
    }
    Ok(merged)
}

fn lookup<'b>(bindings: &'b HashMap<String, Value>, name: &str) -> CascadeResult<&'b Value> {
    bindings
        .get(name)
        .ok_or_else(|| CascadeError::MissingBinding(name.to_owned()))
}

fn input<'b>(
    bindings: &'b HashMap<String, Value>,
    node: &Node,
    position: usize,
) -> CascadeResult<(&'b Value, &'b str)> {
    let name = node
        .input_names()
        .get(position)
        .ok_or_else(|| CascadeError::MissingBinding(format!("input #{position}")))?;
    let (name, value) = bindings
        .get_key_value(name.as_str())
        .ok_or_else(|| CascadeError::MissingBinding(name.clone()))?;
    Ok((value, name.as_str()))
}

fn floats<'b>(
    bindings: &'b HashMap<String, Value>,
    node: &Node,
    position: usize,
) -> CascadeResult<&'b [f64]> {
    let (value, name) = input(bindings, node, position)?;
    value
        .as_floats()
        .ok_or_else(|| CascadeError::MissingBinding(format!("{name} as floats")))
}

fn mask<'b>(
    bindings: &'b HashMap<String, Value>,
    node: &Node,
    position: usize,
) -> CascadeResult<&'b [bool]> {
    let (value, name) = input(bindings, node, position)?;
    value
        .as_mask()
        .ok_or_else(|| CascadeError::MissingBinding(format!("{name} as mask")))
}

fn evaluation(node: NodeId, message: impl ToString) -> CascadeError {
    CascadeError::Evaluation {
        node,
        message: message.to_string(),
    }
}
