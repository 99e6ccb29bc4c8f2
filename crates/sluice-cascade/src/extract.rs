//! Subgraph extraction.
//!
//! Slices the graph under a head node down to what a chosen set of source
//! nodes can compute. Combining nodes are rebuilt over their surviving
//! inputs under tier-namespaced names, so the original program's bindings
//! and types are never shadowed.

use std::collections::HashSet;

use sluice_graph::node::TableShape;
use sluice_graph::{
    FrameType, Graph, GraphError, JoinRoots, Node, NodeId, NodeKind, NodeOutput, TypeEnv,
    ValueType,
};
use strum::{AsRefStr, IntoStaticStr};

use crate::error::{CascadeError, CascadeResult};

/// Tracing target for subgraph extraction.
pub const TRACING_TARGET: &str = "sluice_cascade::extract";

/// Which half of a cascade a subgraph feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    /// Cheap, important features seen by the small model.
    More,
    /// Costly, less important features only the big model sees.
    Less,
}

impl Tier {
    /// Namespaces `name` for this tier.
    pub fn namespaced(self, name: &str) -> String {
        format!("cascading__{}__{name}", self.as_ref())
    }
}

/// A gate restricting feature computation to the rows it leaves unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGate {
    /// The gate node.
    pub node: NodeId,
    /// Name of its resolved-row mask output.
    pub mask: String,
}

/// Extracts the subgraph of a head node computable from selected sources.
pub struct Extractor<'a> {
    graph: &'a mut Graph,
    env: &'a mut TypeEnv,
    roots: &'a mut JoinRoots,
    selected: &'a HashSet<NodeId>,
    tier: Tier,
    gate: Option<&'a RowGate>,
}

impl<'a> Extractor<'a> {
    /// Creates an extractor for `selected` sources.
    pub fn new(
        graph: &'a mut Graph,
        env: &'a mut TypeEnv,
        roots: &'a mut JoinRoots,
        selected: &'a HashSet<NodeId>,
        tier: Tier,
    ) -> Self {
        Self {
            graph,
            env,
            roots,
            selected,
            tier,
            gate: None,
        }
    }

    /// Narrows the kept feature sources to the rows `gate` leaves unresolved.
    pub fn with_gate(mut self, gate: &'a RowGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns the node computing what `head` computes from the selected
    /// sources, or `None` if `head` depends on none of them.
    pub fn extract(&mut self, head: NodeId) -> CascadeResult<Option<NodeId>> {
        let before = self.graph.len();
        let extracted = self.visit(head)?;
        tracing::debug!(
            target: TRACING_TARGET,
            head = %head,
            tier = self.tier.as_ref(),
            extracted = ?extracted,
            created = self.graph.len() - before,
            "subgraph extracted",
        );
        Ok(extracted)
    }

    fn visit(&mut self, id: NodeId) -> CascadeResult<Option<NodeId>> {
        let node = self.graph.node(id)?.clone();
        match node.kind() {
            NodeKind::Vectorizer(params) => {
                if !self.selected.contains(&id) {
                    return Ok(None);
                }
                let Some(gate) = self.gate else {
                    return Ok(Some(id));
                };
                let mut params = params.clone();
                params.row_gate = Some(gate.node);
                let narrowed = node
                    .to_builder()
                    .with_kind(NodeKind::Vectorizer(params))
                    .with_input(gate.node, gate.mask.clone());
                Ok(Some(self.graph.add(self.env, narrowed)?))
            }
            NodeKind::StackSparse | NodeKind::StackDense => {
                let kept = self.visit_all(node.inputs())?;
                if kept.is_empty() {
                    return Ok(None);
                }
                let output = primary(&node, id)?;
                let ty = output.ty.clone();
                self.rebuild(&node, id, node.kind().clone(), kept, ty).map(Some)
            }
            NodeKind::Concat { shape } => {
                let kept = self.visit_all(node.inputs())?;
                if kept.is_empty() {
                    return Ok(None);
                }
                let ty = match shape {
                    TableShape::Frame => {
                        let mut frame = FrameType::default();
                        for &child in &kept {
                            frame = frame.concat(&self.frame_of(child)?)?;
                        }
                        ValueType::Frame(frame)
                    }
                    TableShape::ColumnSet => {
                        let original = primary(&node, id)?;
                        let Some(columns) = original.ty.as_column_set() else {
                            return Err(unexpected(original, "column set"));
                        };
                        let names = self.column_names(&kept)?;
                        ValueType::ColumnSet(columns.with_columns(names))
                    }
                };
                self.rebuild(&node, id, node.kind().clone(), kept, ty).map(Some)
            }
            NodeKind::ColumnSelect { shape, columns } => {
                let kept = self.visit_all(node.inputs())?;
                if kept.is_empty() {
                    return Ok(None);
                }
                let available: HashSet<String> = self.column_names(&kept)?.into_iter().collect();
                let mut selection: Vec<String> = columns
                    .iter()
                    .filter(|column| available.contains(*column))
                    .cloned()
                    .collect();

                let original = primary(&node, id)?;
                let ty = match shape {
                    TableShape::Frame => {
                        // Left-hand columns of an unselected join chain base
                        // also reach the selection through the other tier.
                        if let Some(excluded) = self.unselected_base_columns(&node)? {
                            selection.retain(|column| !excluded.contains(column));
                        }
                        let Some(frame) = original.ty.as_frame() else {
                            return Err(unexpected(original, "frame"));
                        };
                        ValueType::Frame(frame.select(&selection))
                    }
                    TableShape::ColumnSet => {
                        let Some(set) = original.ty.as_column_set() else {
                            return Err(unexpected(original, "column set"));
                        };
                        ValueType::ColumnSet(set.with_columns(selection.clone()))
                    }
                };
                let kind = NodeKind::ColumnSelect {
                    shape: *shape,
                    columns: selection,
                };
                self.rebuild(&node, id, kind, kept, ty).map(Some)
            }
            NodeKind::HashJoin(params) => {
                let base = self.roots.base(self.graph, id)?.unwrap_or(id);
                let left = left_input(&node, id)?;
                if self.selected.contains(&id) {
                    let (left, left_name, left_type) = match (id == base, left) {
                        (true, _) => self.base_left(base)?,
                        (false, left) => match self.visit(left)? {
                            Some(kept) => {
                                let name = self.graph.primary_output(kept)?.name.clone();
                                (kept, name, self.frame_of(kept)?)
                            }
                            None => self.base_left(base)?,
                        },
                    };

                    let mut params = params.clone();
                    params.left_type = left_type;
                    params.row_gate = self.gate.map(|gate| gate.node);
                    let output_type = params.output_type()?;
                    let output = primary(&node, id)?;

                    let mut builder = node
                        .to_builder()
                        .with_kind(NodeKind::HashJoin(params))
                        .with_inputs(vec![left])
                        .with_input_names(vec![left_name])
                        .with_outputs(vec![NodeOutput::new(
                            self.tier.namespaced(&output.name),
                            ValueType::Frame(output_type),
                        )]);
                    if let Some(gate) = self.gate {
                        builder = builder.with_input(gate.node, gate.mask.clone());
                    }
                    Ok(Some(self.graph.add(self.env, builder)?))
                } else if id != base {
                    self.visit(left)
                } else {
                    Ok(None)
                }
            }
            NodeKind::Identity => {
                let input = single_input(&node, id)?;
                let Some(kept) = self.visit(input)? else {
                    return Ok(None);
                };
                let ty = self.graph.primary_output(kept)?.ty.clone();
                self.rebuild(&node, id, NodeKind::Identity, vec![kept], ty)
                    .map(Some)
            }
            NodeKind::Reshape { .. } | NodeKind::ToDenseMatrix => {
                let input = single_input(&node, id)?;
                let Some(kept) = self.visit(input)? else {
                    return Ok(None);
                };
                let ty = primary(&node, id)?.ty.clone();
                self.rebuild(&node, id, node.kind().clone(), vec![kept], ty)
                    .map(Some)
            }
            NodeKind::Glue(_) | NodeKind::Input => {
                Ok(self.selected.contains(&id).then_some(id))
            }
            NodeKind::Output
            | NodeKind::ArrayBinop { .. }
            | NodeKind::StringOp { .. }
            | NodeKind::Model(_)
            | NodeKind::ThresholdGate { .. }
            | NodeKind::TopKGate { .. }
            | NodeKind::PointEarlyExit
            | NodeKind::CascadeStack { .. }
            | NodeKind::CascadeColumnSelect { .. }
            | NodeKind::CombinePredictions => Err(CascadeError::UnsupportedNode {
                node: id,
                kind: node.kind().name(),
                stage: "extract",
            }),
        }
    }

    fn visit_all(&mut self, inputs: &[NodeId]) -> CascadeResult<Vec<NodeId>> {
        let mut kept = Vec::with_capacity(inputs.len());
        for &input in inputs {
            if let Some(node) = self.visit(input)? {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Inserts a copy of `node` over `inputs`, reading each input's primary
    /// output and binding a tier-namespaced name.
    fn rebuild(
        &mut self,
        node: &Node,
        id: NodeId,
        kind: NodeKind,
        inputs: Vec<NodeId>,
        ty: ValueType,
    ) -> CascadeResult<NodeId> {
        let mut names = Vec::with_capacity(inputs.len());
        for &input in &inputs {
            names.push(self.graph.primary_output(input)?.name.clone());
        }
        let name = self.tier.namespaced(&primary(node, id)?.name);
        let builder = node
            .to_builder()
            .with_kind(kind)
            .with_inputs(inputs)
            .with_input_names(names)
            .with_outputs(vec![NodeOutput::new(name, ty)]);
        Ok(self.graph.add(self.env, builder)?)
    }

    /// Left-hand source of a chain base, with its name and frame type.
    fn base_left(&self, base: NodeId) -> CascadeResult<(NodeId, String, FrameType)> {
        let node = self.graph.node(base)?;
        let left = left_input(node, base)?;
        let Some(params) = node.kind().as_hash_join() else {
            return Err(GraphError::InvalidNode(format!("{base} is not a hash join")).into());
        };
        let name = node
            .input_names()
            .first()
            .cloned()
            .ok_or(GraphError::ArityMismatch {
                inputs: node.inputs().len(),
                names: 0,
            })?;
        Ok((left, name, params.left_type.clone()))
    }

    /// Columns of the chain base's left input when that input is not a
    /// selected source.
    fn unselected_base_columns(&mut self, node: &Node) -> CascadeResult<Option<HashSet<String>>> {
        let Some(&first) = node.inputs().first() else {
            return Ok(None);
        };
        let Some(base) = self.roots.base(self.graph, first)? else {
            return Ok(None);
        };
        let base_node = self.graph.node(base)?;
        let left = left_input(base_node, base)?;
        if self.selected.contains(&left) {
            return Ok(None);
        }
        Ok(base_node.kind().as_hash_join().map(|params| {
            params
                .left_type
                .column_names()
                .map(str::to_owned)
                .collect()
        }))
    }

    fn frame_of(&self, id: NodeId) -> CascadeResult<FrameType> {
        let output = self.graph.primary_output(id)?;
        output
            .ty
            .as_frame()
            .cloned()
            .ok_or_else(|| unexpected(output, "frame"))
    }

    fn column_names(&self, nodes: &[NodeId]) -> CascadeResult<Vec<String>> {
        let mut names = Vec::new();
        for &node in nodes {
            let output = self.graph.primary_output(node)?;
            names.extend(output.ty.column_names().into_iter().map(str::to_owned));
        }
        Ok(names)
    }
}

fn primary(node: &Node, id: NodeId) -> CascadeResult<&NodeOutput> {
    node.output().ok_or_else(|| GraphError::NoOutput(id).into())
}

fn left_input(node: &Node, id: NodeId) -> CascadeResult<NodeId> {
    node.inputs()
        .first()
        .copied()
        .ok_or_else(|| GraphError::InvalidNode(format!("{id} has no left input")).into())
}

fn single_input(node: &Node, id: NodeId) -> CascadeResult<NodeId> {
    match node.inputs() {
        [input] => Ok(*input),
        inputs => Err(GraphError::InvalidNode(format!(
            "{id} expects one input, has {}",
            inputs.len()
        ))
        .into()),
    }
}

fn unexpected(output: &NodeOutput, expected: &'static str) -> CascadeError {
    CascadeError::UnexpectedType {
        name: output.name.clone(),
        expected,
        actual: output.ty.clone(),
    }
}
