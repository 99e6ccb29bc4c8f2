//! Dependency collection.
//!
//! Walks backwards from a head node and gathers everything that has to run
//! for it, stopping at feature sources, impure glue and join chain bases.

use std::collections::{HashMap, HashSet, VecDeque};

use sluice_graph::node::GlueBlock;
use sluice_graph::{Graph, JoinRoots, Node, NodeId, NodeKind, TypeEnv, ValueType};

use crate::error::{CascadeError, CascadeResult};
use crate::extract::RowGate;

/// Tracing target for dependency collection.
pub const TRACING_TARGET: &str = "sluice_cascade::collect";

/// Helper the narrowing glue calls to drop resolved rows from a frame.
pub const NARROW_HELPER: &str = "cascade_df_shorten";

/// Collects the ordered dependencies of a head node.
pub struct Collector<'a> {
    graph: &'a mut Graph,
    env: &'a mut TypeEnv,
    roots: &'a mut JoinRoots,
    gate: Option<&'a RowGate>,
    narrowed: HashMap<NodeId, NodeId>,
}

impl<'a> Collector<'a> {
    /// Creates a collector.
    pub fn new(graph: &'a mut Graph, env: &'a mut TypeEnv, roots: &'a mut JoinRoots) -> Self {
        Self {
            graph,
            env,
            roots,
            gate: None,
            narrowed: HashMap::new(),
        }
    }

    /// Narrows frames entering single-input glue blocks to the rows `gate`
    /// leaves unresolved.
    pub fn with_gate(mut self, gate: &'a RowGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Returns every node `head` needs, in dependency order, ending with
    /// `head`.
    ///
    /// Vectorizers, impure glue and join chain bases end the walk: their own
    /// inputs are computed elsewhere in the program.
    pub fn collect(&mut self, head: NodeId) -> CascadeResult<Vec<NodeId>> {
        let mut block = VecDeque::new();
        let mut pending = vec![head];

        while let Some(id) = pending.pop() {
            let node = self.graph.node(id)?.clone();
            block.push_front(id);
            match node.kind() {
                NodeKind::Vectorizer(_) => {}
                NodeKind::StackSparse
                | NodeKind::StackDense
                | NodeKind::ColumnSelect { .. }
                | NodeKind::Concat { .. }
                | NodeKind::Identity
                | NodeKind::Reshape { .. }
                | NodeKind::ToDenseMatrix
                | NodeKind::Input => pending.extend_from_slice(node.inputs()),
                NodeKind::HashJoin(_) => {
                    if !self.roots.is_base(self.graph, id)?
                        && let Some(&left) = node.inputs().first()
                    {
                        pending.push(left);
                    }
                }
                NodeKind::Glue(_) => {
                    if let Some(gate) = self.gate
                        && narrowable(&node)
                    {
                        let narrowing = self.narrowing(id, &node, gate)?;
                        block.push_front(narrowing);
                    }
                    if node.is_pure() {
                        pending.extend_from_slice(node.inputs());
                    }
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
                | NodeKind::CombinePredictions => {
                    return Err(CascadeError::UnsupportedNode {
                        node: id,
                        kind: node.kind().name(),
                        stage: "collect",
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        let block: Vec<NodeId> = block.into_iter().filter(|id| seen.insert(*id)).collect();
        let block = dependency_order(self.graph, &block, &HashSet::new())?;
        tracing::debug!(
            target: TRACING_TARGET,
            head = %head,
            nodes = block.len(),
            gated = self.gate.is_some(),
            "dependencies collected",
        );
        Ok(block)
    }

    /// Glue that rebinds the frame entering `glue` to its unresolved rows.
    fn narrowing(&mut self, glue: NodeId, node: &Node, gate: &RowGate) -> CascadeResult<NodeId> {
        if let Some(&narrowing) = self.narrowed.get(&glue) {
            return Ok(narrowing);
        }
        let (input, name) = (node.inputs()[0], node.input_names()[0].clone());
        let ty = self.env.require(&name)?.clone();
        let code = format!("{name} = {NARROW_HELPER}({name}, {})", gate.mask);
        let builder = Node::builder(NodeKind::Glue(GlueBlock::new(code, false)))
            .with_input(input, name.clone())
            .with_input(gate.node, gate.mask.clone())
            .with_output(name, ty);
        let narrowing = self.graph.add(self.env, builder)?;
        self.narrowed.insert(glue, narrowing);
        Ok(narrowing)
    }
}

/// A glue block reading one value and producing one frame.
fn narrowable(node: &Node) -> bool {
    node.inputs().len() == 1
        && node.input_names().len() == 1
        && matches!(node.outputs(), [output] if matches!(output.ty, ValueType::Frame(_)))
}

/// Reorders `order` so every node follows the inputs it reads.
///
/// Inputs found in `order` or in `pool` are placed before their first
/// reader; everything else keeps its relative position. Nodes from `pool`
/// that nothing reads are dropped.
pub(crate) fn dependency_order(
    graph: &Graph,
    order: &[NodeId],
    pool: &HashSet<NodeId>,
) -> CascadeResult<Vec<NodeId>> {
    let members: HashSet<NodeId> = order.iter().chain(pool).copied().collect();
    let mut placed = HashSet::with_capacity(members.len());
    let mut ordered = Vec::with_capacity(order.len());
    for &id in order {
        place(graph, id, &members, &mut placed, &mut ordered)?;
    }
    Ok(ordered)
}

fn place(
    graph: &Graph,
    id: NodeId,
    members: &HashSet<NodeId>,
    placed: &mut HashSet<NodeId>,
    ordered: &mut Vec<NodeId>,
) -> CascadeResult<()> {
    if !placed.insert(id) {
        return Ok(());
    }
    for &input in graph.node(id)?.inputs() {
        if members.contains(&input) {
            place(graph, input, members, placed, ordered)?;
        }
    }
    ordered.push(id);
    Ok(())
}
