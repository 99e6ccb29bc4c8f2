//! Append-only node arena.

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::DiGraph;

use crate::TRACING_TARGET;
use crate::env::TypeEnv;
use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeBuilder, NodeId, NodeOutput};

/// A pipeline graph.
///
/// Nodes live in a petgraph `DiGraph` arena and are addressed by [`NodeId`].
/// The arena only grows: inserted nodes are never mutated or removed, so
/// every handle stays valid for the lifetime of the graph and rewrites can
/// share the arena with the program they rewrite.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    graph: DiGraph<Node, ()>,
}

impl Graph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Appends a node and registers its outputs in `env`.
    ///
    /// Every input handle must already be in the graph and every input name
    /// must already be typed in `env`.
    pub fn insert(&mut self, env: &mut TypeEnv, node: Node) -> GraphResult<NodeId> {
        for &input in node.inputs() {
            if self.graph.node_weight(input.as_index()).is_none() {
                return Err(GraphError::DanglingInput {
                    node: node
                        .output()
                        .map(|output| output.name.clone())
                        .unwrap_or_default(),
                    input,
                });
            }
        }
        if node.input_names().len() < node.inputs().len() {
            return Err(GraphError::ArityMismatch {
                inputs: node.inputs().len(),
                names: node.input_names().len(),
            });
        }
        for name in node.input_names() {
            env.require(name)?;
        }

        for output in node.outputs() {
            env.insert(output.name.clone(), output.ty.clone());
        }
        let inputs = node.inputs().to_vec();
        let kind = node.kind().name();
        let id = NodeId::from(self.graph.add_node(node));
        for input in inputs {
            self.graph.add_edge(input.as_index(), id.as_index(), ());
        }

        tracing::trace!(target: TRACING_TARGET, node = %id, kind, "node inserted");
        Ok(id)
    }

    /// Builds a node from `builder` and appends it.
    pub fn add(&mut self, env: &mut TypeEnv, builder: NodeBuilder) -> GraphResult<NodeId> {
        let node = builder.build()?;
        self.insert(env, node)
    }

    /// Returns the node behind `id`.
    pub fn node(&self, id: NodeId) -> GraphResult<&Node> {
        self.graph
            .node_weight(id.as_index())
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Returns the first output of `id`.
    pub fn primary_output(&self, id: NodeId) -> GraphResult<&NodeOutput> {
        self.node(id)?.output().ok_or(GraphError::NoOutput(id))
    }

    /// Whether `id` belongs to this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.node_weight(id.as_index()).is_some()
    }

    /// Iterates over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.graph
            .node_indices()
            .map(|index| (NodeId::from(index), &self.graph[index]))
    }

    /// Returns every node in dependency order.
    pub fn topological_order(&self) -> GraphResult<Vec<NodeId>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(NodeId::from).collect())
            .map_err(|cycle| GraphError::Cycle(NodeId::from(cycle.node_id())))
    }

    /// Checks that the graph is acyclic.
    pub fn validate(&self) -> GraphResult<()> {
        if is_cyclic_directed(&self.graph) {
            self.topological_order()?;
        }
        Ok(())
    }
}
