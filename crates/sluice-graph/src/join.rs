//! Join chain root discovery.

use std::collections::HashMap;

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::node::NodeId;

/// Memoized lookup of the base join of a join chain.
///
/// A chain is a sequence of hash joins where each join's left input is the
/// previous join. The base is the join whose left input is not a join, i.e.
/// the one attached to the original left-hand source.
#[derive(Debug, Clone, Default)]
pub struct JoinRoots {
    bases: HashMap<NodeId, NodeId>,
}

impl JoinRoots {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the base join of the chain `id` belongs to.
    ///
    /// Returns `None` when `id` is not a hash join.
    pub fn base(&mut self, graph: &Graph, id: NodeId) -> GraphResult<Option<NodeId>> {
        if let Some(base) = self.bases.get(&id) {
            return Ok(Some(*base));
        }
        if graph.node(id)?.kind().as_hash_join().is_none() {
            return Ok(None);
        }

        let mut chain = vec![id];
        let mut current = id;
        let base = loop {
            if let Some(base) = self.bases.get(&current) {
                break *base;
            }
            let left = graph.node(current)?.inputs().first().copied();
            match left {
                Some(left) if graph.node(left)?.kind().as_hash_join().is_some() => {
                    chain.push(left);
                    current = left;
                }
                _ => break current,
            }
        };

        for join in chain {
            self.bases.insert(join, base);
        }
        Ok(Some(base))
    }

    /// Whether `id` is the base of its own chain.
    pub fn is_base(&mut self, graph: &Graph, id: NodeId) -> GraphResult<bool> {
        Ok(self.base(graph, id)? == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::TypeEnv;
    use crate::node::{HashJoinParams, Node, NodeKind};
    use crate::types::{FrameType, ValueType};

    fn join(
        graph: &mut Graph,
        env: &mut TypeEnv,
        left: NodeId,
        left_type: FrameType,
        column: &str,
    ) -> (NodeId, FrameType) {
        let params = HashJoinParams {
            join_cols: vec!["id".into()],
            right_table: format!("{column}_table"),
            left_type: left_type.clone(),
            right_type: FrameType::doubles([column]).unwrap(),
            row_gate: None,
        };
        let output = params.output_type().unwrap();
        let left_name = graph.primary_output(left).unwrap().name.clone();
        let id = graph
            .add(
                env,
                Node::builder(NodeKind::HashJoin(params))
                    .with_input(left, left_name)
                    .with_output(format!("joined_{column}"), ValueType::Frame(output.clone())),
            )
            .unwrap();
        (id, output)
    }

    #[test]
    fn chain_resolves_to_first_join() {
        let mut graph = Graph::new();
        let mut env = TypeEnv::new();
        let frame = FrameType::doubles(["id"]).unwrap();
        let df = graph
            .add(
                &mut env,
                Node::builder(NodeKind::Input).with_output("df", ValueType::Frame(frame.clone())),
            )
            .unwrap();
        let (first, first_type) = join(&mut graph, &mut env, df, frame, "a");
        let (second, second_type) = join(&mut graph, &mut env, first, first_type, "b");
        let (third, _) = join(&mut graph, &mut env, second, second_type, "c");

        let mut roots = JoinRoots::new();
        assert_eq!(roots.base(&graph, third).unwrap(), Some(first));
        assert_eq!(roots.base(&graph, second).unwrap(), Some(first));
        assert!(roots.is_base(&graph, first).unwrap());
        assert_eq!(roots.base(&graph, df).unwrap(), None);
    }
}
