//! Code generation contract.
//!
//! Lowering a plan to executable code is the job of an external backend.
//! This module only fixes the contract every plan, rewritten or not, must
//! satisfy, plus a textual backend used to inspect and compare plans.

use std::fmt::Write as _;

use crate::env::TypeEnv;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};

/// Output of a backend compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    /// Program text in the backend's language.
    pub program: String,
    /// Names bound by program inputs, in plan order.
    pub input_names: Vec<String>,
    /// Names returned by the program, in plan order.
    pub output_names: Vec<String>,
}

/// Lowers an ordered plan over a graph to a program.
pub trait Backend {
    /// Compilation error.
    type Error;

    /// Compiles `plan`, a topologically ordered list of nodes of `graph`.
    fn compile(
        &self,
        graph: &Graph,
        plan: &[NodeId],
        env: &TypeEnv,
    ) -> Result<CompiledProgram, Self::Error>;
}

/// Renders a plan as one line per node.
///
/// Two plans render identically exactly when they bind the same names, in the
/// same order, with the same kinds, inputs and types.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanPrinter;

impl Backend for PlanPrinter {
    type Error = GraphError;

    fn compile(
        &self,
        graph: &Graph,
        plan: &[NodeId],
        _env: &TypeEnv,
    ) -> GraphResult<CompiledProgram> {
        let mut program = String::new();
        let mut input_names = Vec::new();
        let mut output_names = Vec::new();

        for &id in plan {
            let node = graph.node(id)?;
            match node.kind() {
                NodeKind::Input => input_names.extend(node.output_names().map(str::to_owned)),
                NodeKind::Output => output_names.extend(node.input_names().iter().cloned()),
                _ => {}
            }

            let outputs: Vec<_> = node
                .outputs()
                .iter()
                .map(|output| format!("{}: {}", output.name, output.ty))
                .collect();
            let _ = writeln!(
                program,
                "{} = {}({})",
                outputs.join(", "),
                node.kind().name(),
                node.input_names().join(", "),
            );
        }

        Ok(CompiledProgram {
            program,
            input_names,
            output_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::types::ValueType;

    #[test]
    fn printer_lists_bindings_in_plan_order() {
        let mut graph = Graph::new();
        let mut env = TypeEnv::new();
        let x = graph
            .add(&mut env, Node::builder(NodeKind::Input).with_output("x", ValueType::doubles()))
            .unwrap();
        let y = graph
            .add(
                &mut env,
                Node::builder(NodeKind::Identity)
                    .with_input(x, "x")
                    .with_output("y", ValueType::doubles()),
            )
            .unwrap();
        let out = graph
            .add(&mut env, Node::builder(NodeKind::Output).with_input(y, "y"))
            .unwrap();

        let compiled = PlanPrinter.compile(&graph, &[x, y, out], &env).unwrap();
        assert_eq!(compiled.input_names, ["x"]);
        assert_eq!(compiled.output_names, ["y"]);
        assert_eq!(
            compiled.program,
            "x: vec[double] = input()\ny: vec[double] = identity(x)\n = output(y)\n"
        );
    }
}
