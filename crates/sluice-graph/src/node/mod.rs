//! Node records.

mod id;
mod kind;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

pub use self::id::NodeId;
pub use self::kind::{
    BinaryOp, GlueBlock, HashJoinParams, NodeKind, StackLayout, StringTransform, TableShape,
    ThresholdPolicy, VectorizerParams,
};
use crate::types::ValueType;

/// A named, typed node output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Name the value is bound to.
    pub name: String,
    /// Type of the value.
    pub ty: ValueType,
}

impl NodeOutput {
    /// Creates a new output.
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An immutable node record.
///
/// `input_names` is parallel to the flattened outputs consumed from `inputs`:
/// a consumer of a multi-output producer lists every name it reads, so there
/// can be more names than input nodes, never fewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(
    name = "NodeBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct Node {
    /// Variant and static parameters.
    kind: NodeKind,
    /// Ordered input nodes.
    #[builder(default)]
    inputs: Vec<NodeId>,
    /// Ordered input names, flattened across multi-output producers.
    #[builder(default)]
    input_names: Vec<String>,
    /// Ordered outputs.
    #[builder(default)]
    outputs: Vec<NodeOutput>,
    /// Estimated per-row cost.
    #[builder(default)]
    cost: f64,
}

impl Node {
    /// Starts building a node of the given kind.
    pub fn builder(kind: NodeKind) -> NodeBuilder {
        NodeBuilder::default().with_kind(kind)
    }

    /// Returns a builder pre-populated with this node's fields.
    ///
    /// Overriding fields on the builder and inserting the result produces a
    /// new node; the original is left untouched.
    pub fn to_builder(&self) -> NodeBuilder {
        NodeBuilder::default()
            .with_kind(self.kind.clone())
            .with_inputs(self.inputs.clone())
            .with_input_names(self.input_names.clone())
            .with_outputs(self.outputs.clone())
            .with_cost(self.cost)
    }

    /// Variant and static parameters.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Ordered input nodes.
    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    /// Ordered input names.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Ordered outputs.
    pub fn outputs(&self) -> &[NodeOutput] {
        &self.outputs
    }

    /// The first output, if the node has any.
    pub fn output(&self) -> Option<&NodeOutput> {
        self.outputs.first()
    }

    /// Iterates over output names.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|output| output.name.as_str())
    }

    /// Estimated per-row cost.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Whether the outputs depend functionally and losslessly on the inputs,
    /// so the node can safely be re-derived.
    pub fn is_pure(&self) -> bool {
        match &self.kind {
            NodeKind::Glue(glue) => glue.pure,
            _ => true,
        }
    }
}

impl NodeBuilder {
    /// Appends an input node together with the name read from it.
    pub fn with_input(mut self, node: NodeId, name: impl Into<String>) -> Self {
        self.inputs.get_or_insert_with(Vec::new).push(node);
        self.input_names.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Appends an extra name read from the most recently added input.
    pub fn with_input_name(mut self, name: impl Into<String>) -> Self {
        self.input_names.get_or_insert_with(Vec::new).push(name.into());
        self
    }

    /// Appends an output.
    pub fn with_output(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.outputs
            .get_or_insert_with(Vec::new)
            .push(NodeOutput::new(name, ty));
        self
    }

    fn validate(&self) -> Result<(), String> {
        let inputs = self.inputs.as_ref().map_or(0, Vec::len);
        let names = self.input_names.as_ref().map_or(0, Vec::len);
        if names < inputs {
            return Err(format!("{inputs} inputs but only {names} input names"));
        }
        if let Some(cost) = self.cost
            && !(cost.is_finite() && cost >= 0.0)
        {
            return Err(format!("cost must be finite and non-negative, got {cost}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    #[test]
    fn to_builder_copies_without_aliasing() {
        let original = Node::builder(NodeKind::Identity)
            .with_input(NodeId::new(0), "x")
            .with_output("y", ValueType::doubles())
            .with_cost(2.0)
            .build()
            .unwrap();

        let copy = original
            .to_builder()
            .with_outputs(vec![NodeOutput::new("z", ValueType::doubles())])
            .build()
            .unwrap();

        assert_eq!(original.output().unwrap().name, "y");
        assert_eq!(copy.output().unwrap().name, "z");
        assert_eq!(copy.inputs(), original.inputs());
        assert_eq!(copy.cost(), 2.0);
    }

    #[test]
    fn builder_rejects_missing_input_names() {
        let result = Node::builder(NodeKind::StackDense)
            .with_inputs(vec![NodeId::new(0), NodeId::new(1)])
            .with_input_names(vec!["a".to_owned()])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_rejects_negative_cost() {
        let result = Node::builder(NodeKind::Input)
            .with_output("x", ValueType::scalar(ScalarKind::Long))
            .with_cost(-1.0)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn only_glue_can_be_impure() {
        let glue = Node::builder(NodeKind::Glue(GlueBlock::new("f(x)", false)))
            .build()
            .unwrap();
        let identity = Node::builder(NodeKind::Identity).build().unwrap();
        assert!(!glue.is_pure());
        assert!(identity.is_pure());
    }
}
