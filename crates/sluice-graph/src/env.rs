//! Name to type environment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::types::ValueType;

/// Maps every value name in a program to its [`ValueType`].
///
/// The environment is threaded explicitly through every graph edit.
/// [`Graph::insert`](crate::Graph::insert) registers the outputs of each new
/// node in the same call that appends it, so the environment never lags
/// behind the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeEnv {
    types: BTreeMap<String, ValueType>,
}

impl TypeEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` with type `ty`, returning the previous type if any.
    pub fn insert(&mut self, name: impl Into<String>, ty: ValueType) -> Option<ValueType> {
        self.types.insert(name.into(), ty)
    }

    /// Returns the type of `name`.
    pub fn get(&self, name: &str) -> Option<&ValueType> {
        self.types.get(name)
    }

    /// Returns the type of `name`, failing if it is not registered.
    pub fn require(&self, name: &str) -> GraphResult<&ValueType> {
        self.get(name)
            .ok_or_else(|| GraphError::MissingType(name.to_owned()))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterates over all registered names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), ty))
    }
}
