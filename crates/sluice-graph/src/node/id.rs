//! Node handle type.

use derive_more::{Debug, Display, From, Into};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Stable handle of a node inside a [`Graph`](crate::Graph).
///
/// Nodes are identified by handle, never by structural equality: two nodes
/// with identical fields are still distinct nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("n{}", _0.index())]
#[display("n{}", _0.index())]
#[serde(transparent)]
pub struct NodeId(NodeIndex);

impl NodeId {
    /// Creates a handle from a raw arena index.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(NodeIndex::new(index))
    }

    /// Returns the raw arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0.index()
    }

    /// Returns the underlying petgraph index.
    #[inline]
    pub(crate) fn as_index(self) -> NodeIndex {
        self.0
    }
}
