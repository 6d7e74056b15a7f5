//! Node identifiers for the stream-IR arena.
//!
//! [`NodeId`] is an arena index (see [`crate::graph`]), not the structural hash described
//! in spec §3.3 — that hash is carried separately as `StreamNode::struct_id` so arena-index
//! identity and structural-equality identity aren't conflated.

use std::fmt;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Index of a node in the stream-IR arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<NodeIndex<u32>> for NodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        NodeId(idx.index() as u32)
    }
}

impl From<NodeId> for NodeIndex<u32> {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

/// Monotonic source of ids not tied to structure: `Eps` nodes and fresh `TypeVar`s each
/// get one of these rather than a hash of their (nonexistent) children.
#[derive(Debug, Default)]
pub struct FreshIdSource {
    next: u64,
}

impl FreshIdSource {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}
