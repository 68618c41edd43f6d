//! Stable ID newtypes for trace entities.
//!
//! Node ids are stable across clones of a [`TraceGraph`](crate::TraceGraph):
//! a clone keeps every id, so an id taken from one graph version can be
//! resolved against another. A graph never reuses the id of a removed node.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable trace node identifier. `u32::MAX` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity (memory address) of a stateful object referenced by calls,
/// such as a map, a vector or an index allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjAddr(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ObjAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
