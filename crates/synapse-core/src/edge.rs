//! Link kinds of the trace graph.
//!
//! Every non-root node has exactly one incoming edge. `Call` nodes have at
//! most one outgoing [`TraceEdge::Next`]; `Branch` nodes have exactly one
//! [`TraceEdge::OnTrue`] and one [`TraceEdge::OnFalse`]; `Terminal` nodes
//! have none.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEdge {
    /// Sequential successor of a non-branch node.
    Next,
    /// Successor taken when the branch condition holds.
    OnTrue,
    /// Successor taken when the branch condition does not hold.
    OnFalse,
}

impl TraceEdge {
    /// Returns `true` for the two branch edges.
    pub fn is_branch(&self) -> bool {
        matches!(self, TraceEdge::OnTrue | TraceEdge::OnFalse)
    }
}
