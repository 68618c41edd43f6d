//! JSON input format for traces produced by the symbolic execution tool.
//!
//! The on-disk shape is a flat node list with explicit links:
//!
//! ```json
//! { "root": 0,
//!   "nodes": [
//!     { "id": 0, "kind": { "type": "call", "function": "current_time", ... }, "next": 1 },
//!     { "id": 1, "kind": { "type": "branch", "condition": { ... } },
//!       "on_true": 2, "on_false": 3 },
//!     ...
//!   ] }
//! ```
//!
//! External ids are preserved as node ids and may be sparse; ids allocated
//! after loading start above the largest one. `u32::MAX` is reserved. Path
//! constraints are derived on load, so any `constraints` present in the input
//! are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::edge::TraceEdge;
use crate::error::CoreError;
use crate::graph::TraceGraph;
use crate::id::NodeId;
use crate::node::{NodeKind, TraceNode};

/// Flat serialized form of a [`TraceGraph`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<NodeId>,
    pub nodes: Vec<SerializedNode>,
}

/// One node of a [`SerializedTrace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedNode {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_true: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_false: Option<NodeId>,
}

impl TraceGraph {
    /// Parses and validates a trace from JSON.
    pub fn from_json(json: &str) -> Result<TraceGraph, CoreError> {
        let serialized: SerializedTrace = serde_json::from_str(json)?;
        TraceGraph::from_serialized(serialized)
    }

    /// Serializes the trace to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(&self.to_serialized())?)
    }

    /// Builds a graph from its flat form, preserving ids.
    pub fn from_serialized(serialized: SerializedTrace) -> Result<TraceGraph, CoreError> {
        let invalid = |reason: String| CoreError::InvalidTrace { reason };

        let mut by_id: BTreeMap<NodeId, SerializedNode> = BTreeMap::new();
        for node in serialized.nodes {
            let id = node.id;
            if by_id.insert(id, node).is_some() {
                return Err(invalid(format!("duplicate node id {}", id)));
            }
        }

        let mut graph = TraceGraph::new();
        if by_id.is_empty() {
            return Ok(graph);
        }
        if let Some(reserved) = by_id.keys().find(|id| id.0 == u32::MAX) {
            return Err(invalid(format!("node id {} is reserved", reserved)));
        }
        for node in by_id.values() {
            graph.place(node.id, TraceNode::new(node.kind.clone()));
        }

        for node in by_id.values() {
            let links = [
                (TraceEdge::Next, node.next),
                (TraceEdge::OnTrue, node.on_true),
                (TraceEdge::OnFalse, node.on_false),
            ];
            for (edge, target) in links {
                let Some(target) = target else { continue };
                if !by_id.contains_key(&target) {
                    return Err(CoreError::NodeNotFound { id: target });
                }
                graph.link(node.id, target, edge);
            }
        }

        let root = match serialized.root {
            Some(root) if by_id.contains_key(&root) => root,
            Some(root) => return Err(CoreError::NodeNotFound { id: root }),
            None => {
                let mut roots = by_id.keys().filter(|id| graph.prev(**id).is_none());
                match (roots.next(), roots.next()) {
                    (Some(root), None) => *root,
                    _ => return Err(invalid("cannot infer a unique root".into())),
                }
            }
        };
        graph.root = Some(root);
        graph.refresh_constraints(root);
        graph.validate()?;
        Ok(graph)
    }

    /// Flattens the graph, nodes in ascending id order.
    pub fn to_serialized(&self) -> SerializedTrace {
        let nodes = self
            .node_ids()
            .into_iter()
            .map(|id| SerializedNode {
                id,
                kind: self.expect_node(id).kind.clone(),
                next: self.next(id),
                on_true: self.on_true(id),
                on_false: self.on_false(id),
            })
            .collect();
        SerializedTrace {
            root: self.root,
            nodes,
        }
    }
}
