//! TraceGraph: the arena that owns every node of a symbolic execution trace.
//!
//! [`TraceGraph`] wraps a petgraph `StableGraph` and hands out its own
//! [`NodeId`]s from a counter that only grows, so an id is never reused after
//! its node is removed. Each arena slot records its id and the graph keeps the
//! reverse map. Cloning the graph duplicates both, which is what lets a search
//! candidate edit its private copy and still cross-reference nodes of the
//! shared baseline by id.
//!
//! # Structural invariants
//!
//! 1. The root has no incoming edge; every other node has exactly one.
//! 2. A `Branch` has exactly one `OnTrue` and one `OnFalse` successor, a
//!    `Call` at most one `Next` successor, a `Terminal` none.
//! 3. A child's constraint list is its parent's list, extended by the parent's
//!    condition (or its negation) when the parent is a branch.
//!
//! Builder methods validate their input and return [`CoreError`]; the editing
//! primitives in [`crate::edit`] assert the invariants instead.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use smallvec::SmallVec;

use crate::edge::TraceEdge;
use crate::error::CoreError;
use crate::expr::Expr;
use crate::id::NodeId;
use crate::node::{Call, NodeKind, Route, Symbol, TraceNode};
use crate::oracle::{ExprGroup, ExprOracle};

/// One arena slot: a node and the id it was handed out under.
#[derive(Debug, Clone)]
struct Slot {
    id: NodeId,
    node: TraceNode,
}

/// The trace graph arena.
#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    graph: StableGraph<Slot, TraceEdge, Directed, u32>,
    slots: BTreeMap<NodeId, NodeIndex<u32>>,
    /// Smallest id never handed out by this graph or its ancestors.
    next_id: u32,
    pub(crate) root: Option<NodeId>,
}

impl TraceGraph {
    /// Creates an empty trace graph.
    pub fn new() -> Self {
        TraceGraph::default()
    }

    // -----------------------------------------------------------------------
    // Builder methods
    // -----------------------------------------------------------------------

    /// Adds the root node. Errors if the graph already has one.
    pub fn add_root(&mut self, node: TraceNode) -> Result<NodeId, CoreError> {
        if let Some(existing) = self.root {
            return Err(CoreError::DuplicateRoot { existing });
        }
        let mut node = node;
        node.constraints.clear();
        let id = self.push_node(node);
        self.root = Some(id);
        Ok(id)
    }

    /// Appends `node` as the `Next` successor of the call `prev`.
    pub fn add_after(&mut self, prev: NodeId, node: TraceNode) -> Result<NodeId, CoreError> {
        self.attach(prev, TraceEdge::Next, node)
    }

    /// Attaches `node` to the true side of `branch`.
    pub fn add_on_true(&mut self, branch: NodeId, node: TraceNode) -> Result<NodeId, CoreError> {
        self.attach(branch, TraceEdge::OnTrue, node)
    }

    /// Attaches `node` to the false side of `branch`.
    pub fn add_on_false(&mut self, branch: NodeId, node: TraceNode) -> Result<NodeId, CoreError> {
        self.attach(branch, TraceEdge::OnFalse, node)
    }

    /// Convenience: appends a call after `prev`, or as root when `prev` is
    /// `None`.
    pub fn add_call(&mut self, prev: Option<NodeId>, call: Call) -> Result<NodeId, CoreError> {
        self.add_linear(prev, TraceNode::call(call))
    }

    /// Convenience: appends a branch after `prev`, or as root.
    pub fn add_branch(
        &mut self,
        prev: Option<NodeId>,
        condition: Expr,
    ) -> Result<NodeId, CoreError> {
        self.add_linear(prev, TraceNode::branch(condition))
    }

    /// Convenience: appends a terminal after `prev`, or as root.
    pub fn add_terminal(
        &mut self,
        prev: Option<NodeId>,
        route: Route,
    ) -> Result<NodeId, CoreError> {
        self.add_linear(prev, TraceNode::terminal(route))
    }

    fn add_linear(&mut self, prev: Option<NodeId>, node: TraceNode) -> Result<NodeId, CoreError> {
        match prev {
            Some(prev) => self.add_after(prev, node),
            None => self.add_root(node),
        }
    }

    /// Attaches a fresh node below `parent` through an edge of kind `edge`.
    ///
    /// Validates that the edge kind matches the parent's payload and that the
    /// slot is still free. The child's constraint list is derived from the
    /// parent's.
    pub fn attach(
        &mut self,
        parent: NodeId,
        edge: TraceEdge,
        node: TraceNode,
    ) -> Result<NodeId, CoreError> {
        let parent_node = self.node(parent).ok_or(CoreError::NodeNotFound { id: parent })?;
        let allowed = match parent_node.kind {
            NodeKind::Call(_) => edge == TraceEdge::Next,
            NodeKind::Branch { .. } => edge.is_branch(),
            NodeKind::Terminal(_) => false,
        };
        if !allowed {
            return Err(CoreError::InvalidTrace {
                reason: format!(
                    "cannot attach {:?} edge below {} node {}",
                    edge,
                    parent_node.kind.operation(),
                    parent
                ),
            });
        }
        if self.edge_target(parent, edge).is_some() {
            return Err(CoreError::InvalidTrace {
                reason: format!("node {} already has a {:?} successor", parent, edge),
            });
        }

        let mut node = node;
        node.constraints = self.child_constraints(parent, edge);
        let id = self.push_node(node);
        self.link(parent, id, edge);
        Ok(id)
    }

    /// Adds a node under a fresh id without linking it.
    ///
    /// # Panics
    ///
    /// Panics if the id space is exhausted.
    pub(crate) fn push_node(&mut self, node: TraceNode) -> NodeId {
        assert!(self.next_id < u32::MAX, "trace node id space exhausted");
        let id = NodeId(self.next_id);
        self.place(id, node);
        id
    }

    /// Adds a node under an explicit, unused id and moves the id counter past
    /// it. Fixes up the origin of produced symbols.
    pub(crate) fn place(&mut self, id: NodeId, mut node: TraceNode) {
        debug_assert!(!self.slots.contains_key(&id), "node id {} is taken", id);
        debug_assert!(id.0 < u32::MAX, "node id {} is reserved", id);
        if let NodeKind::Call(call) = &mut node.kind {
            for symbol in call.produced.iter_mut() {
                symbol.origin = id;
            }
        }
        let idx = self.graph.add_node(Slot { id, node });
        self.slots.insert(id, idx);
        self.next_id = self.next_id.max(id.0.saturating_add(1));
    }

    /// Removes a node and every edge touching it. Its id stays retired.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<TraceNode> {
        let idx = self.slots.remove(&id)?;
        self.graph.remove_node(idx).map(|slot| slot.node)
    }

    /// Links two existing nodes.
    ///
    /// # Panics
    ///
    /// Panics if either end is not in this graph.
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId, edge: TraceEdge) {
        let (Some(&a), Some(&b)) = (self.slots.get(&from), self.slots.get(&to)) else {
            panic!("cannot link {} -> {}: node missing", from, to);
        };
        self.graph.add_edge(a, b, edge);
    }

    pub(crate) fn unlink_edge(&mut self, index: EdgeIndex<u32>) {
        self.graph.remove_edge(index);
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut TraceNode> {
        let idx = *self.slots.get(&id)?;
        self.graph.node_weight_mut(idx).map(|slot| &mut slot.node)
    }

    /// Edges of `id` in `direction` as (other end, kind, edge index). Empty
    /// for unknown ids.
    pub(crate) fn edges_at(
        &self,
        id: NodeId,
        direction: Direction,
    ) -> impl Iterator<Item = (NodeId, TraceEdge, EdgeIndex<u32>)> + '_ {
        self.slots.get(&id).into_iter().flat_map(move |&idx| {
            self.graph.edges_directed(idx, direction).map(move |e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (self.graph[other].id, *e.weight(), e.id())
            })
        })
    }

    /// The id the next inserted node will receive.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next_id)
    }

    /// The constraint list a node attached below `parent` via `edge` carries.
    pub(crate) fn child_constraints(&self, parent: NodeId, edge: TraceEdge) -> Vec<Expr> {
        let parent_node = self.expect_node(parent);
        let mut constraints = parent_node.constraints.clone();
        if let Some(condition) = parent_node.kind.condition() {
            match edge {
                TraceEdge::OnTrue => constraints.push(condition.clone()),
                TraceEdge::OnFalse => constraints.push(condition.negated()),
                TraceEdge::Next => {}
            }
        }
        constraints
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// The root node, if the graph is not empty.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&TraceNode> {
        let idx = *self.slots.get(&id)?;
        self.graph.node_weight(idx).map(|slot| &slot.node)
    }

    /// Returns `true` if the arena holds a node with this id.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Looks up a node that must exist.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in this graph.
    pub fn expect_node(&self, id: NodeId) -> &TraceNode {
        match self.node(id) {
            Some(node) => node,
            None => panic!("trace node {} does not exist in this graph", id),
        }
    }

    /// The payload of a node.
    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.slots.keys().copied().collect()
    }

    /// The successor of `id` along an edge of the given kind.
    pub fn edge_target(&self, id: NodeId, edge: TraceEdge) -> Option<NodeId> {
        self.edges_at(id, Direction::Outgoing)
            .find(|(_, e, _)| *e == edge)
            .map(|(target, _, _)| target)
    }

    /// The sequential successor of a non-branch node.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.edge_target(id, TraceEdge::Next)
    }

    pub fn on_true(&self, id: NodeId) -> Option<NodeId> {
        self.edge_target(id, TraceEdge::OnTrue)
    }

    pub fn on_false(&self, id: NodeId) -> Option<NodeId> {
        self.edge_target(id, TraceEdge::OnFalse)
    }

    /// The unique predecessor of `id` and the kind of edge linking them.
    pub fn incoming(&self, id: NodeId) -> Option<(NodeId, TraceEdge)> {
        self.edges_at(id, Direction::Incoming)
            .next()
            .map(|(source, edge, _)| (source, edge))
    }

    /// The unique predecessor of `id`.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.incoming(id).map(|(p, _)| p)
    }

    /// Successors in a stable order: `Next`, or `OnTrue` then `OnFalse`.
    pub fn successors(&self, id: NodeId) -> SmallVec<[NodeId; 2]> {
        let mut out = SmallVec::new();
        for edge in [TraceEdge::Next, TraceEdge::OnTrue, TraceEdge::OnFalse] {
            if let Some(target) = self.edge_target(id, edge) {
                out.push(target);
            }
        }
        out
    }

    /// Every node reachable from `id` (inclusive), in pre-order with the true
    /// side visited before the false side.
    pub fn reachable_from(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(id) {
            return out;
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            let succ = self.successors(current);
            for s in succ.into_iter().rev() {
                stack.push(s);
            }
        }
        out
    }

    /// The ordered branch constraints on the root-to-node path.
    ///
    /// Profiler lookups must always use this list (never a re-ordered
    /// conjunction) so that identical paths map to identical keys.
    pub fn ordered_constraints(&self, id: NodeId) -> &[Expr] {
        &self.expect_node(id).constraints
    }

    // -----------------------------------------------------------------------
    // Symbols
    // -----------------------------------------------------------------------

    /// Symbols produced at `id` (empty for non-call nodes).
    pub fn symbols_at(&self, id: NodeId) -> &[Symbol] {
        match self.kind(id) {
            Some(NodeKind::Call(call)) => call.produced.as_slice(),
            _ => &[],
        }
    }

    /// Finds the closest symbol with the given base name produced at `from`
    /// or any of its ancestors.
    pub fn find_symbol(&self, from: NodeId, base: &str) -> Option<&Symbol> {
        let mut current = Some(from);
        while let Some(id) = current {
            if let Some(symbol) = self.symbols_at(id).iter().find(|s| s.base == base) {
                return Some(symbol);
            }
            current = self.prev(id);
        }
        None
    }

    /// Finds a symbol that a generator requires to exist.
    ///
    /// # Panics
    ///
    /// Panics if no ancestor of `from` produced `base`.
    pub fn expect_symbol(&self, from: NodeId, base: &str) -> &Symbol {
        match self.find_symbol(from, base) {
            Some(symbol) => symbol,
            None => panic!("symbol '{}' was never produced upstream of node {}", base, from),
        }
    }

    // -----------------------------------------------------------------------
    // Bounded searches
    // -----------------------------------------------------------------------

    /// Call nodes downstream of `from` (exclusive) whose function is one of
    /// `names`, in pre-order. Exploration stops at nodes in `bounded_by`.
    pub fn future_functions(
        &self,
        from: NodeId,
        names: &[&str],
        bounded_by: Option<&BTreeSet<NodeId>>,
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.successors(from).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if bounded_by.is_some_and(|b| b.contains(&current)) {
                continue;
            }
            if self.is_call_to(current, names) {
                out.push(current);
            }
            for s in self.successors(current).into_iter().rev() {
                stack.push(s);
            }
        }
        out
    }

    /// Call nodes upstream of `from` (exclusive) whose function is one of
    /// `names`, nearest first. The walk stops at nodes in `bounded_by`.
    pub fn prev_functions(
        &self,
        from: NodeId,
        names: &[&str],
        bounded_by: Option<&BTreeSet<NodeId>>,
    ) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.prev(from);
        while let Some(id) = current {
            if bounded_by.is_some_and(|b| b.contains(&id)) {
                break;
            }
            if self.is_call_to(id, names) {
                out.push(id);
            }
            current = self.prev(id);
        }
        out
    }

    fn is_call_to(&self, id: NodeId, names: &[&str]) -> bool {
        self.kind(id)
            .and_then(NodeKind::as_call)
            .is_some_and(|call| names.contains(&call.function.as_str()))
    }

    /// Decomposes a composite value into symbol-aligned groups.
    pub fn expr_groups(&self, oracle: &dyn ExprOracle, expr: &Expr) -> Vec<ExprGroup> {
        oracle.groups(expr)
    }

    // -----------------------------------------------------------------------
    // Cloning
    // -----------------------------------------------------------------------

    /// Copies `node` (and its whole downstream subgraph when `recursive`) into
    /// an independent arena rooted at `node`. Ids, constraint lists and the id
    /// counter are preserved.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not in this graph.
    pub fn clone_from_node(&self, node: NodeId, recursive: bool) -> TraceGraph {
        self.expect_node(node);
        let keep: BTreeSet<NodeId> = if recursive {
            self.reachable_from(node).into_iter().collect()
        } else {
            BTreeSet::from([node])
        };
        let mut copy = self.clone();
        for id in self.node_ids() {
            if !keep.contains(&id) {
                copy.remove(id);
            }
        }
        copy.root = Some(node);
        copy
    }

    // -----------------------------------------------------------------------
    // Structural comparison
    // -----------------------------------------------------------------------

    /// Returns `true` if both graphs have the same root, node ids, payloads,
    /// constraint lists and links.
    pub fn structurally_eq(&self, other: &TraceGraph) -> bool {
        if self.root != other.root || self.node_ids() != other.node_ids() {
            return false;
        }
        self.node_ids().into_iter().all(|id| {
            self.node(id) == other.node(id)
                && [TraceEdge::Next, TraceEdge::OnTrue, TraceEdge::OnFalse]
                    .iter()
                    .all(|e| self.edge_target(id, *e) == other.edge_target(id, *e))
        })
    }

    /// A content hash over root, ids, payloads, constraints and links.
    /// Two structurally equal graphs have the same fingerprint.
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        match self.root {
            Some(root) => hasher.update(&root.0.to_le_bytes()),
            None => hasher.update(b"empty"),
        };
        for id in self.node_ids() {
            let node = self.expect_node(id);
            hasher.update(&id.0.to_le_bytes());
            // Serialization of plain data enums cannot fail.
            let payload = serde_json::to_vec(node).unwrap_or_default();
            hasher.update(&payload);
            for edge in [TraceEdge::Next, TraceEdge::OnTrue, TraceEdge::OnFalse] {
                let target = self.edge_target(id, edge).map_or(u32::MAX, |t| t.0);
                hasher.update(&target.to_le_bytes());
            }
        }
        hasher.finalize()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Checks every structural invariant, reporting the first violation.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: String| Err(CoreError::InvalidTrace { reason });

        let Some(root) = self.root else {
            if self.is_empty() {
                return Ok(());
            }
            return invalid("non-empty graph without a root".into());
        };
        if !self.contains(root) {
            return Err(CoreError::NodeNotFound { id: root });
        }

        for id in self.node_ids() {
            let incoming = self.edges_at(id, Direction::Incoming).count();
            let expected_incoming = usize::from(id != root);
            if incoming != expected_incoming {
                return invalid(format!(
                    "node {} has {} predecessors, expected {}",
                    id, incoming, expected_incoming
                ));
            }

            let outgoing: Vec<TraceEdge> = self
                .edges_at(id, Direction::Outgoing)
                .map(|(_, edge, _)| edge)
                .collect();
            let node = self.expect_node(id);
            let shape_ok = match node.kind {
                NodeKind::Call(_) => {
                    outgoing.iter().all(|e| *e == TraceEdge::Next) && outgoing.len() <= 1
                }
                NodeKind::Branch { .. } => {
                    outgoing.len() == 2
                        && outgoing.contains(&TraceEdge::OnTrue)
                        && outgoing.contains(&TraceEdge::OnFalse)
                }
                NodeKind::Terminal(_) => outgoing.is_empty(),
            };
            if !shape_ok {
                return invalid(format!(
                    "{} node {} has successors {:?}",
                    node.kind.operation(),
                    id,
                    outgoing
                ));
            }

            if let Some((parent, edge)) = self.incoming(id) {
                if node.constraints != self.child_constraints(parent, edge) {
                    return invalid(format!("node {} has stale path constraints", id));
                }
            }
        }

        let reachable = self.reachable_from(root).len();
        if reachable != self.node_count() {
            return invalid(format!(
                "{} of {} nodes are unreachable from root {}",
                self.node_count() - reachable,
                self.node_count(),
                root
            ));
        }
        Ok(())
    }

    /// Panicking form of [`validate`](Self::validate), run after every edit in
    /// debug builds.
    #[cfg(debug_assertions)]
    pub(crate) fn assert_consistency(&self) {
        if let Err(e) = self.validate() {
            panic!("trace graph invariant violated: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::CallArg;

    /// root: borrow -> branch(c) -> { map_get -> forward(1), drop }
    fn sample() -> (TraceGraph, [NodeId; 5]) {
        let mut g = TraceGraph::new();
        let borrow = g
            .add_call(
                None,
                Call::new("packet_borrow_next_chunk")
                    .producing("packet_chunks", Expr::symbol("pkt", 112)),
            )
            .unwrap();
        let cond = Expr::eq(Expr::symbol("pkt", 112), Expr::constant(0, 112));
        let branch = g.add_branch(Some(borrow), cond).unwrap();
        let get = g
            .add_on_true(
                branch,
                TraceNode::call(
                    Call::new("map_get").arg("map", CallArg::value(Expr::constant(0x10, 64))),
                ),
            )
            .unwrap();
        let fwd = g
            .add_terminal(Some(get), Route::Forward { port: 1 })
            .unwrap();
        let drop = g
            .add_on_false(branch, TraceNode::terminal(Route::Drop))
            .unwrap();
        (g, [borrow, branch, get, fwd, drop])
    }

    #[test]
    fn builder_links_and_constraints() {
        let (g, [borrow, branch, get, fwd, drop]) = sample();
        assert_eq!(g.root(), Some(borrow));
        assert_eq!(g.next(borrow), Some(branch));
        assert_eq!(g.on_true(branch), Some(get));
        assert_eq!(g.on_false(branch), Some(drop));
        assert_eq!(g.prev(fwd), Some(get));
        assert_eq!(g.ordered_constraints(borrow).len(), 0);
        assert_eq!(g.ordered_constraints(fwd).len(), 1);
        let c = g.kind(branch).unwrap().condition().unwrap().clone();
        assert_eq!(g.ordered_constraints(drop), &[c.negated()]);
        g.validate().unwrap();
    }

    #[test]
    fn symbols_get_their_origin() {
        let (g, [borrow, _, get, _, _]) = sample();
        let sym = g.find_symbol(get, "packet_chunks").unwrap();
        assert_eq!(sym.origin, borrow);
        assert!(g.find_symbol(borrow, "map_has_this_key").is_none());
    }

    #[test]
    #[should_panic(expected = "never produced")]
    fn expect_symbol_panics_on_missing() {
        let (g, [_, _, get, _, _]) = sample();
        g.expect_symbol(get, "vector_data");
    }

    #[test]
    fn attach_rejects_wrong_edges() {
        let (mut g, [borrow, branch, _, fwd, _]) = sample();
        assert!(matches!(
            g.add_after(fwd, TraceNode::terminal(Route::Drop)),
            Err(CoreError::InvalidTrace { .. })
        ));
        assert!(g.add_after(branch, TraceNode::terminal(Route::Drop)).is_err());
        assert!(g.add_after(borrow, TraceNode::terminal(Route::Drop)).is_err());
        assert!(matches!(
            g.add_root(TraceNode::terminal(Route::Drop)),
            Err(CoreError::DuplicateRoot { .. })
        ));
    }

    #[test]
    fn future_and_prev_functions() {
        let (g, [borrow, branch, get, _, _]) = sample();
        assert_eq!(g.future_functions(borrow, &["map_get"], None), vec![get]);
        let bound = BTreeSet::from([get]);
        assert!(g.future_functions(borrow, &["map_get"], Some(&bound)).is_empty());
        assert_eq!(
            g.prev_functions(get, &["packet_borrow_next_chunk"], None),
            vec![borrow]
        );
        let bound = BTreeSet::from([branch]);
        assert!(g
            .prev_functions(get, &["packet_borrow_next_chunk"], Some(&bound))
            .is_empty());
    }

    #[test]
    fn clone_from_node_preserves_ids() {
        let (g, [_, branch, get, fwd, drop]) = sample();
        let sub = g.clone_from_node(branch, true);
        assert_eq!(sub.root(), Some(branch));
        assert_eq!(sub.node_ids(), vec![branch, get, fwd, drop]);
        sub.validate().unwrap();

        let single = g.clone_from_node(get, false);
        assert_eq!(single.node_ids(), vec![get]);
        assert_eq!(single.next(get), None);
        assert_eq!(single.ordered_constraints(get), g.ordered_constraints(get));
    }

    #[test]
    fn fingerprint_tracks_structure() {
        let (g, _) = sample();
        let (h, _) = sample();
        assert!(g.structurally_eq(&h));
        assert_eq!(g.fingerprint(), h.fingerprint());

        let sub = g.clone_from_node(g.root().unwrap(), false);
        assert!(!g.structurally_eq(&sub));
        assert_ne!(g.fingerprint(), sub.fingerprint());
    }

    #[test]
    fn reachable_visits_true_side_first() {
        let (g, [borrow, branch, get, fwd, drop]) = sample();
        assert_eq!(g.reachable_from(borrow), vec![borrow, branch, get, fwd, drop]);
    }
}
