//! Structural editing primitives for the trace graph.
//!
//! Generators call these on their private clone after establishing, through
//! read-only queries, that the edit is legal. A request that would break a
//! structural invariant is a generator bug and panics. Each primitive returns
//! the id of the node that now occupies the edited position, since the
//! surrounding ids are the only handles that stay valid across edits.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;

use crate::edge::TraceEdge;
use crate::expr::Expr;
use crate::graph::TraceGraph;
use crate::id::NodeId;
use crate::node::{NodeKind, TraceNode};

/// One side of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchSide {
    OnTrue,
    OnFalse,
}

impl BranchSide {
    pub fn edge(self) -> TraceEdge {
        match self {
            BranchSide::OnTrue => TraceEdge::OnTrue,
            BranchSide::OnFalse => TraceEdge::OnFalse,
        }
    }

    pub fn opposite(self) -> BranchSide {
        match self {
            BranchSide::OnTrue => BranchSide::OnFalse,
            BranchSide::OnFalse => BranchSide::OnTrue,
        }
    }

    /// The constraint this side contributes to its descendants' paths.
    pub fn constraint(self, condition: &Expr) -> Expr {
        match self {
            BranchSide::OnTrue => condition.clone(),
            BranchSide::OnFalse => condition.negated(),
        }
    }
}

/// What [`TraceGraph::delete_branch`] removed, for callers that must keep a
/// profile in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRemoval {
    /// The kept child, now linked where the branch used to be.
    pub survivor: NodeId,
    /// The removed branch's condition.
    pub condition: Expr,
    /// Which side survived.
    pub kept: BranchSide,
    /// Path constraints of the removed branch node itself.
    pub path: Vec<Expr>,
    /// Every node deleted by the edit (the branch and its discarded side).
    pub removed: Vec<NodeId>,
}

impl TraceGraph {
    /// Inserts a chain of non-branch nodes right after the call `after`.
    ///
    /// Returns the id of the first inserted node, the new `next` of `after`.
    ///
    /// # Panics
    ///
    /// Panics if `after` is not a call, if `nodes` is empty or contains a
    /// branch, or if a terminal is inserted anywhere but at the end of a
    /// chain with no downstream.
    pub fn insert_nonbranch(&mut self, after: NodeId, nodes: Vec<NodeKind>) -> NodeId {
        assert!(!nodes.is_empty(), "insert_nonbranch with no nodes");
        assert!(
            matches!(self.expect_node(after).kind, NodeKind::Call(_)),
            "insert_nonbranch: node {} is not a call",
            after
        );
        let old_next = self.next(after);
        for (i, kind) in nodes.iter().enumerate() {
            assert!(!kind.is_branch(), "insert_nonbranch: cannot insert a branch");
            let last = i + 1 == nodes.len();
            assert!(
                !kind.is_terminal() || (last && old_next.is_none()),
                "insert_nonbranch: a terminal would cut off downstream nodes"
            );
        }

        if old_next.is_some() {
            self.unlink(after, TraceEdge::Next);
        }
        let constraints = self.expect_node(after).constraints.clone();
        let mut prev = after;
        let mut first = None;
        for kind in nodes {
            let node = TraceNode {
                kind,
                constraints: constraints.clone(),
            };
            let id = self.push_node(node);
            self.link(prev, id, TraceEdge::Next);
            first.get_or_insert(id);
            prev = id;
        }
        if let Some(next) = old_next {
            self.link(prev, next, TraceEdge::Next);
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        // `nodes` was asserted non-empty.
        first.unwrap_or(after)
    }

    /// Deletes a non-branch node and relinks its predecessor to its successor.
    ///
    /// Returns the successor that now occupies the position, or `None` when
    /// the deleted node was the last one on its path.
    ///
    /// # Panics
    ///
    /// Panics if `id` is a branch, or if the deletion would leave a branch
    /// with a missing side.
    pub fn delete_nonbranch(&mut self, id: NodeId) -> Option<NodeId> {
        assert!(
            !self.expect_node(id).kind.is_branch(),
            "delete_nonbranch: node {} is a branch",
            id
        );
        let incoming = self.incoming(id);
        let next = self.next(id);
        if let (Some((parent, edge)), None) = (incoming, next) {
            assert!(
                !edge.is_branch(),
                "delete_nonbranch: removing node {} would leave branch {} without a {:?} side",
                id,
                parent,
                edge
            );
        }

        self.remove(id);
        match (incoming, next) {
            (Some((parent, edge)), Some(next)) => {
                self.link(parent, next, edge);
            }
            (None, next) => self.root = next,
            (Some(_), None) => {}
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        next
    }

    /// Inserts a branch on `condition` right after the call `after`.
    ///
    /// The existing downstream becomes the `OnTrue` side; the `OnFalse` side
    /// receives a copy of it with fresh ids. Path constraints are rewritten on
    /// both sides. Returns the new branch's id.
    ///
    /// # Panics
    ///
    /// Panics if `after` is not a call with a successor.
    pub fn insert_branch(&mut self, after: NodeId, condition: Expr) -> NodeId {
        assert!(
            matches!(self.expect_node(after).kind, NodeKind::Call(_)),
            "insert_branch: node {} is not a call",
            after
        );
        let Some(downstream) = self.next(after) else {
            panic!("insert_branch: node {} has no downstream to branch over", after);
        };

        let copy = self.copy_subtree(downstream);
        self.unlink(after, TraceEdge::Next);
        let branch = self.push_node(TraceNode::branch(condition));
        self.link(after, branch, TraceEdge::Next);
        self.link(branch, downstream, TraceEdge::OnTrue);
        self.link(branch, copy, TraceEdge::OnFalse);
        self.refresh_constraints(branch);

        #[cfg(debug_assertions)]
        self.assert_consistency();

        branch
    }

    /// Deletes a branch, keeping one side in its place.
    ///
    /// The discarded side is removed entirely; survivors drop the removed
    /// condition (or its negation) from their constraint lists.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a branch.
    pub fn delete_branch(&mut self, id: NodeId, keep: BranchSide) -> BranchRemoval {
        let node = self.expect_node(id);
        let Some(condition) = node.kind.condition().cloned() else {
            panic!("delete_branch: node {} is not a branch", id);
        };
        let path = node.constraints.clone();
        let incoming = self.incoming(id);
        let survivor = self
            .edge_target(id, keep.edge())
            .unwrap_or_else(|| panic!("delete_branch: branch {} has no {:?} side", id, keep));
        let discarded = self
            .edge_target(id, keep.opposite().edge())
            .unwrap_or_else(|| {
                panic!("delete_branch: branch {} has no {:?} side", id, keep.opposite())
            });

        let mut removed = vec![id];
        removed.extend(self.reachable_from(discarded));
        for node in &removed {
            self.remove(*node);
        }

        match incoming {
            Some((parent, edge)) => {
                self.link(parent, survivor, edge);
            }
            None => {
                self.root = Some(survivor);
                if let Some(n) = self.node_mut(survivor) {
                    n.constraints = path.clone();
                }
            }
        }
        self.refresh_constraints(survivor);

        #[cfg(debug_assertions)]
        self.assert_consistency();

        BranchRemoval {
            survivor,
            condition,
            kept: keep,
            path,
            removed,
        }
    }

    /// Re-resolves a cached id against this (possibly edited) graph: `id`
    /// itself if the node survived, otherwise `None`. Ids of deleted nodes are
    /// never handed out again, so a stale id cannot alias a newer node.
    pub fn resolve(&self, id: NodeId) -> Option<NodeId> {
        self.contains(id).then_some(id)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn unlink(&mut self, from: NodeId, edge: TraceEdge) {
        let found = self
            .edges_at(from, Direction::Outgoing)
            .find(|(_, e, _)| *e == edge)
            .map(|(_, _, index)| index);
        if let Some(index) = found {
            self.unlink_edge(index);
        }
    }

    /// Recomputes constraint lists of every node below `from` (inclusive)
    /// from their parents.
    pub(crate) fn refresh_constraints(&mut self, from: NodeId) {
        for id in self.reachable_from(from) {
            if let Some((parent, edge)) = self.incoming(id) {
                let constraints = self.child_constraints(parent, edge);
                if let Some(node) = self.node_mut(id) {
                    node.constraints = constraints;
                }
            }
        }
    }

    /// Deep-copies the subtree rooted at `src` with fresh ids. The copy's root
    /// is left unlinked.
    fn copy_subtree(&mut self, src: NodeId) -> NodeId {
        let nodes = self.reachable_from(src);
        let mut mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();
        for old in &nodes {
            let payload = self.expect_node(*old).clone();
            let new = self.push_node(payload);
            mapping.insert(*old, new);
        }
        let members: BTreeSet<NodeId> = nodes.iter().copied().collect();
        for old in &nodes {
            for edge in [TraceEdge::Next, TraceEdge::OnTrue, TraceEdge::OnFalse] {
                if let Some(target) = self.edge_target(*old, edge) {
                    if members.contains(&target) {
                        self.link(mapping[old], mapping[&target], edge);
                    }
                }
            }
        }
        mapping[&src]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Call, Route};

    /// a -> b -> c -> drop
    fn chain() -> (TraceGraph, [NodeId; 4]) {
        let mut g = TraceGraph::new();
        let a = g.add_call(None, Call::new("a")).unwrap();
        let b = g.add_call(Some(a), Call::new("b")).unwrap();
        let c = g.add_call(Some(b), Call::new("c")).unwrap();
        let d = g.add_terminal(Some(c), Route::Drop).unwrap();
        (g, [a, b, c, d])
    }

    fn cond() -> Expr {
        Expr::eq(Expr::symbol("x", 8), Expr::constant(7, 8))
    }

    #[test]
    fn insert_then_delete_nonbranch_restores_graph() {
        let (mut g, [a, b, ..]) = chain();
        let before = g.fingerprint();
        let new = g.insert_nonbranch(a, vec![NodeKind::Call(Call::new("x"))]);
        assert_eq!(g.next(a), Some(new));
        assert_eq!(g.next(new), Some(b));
        assert_eq!(g.delete_nonbranch(new), Some(b));
        assert_eq!(g.fingerprint(), before);
    }

    #[test]
    fn delete_root_promotes_successor() {
        let (mut g, [a, b, ..]) = chain();
        assert_eq!(g.delete_nonbranch(a), Some(b));
        assert_eq!(g.root(), Some(b));
        assert_eq!(g.prev(b), None);
    }

    #[test]
    fn delete_last_call_returns_none() {
        let mut g = TraceGraph::new();
        let a = g.add_call(None, Call::new("a")).unwrap();
        let b = g.add_call(Some(a), Call::new("b")).unwrap();
        assert_eq!(g.delete_nonbranch(b), None);
        assert_eq!(g.next(a), None);
    }

    #[test]
    #[should_panic(expected = "is a branch")]
    fn delete_nonbranch_rejects_branch() {
        let (mut g, [a, ..]) = chain();
        let br = g.insert_branch(a, cond());
        g.delete_nonbranch(br);
    }

    #[test]
    #[should_panic(expected = "would cut off downstream")]
    fn terminal_cannot_cut_downstream() {
        let (mut g, [a, ..]) = chain();
        g.insert_nonbranch(a, vec![NodeKind::Terminal(Route::Drop)]);
    }

    #[test]
    fn insert_branch_clones_downstream_and_rewrites_constraints() {
        let (mut g, [a, b, c, d]) = chain();
        let br = g.insert_branch(a, cond());
        assert_eq!(g.on_true(br), Some(b));
        let copy = g.on_false(br).unwrap();
        assert!(![a, b, c, d].contains(&copy));
        assert_eq!(g.kind(copy), g.kind(b));
        assert_eq!(g.ordered_constraints(d), &[cond()]);
        let copy_tail = g.reachable_from(copy);
        assert_eq!(copy_tail.len(), 3);
        for id in copy_tail {
            assert_eq!(g.ordered_constraints(id), &[cond().negated()]);
        }
    }

    #[test]
    fn insert_then_delete_branch_restores_graph() {
        let (mut g, [a, b, ..]) = chain();
        let before = g.clone();
        let br = g.insert_branch(a, cond());
        let removal = g.delete_branch(br, BranchSide::OnTrue);
        assert_eq!(removal.survivor, b);
        assert_eq!(removal.condition, cond());
        assert_eq!(removal.removed.len(), 4);
        assert!(g.structurally_eq(&before));
    }

    #[test]
    fn delete_branch_keeping_false_side() {
        let mut g = TraceGraph::new();
        let br = g.add_branch(None, cond()).unwrap();
        let t = g.add_on_true(br, TraceNode::terminal(Route::Drop)).unwrap();
        let f = g
            .add_on_false(br, TraceNode::terminal(Route::Forward { port: 3 }))
            .unwrap();
        let removal = g.delete_branch(br, BranchSide::OnFalse);
        assert_eq!(removal.survivor, f);
        assert_eq!(g.root(), Some(f));
        assert!(!g.contains(t));
        assert!(g.ordered_constraints(f).is_empty());
        g.validate().unwrap();
    }

    #[test]
    fn nested_branch_deletion_drops_only_its_condition() {
        let outer = cond();
        let inner = Expr::symbol("flag", 1);
        let mut g = TraceGraph::new();
        let br = g.add_branch(None, outer.clone()).unwrap();
        let call = g.add_on_true(br, TraceNode::call(Call::new("a"))).unwrap();
        g.add_on_false(br, TraceNode::terminal(Route::Drop)).unwrap();
        let tail = g.add_terminal(Some(call), Route::Broadcast).unwrap();

        let inner_br = g.insert_branch(call, inner.clone());
        assert_eq!(g.ordered_constraints(tail), &[outer.clone(), inner.clone()]);

        g.delete_branch(inner_br, BranchSide::OnTrue);
        assert_eq!(g.ordered_constraints(tail), &[outer]);
        assert_eq!(g.next(call), Some(tail));
    }

    #[test]
    fn resolve_reports_deleted_ids() {
        let (mut g, [_, b, c, _]) = chain();
        g.delete_nonbranch(b);
        assert_eq!(g.resolve(b), None);
        assert_eq!(g.resolve(c), Some(c));
    }

    #[test]
    fn deleted_ids_are_not_handed_out_again() {
        let (mut g, [a, b, c, d]) = chain();
        g.delete_nonbranch(b);
        let x = g.insert_nonbranch(a, vec![NodeKind::Call(Call::new("x"))]);
        assert!(![a, b, c, d].contains(&x));
        assert_eq!(g.resolve(b), None);
        assert_eq!(g.next(x), Some(c));

        let br = g.insert_branch(x, cond());
        g.delete_branch(br, BranchSide::OnTrue);
        let y = g.insert_nonbranch(x, vec![NodeKind::Call(Call::new("y"))]);
        assert!(y > br);
        assert_eq!(g.resolve(br), None);
    }

    #[test]
    fn clones_share_the_id_counter() {
        let (mut g, [a, b, ..]) = chain();
        g.delete_nonbranch(b);
        let copy = g.clone();
        assert_eq!(copy.next_id(), g.next_id());
        let sub = g.clone_from_node(a, false);
        assert_eq!(sub.next_id(), g.next_id());
    }
}
