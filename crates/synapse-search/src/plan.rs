//! Execution plans.
//!
//! An [`ExecutionPlan`] is a partial or complete lowering of a trace: a tree
//! of [`Module`]s plus a list of open [`EpLeaf`]s, each naming the next trace
//! node to lower and the target it runs on. The first leaf is the active one;
//! new leaves are pushed to the front so leaves are consumed depth-first in
//! trace order.
//!
//! A plan shares its [`TraceGraph`] with its ancestors until a generator
//! edits it: [`ExecutionPlan::graph_mut`] clones the graph on first write.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use synapse_core::{NodeId, TraceGraph};

use crate::config::CostWeights;
use crate::ledger::Ledger;
use crate::module::Module;
use crate::target::TargetType;

/// Identifier of a plan within one search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpId(pub u64);

impl fmt::Display for EpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Index of a module node inside one plan's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpNodeId(pub u32);

/// Lifecycle of a plan as seen by the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpState {
    /// Waiting in the frontier.
    Open,
    /// Popped and being expanded by generators.
    Extending,
    /// No open leaves remain.
    Complete,
    /// No generator could extend the active leaf.
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpNode {
    pub id: EpNodeId,
    pub module: Module,
    pub parent: Option<EpNodeId>,
    pub children: Vec<EpNodeId>,
}

/// An open end of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpLeaf {
    /// The module the continuation hangs from; `None` before the first module.
    pub at: Option<EpNodeId>,
    /// The next trace node to lower.
    pub next: NodeId,
    pub target: TargetType,
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    id: EpId,
    parent: Option<EpId>,
    depth: usize,
    graph: Arc<TraceGraph>,
    nodes: Vec<EpNode>,
    root: Option<EpNodeId>,
    leaves: Vec<EpLeaf>,
    skip: BTreeSet<NodeId>,
    processed: BTreeSet<NodeId>,
    ledger: Ledger,
}

impl ExecutionPlan {
    /// An empty plan with a single leaf at the trace root.
    pub fn new(graph: Arc<TraceGraph>, target: TargetType, ledger: Ledger) -> Self {
        let leaves = graph
            .root()
            .map(|next| EpLeaf { at: None, next, target })
            .into_iter()
            .collect();
        ExecutionPlan {
            id: EpId(0),
            parent: None,
            depth: 0,
            graph,
            nodes: Vec::new(),
            root: None,
            leaves,
            skip: BTreeSet::new(),
            processed: BTreeSet::new(),
            ledger,
        }
    }

    /// A child copy of this plan. The search assigns the child its own id
    /// when it enters the frontier.
    pub fn derive(&self) -> ExecutionPlan {
        let mut child = self.clone();
        child.parent = Some(self.id);
        child.depth = self.depth + 1;
        child
    }

    pub(crate) fn set_id(&mut self, id: EpId) {
        self.id = id;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> EpId {
        self.id
    }

    pub fn parent(&self) -> Option<EpId> {
        self.parent
    }

    /// Number of commits between this plan and the initial one.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn graph(&self) -> &TraceGraph {
        &self.graph
    }

    /// The shared graph handle.
    pub fn graph_arc(&self) -> &Arc<TraceGraph> {
        &self.graph
    }

    /// Mutable access to this plan's trace, cloning it first if any other
    /// plan still shares it.
    pub fn graph_mut(&mut self) -> &mut TraceGraph {
        Arc::make_mut(&mut self.graph)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub fn root(&self) -> Option<EpNodeId> {
        self.root
    }

    pub fn node(&self, id: EpNodeId) -> Option<&EpNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[EpNode] {
        &self.nodes
    }

    /// Modules in placement order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.nodes.iter().map(|n| &n.module)
    }

    pub fn leaves(&self) -> &[EpLeaf] {
        &self.leaves
    }

    pub fn active_leaf(&self) -> Option<&EpLeaf> {
        self.leaves.first()
    }

    pub fn is_complete(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn state(&self) -> EpState {
        if self.is_complete() {
            EpState::Complete
        } else {
            EpState::Open
        }
    }

    pub fn skip(&self) -> &BTreeSet<NodeId> {
        &self.skip
    }

    /// Returns `true` once a module has been emitted for `node` or the node
    /// was skipped.
    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.contains(&node)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn cost(&self, weights: &CostWeights) -> f64 {
        self.ledger.cost(weights)
    }

    /// Fraction of all traffic reaching `node` under this plan's profile.
    pub fn hit_rate(&self, node: NodeId) -> f64 {
        self.ledger
            .profiler()
            .fraction_at(self.graph.ordered_constraints(node))
    }

    // -----------------------------------------------------------------------
    // Leaf processing
    // -----------------------------------------------------------------------

    fn take_active(&mut self, module: &Module) -> EpLeaf {
        if self.leaves.is_empty() {
            panic!("plan {} has no open leaf for {}", self.id, module);
        }
        let leaf = self.leaves.remove(0);
        assert_eq!(
            module.target(),
            leaf.target,
            "module {} placed on a {} leaf",
            module,
            leaf.target
        );
        leaf
    }

    fn attach(&mut self, parent: Option<EpNodeId>, module: Module) -> EpNodeId {
        let id = EpNodeId(self.nodes.len() as u32);
        match parent {
            Some(p) => self.nodes[p.0 as usize].children.push(id),
            None => {
                assert!(self.root.is_none(), "plan {} already has a root module", self.id);
                self.root = Some(id);
            }
        }
        self.nodes.push(EpNode {
            id,
            module,
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Emits `module` on the active leaf and continues at `next` on the same
    /// target, or closes the leaf when `next` is `None`.
    ///
    /// # Panics
    ///
    /// Panics if there is no open leaf or the module targets a different
    /// platform than the leaf.
    pub fn process_leaf(&mut self, module: Module, next: Option<NodeId>) -> EpNodeId {
        let leaf = self.take_active(&module);
        let node = module.node();
        let id = self.attach(leaf.at, module);
        self.processed.insert(node);
        if let Some(next) = next {
            self.leaves.insert(
                0,
                EpLeaf {
                    at: Some(id),
                    next,
                    target: leaf.target,
                },
            );
        }
        id
    }

    /// Emits an `If` with its `Then`/`Else` children on the active leaf and
    /// opens one leaf per side, true side first.
    pub fn process_branch(
        &mut self,
        if_module: Module,
        then_module: Module,
        else_module: Module,
        on_true: NodeId,
        on_false: NodeId,
    ) -> [EpNodeId; 3] {
        let leaf = self.take_active(&if_module);
        assert!(
            then_module.target() == leaf.target && else_module.target() == leaf.target,
            "branch arms must stay on {}",
            leaf.target
        );
        let node = if_module.node();
        let cond = self.attach(leaf.at, if_module);
        let then = self.attach(Some(cond), then_module);
        let otherwise = self.attach(Some(cond), else_module);
        self.processed.insert(node);
        let target = leaf.target;
        self.leaves.insert(
            0,
            EpLeaf {
                at: Some(then),
                next: on_true,
                target,
            },
        );
        self.leaves.insert(
            1,
            EpLeaf {
                at: Some(otherwise),
                next: on_false,
                target,
            },
        );
        [cond, then, otherwise]
    }

    /// Emits a cross-target module on the active leaf. The continuation keeps
    /// the leaf's next node and runs on the module's destination target.
    ///
    /// # Panics
    ///
    /// Panics if `module` does not cross targets.
    pub fn transfer(&mut self, module: Module) -> EpNodeId {
        let Some(to) = module.crosses_to() else {
            panic!("{} is not a cross-target module", module);
        };
        let leaf = self.take_active(&module);
        let id = self.attach(leaf.at, module);
        self.leaves.insert(
            0,
            EpLeaf {
                at: Some(id),
                next: leaf.next,
                target: to,
            },
        );
        id
    }

    /// Emits a module that ends its leaf.
    pub fn close_leaf(&mut self, module: Module) -> EpNodeId {
        self.process_leaf(module, None)
    }

    /// Makes the leaf at `index` the active one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn activate(&mut self, index: usize) {
        let leaf = self.leaves.remove(index);
        self.leaves.insert(0, leaf);
    }

    /// Marks trace nodes as already accounted for by an emitted module.
    pub fn add_skip(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        self.skip.extend(nodes);
    }

    /// Advances every leaf past skipped nodes, closing leaves that run off
    /// the end of the trace. A skipped terminal is not passed over: the leaf
    /// stays open on it so its route still receives the traffic.
    ///
    /// # Panics
    ///
    /// Panics if a branch was marked as skipped.
    pub fn resolve_leaves(&mut self) {
        let leaves = std::mem::take(&mut self.leaves);
        for mut leaf in leaves {
            let mut open = true;
            while self.skip.contains(&leaf.next) {
                let kind = self.graph.kind(leaf.next);
                assert!(
                    !kind.is_some_and(|k| k.is_branch()),
                    "branch node {} cannot be skipped",
                    leaf.next
                );
                if kind.is_some_and(|k| k.is_terminal()) {
                    break;
                }
                self.processed.insert(leaf.next);
                match self.graph.next(leaf.next) {
                    Some(next) => leaf.next = next,
                    None => {
                        open = false;
                        break;
                    }
                }
            }
            if open {
                self.leaves.push(leaf);
            }
        }
    }

    /// Points leaves waiting on `old` at `replacement` after an edit removed
    /// `old` from this plan's trace. Leaves are closed when there is no
    /// replacement.
    pub fn retarget_leaves(&mut self, old: NodeId, replacement: Option<NodeId>) {
        match replacement {
            Some(new) => self
                .leaves
                .iter_mut()
                .filter(|l| l.next == old)
                .for_each(|l| l.next = new),
            None => self.leaves.retain(|l| l.next != old),
        }
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Indented text rendering of the module tree and the open leaves.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.render_node(root, 0, &mut out);
        }
        for leaf in &self.leaves {
            out.push_str(&format!("(open) {} -> node {}\n", leaf.target, leaf.next));
        }
        out
    }

    fn render_node(&self, id: EpNodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0 as usize];
        out.push_str(&format!("{}{}\n", "  ".repeat(depth), node.module));
        for child in &node.children {
            self.render_node(*child, depth + 1, out);
        }
    }
}
