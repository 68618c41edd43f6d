//! Path-keyed traffic model.
//!
//! The profile is a binary tree mirroring the branches of a trace. Each node
//! holds the absolute fraction of all traffic that reaches it; a node with a
//! split divides its mass between the traffic satisfying the split condition
//! and the traffic that does not. A path is the ordered constraint list of a
//! trace node, so lookups match conditions structurally: a constraint equal
//! to the split condition selects the true side, its negation the false side.
//!
//! Every mutation keeps ancestor fractions equal to the sum of their
//! children.

use serde::{Deserialize, Serialize};
use synapse_core::{BranchSide, Expr, NodeId, NodeKind, TraceGraph};

/// Flow-level statistics keyed by the expression identifying a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub key: Expr,
    pub total_packets: u64,
    pub total_flows: u64,
    /// Packet counts of the most frequent flows, in descending order.
    #[serde(default)]
    pub top_k: Vec<u64>,
}

impl FlowStats {
    pub fn avg_packets_per_flow(&self) -> f64 {
        if self.total_flows == 0 {
            0.0
        } else {
            self.total_packets as f64 / self.total_flows as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    pub fraction: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<FlowStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Box<ProfileSplit>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSplit {
    pub condition: Expr,
    pub on_true: ProfileNode,
    pub on_false: ProfileNode,
}

impl ProfileNode {
    pub fn leaf(fraction: f64) -> Self {
        ProfileNode {
            fraction,
            flows: Vec::new(),
            split: None,
        }
    }

    fn child(&self, constraint: &Expr) -> Option<&ProfileNode> {
        let split = self.split.as_ref()?;
        if *constraint == split.condition {
            Some(&split.on_true)
        } else if *constraint == split.condition.negated() {
            Some(&split.on_false)
        } else {
            None
        }
    }

    fn child_mut(&mut self, constraint: &Expr) -> Option<&mut ProfileNode> {
        let split = self.split.as_mut()?;
        if *constraint == split.condition {
            Some(&mut split.on_true)
        } else if *constraint == split.condition.negated() {
            Some(&mut split.on_false)
        } else {
            None
        }
    }

    fn scale(&mut self, factor: f64) {
        self.fraction *= factor;
        if let Some(split) = self.split.as_mut() {
            split.on_true.scale(factor);
            split.on_false.scale(factor);
        }
    }

    /// Sets the node's mass, rescaling the subtree proportionally. A
    /// massless subtree is split evenly.
    fn assign(&mut self, fraction: f64) {
        if self.fraction > 0.0 {
            self.scale(fraction / self.fraction);
            return;
        }
        self.fraction = fraction;
        if let Some(split) = self.split.as_mut() {
            split.on_true.assign(fraction / 2.0);
            split.on_false.assign(fraction / 2.0);
        }
    }
}

/// The traffic profile carried by every plan's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profiler {
    root: ProfileNode,
}

impl Default for Profiler {
    fn default() -> Self {
        Profiler::new()
    }
}

impl Profiler {
    /// A profile where all traffic reaches the root and nothing is split.
    pub fn new() -> Self {
        Profiler {
            root: ProfileNode::leaf(1.0),
        }
    }

    pub fn from_root(root: ProfileNode) -> Self {
        Profiler { root }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// A profile splitting traffic 50/50 on every branch of `graph`.
    pub fn uniform(graph: &TraceGraph) -> Self {
        Profiler {
            root: uniform_from(graph, graph.root(), 1.0),
        }
    }

    pub fn root(&self) -> &ProfileNode {
        &self.root
    }

    /// Fraction of all traffic that reaches the root.
    pub fn total(&self) -> f64 {
        self.root.fraction
    }

    fn locate(&self, path: &[Expr]) -> Option<&ProfileNode> {
        path.iter().try_fold(&self.root, |node, c| node.child(c))
    }

    /// Hit-rate of the node at `path`, if the profile models that path.
    pub fn get(&self, path: &[Expr]) -> Option<f64> {
        self.locate(path).map(|n| n.fraction)
    }

    /// Hit-rate of the deepest modeled prefix of `path`.
    pub fn fraction_at(&self, path: &[Expr]) -> f64 {
        let mut node = &self.root;
        for c in path {
            match node.child(c) {
                Some(child) => node = child,
                None => break,
            }
        }
        node.fraction
    }

    /// Hit-rate `path` would have after [`materialize`](Self::materialize),
    /// or `None` if a step contradicts an existing split.
    pub fn projected_fraction(&self, path: &[Expr]) -> Option<f64> {
        let mut node = &self.root;
        for (depth, c) in path.iter().enumerate() {
            if node.split.is_none() {
                let unmodeled = i32::try_from(path.len() - depth).ok()?;
                return Some(node.fraction / 2f64.powi(unmodeled));
            }
            node = node.child(c)?;
        }
        Some(node.fraction)
    }

    /// Models every step of `path`, splitting unsplit nodes evenly on the
    /// step's condition. Returns `false`, leaving the profile unchanged, if a
    /// step contradicts an existing split.
    pub fn materialize(&mut self, path: &[Expr]) -> bool {
        if self.projected_fraction(path).is_none() {
            return false;
        }
        let mut node = &mut self.root;
        for c in path {
            if node.split.is_none() {
                let condition = match c {
                    Expr::Not { arg } => (**arg).clone(),
                    other => other.clone(),
                };
                let half = ProfileNode::leaf(node.fraction / 2.0);
                node.split = Some(Box::new(ProfileSplit {
                    condition,
                    on_true: half.clone(),
                    on_false: half,
                }));
            }
            let Some(child) = node.child_mut(c) else {
                return false;
            };
            node = child;
        }
        true
    }

    /// Applies `op` to the node at `path` and propagates its mass change to
    /// every ancestor. Returns the change, or `None` if the path is unknown.
    fn update(&mut self, path: &[Expr], op: &mut dyn FnMut(&mut ProfileNode)) -> Option<f64> {
        fn go(
            node: &mut ProfileNode,
            path: &[Expr],
            op: &mut dyn FnMut(&mut ProfileNode),
        ) -> Option<f64> {
            match path.split_first() {
                None => {
                    let before = node.fraction;
                    op(node);
                    Some(node.fraction - before)
                }
                Some((c, rest)) => {
                    let delta = go(node.child_mut(c)?, rest, op)?;
                    node.fraction += delta;
                    Some(delta)
                }
            }
        }
        go(&mut self.root, path, op)
    }

    /// Sets the hit-rate at `path`. Returns `false` if the path is unknown.
    pub fn set(&mut self, path: &[Expr], fraction: f64) -> bool {
        self.update(path, &mut |n| n.assign(fraction)).is_some()
    }

    /// Multiplies the hit-rate of the subtree at `path` by `factor`.
    pub fn scale(&mut self, path: &[Expr], factor: f64) -> bool {
        self.update(path, &mut |n| n.scale(factor)).is_some()
    }

    /// Splits the node at `path` on `condition`, sending `probability` of its
    /// traffic to the true side. An existing split below the node is kept on
    /// both sides.
    pub fn insert_relative(&mut self, path: &[Expr], condition: Expr, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        let mut condition = Some(condition);
        self.update(path, &mut |n| {
            let Some(condition) = condition.take() else { return };
            let mut on_true = n.clone();
            on_true.flows.clear();
            let mut on_false = on_true.clone();
            on_true.scale(p);
            on_false.scale(1.0 - p);
            n.split = Some(Box::new(ProfileSplit {
                condition,
                on_true,
                on_false,
            }));
        })
        .is_some()
    }

    /// Retracts all traffic at `path`. Returns the removed mass. The root
    /// cannot be removed.
    pub fn remove(&mut self, path: &[Expr]) -> Option<f64> {
        if path.is_empty() {
            return None;
        }
        let delta = self.update(path, &mut |n| *n = ProfileNode::leaf(0.0))?;
        Some(-delta)
    }

    /// Drops the split on `condition` at `path`, keeping only the `keep` side
    /// rescaled to carry the node's whole mass.
    pub fn collapse(&mut self, path: &[Expr], condition: &Expr, keep: BranchSide) -> bool {
        let mut collapsed = false;
        let found = self
            .update(path, &mut |n| {
                let Some(split) = n.split.take_if(|s| s.condition == *condition) else {
                    return;
                };
                let mut kept = match keep {
                    BranchSide::OnTrue => split.on_true,
                    BranchSide::OnFalse => split.on_false,
                };
                kept.assign(n.fraction);
                let mut flows = std::mem::take(&mut n.flows);
                flows.append(&mut kept.flows);
                *n = kept;
                n.flows = flows;
                collapsed = true;
            })
            .is_some();
        found && collapsed
    }

    /// Flow statistics for `key` at the deepest modeled prefix of `path`,
    /// falling back to ancestors.
    pub fn flow_stats(&self, path: &[Expr], key: &Expr) -> Option<&FlowStats> {
        let mut chain = vec![&self.root];
        for c in path {
            match chain[chain.len() - 1].child(c) {
                Some(child) => chain.push(child),
                None => break,
            }
        }
        chain
            .into_iter()
            .rev()
            .find_map(|n| n.flows.iter().find(|s| s.key == *key))
    }

    /// Records flow statistics at `path`, replacing any with the same key.
    pub fn set_flow_stats(&mut self, path: &[Expr], stats: FlowStats) -> bool {
        let mut stats = Some(stats);
        self.update(path, &mut |n| {
            let Some(stats) = stats.take() else { return };
            n.flows.retain(|s| s.key != stats.key);
            n.flows.push(stats);
        })
        .is_some()
    }
}

fn uniform_from(graph: &TraceGraph, from: Option<NodeId>, fraction: f64) -> ProfileNode {
    let mut current = from;
    while let Some(id) = current {
        if let Some(NodeKind::Branch { condition }) = graph.kind(id) {
            return ProfileNode {
                fraction,
                flows: Vec::new(),
                split: Some(Box::new(ProfileSplit {
                    condition: condition.clone(),
                    on_true: uniform_from(graph, graph.on_true(id), fraction / 2.0),
                    on_false: uniform_from(graph, graph.on_false(id), fraction / 2.0),
                })),
            };
        }
        current = graph.next(id);
    }
    ProfileNode::leaf(fraction)
}
