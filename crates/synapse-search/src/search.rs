//! Best-first search over execution plans.
//!
//! The frontier is a min-heap of plans keyed by accumulated cost, ties broken
//! by insertion order. Each iteration pops the cheapest plan, advances its
//! leaves past skipped nodes, and either collects it (no open leaves) or
//! expands its active leaf:
//!
//! 1. every generator registered for the leaf's target speculates on the
//!    leaf's node;
//! 2. applicable generators are ranked by speculated cost and the best ones,
//!    per [`CommitPolicy`](crate::CommitPolicy), commit;
//! 3. children that hand traffic to a disabled target are dropped, the rest
//!    enter the frontier.
//!
//! A popped plan that no generator can extend is dead. Since costs only grow
//! along a lineage, the first complete plan popped is the cheapest one.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;

use serde::Serialize;
use synapse_core::{NodeId, TraceGraph};
use tracing::{debug, info, trace};

use crate::config::{CostWeights, SearchConfig};
use crate::error::SynthesisError;
use crate::generator::{GeneratorRegistry, SearchEnv, Speculation};
use crate::ledger::Ledger;
use crate::plan::{EpId, EpState, ExecutionPlan};
use crate::profiler::Profiler;
use crate::target::TargetType;

/// Counters describing one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Plans popped from the frontier.
    pub iterations: usize,
    /// Child plans that entered the frontier.
    pub generated: usize,
    /// Popped plans no generator could extend.
    pub dead: usize,
    /// Plans discarded by the frontier budget or for crossing to a disabled
    /// target.
    pub pruned: usize,
    /// Complete plans collected.
    pub completed: usize,
}

/// Complete plans ranked by ascending cost.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub plans: Vec<ExecutionPlan>,
    pub stats: SearchStats,
}

impl SynthesisOutcome {
    pub fn best(&self) -> Option<&ExecutionPlan> {
        self.plans.first()
    }
}

struct Entry {
    cost: f64,
    seq: u64,
    plan: ExecutionPlan,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed so the max-heap pops the cheapest, oldest entry.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Why the search could not go further, kept for the error report.
struct Stuck {
    node: NodeId,
    operation: String,
    processed: usize,
    render: String,
}

pub struct SearchEngine {
    registry: GeneratorRegistry,
    env: SearchEnv,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(registry: GeneratorRegistry, env: SearchEnv, config: SearchConfig) -> Self {
        SearchEngine { registry, env, config }
    }

    pub fn env(&self) -> &SearchEnv {
        &self.env
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Lowers `graph` starting on `initial`, using only `targets`.
    pub fn run(
        &self,
        graph: TraceGraph,
        initial: TargetType,
        targets: &[TargetType],
        profiler: Profiler,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        if targets.is_empty() {
            return Err(SynthesisError::NoTargets);
        }
        if !targets.contains(&initial) {
            return Err(SynthesisError::TargetDisabled { target: initial });
        }
        if graph.root().is_none() {
            return Err(SynthesisError::EmptyTrace);
        }
        let enabled: BTreeSet<TargetType> = targets.iter().copied().collect();
        let weights = &self.env.weights;

        let mut stats = SearchStats::default();
        let mut seq: u64 = 0;
        let mut frontier = BinaryHeap::new();
        let mut complete = Vec::new();
        let mut stuck: Option<Stuck> = None;

        let root = ExecutionPlan::new(Arc::new(graph), initial, Ledger::new(profiler));
        frontier.push(Entry {
            cost: root.cost(weights),
            seq,
            plan: root,
        });

        info!(%initial, targets = ?enabled, generators = self.registry.len(), "starting synthesis");

        while let Some(Entry { cost, plan, .. }) = frontier.pop() {
            stats.iterations += 1;
            if stats.iterations > self.config.max_iterations {
                if complete.is_empty() {
                    return Err(SynthesisError::BudgetExhausted {
                        iterations: self.config.max_iterations,
                    });
                }
                break;
            }

            let mut plan = plan;
            plan.resolve_leaves();
            if plan.is_complete() {
                debug!(ep = %plan.id(), cost, modules = plan.nodes().len(), "plan complete");
                stats.completed += 1;
                complete.push(plan);
                if complete.len() >= self.config.results {
                    break;
                }
                continue;
            }

            let Some(leaf) = plan.active_leaf().copied() else {
                continue;
            };
            let node = leaf.next;
            let state = EpState::Extending;
            trace!(ep = %plan.id(), ?state, cost, %node, target = %leaf.target, "expanding");

            let mut ranked: Vec<(f64, usize, Speculation)> = self
                .registry
                .for_target(leaf.target)
                .iter()
                .enumerate()
                .filter_map(|(i, g)| {
                    let speculation = (g.speculate)(&self.env, &plan, node)?;
                    let delta = speculation.delta.cost(weights);
                    trace!(generator = g.name, delta, "applicable");
                    Some((delta, i, speculation))
                })
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            let take = self.config.policy.limit(ranked.len());

            let mut children = 0usize;
            for (_, index, speculation) in ranked.into_iter().take(take) {
                let generator = &self.registry.for_target(leaf.target)[index];
                for candidate in (generator.commit)(&self.env, &plan, node) {
                    let mut child = candidate.plan;
                    let disabled = child.leaves().iter().find(|l| !enabled.contains(&l.target));
                    if let Some(disabled) = disabled {
                        debug!(
                            generator = generator.name,
                            target = %disabled.target,
                            "dropping child on disabled target"
                        );
                        stats.pruned += 1;
                        continue;
                    }
                    seq += 1;
                    child.set_id(EpId(seq));
                    child.add_skip(speculation.skip.iter().copied());
                    child.add_skip(candidate.skipped);
                    child.resolve_leaves();
                    let child_cost = child.cost(weights);
                    trace!(
                        ep = %child.id(),
                        parent = %plan.id(),
                        generator = generator.name,
                        params = %candidate.params,
                        cost = child_cost,
                        "candidate"
                    );
                    frontier.push(Entry {
                        cost: child_cost,
                        seq,
                        plan: child,
                    });
                    stats.generated += 1;
                    children += 1;
                }
            }

            if children == 0 {
                let state = EpState::Dead;
                let operation = plan
                    .graph()
                    .kind(node)
                    .map_or_else(|| "unknown".to_string(), |k| k.operation());
                debug!(
                    ep = %plan.id(),
                    ?state,
                    %node,
                    %operation,
                    target = %leaf.target,
                    "no generator applies"
                );
                stats.dead += 1;
                if stuck.as_ref().map_or(true, |s| plan.processed_count() >= s.processed) {
                    stuck = Some(Stuck {
                        node,
                        operation,
                        processed: plan.processed_count(),
                        render: plan.render(),
                    });
                }
            }

            if frontier.len() > self.config.max_frontier {
                let mut entries = frontier.into_sorted_vec();
                // Sorted ascending by `Ord`, so the cheapest entries are last.
                let excess = entries.len() - self.config.max_frontier;
                entries.drain(..excess);
                stats.pruned += excess;
                debug!(pruned = excess, kept = entries.len(), "frontier budget exceeded");
                frontier = entries.into();
            }
        }

        if complete.is_empty() {
            let Some(stuck) = stuck else {
                info!(?stats, "frontier budget pruned every plan");
                return Err(SynthesisError::FrontierExhausted {
                    max_frontier: self.config.max_frontier,
                    pruned: stats.pruned,
                });
            };
            info!(?stats, node = %stuck.node, operation = %stuck.operation, "synthesis failed");
            return Err(SynthesisError::NoLoweringFound {
                node: stuck.node,
                operation: stuck.operation,
                best_partial: Some(stuck.render),
            });
        }

        complete.sort_by(|a, b| a.cost(weights).total_cmp(&b.cost(weights)));
        info!(?stats, best_cost = complete[0].cost(weights), "synthesis finished");
        Ok(SynthesisOutcome { plans: complete, stats })
    }
}

/// Synthesizes the cheapest plan for `graph`, starting on the first of
/// `targets`, under a uniform traffic profile.
pub fn synthesize(
    graph: TraceGraph,
    targets: &[TargetType],
    weights: CostWeights,
    registry: GeneratorRegistry,
) -> Result<ExecutionPlan, SynthesisError> {
    let mut plans = synthesize_ranked(graph, targets, weights, registry, 1)?;
    // A successful search always yields at least one plan.
    Ok(plans.remove(0))
}

/// Like [`synthesize`], returning up to `n` complete plans by ascending cost.
pub fn synthesize_ranked(
    graph: TraceGraph,
    targets: &[TargetType],
    weights: CostWeights,
    registry: GeneratorRegistry,
    n: usize,
) -> Result<Vec<ExecutionPlan>, SynthesisError> {
    let Some(initial) = targets.first().copied() else {
        return Err(SynthesisError::NoTargets);
    };
    let profiler = Profiler::uniform(&graph);
    let config = SearchConfig {
        results: n.max(1),
        ..SearchConfig::default()
    };
    let engine = SearchEngine::new(registry, SearchEnv::new(weights), config);
    Ok(engine.run(graph, initial, targets, profiler)?.plans)
}
