//! Switch-only generators.
//!
//! A `map_get` is served from a match-action table when the whole map fits,
//! or from a bounded cache in front of the controller. Any node can instead
//! be handed to the switch CPU or the controller, which then continue the
//! lowering from that node.

use synapse_core::{Call, Expr, NodeId, NodeKind, ObjAddr};

use super::{call_to, generator, leaf_target, object_arg, MAP_GET};
use crate::generator::{Candidate, CostDelta, Generator, SearchEnv, Speculation};
use crate::ledger::DsImpl;
use crate::module::{Module, ModuleKind, SwitchModule};
use crate::perf::PerfOracle;
use crate::placement::{ResourceKind, ResourceRequest};
use crate::plan::ExecutionPlan;
use crate::target::TargetType;

const SWITCH: TargetType = TargetType::Switch;

pub fn generators() -> Vec<Generator> {
    vec![
        generator("table_lookup", SWITCH, ModuleKind::TableLookup, speculate_table, commit_table),
        generator(
            "cached_table_lookup",
            SWITCH,
            ModuleKind::CachedTableLookup,
            speculate_cached_table,
            commit_cached_table,
        ),
        generator(
            "send_to_cpu",
            SWITCH,
            ModuleKind::SendToCpu,
            speculate_send_to_cpu,
            commit_send_to_cpu,
        ),
        generator(
            "send_to_controller",
            SWITCH,
            ModuleKind::SendToController,
            speculate_send_to_controller,
            commit_send_to_controller,
        ),
    ]
}

fn key_expr(call: &Call) -> Option<&Expr> {
    let key = call.get_arg("key")?;
    Some(key.input.as_ref().unwrap_or(&key.expr))
}

fn lookup_request(call: &Call, kind: ResourceKind, entries: u64) -> Option<ResourceRequest> {
    let key_bits = key_expr(call)?.width();
    let value_bits = call
        .get_arg("value_out")
        .and_then(|a| a.output.as_ref())
        .map_or(32, Expr::width);
    Some(ResourceRequest {
        kind,
        key_bits,
        value_bits,
        entries,
    })
}

fn map_lookup<'a>(
    env: &SearchEnv,
    ep: &'a ExecutionPlan,
    node: NodeId,
) -> Option<(&'a Call, ObjAddr)> {
    if leaf_target(ep)? != SWITCH {
        return None;
    }
    let call = call_to(ep, node, MAP_GET)?;
    Some((call, object_arg(env, call, "map")?))
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

fn speculate_table(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    let (call, obj) = map_lookup(env, ep, node)?;
    let request = lookup_request(call, ResourceKind::Table, env.library.table_entries)?;
    let ledger = ep.ledger();
    if !ledger.would_fit(env.placement(SWITCH), SWITCH, obj, DsImpl::SwitchTable, request) {
        return None;
    }
    let new_bits = if ledger.resource_for(SWITCH, obj).is_some() {
        0
    } else {
        request.bits()
    };
    Some(Speculation {
        delta: CostDelta {
            perf: PerfOracle::new(),
            resource_cost: new_bits as f64 * env.weights.memory_bit,
        },
        skip: Default::default(),
    })
}

fn commit_table(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let Some((call, obj)) = map_lookup(env, ep, node) else {
        return Vec::new();
    };
    let Some(request) = lookup_request(call, ResourceKind::Table, env.library.table_entries) else {
        return Vec::new();
    };
    let mut child = ep.derive();
    let Some(table) = child
        .ledger_mut()
        .build_or_reuse(env.placement(SWITCH), SWITCH, obj, DsImpl::SwitchTable, request)
    else {
        return Vec::new();
    };
    let next = child.graph().next(node);
    child.process_leaf(Module::Switch(SwitchModule::TableLookup { node, obj, table }), next);
    vec![Candidate::new(child).with_params(format!("entries={}", request.entries))]
}

// ---------------------------------------------------------------------------
// Cached tables
// ---------------------------------------------------------------------------

struct CacheOption {
    capacity: u64,
    /// Fraction of the lookup's traffic the cache serves.
    hit: f64,
    /// Fraction of all traffic reaching the lookup once its path is modeled.
    share: f64,
    request: ResourceRequest,
}

/// Cache sizes that fit. Empty when the profile contradicts the lookup's
/// path, since the hit/miss split could not be recorded there.
fn cache_options(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<CacheOption> {
    let Some((call, obj)) = map_lookup(env, ep, node) else {
        return Vec::new();
    };
    // The hit/miss split is inserted after the preceding call.
    let graph = ep.graph();
    let prev_is_call = graph
        .incoming(node)
        .is_some_and(|(p, e)| !e.is_branch() && matches!(graph.kind(p), Some(NodeKind::Call(_))));
    if !prev_is_call {
        return Vec::new();
    }
    let Some(key) = key_expr(call) else {
        return Vec::new();
    };
    let path = graph.ordered_constraints(node);
    let profiler = ep.ledger().profiler();
    let (Some(share), Some(stats)) =
        (profiler.projected_fraction(path), profiler.flow_stats(path, key))
    else {
        return Vec::new();
    };
    env.library
        .cache_capacities
        .iter()
        .filter_map(|&capacity| {
            let request = lookup_request(call, ResourceKind::CachedTable, capacity)?;
            ep.ledger()
                .would_fit(env.placement(SWITCH), SWITCH, obj, DsImpl::SwitchCachedTable, request)
                .then(|| CacheOption {
                    capacity,
                    hit: env.estimator.cache_hit_rate(stats, capacity),
                    share,
                    request,
                })
        })
        .collect()
}

fn speculate_cached_table(
    env: &SearchEnv,
    ep: &ExecutionPlan,
    node: NodeId,
) -> Option<Speculation> {
    cache_options(env, ep, node)
        .into_iter()
        .map(|option| {
            let mut perf = PerfOracle::new();
            perf.add_controller(option.share * (1.0 - option.hit));
            Speculation {
                delta: CostDelta {
                    perf,
                    resource_cost: option.request.bits() as f64 * env.weights.memory_bit,
                },
                skip: Default::default(),
            }
        })
        .min_by(|a, b| a.delta.cost(&env.weights).total_cmp(&b.delta.cost(&env.weights)))
}

/// One candidate per cache size. Each splits the trace before the lookup on
/// a fresh hit condition: hits continue on the switch through the cache,
/// misses are sent to the controller on a copy of the downstream trace.
/// Unmodeled steps of the lookup's path are split evenly in the profile
/// first, so the split's mass is carved out of the lookup's own share.
fn commit_cached_table(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let Some((_, obj)) = map_lookup(env, ep, node) else {
        return Vec::new();
    };
    let Some(prev) = ep.graph().prev(node) else {
        return Vec::new();
    };
    let path = ep.graph().ordered_constraints(node).to_vec();

    let mut out = Vec::new();
    for CacheOption {
        capacity,
        hit,
        share,
        request,
    } in cache_options(env, ep, node)
    {
        let mut child = ep.derive();
        let Some(table) = child.ledger_mut().build_or_reuse(
            env.placement(SWITCH),
            SWITCH,
            obj,
            DsImpl::SwitchCachedTable,
            request,
        ) else {
            continue;
        };

        let hit_condition = Expr::symbol(format!("cache_hit_{}", node), 1);
        let split = child.graph_mut().insert_branch(prev, hit_condition.clone());
        let Some(miss) = child.graph().on_false(split) else {
            continue;
        };
        debug_assert_eq!(child.graph().on_true(split), Some(node));

        let ledger = child.ledger_mut();
        let profiler = ledger.profiler_mut();
        let recorded = profiler.materialize(&path)
            && profiler.insert_relative(&path, hit_condition.clone(), hit);
        if !recorded {
            continue;
        }
        ledger.perf_mut().add_controller(share * (1.0 - hit));

        child.retarget_leaves(node, Some(split));
        child.process_branch(
            Module::if_(SWITCH, split, hit_condition),
            Module::then(SWITCH, split),
            Module::else_(SWITCH, split),
            node,
            miss,
        );
        // Leaves are now [hit, miss, ..]: hand the miss side over first.
        child.activate(1);
        child.transfer(Module::Switch(SwitchModule::SendToController { node: miss }));
        child.activate(1);
        let next = child.graph().next(node);
        child.process_leaf(
            Module::Switch(SwitchModule::CachedTableLookup {
                node,
                obj,
                table,
                capacity,
            }),
            next,
        );
        let params = format!("capacity={} hit_rate={:.3}", capacity, hit);
        out.push(Candidate::new(child).with_params(params));
    }
    out
}

// ---------------------------------------------------------------------------
// Hand-off
// ---------------------------------------------------------------------------

fn handoff(share: f64, to: TargetType) -> PerfOracle {
    let mut perf = PerfOracle::new();
    match to {
        TargetType::SwitchCpu => perf.add_cpu(share),
        _ => perf.add_controller(share),
    }
    perf
}

fn speculate_handoff(ep: &ExecutionPlan, node: NodeId, to: TargetType) -> Option<Speculation> {
    if leaf_target(ep)? != SWITCH {
        return None;
    }
    Some(Speculation::with_perf(handoff(ep.hit_rate(node), to)))
}

fn speculate_send_to_cpu(
    _env: &SearchEnv,
    ep: &ExecutionPlan,
    node: NodeId,
) -> Option<Speculation> {
    speculate_handoff(ep, node, TargetType::SwitchCpu)
}

fn speculate_send_to_controller(
    _env: &SearchEnv,
    ep: &ExecutionPlan,
    node: NodeId,
) -> Option<Speculation> {
    speculate_handoff(ep, node, TargetType::Controller)
}

fn commit_handoff(
    ep: &ExecutionPlan,
    node: NodeId,
    module: SwitchModule,
    to: TargetType,
) -> Vec<Candidate> {
    if leaf_target(ep) != Some(SWITCH) {
        return Vec::new();
    }
    let mut child = ep.derive();
    child.ledger_mut().perf_mut().merge(&handoff(ep.hit_rate(node), to));
    child.transfer(Module::Switch(module));
    vec![Candidate::new(child)]
}

fn commit_send_to_cpu(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    commit_handoff(ep, node, SwitchModule::SendToCpu { node }, TargetType::SwitchCpu)
}

fn commit_send_to_controller(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    commit_handoff(ep, node, SwitchModule::SendToController { node }, TargetType::Controller)
}
