//! End-to-end lowering with the reference generator library.

use std::sync::Arc;

use synapse_core::{Call, CallArg, Expr, NodeId, ObjAddr, Route, TraceGraph, TraceNode};
use synapse_search::library::{self, switch};
use synapse_search::{
    CapacityModel, DsImpl, ExecutionPlan, FlowStats, Ledger, LibraryConfig, Module, ModuleKind,
    Profiler, SearchConfig, SearchEngine, SearchEnv, SwitchModule, TargetType,
};

const MAP: u64 = 0x100;
const HEADER_BITS: u32 = 272;

fn header() -> Expr {
    Expr::symbol("hdr", HEADER_BITS)
}

fn pointer() -> Expr {
    Expr::symbol("pkt_ptr", 64)
}

fn lookup_key() -> Expr {
    Expr::extract(header(), 0, 32)
}

fn borrow() -> Call {
    Call::new(library::PACKET_BORROW_NEXT_CHUNK)
        .arg("length", CallArg::value(Expr::constant(34, 32)))
        .arg("chunk", CallArg::value(pointer()).with_output(header()))
        .producing("packet_chunks", header())
}

fn give_back(content: Expr) -> Call {
    Call::new(library::PACKET_RETURN_CHUNK)
        .arg("the_chunk", CallArg::value(pointer()).with_input(content))
}

fn map_get() -> Call {
    Call::new(library::MAP_GET)
        .arg("map", CallArg::value(Expr::constant(MAP, 64)))
        .arg("key", CallArg::value(lookup_key()))
        .arg(
            "value_out",
            CallArg::value(Expr::symbol("val_ptr", 64)).with_output(Expr::symbol("port", 32)),
        )
        .producing("map_has_this_key", Expr::symbol("hit", 1))
}

struct Nat {
    graph: TraceGraph,
    borrow: NodeId,
    get: NodeId,
    ret_true: NodeId,
    ret_false: NodeId,
}

/// borrow -> map_get -> branch(hit) -> { return -> forward(1), return -> drop }
fn nat(returned_on_true: Expr) -> Nat {
    let mut g = TraceGraph::new();
    let b = g.add_call(None, borrow()).unwrap();
    let get = g.add_call(Some(b), map_get()).unwrap();
    let br = g
        .add_branch(Some(get), Expr::eq(Expr::symbol("hit", 1), Expr::constant(1, 1)))
        .unwrap();
    let ret_true = g.add_on_true(br, TraceNode::call(give_back(returned_on_true))).unwrap();
    g.add_terminal(Some(ret_true), Route::Forward { port: 1 }).unwrap();
    let ret_false = g.add_on_false(br, TraceNode::call(give_back(header()))).unwrap();
    g.add_terminal(Some(ret_false), Route::Drop).unwrap();
    Nat {
        graph: g,
        borrow: b,
        get,
        ret_true,
        ret_false,
    }
}

fn engine(env: SearchEnv) -> SearchEngine {
    SearchEngine::new(library::registry().unwrap(), env, SearchConfig::default())
}

fn kinds(plan: &ExecutionPlan) -> Vec<ModuleKind> {
    plan.modules().map(Module::kind).collect()
}

#[test]
fn header_round_trip_is_folded_into_the_parse() {
    let nat = nat(header());
    let profiler = Profiler::uniform(&nat.graph);
    let targets = [TargetType::Switch, TargetType::Controller];
    let outcome = engine(SearchEnv::default())
        .run(nat.graph, TargetType::Switch, &targets, profiler)
        .unwrap();
    let plan = outcome.best().unwrap();

    assert_eq!(
        kinds(plan),
        vec![
            ModuleKind::ParseHeader,
            ModuleKind::TableLookup,
            ModuleKind::If,
            ModuleKind::Then,
            ModuleKind::Else,
            ModuleKind::Forward,
            ModuleKind::Drop,
        ]
    );
    assert!(plan.modules().all(|m| m.target() == TargetType::Switch));
    assert!(plan.modules().all(|m| m.node() != nat.ret_true && m.node() != nat.ret_false));
    assert!(plan.is_processed(nat.ret_true) && plan.is_processed(nat.ret_false));
    assert_eq!(plan.modules().filter(|m| m.node() == nat.borrow).count(), 1);
    assert_eq!(
        plan.ledger().ds_impl(TargetType::Switch, ObjAddr(MAP)),
        Some(DsImpl::SwitchTable)
    );
    assert!((plan.ledger().perf().handled() - 1.0).abs() < 1e-9);
}

#[test]
fn rewritten_header_is_emitted_as_a_modification() {
    let rewritten = Expr::concat(vec![
        Expr::extract(header(), 32, HEADER_BITS - 32),
        Expr::symbol("new_src", 32),
    ]);
    let nat = nat(rewritten);
    let profiler = Profiler::uniform(&nat.graph);
    let outcome = engine(SearchEnv::default())
        .run(nat.graph, TargetType::Switch, &[TargetType::Switch], profiler)
        .unwrap();
    let plan = outcome.best().unwrap();

    let modify: Vec<&Module> = plan
        .modules()
        .filter(|m| m.kind() == ModuleKind::ModifyHeader)
        .collect();
    assert_eq!(modify.len(), 1);
    assert_eq!(modify[0].node(), nat.ret_true);
    match modify[0] {
        Module::Switch(SwitchModule::ModifyHeader { fields, .. }) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].symbol.as_deref(), Some("new_src"));
            assert_eq!((fields[0].offset, fields[0].width), (0, 32));
        }
        other => panic!("unexpected module {other}"),
    }
    // The untouched return on the other side is still folded.
    assert!(plan.modules().all(|m| m.node() != nat.ret_false));
}

fn tight_switch_env() -> SearchEnv {
    let capacity = CapacityModel {
        max_resources: 4,
        max_entries: 8192,
        max_bits: u64::MAX,
    };
    SearchEnv::default()
        .with_placement(TargetType::Switch, Arc::new(capacity))
        .with_library(LibraryConfig {
            table_entries: 65_536,
            cache_capacities: vec![1024, 4096],
        })
}

fn profile_with_flows(graph: &TraceGraph) -> Profiler {
    let mut profiler = Profiler::uniform(graph);
    profiler.set_flow_stats(
        &[],
        FlowStats {
            key: lookup_key(),
            total_packets: 10_000,
            total_flows: 10_000,
            top_k: Vec::new(),
        },
    );
    profiler
}

#[test]
fn cached_table_yields_one_candidate_per_capacity() {
    let nat = nat(header());
    let env = tight_switch_env();
    let profiler = profile_with_flows(&nat.graph);
    let mut parent =
        ExecutionPlan::new(Arc::new(nat.graph), TargetType::Switch, Ledger::new(profiler));
    let next = parent.graph().next(nat.borrow);
    parent.process_leaf(Module::parse_header(TargetType::Switch, nat.borrow, header(), 34), next);
    parent.resolve_leaves();
    assert_eq!(parent.active_leaf().unwrap().next, nat.get);

    let generator = switch::generators()
        .into_iter()
        .find(|g| g.kind == ModuleKind::CachedTableLookup)
        .unwrap();
    let speculation = (generator.speculate)(&env, &parent, nat.get).unwrap();
    let candidates = (generator.commit)(&env, &parent, nat.get);
    assert_eq!(candidates.len(), 2);

    let estimator = synapse_search::IndependentFlowEstimator;
    let stats = parent.ledger().profiler().flow_stats(&[], &lookup_key()).unwrap().clone();
    for (candidate, capacity) in candidates.iter().zip([1024u64, 4096]) {
        let hit = synapse_search::HitRateEstimator::cache_hit_rate(&estimator, &stats, capacity);
        let controller = candidate.plan.ledger().perf().controller;
        assert!((controller - (1.0 - hit)).abs() < 1e-9, "capacity {capacity}");
        assert!(candidate.params.contains(&format!("capacity={capacity}")));
        assert!(candidate.plan.graph().validate().is_ok());
        // Hit and miss sides partition the lookup's traffic.
        let leaves = candidate.plan.leaves();
        assert_eq!(leaves[0].target, TargetType::Switch);
        assert_eq!(leaves[1].target, TargetType::Controller);
    }
    // The speculation reports the better of the two.
    let best_controller = candidates[1].plan.ledger().perf().controller;
    assert!((speculation.delta.perf.controller - best_controller).abs() < 1e-9);

    // The parent plan is untouched by the trace split.
    assert_eq!(parent.graph().node_count(), 7);
    assert_eq!(parent.ledger().ds_impl(TargetType::Switch, ObjAddr(MAP)), None);
}

#[test]
fn oversized_table_falls_back_to_a_cache() {
    let nat = nat(header());
    let profiler = profile_with_flows(&nat.graph);
    let targets = [TargetType::Switch, TargetType::Controller];
    let outcome = engine(tight_switch_env())
        .run(nat.graph, TargetType::Switch, &targets, profiler)
        .unwrap();
    let plan = outcome.best().unwrap();

    let cached = plan
        .modules()
        .find_map(|m| match m {
            Module::Switch(SwitchModule::CachedTableLookup { capacity, node, .. }) => {
                Some((*capacity, *node))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(cached, (4096, nat.get));
    assert!((plan.ledger().perf().controller - (1.0 - 0.4096)).abs() < 1e-9);
    assert_eq!(
        plan.ledger().ds_impl(TargetType::Switch, ObjAddr(MAP)),
        Some(DsImpl::SwitchCachedTable)
    );
    assert_eq!(
        plan.ledger().ds_impl(TargetType::Controller, ObjAddr(MAP)),
        Some(DsImpl::SoftwareMap)
    );
    assert!(plan
        .modules()
        .any(|m| m.target() == TargetType::Controller && m.kind() == ModuleKind::MapGet));
    assert!((plan.ledger().perf().handled() - 1.0).abs() < 1e-9);
}

/// branch(proto) -> { borrow -> map_get -> return -> forward(1), drop }
fn guarded_lookup() -> (TraceGraph, Expr) {
    let proto = Expr::eq(Expr::symbol("proto", 8), Expr::constant(17, 8));
    let mut g = TraceGraph::new();
    let br = g.add_branch(None, proto.clone()).unwrap();
    let b = g.add_on_true(br, TraceNode::call(borrow())).unwrap();
    let get = g.add_call(Some(b), map_get()).unwrap();
    let ret = g.add_call(Some(get), give_back(header())).unwrap();
    g.add_terminal(Some(ret), Route::Forward { port: 1 }).unwrap();
    g.add_on_false(br, TraceNode::terminal(Route::Drop)).unwrap();
    (g, proto)
}

#[test]
fn cache_under_an_unprofiled_branch_conserves_traffic() {
    let (graph, proto) = guarded_lookup();
    let mut profiler = Profiler::new();
    profiler.set_flow_stats(
        &[],
        FlowStats {
            key: lookup_key(),
            total_packets: 10_000,
            total_flows: 10_000,
            top_k: Vec::new(),
        },
    );
    let targets = [TargetType::Switch, TargetType::Controller];
    let outcome = engine(tight_switch_env())
        .run(graph, TargetType::Switch, &targets, profiler)
        .unwrap();
    let plan = outcome.best().unwrap();
    assert!(kinds(plan).contains(&ModuleKind::CachedTableLookup));

    let perf = plan.ledger().perf();
    assert!((perf.forwarded[&1] - 0.5).abs() < 1e-9, "{:?}", perf.forwarded);
    assert!((perf.dropped - 0.5).abs() < 1e-9);
    assert!((perf.handled() - 1.0).abs() < 1e-9);
    assert!((perf.controller - 0.5 * (1.0 - 0.4096)).abs() < 1e-9);

    let profile = plan.ledger().profiler();
    assert!((profile.total() - 1.0).abs() < 1e-9);
    assert!((profile.get(&[proto.clone()]).unwrap() - 0.5).abs() < 1e-9);
    assert!((profile.get(&[proto.negated()]).unwrap() - 0.5).abs() < 1e-9);
}

#[test]
fn oversized_chunk_length_is_not_parsed() {
    let huge = Call::new(library::PACKET_BORROW_NEXT_CHUNK)
        .arg("length", CallArg::value(Expr::constant(1 << 33, 64)))
        .arg("chunk", CallArg::value(pointer()).with_output(header()))
        .producing("packet_chunks", header());
    let mut g = TraceGraph::new();
    let b = g.add_call(None, huge).unwrap();
    g.add_terminal(Some(b), Route::Drop).unwrap();
    let ep = ExecutionPlan::new(Arc::new(g), TargetType::Switch, Ledger::default());

    let parse = library::common::generators(TargetType::Switch)
        .into_iter()
        .find(|g| g.kind == ModuleKind::ParseHeader)
        .unwrap();
    let env = SearchEnv::default();
    assert!((parse.speculate)(&env, &ep, b).is_none());
    assert!((parse.commit)(&env, &ep, b).is_empty());
}

/// map_put -> dchain_allocate_new_index -> vector_borrow -> vector_return -> forward(2)
fn stateful_trace() -> TraceGraph {
    let obj = |addr: u64| CallArg::value(Expr::constant(addr, 64));
    let mut g = TraceGraph::new();
    let put = g
        .add_call(
            None,
            Call::new(library::MAP_PUT)
                .arg("map", obj(0x200))
                .arg("key", CallArg::value(Expr::symbol("k", 32)))
                .arg("value", CallArg::value(Expr::symbol("v", 32))),
        )
        .unwrap();
    let alloc = g
        .add_call(Some(put), Call::new(library::DCHAIN_ALLOCATE_NEW_INDEX).arg("chain", obj(0x300)))
        .unwrap();
    let read = g
        .add_call(Some(alloc), Call::new(library::VECTOR_BORROW).arg("vector", obj(0x400)))
        .unwrap();
    let write = g
        .add_call(Some(read), Call::new(library::VECTOR_RETURN).arg("vector", obj(0x400)))
        .unwrap();
    g.add_terminal(Some(write), Route::Forward { port: 2 }).unwrap();
    g
}

#[test]
fn stateful_trace_runs_on_the_cheapest_software_target() {
    let g = stateful_trace();
    let all = [TargetType::Switch, TargetType::SwitchCpu, TargetType::Controller];
    let outcome = engine(SearchEnv::default())
        .run(g.clone(), TargetType::Switch, &all, Profiler::uniform(&g))
        .unwrap();
    let plan = outcome.best().unwrap();
    assert_eq!(
        kinds(plan),
        vec![
            ModuleKind::SendToCpu,
            ModuleKind::MapPut,
            ModuleKind::ChainAllocate,
            ModuleKind::VectorRead,
            ModuleKind::VectorWrite,
            ModuleKind::Forward,
        ]
    );
    assert!(plan.modules().skip(1).all(|m| m.target() == TargetType::SwitchCpu));
    assert_eq!(
        plan.ledger().ds_impl(TargetType::SwitchCpu, ObjAddr(0x400)),
        Some(DsImpl::SoftwareVector)
    );

    let without_cpu = [TargetType::Switch, TargetType::Controller];
    let outcome = engine(SearchEnv::default())
        .run(g.clone(), TargetType::Switch, &without_cpu, Profiler::uniform(&g))
        .unwrap();
    let plan = outcome.best().unwrap();
    assert_eq!(plan.modules().next().unwrap().kind(), ModuleKind::SendToController);
    assert!((plan.ledger().perf().controller - 1.0).abs() < 1e-9);
}
