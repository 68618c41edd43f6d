//! Engine-level behavior with small hand-written generators.

use synapse_core::{Call, Expr, NodeId, Route, TraceGraph, TraceNode};
use synapse_search::library::common;
use synapse_search::{
    synthesize, synthesize_ranked, Candidate, CommitPolicy, CostDelta, CostWeights, ExecutionPlan,
    Generator, GeneratorRegistry, Module, ModuleKind, Profiler, SearchConfig, SearchEngine,
    SearchEnv, Speculation, SynthesisError, TargetType,
};

// ---------------------------------------------------------------------------
// Test generators
// ---------------------------------------------------------------------------

fn is_call(ep: &ExecutionPlan, node: NodeId, name: &str) -> bool {
    ep.graph()
        .kind(node)
        .and_then(|k| k.as_call())
        .is_some_and(|c| c.function == name)
}

fn lower_as_ignore(ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let target = ep.active_leaf().unwrap().target;
    let mut child = ep.derive();
    let next = child.graph().next(node);
    child.process_leaf(Module::ignore(target, node), next);
    vec![Candidate::new(child)]
}

fn speculate_op_a(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    is_call(ep, node, "op_a").then(Speculation::free)
}

fn commit_op_a(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    lower_as_ignore(ep, node)
}

fn speculate_op_b(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    is_call(ep, node, "op_b").then(Speculation::free)
}

fn commit_op_b(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    lower_as_ignore(ep, node)
}

fn speculate_any_call(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    ep.graph().kind(node)?.as_call()?;
    Some(Speculation::free())
}

fn commit_any_call(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    lower_as_ignore(ep, node)
}

const PRICE: f64 = 5.0;

fn speculate_pricey(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    ep.graph().kind(node)?.as_call()?;
    Some(Speculation {
        delta: CostDelta {
            resource_cost: PRICE,
            ..CostDelta::default()
        },
        ..Speculation::default()
    })
}

fn commit_pricey(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let mut out = lower_as_ignore(ep, node);
    for candidate in &mut out {
        candidate.plan.ledger_mut().add_cost(PRICE);
    }
    out
}

fn handoff_any(_: &SearchEnv, ep: &ExecutionPlan, _: NodeId) -> Option<Speculation> {
    (ep.active_leaf()?.target == TargetType::Switch).then(Speculation::free)
}

fn commit_handoff(_: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let mut child = ep.derive();
    child.transfer(Module::Switch(synapse_search::SwitchModule::SendToController { node }));
    vec![Candidate::new(child)]
}

fn gen(
    name: &'static str,
    target: TargetType,
    kind: ModuleKind,
    speculate: synapse_search::generator::SpeculateFn,
    commit: synapse_search::generator::CommitFn,
) -> Generator {
    Generator {
        name,
        target,
        kind,
        speculate,
        commit,
    }
}

fn registry(generators: Vec<Generator>) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for g in generators {
        registry.register(g.target, g.kind, g).unwrap();
    }
    registry
}

fn engine(registry: GeneratorRegistry, config: SearchConfig) -> SearchEngine {
    SearchEngine::new(registry, SearchEnv::default(), config)
}

// ---------------------------------------------------------------------------
// Traces
// ---------------------------------------------------------------------------

/// op_a -> branch(c) -> { op_b, drop }
fn branching_trace() -> (TraceGraph, [NodeId; 4], Expr) {
    let mut g = TraceGraph::new();
    let cond = Expr::eq(Expr::symbol("proto", 8), Expr::constant(6, 8));
    let a = g.add_call(None, Call::new("op_a")).unwrap();
    let br = g.add_branch(Some(a), cond.clone()).unwrap();
    let b = g.add_on_true(br, TraceNode::call(Call::new("op_b"))).unwrap();
    let d = g.add_on_false(br, TraceNode::terminal(Route::Drop)).unwrap();
    (g, [a, br, b, d], cond)
}

fn scenario_registry() -> GeneratorRegistry {
    let s = TargetType::Switch;
    let mut generators = common::generators(s);
    generators.push(gen("op_a", s, ModuleKind::Ignore, speculate_op_a, commit_op_a));
    generators.push(gen("op_b", s, ModuleKind::Ignore, speculate_op_b, commit_op_b));
    registry(generators)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn single_node_trace_yields_one_module() {
    let mut g = TraceGraph::new();
    let op = g.add_call(None, Call::new("op")).unwrap();
    let s = TargetType::Switch;
    let any = gen("any", s, ModuleKind::Ignore, speculate_any_call, commit_any_call);
    let reg = registry(vec![any]);

    let plan = synthesize(g, &[s], CostWeights::default(), reg).unwrap();
    assert!(plan.is_complete());
    let modules: Vec<&Module> = plan.modules().collect();
    assert_eq!(modules, vec![&Module::ignore(s, op)]);
}

#[test]
fn unlowerable_node_is_reported() {
    let mut g = TraceGraph::new();
    let a = g.add_call(None, Call::new("op_a")).unwrap();
    let x = g.add_call(Some(a), Call::new("op_x")).unwrap();
    g.add_terminal(Some(x), Route::Drop).unwrap();

    let err = synthesize(g, &[TargetType::Switch], CostWeights::default(), scenario_registry())
        .unwrap_err();
    match err {
        SynthesisError::NoLoweringFound {
            node,
            operation,
            best_partial,
        } => {
            assert_eq!(node, x);
            assert_eq!(operation, "op_x");
            assert!(best_partial.unwrap().contains("switch::Ignore"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn branching_scenario_builds_if_then_else() {
    let (g, [a, br, b, d], cond) = branching_trace();
    let profiler = Profiler::uniform(&g);
    let dropped_share = profiler.get(&[cond.negated()]).unwrap();
    let s = TargetType::Switch;

    let outcome = engine(scenario_registry(), SearchConfig::default())
        .run(g, s, &[s], profiler)
        .unwrap();
    let plan = outcome.best().unwrap();
    assert!(plan.is_complete());

    let root = plan.node(plan.root().unwrap()).unwrap();
    assert_eq!(root.module, Module::ignore(s, a));
    let iff = plan.node(root.children[0]).unwrap();
    assert_eq!(iff.module, Module::if_(s, br, cond));
    let then = plan.node(iff.children[0]).unwrap();
    let otherwise = plan.node(iff.children[1]).unwrap();
    assert_eq!(then.module, Module::then(s, br));
    assert_eq!(otherwise.module, Module::else_(s, br));
    assert_eq!(plan.node(then.children[0]).unwrap().module, Module::ignore(s, b));
    assert_eq!(plan.node(otherwise.children[0]).unwrap().module, Module::drop(s, d));

    assert!((plan.ledger().perf().dropped - dropped_share).abs() < 1e-9);
    assert_eq!(plan.modules().count(), 6);
}

#[test]
fn commit_never_mutates_the_parent() {
    let (g, [a, ..], _) = branching_trace();
    let parent = ExecutionPlan::new(
        std::sync::Arc::new(g),
        TargetType::Switch,
        synapse_search::Ledger::new(Profiler::new()),
    );
    let fingerprint = parent.graph().fingerprint();
    let leaves = parent.leaves().to_vec();

    let children = commit_op_a(&SearchEnv::default(), &parent, a);
    assert_eq!(children.len(), 1);
    assert_eq!(parent.leaves(), leaves.as_slice());
    assert_eq!(parent.modules().count(), 0);
    assert_eq!(parent.graph().fingerprint(), fingerprint);
    assert_eq!(children[0].plan.parent(), Some(parent.id()));
}

#[test]
fn ranked_results_ascend_in_cost() {
    let mut g = TraceGraph::new();
    g.add_call(None, Call::new("op")).unwrap();
    let s = TargetType::Switch;
    let reg = registry(vec![
        gen("pricey", s, ModuleKind::Ignore, speculate_pricey, commit_pricey),
        gen("cheap", s, ModuleKind::Ignore, speculate_any_call, commit_any_call),
    ]);
    let weights = CostWeights::default();
    let plans = synthesize_ranked(g, &[s], weights.clone(), reg, 3).unwrap();
    let costs: Vec<f64> = plans.iter().map(|p| p.cost(&weights)).collect();
    assert_eq!(costs, vec![0.0, PRICE]);
}

#[test]
fn best_policy_commits_only_the_cheapest_generator() {
    let mut g = TraceGraph::new();
    g.add_call(None, Call::new("op")).unwrap();
    let s = TargetType::Switch;
    let reg = registry(vec![
        gen("pricey", s, ModuleKind::Ignore, speculate_pricey, commit_pricey),
        gen("cheap", s, ModuleKind::Ignore, speculate_any_call, commit_any_call),
    ]);
    let config = SearchConfig {
        policy: CommitPolicy::Best,
        results: 5,
        ..SearchConfig::default()
    };
    let outcome = engine(reg, config).run(g, s, &[s], Profiler::new()).unwrap();
    assert_eq!(outcome.plans.len(), 1);
    assert_eq!(outcome.stats.generated, 1);
}

#[test]
fn handoff_to_disabled_target_is_pruned() {
    let mut g = TraceGraph::new();
    g.add_call(None, Call::new("op_x")).unwrap();
    let reg = registry(vec![
        gen(
            "handoff",
            TargetType::Switch,
            ModuleKind::SendToController,
            handoff_any,
            commit_handoff,
        ),
        gen(
            "any",
            TargetType::Controller,
            ModuleKind::Ignore,
            speculate_any_call,
            commit_any_call,
        ),
    ]);
    let switch_only = engine(reg.clone(), SearchConfig::default())
        .run(g.clone(), TargetType::Switch, &[TargetType::Switch], Profiler::new())
        .unwrap_err();
    assert!(matches!(
        switch_only,
        SynthesisError::NoLoweringFound { operation, .. } if operation == "op_x"
    ));

    let outcome = engine(reg, SearchConfig::default())
        .run(
            g,
            TargetType::Switch,
            &[TargetType::Switch, TargetType::Controller],
            Profiler::new(),
        )
        .unwrap();
    let kinds: Vec<ModuleKind> = outcome.best().unwrap().modules().map(Module::kind).collect();
    assert_eq!(kinds, vec![ModuleKind::SendToController, ModuleKind::Ignore]);
    assert_eq!(outcome.best().unwrap().modules().last().unwrap().target(), TargetType::Controller);
}

#[test]
fn iteration_budget_is_enforced() {
    let (g, ..) = branching_trace();
    let config = SearchConfig {
        max_iterations: 2,
        ..SearchConfig::default()
    };
    let err = engine(scenario_registry(), config)
        .run(g, TargetType::Switch, &[TargetType::Switch], Profiler::new())
        .unwrap_err();
    assert_eq!(err, SynthesisError::BudgetExhausted { iterations: 2 });
}

#[test]
fn frontier_budget_prunes_but_still_finds_a_plan() {
    let (g, ..) = branching_trace();
    let config = SearchConfig {
        max_frontier: 1,
        ..SearchConfig::default()
    };
    let s = TargetType::Switch;
    let mut generators = vec![gen(
        "pricey",
        s,
        ModuleKind::Ignore,
        speculate_pricey,
        commit_pricey,
    )];
    generators.extend(common::generators(s));
    generators.push(gen("any", s, ModuleKind::Ignore, speculate_any_call, commit_any_call));
    let outcome = engine(registry(generators), config)
        .run(g, s, &[s], Profiler::new())
        .unwrap();
    assert!(outcome.stats.pruned > 0);
    assert!(outcome.best().unwrap().is_complete());
}

#[test]
fn zero_frontier_reports_the_budget_not_a_node() {
    let (g, ..) = branching_trace();
    let config = SearchConfig {
        max_frontier: 0,
        ..SearchConfig::default()
    };
    let err = engine(scenario_registry(), config)
        .run(g, TargetType::Switch, &[TargetType::Switch], Profiler::new())
        .unwrap_err();
    match err {
        SynthesisError::FrontierExhausted { max_frontier, pruned } => {
            assert_eq!(max_frontier, 0);
            assert!(pruned > 0);
        }
        other => panic!("unexpected error {other}"),
    }
}
