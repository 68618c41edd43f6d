//! Generators every target provides.

use synapse_core::{Call, Expr, ExprGroup, NodeId, NodeKind, Route, TraceGraph};

use super::{
    call_to, constant_arg, generator, leaf_target, IGNORED_FUNCTIONS, PACKET_BORROW_NEXT_CHUNK,
    PACKET_RETURN_CHUNK,
};
use crate::generator::{Candidate, Generator, SearchEnv, Speculation};
use crate::module::{Module, ModuleKind};
use crate::perf::PerfOracle;
use crate::plan::ExecutionPlan;
use crate::target::TargetType;

pub fn generators(target: TargetType) -> Vec<Generator> {
    vec![
        generator("if", target, ModuleKind::If, speculate_if, commit_if),
        generator("drop", target, ModuleKind::Drop, speculate_drop, commit_terminal),
        generator("forward", target, ModuleKind::Forward, speculate_forward, commit_terminal),
        generator("broadcast", target, ModuleKind::Broadcast, speculate_broadcast, commit_terminal),
        generator("ignore", target, ModuleKind::Ignore, speculate_ignore, commit_ignore),
        generator(
            "parse_header",
            target,
            ModuleKind::ParseHeader,
            speculate_parse_header,
            commit_parse_header,
        ),
        generator(
            "modify_header",
            target,
            ModuleKind::ModifyHeader,
            speculate_modify_header,
            commit_modify_header,
        ),
    ]
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

fn speculate_if(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    ep.graph().kind(node)?.condition()?;
    Some(Speculation::free())
}

fn commit_if(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let graph = ep.graph();
    let (Some(target), Some(condition), Some(on_true), Some(on_false)) = (
        leaf_target(ep),
        graph.kind(node).and_then(NodeKind::condition).cloned(),
        graph.on_true(node),
        graph.on_false(node),
    ) else {
        return Vec::new();
    };
    let mut child = ep.derive();
    child.process_branch(
        Module::if_(target, node, condition),
        Module::then(target, node),
        Module::else_(target, node),
        on_true,
        on_false,
    );
    vec![Candidate::new(child)]
}

// ---------------------------------------------------------------------------
// Terminals
// ---------------------------------------------------------------------------

fn route(ep: &ExecutionPlan, node: NodeId) -> Option<Route> {
    match ep.graph().kind(node)? {
        NodeKind::Terminal(route) => Some(*route),
        _ => None,
    }
}

fn terminal_traffic(ep: &ExecutionPlan, node: NodeId, route: Route) -> PerfOracle {
    let share = ep.hit_rate(node);
    let mut perf = PerfOracle::new();
    match route {
        Route::Drop => perf.add_dropped(share),
        Route::Broadcast => perf.add_broadcast(share),
        Route::Forward { port } => perf.add_forwarded(port, share),
    }
    perf
}

fn speculate_drop(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    let route = route(ep, node).filter(|r| *r == Route::Drop)?;
    Some(Speculation::with_perf(terminal_traffic(ep, node, route)))
}

fn speculate_forward(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    let route = route(ep, node).filter(|r| matches!(r, Route::Forward { .. }))?;
    Some(Speculation::with_perf(terminal_traffic(ep, node, route)))
}

fn speculate_broadcast(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    let route = route(ep, node).filter(|r| *r == Route::Broadcast)?;
    Some(Speculation::with_perf(terminal_traffic(ep, node, route)))
}

fn commit_terminal(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let (Some(target), Some(route)) = (leaf_target(ep), route(ep, node)) else {
        return Vec::new();
    };
    let traffic = terminal_traffic(ep, node, route);
    let module = match route {
        Route::Drop => Module::drop(target, node),
        Route::Broadcast => Module::broadcast(target, node),
        Route::Forward { port } => Module::forward(target, node, port),
    };
    let mut child = ep.derive();
    child.ledger_mut().perf_mut().merge(&traffic);
    child.close_leaf(module);
    vec![Candidate::new(child)]
}

// ---------------------------------------------------------------------------
// No-op calls
// ---------------------------------------------------------------------------

fn speculate_ignore(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
    let call = ep.graph().kind(node)?.as_call()?;
    let ignorable = IGNORED_FUNCTIONS.contains(&call.function.as_str())
        || (call.function == PACKET_RETURN_CHUNK
            && modified_fields(env, ep.graph(), node).is_some_and(|f| f.is_empty()));
    ignorable.then(Speculation::free)
}

fn commit_ignore(_env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let Some(target) = leaf_target(ep) else {
        return Vec::new();
    };
    let mut child = ep.derive();
    let next = child.graph().next(node);
    child.process_leaf(Module::ignore(target, node), next);
    vec![Candidate::new(child)]
}

// ---------------------------------------------------------------------------
// Packet headers
// ---------------------------------------------------------------------------

fn chunk_pointer(call: &Call) -> Option<&Expr> {
    let arg = if call.function == PACKET_BORROW_NEXT_CHUNK {
        "chunk"
    } else {
        "the_chunk"
    };
    call.get_arg(arg).map(|a| &a.expr)
}

/// The nearest upstream borrow of the chunk `ret` hands back.
fn matching_borrow(env: &SearchEnv, graph: &TraceGraph, ret: NodeId) -> Option<NodeId> {
    let pointer = chunk_pointer(graph.kind(ret)?.as_call()?)?;
    graph
        .prev_functions(ret, &[PACKET_BORROW_NEXT_CHUNK], None)
        .into_iter()
        .find(|b| {
            graph
                .kind(*b)
                .and_then(NodeKind::as_call)
                .and_then(chunk_pointer)
                .is_some_and(|p| env.oracle.equivalent(p, pointer))
        })
}

/// Header fields a `packet_return_chunk` rewrites relative to the bytes its
/// borrow read. Empty when the header comes back untouched; `None` when the
/// call has no matching borrow.
pub(crate) fn modified_fields(
    env: &SearchEnv,
    graph: &TraceGraph,
    ret: NodeId,
) -> Option<Vec<ExprGroup>> {
    let borrow = matching_borrow(env, graph, ret)?;
    let original = graph.kind(borrow)?.as_call()?.get_arg("chunk")?.output.as_ref()?;
    let returned = graph.kind(ret)?.as_call()?.get_arg("the_chunk")?.input.as_ref()?;
    if env.oracle.equivalent(original, returned) {
        return Some(Vec::new());
    }
    let groups = graph.expr_groups(env.oracle.as_ref(), returned);
    let fields = match original {
        Expr::Symbol { name, .. } => groups
            .into_iter()
            .filter(|g| {
                !(g.symbol.as_deref() == Some(name.as_str()) && g.symbol_offset == g.offset)
            })
            .collect(),
        _ => vec![ExprGroup {
            symbol: None,
            symbol_offset: 0,
            offset: 0,
            width: returned.width(),
        }],
    };
    Some(fields)
}

/// Unmodified returns downstream of the borrow at `node` that pair with it.
fn folded_returns(env: &SearchEnv, graph: &TraceGraph, node: NodeId) -> Vec<NodeId> {
    graph
        .future_functions(node, &[PACKET_RETURN_CHUNK], None)
        .into_iter()
        .filter(|ret| matching_borrow(env, graph, *ret) == Some(node))
        .filter(|ret| modified_fields(env, graph, *ret).is_some_and(|f| f.is_empty()))
        .collect()
}

/// Constant chunk length of a borrow. Lengths past `u32::MAX` bytes are not
/// parseable.
fn chunk_length(env: &SearchEnv, call: &Call) -> Option<u32> {
    u32::try_from(constant_arg(env, call, "length")?).ok()
}

fn speculate_parse_header(
    env: &SearchEnv,
    ep: &ExecutionPlan,
    node: NodeId,
) -> Option<Speculation> {
    let call = call_to(ep, node, PACKET_BORROW_NEXT_CHUNK)?;
    chunk_length(env, call)?;
    call.get_arg("chunk")?.output.as_ref()?;
    Some(Speculation::free().skipping(folded_returns(env, ep.graph(), node)))
}

fn commit_parse_header(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let Some(call) = call_to(ep, node, PACKET_BORROW_NEXT_CHUNK) else {
        return Vec::new();
    };
    let (Some(target), Some(length), Some(chunk)) = (
        leaf_target(ep),
        chunk_length(env, call),
        call.get_arg("chunk").and_then(|a| a.output.clone()),
    ) else {
        return Vec::new();
    };
    let folded = folded_returns(env, ep.graph(), node);
    let mut child = ep.derive();
    let next = child.graph().next(node);
    child.process_leaf(Module::parse_header(target, node, chunk, length), next);
    vec![Candidate::new(child).skipping(folded)]
}

fn speculate_modify_header(
    env: &SearchEnv,
    ep: &ExecutionPlan,
    node: NodeId,
) -> Option<Speculation> {
    call_to(ep, node, PACKET_RETURN_CHUNK)?;
    let fields = modified_fields(env, ep.graph(), node)?;
    (!fields.is_empty()).then(Speculation::free)
}

fn commit_modify_header(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
    let (Some(target), Some(fields)) =
        (leaf_target(ep), modified_fields(env, ep.graph(), node))
    else {
        return Vec::new();
    };
    if fields.is_empty() {
        return Vec::new();
    }
    let mut child = ep.derive();
    let next = child.graph().next(node);
    child.process_leaf(Module::modify_header(target, node, fields), next);
    vec![Candidate::new(child)]
}
