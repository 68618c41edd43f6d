//! Stateful primitives on the software targets.
//!
//! The switch CPU and the controller implement every map, vector and index
//! allocator in memory, so these generators only record the implementation
//! decision and emit the matching module.

use synapse_core::NodeId;

use super::{
    call_to, generator, leaf_target, object_arg, DCHAIN_ALLOCATE_NEW_INDEX, MAP_GET, MAP_PUT,
    VECTOR_BORROW, VECTOR_RETURN,
};
use crate::generator::{Candidate, Generator, SearchEnv, Speculation};
use crate::ledger::DsImpl;
use crate::module::{Module, ModuleKind, SoftwareModule};
use crate::plan::ExecutionPlan;
use crate::target::TargetType;

macro_rules! stateful {
    ($speculate:ident, $commit:ident, $function:expr, $arg:literal, $imp:expr, $variant:ident) => {
        fn $speculate(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Option<Speculation> {
            let target = leaf_target(ep).filter(|t| t.is_software())?;
            let obj = object_arg(env, call_to(ep, node, $function)?, $arg)?;
            ep.ledger().can_impl_ds(target, obj, $imp).then(Speculation::free)
        }

        fn $commit(env: &SearchEnv, ep: &ExecutionPlan, node: NodeId) -> Vec<Candidate> {
            let Some(target) = leaf_target(ep).filter(|t| t.is_software()) else {
                return Vec::new();
            };
            let obj = call_to(ep, node, $function).and_then(|c| object_arg(env, c, $arg));
            let Some(obj) = obj else {
                return Vec::new();
            };
            let mut child = ep.derive();
            if child.ledger_mut().save_ds_impl(target, obj, $imp).is_err() {
                return Vec::new();
            }
            let next = child.graph().next(node);
            let module = Module::software(target, SoftwareModule::$variant { node, obj });
            child.process_leaf(module, next);
            vec![Candidate::new(child)]
        }
    };
}

stateful!(speculate_map_get, commit_map_get, MAP_GET, "map", DsImpl::SoftwareMap, MapGet);
stateful!(speculate_map_put, commit_map_put, MAP_PUT, "map", DsImpl::SoftwareMap, MapPut);
stateful!(
    speculate_chain_allocate,
    commit_chain_allocate,
    DCHAIN_ALLOCATE_NEW_INDEX,
    "chain",
    DsImpl::SoftwareChain,
    ChainAllocate
);
stateful!(
    speculate_vector_read,
    commit_vector_read,
    VECTOR_BORROW,
    "vector",
    DsImpl::SoftwareVector,
    VectorRead
);
stateful!(
    speculate_vector_write,
    commit_vector_write,
    VECTOR_RETURN,
    "vector",
    DsImpl::SoftwareVector,
    VectorWrite
);

/// # Panics
///
/// Panics if `target` is the switch.
pub fn generators(target: TargetType) -> Vec<Generator> {
    assert!(target.is_software(), "{} has no software generators", target);
    vec![
        generator("map_get", target, ModuleKind::MapGet, speculate_map_get, commit_map_get),
        generator("map_put", target, ModuleKind::MapPut, speculate_map_put, commit_map_put),
        generator(
            "chain_allocate",
            target,
            ModuleKind::ChainAllocate,
            speculate_chain_allocate,
            commit_chain_allocate,
        ),
        generator(
            "vector_read",
            target,
            ModuleKind::VectorRead,
            speculate_vector_read,
            commit_vector_read,
        ),
        generator(
            "vector_write",
            target,
            ModuleKind::VectorWrite,
            speculate_vector_write,
            commit_vector_write,
        ),
    ]
}
