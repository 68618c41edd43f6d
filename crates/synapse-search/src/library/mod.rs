//! Reference generator library.
//!
//! Enough generators to lower common network-function traces end to end:
//!
//! - [`common`]: branches, terminals, header parsing and no-op calls, for
//!   every target
//! - [`switch`]: match-action tables, cached tables and the hand-off of
//!   traffic to the switch CPU or the controller
//! - [`software`]: the stateful primitives of the switch CPU and the
//!   controller
//!
//! # Trace conventions
//!
//! | function | arguments |
//! |----------|-----------|
//! | `packet_borrow_next_chunk` | `length` (constant), `chunk` (pointer, `output` = header bytes) |
//! | `packet_return_chunk` | `the_chunk` (pointer, `input` = header bytes at return) |
//! | `map_get` | `map` (object), `key`, `value_out` (`output` = value) |
//! | `map_put` | `map` (object), `key`, `value` |
//! | `dchain_allocate_new_index` | `chain` (object), `index_out` |
//! | `vector_borrow` | `vector` (object), `index`, `val_out` |
//! | `vector_return` | `vector` (object), `index`, `value` |
//!
//! Object arguments must be constant addresses.

pub mod common;
pub mod software;
pub mod switch;

use synapse_core::{Call, NodeId, ObjAddr};

use crate::error::RegistryError;
use crate::generator::{CommitFn, Generator, GeneratorRegistry, SearchEnv, SpeculateFn};
use crate::module::ModuleKind;
use crate::plan::ExecutionPlan;
use crate::target::TargetType;

pub const PACKET_BORROW_NEXT_CHUNK: &str = "packet_borrow_next_chunk";
pub const PACKET_RETURN_CHUNK: &str = "packet_return_chunk";
pub const MAP_GET: &str = "map_get";
pub const MAP_PUT: &str = "map_put";
pub const DCHAIN_ALLOCATE_NEW_INDEX: &str = "dchain_allocate_new_index";
pub const VECTOR_BORROW: &str = "vector_borrow";
pub const VECTOR_RETURN: &str = "vector_return";

/// Calls that carry no packet-processing behavior.
pub const IGNORED_FUNCTIONS: &[&str] = &["current_time", "nf_set_rte_ipv4_udptcp_checksum"];

/// Builds a registry with every generator of the library.
pub fn registry() -> Result<GeneratorRegistry, RegistryError> {
    let mut registry = GeneratorRegistry::new();
    for generator in generators() {
        registry.register(generator.target, generator.kind, generator)?;
    }
    Ok(registry)
}

/// Every generator of the library, switch first.
pub fn generators() -> Vec<Generator> {
    let mut out = Vec::new();
    for target in TargetType::ALL {
        out.extend(common::generators(target));
        if target.is_software() {
            out.extend(software::generators(target));
        } else {
            out.extend(switch::generators());
        }
    }
    out
}

pub(crate) fn generator(
    name: &'static str,
    target: TargetType,
    kind: ModuleKind,
    speculate: SpeculateFn,
    commit: CommitFn,
) -> Generator {
    Generator {
        name,
        target,
        kind,
        speculate,
        commit,
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub(crate) fn leaf_target(ep: &ExecutionPlan) -> Option<TargetType> {
    ep.active_leaf().map(|l| l.target)
}

/// The call at `node`, if it calls `function`.
pub(crate) fn call_to<'a>(ep: &'a ExecutionPlan, node: NodeId, function: &str) -> Option<&'a Call> {
    ep.graph()
        .kind(node)?
        .as_call()
        .filter(|c| c.function == function)
}

pub(crate) fn constant_arg(env: &SearchEnv, call: &Call, arg: &str) -> Option<u64> {
    env.oracle.constant_value(&call.get_arg(arg)?.expr).ok()
}

pub(crate) fn object_arg(env: &SearchEnv, call: &Call, arg: &str) -> Option<ObjAddr> {
    constant_arg(env, call, arg).map(ObjAddr)
}
