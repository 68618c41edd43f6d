use synapse_core::{NodeId, ObjAddr};
use thiserror::Error;

use crate::ledger::DsImpl;
use crate::module::ModuleKind;
use crate::target::TargetType;

/// Rejections from the resource ledger. These are ordinary "no match"
/// outcomes for the generator that asked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("object {obj} is already implemented as {existing:?} on {target}, cannot use {requested:?}")]
    Conflict {
        target: TargetType,
        obj: ObjAddr,
        existing: DsImpl,
        requested: DsImpl,
    },

    #[error("{imp:?} is not available on {target}")]
    WrongTarget { target: TargetType, imp: DsImpl },

    #[error("resource for object {obj} does not fit on {target}")]
    DoesNotFit { target: TargetType, obj: ObjAddr },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("generator '{name}' is declared for {declared_target}/{declared_kind:?}, registered as {target}/{kind:?}")]
    Mismatch {
        name: &'static str,
        target: TargetType,
        kind: ModuleKind,
        declared_target: TargetType,
        declared_kind: ModuleKind,
    },

    #[error("module kind {kind:?} cannot be emitted for {target}")]
    KindUnavailable { target: TargetType, kind: ModuleKind },

    #[error("generator '{name}' is already registered for {target}/{kind:?}")]
    Duplicate {
        name: &'static str,
        target: TargetType,
        kind: ModuleKind,
    },
}

/// Why synthesis produced no plan.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    #[error("no lowering found: node {node} ({operation}) has no applicable generator")]
    NoLoweringFound {
        node: NodeId,
        operation: String,
        /// Rendering of the most advanced plan that got stuck.
        best_partial: Option<String>,
    },

    #[error("no target enabled")]
    NoTargets,

    #[error("initial target {target} is not enabled")]
    TargetDisabled { target: TargetType },

    #[error("trace graph is empty")]
    EmptyTrace,

    #[error("search budget exhausted after {iterations} iterations")]
    BudgetExhausted { iterations: usize },

    /// Every open plan was discarded by the frontier budget before any plan
    /// got stuck or completed.
    #[error("frontier budget of {max_frontier} plans pruned every open plan ({pruned} discarded)")]
    FrontierExhausted { max_frontier: usize, pruned: usize },
}
