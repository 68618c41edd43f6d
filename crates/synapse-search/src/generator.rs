//! The generator contract.
//!
//! A [`Generator`] proposes lowerings of a single trace node for one target
//! and one module kind. It is a pair of plain functions:
//!
//! - `speculate` is a cheap, side-effect-free applicability check returning
//!   the cost the lowering would add and the nodes it would fold away, or
//!   `None` when the generator does not apply;
//! - `commit` builds the child plans. Each candidate owns a derived copy of
//!   the parent plan, so the parent is never mutated.
//!
//! Generators live in a [`GeneratorRegistry`] keyed by target and kind.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use synapse_core::{ExprOracle, NodeId, StructuralOracle};

use crate::config::{CostWeights, LibraryConfig};
use crate::error::RegistryError;
use crate::estimator::{HitRateEstimator, IndependentFlowEstimator};
use crate::module::ModuleKind;
use crate::perf::PerfOracle;
use crate::placement::{CapacityModel, PlacementOracle};
use crate::plan::ExecutionPlan;
use crate::target::TargetType;

/// The cost a lowering would add to its plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostDelta {
    pub perf: PerfOracle,
    /// Fixed cost, including placed memory.
    pub resource_cost: f64,
}

impl CostDelta {
    pub fn cost(&self, weights: &CostWeights) -> f64 {
        self.perf.cost(weights) + self.resource_cost
    }
}

/// Result of a successful `speculate`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Speculation {
    pub delta: CostDelta,
    /// Trace nodes the lowering accounts for besides the target node.
    pub skip: BTreeSet<NodeId>,
}

impl Speculation {
    /// A lowering that adds no cost.
    pub fn free() -> Self {
        Speculation::default()
    }

    pub fn with_perf(perf: PerfOracle) -> Self {
        Speculation {
            delta: CostDelta {
                perf,
                resource_cost: 0.0,
            },
            skip: BTreeSet::new(),
        }
    }

    pub fn skipping(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.skip.extend(nodes);
        self
    }
}

/// One child plan produced by `commit`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub plan: ExecutionPlan,
    /// Trace nodes the child accounts for besides the target node.
    pub skipped: BTreeSet<NodeId>,
    /// Human-readable parameters distinguishing sibling candidates.
    pub params: String,
}

impl Candidate {
    pub fn new(plan: ExecutionPlan) -> Self {
        Candidate {
            plan,
            skipped: BTreeSet::new(),
            params: String::new(),
        }
    }

    pub fn skipping(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.skipped.extend(nodes);
        self
    }

    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }
}

pub type SpeculateFn = fn(&SearchEnv, &ExecutionPlan, NodeId) -> Option<Speculation>;
pub type CommitFn = fn(&SearchEnv, &ExecutionPlan, NodeId) -> Vec<Candidate>;

#[derive(Clone, Copy)]
pub struct Generator {
    pub name: &'static str,
    pub target: TargetType,
    pub kind: ModuleKind,
    pub speculate: SpeculateFn,
    pub commit: CommitFn,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Generators by target, in registration order.
#[derive(Debug, Clone, Default)]
pub struct GeneratorRegistry {
    generators: IndexMap<TargetType, Vec<Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        GeneratorRegistry::default()
    }

    /// Adds `generator` under `target` and `kind`, which must match what the
    /// generator declares and what the target supports.
    pub fn register(
        &mut self,
        target: TargetType,
        kind: ModuleKind,
        generator: Generator,
    ) -> Result<(), RegistryError> {
        if generator.target != target || generator.kind != kind {
            return Err(RegistryError::Mismatch {
                name: generator.name,
                target,
                kind,
                declared_target: generator.target,
                declared_kind: generator.kind,
            });
        }
        if !kind.available_on(target) {
            return Err(RegistryError::KindUnavailable { target, kind });
        }
        let bucket = self.generators.entry(target).or_default();
        if bucket.iter().any(|g| g.name == generator.name && g.kind == kind) {
            return Err(RegistryError::Duplicate {
                name: generator.name,
                target,
                kind,
            });
        }
        bucket.push(generator);
        Ok(())
    }

    pub fn for_target(&self, target: TargetType) -> &[Generator] {
        self.generators.get(&target).map_or(&[], |g| g.as_slice())
    }

    pub fn len(&self) -> usize {
        self.generators.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read-only context shared by every generator call of a search.
#[derive(Clone)]
pub struct SearchEnv {
    pub oracle: Arc<dyn ExprOracle>,
    pub estimator: Arc<dyn HitRateEstimator>,
    pub weights: CostWeights,
    pub library: LibraryConfig,
    placement: BTreeMap<TargetType, Arc<dyn PlacementOracle>>,
    unbounded: Arc<dyn PlacementOracle>,
}

impl Default for SearchEnv {
    fn default() -> Self {
        SearchEnv::new(CostWeights::default())
    }
}

impl SearchEnv {
    /// An environment with the structural oracle, the independent-flow
    /// estimator and the default switch capacity.
    pub fn new(weights: CostWeights) -> Self {
        let mut placement: BTreeMap<TargetType, Arc<dyn PlacementOracle>> = BTreeMap::new();
        placement.insert(TargetType::Switch, Arc::new(CapacityModel::default()));
        SearchEnv {
            oracle: Arc::new(StructuralOracle::new()),
            estimator: Arc::new(IndependentFlowEstimator),
            weights,
            library: LibraryConfig::default(),
            placement,
            unbounded: Arc::new(CapacityModel::unbounded()),
        }
    }

    pub fn with_placement(mut self, target: TargetType, oracle: Arc<dyn PlacementOracle>) -> Self {
        self.placement.insert(target, oracle);
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn HitRateEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ExprOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_library(mut self, library: LibraryConfig) -> Self {
        self.library = library;
        self
    }

    /// The placement oracle of `target`; targets without one are unbounded.
    pub fn placement(&self, target: TargetType) -> &dyn PlacementOracle {
        self.placement.get(&target).unwrap_or(&self.unbounded).as_ref()
    }
}
