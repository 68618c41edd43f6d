//! Search-and-transformation engine of the synapse synthesizer.
//!
//! Lowers a [`TraceGraph`](synapse_core::TraceGraph) into an
//! [`ExecutionPlan`]: a tree of target-specific [`Module`]s chosen by a
//! best-first search over candidate lowerings proposed by registered
//! [`Generator`]s.
//!
//! # Architecture
//!
//! - [`ledger`]: per-candidate resource placement registry and cost state
//! - [`profiler`]: path-keyed traffic model
//! - [`estimator`]: pluggable cache hit-rate estimation
//! - [`perf`]: additive traffic-class counters
//! - [`placement`]: physical resource descriptors and the capacity oracle
//! - [`module`]: emitted behavior per target
//! - [`plan`]: execution plans, their tree and open leaves
//! - [`generator`]: the speculate/commit contract and the registry
//! - [`search`]: the engine and the top-level [`synthesize`] entry point
//! - [`library`]: a reference generator library
//! - [`config`]: cost weights and tuning knobs
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod estimator;
pub mod generator;
pub mod ledger;
pub mod library;
pub mod module;
pub mod perf;
pub mod placement;
pub mod plan;
pub mod profiler;
pub mod search;
pub mod target;

pub use config::{CommitPolicy, CostWeights, LibraryConfig, SearchConfig};
pub use error::{PlacementError, RegistryError, SynthesisError};
pub use estimator::{HitRateEstimator, IndependentFlowEstimator};
pub use generator::{Candidate, CostDelta, Generator, GeneratorRegistry, SearchEnv, Speculation};
pub use ledger::{DsImpl, Ledger};
pub use module::{Module, ModuleKind, SoftwareModule, SwitchModule};
pub use perf::PerfOracle;
pub use placement::{
    CapacityModel, CapacityState, PlacementOracle, Resource, ResourceId, ResourceKind,
    ResourceRequest,
};
pub use plan::{EpId, EpLeaf, EpNode, EpNodeId, EpState, ExecutionPlan};
pub use profiler::{FlowStats, Profiler};
pub use search::{synthesize, synthesize_ranked, SearchEngine, SearchStats, SynthesisOutcome};
pub use target::TargetType;
