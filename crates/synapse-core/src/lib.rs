//! Trace Graph IR for the synapse synthesizer.
//!
//! The trace graph is the symbolic execution trace of a verified network
//! function: a mostly-linear decision diagram of primitive calls, branches and
//! terminal routing decisions. Search candidates own private clones of it and
//! edit them through the primitives in [`edit`].
//!
//! # Modules
//!
//! - [`id`]: stable id newtypes
//! - [`expr`]: serializable symbolic expressions
//! - [`oracle`]: the expression oracle interface and a structural reference oracle
//! - [`node`]: node payloads (calls, branches, terminals) and symbols
//! - [`edge`]: graph link kinds
//! - [`graph`]: the arena-backed [`TraceGraph`]
//! - [`edit`]: structural editing primitives
//! - [`serialize`]: JSON input format
//! - [`error`]: [`CoreError`]

pub mod edge;
pub mod edit;
pub mod error;
pub mod expr;
pub mod graph;
pub mod id;
pub mod node;
pub mod oracle;
pub mod serialize;

// Re-export commonly used types
pub use edge::TraceEdge;
pub use edit::{BranchRemoval, BranchSide};
pub use error::CoreError;
pub use expr::Expr;
pub use graph::TraceGraph;
pub use id::{NodeId, ObjAddr};
pub use node::{Call, CallArg, NodeKind, Route, Symbol, TraceNode};
pub use oracle::{ExprGroup, ExprOracle, StructuralOracle};
