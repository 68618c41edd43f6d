//! Core error types for synapse-core.
//!
//! Uses `thiserror` for structured, matchable error variants. These cover
//! recoverable failures on external input (malformed traces, non-constant
//! expressions). Structural misuse of the editing API is a panic instead.

use crate::expr::Expr;
use crate::id::NodeId;
use thiserror::Error;

/// Core errors produced by the synapse-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node id was not found in the trace graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// The trace violates a structural invariant.
    #[error("invalid trace: {reason}")]
    InvalidTrace { reason: String },

    /// A second root was attached to a graph that already has one.
    #[error("trace graph already has root NodeId({existing})", existing = existing.0)]
    DuplicateRoot { existing: NodeId },

    /// The expression oracle was asked for the value of a symbolic expression.
    #[error("expression is not constant: {expr}")]
    NotConstant { expr: Expr },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
