//! Runtime error types produced while driving the reference interpreter (spec §7).
//!
//! Every variant traces back to a failure kind that can arise during execution rather
//! than at build time; construction failures (`UnificationError`, `InconsistentOrdering`,
//! ...) never reach here since they abort the builder first, and are surfaced as
//! [`delta_core::CoreError`] directly.

use delta_core::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while pulling a compiled-or-interpreted stream to exhaustion.
///
/// All variants include the [`NodeId`] of the node that raised them, matching the
/// teacher's node-id-carrying `RuntimeError` shape.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum RuntimeError {
    #[error("unexpected tag event at node {node}: {detail}")]
    UnexpectedTag { node: NodeId, detail: String },

    #[error("var node {node} ('{name}') has no bound source iterator")]
    UnboundVar { node: NodeId, name: String },

    #[error("derivative of event at node {node} is undefined: {detail}")]
    IllTypedEvent { node: NodeId, detail: String },

    #[error("node {node}: {operation} is not yet implemented for backend {backend}")]
    NotYetImplemented {
        node: NodeId,
        operation: String,
        backend: String,
    },

    #[error("step budget of {limit} exhausted without reaching Done (node {node})")]
    StepBudgetExceeded { node: NodeId, limit: usize },

    #[error("buffer expression evaluation failed at node {node}: {detail}")]
    BufferEvalError { node: NodeId, detail: String },
}
