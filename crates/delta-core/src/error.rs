//! Error kinds surfaced by the core crate (spec §7).
//!
//! Every variant is fatal for the operation that raised it; none are retried at the
//! library boundary, and partial state in a failed iterator is not recoverable.

use thiserror::Error;

use crate::id::NodeId;
use crate::types::Type;

/// Failures from the type system and the builder that sits on top of it.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("cannot unify {a} with {b}")]
    UnificationError { a: String, b: String },

    #[error("occurs check failed: type variable would reference itself")]
    OccursCheck,

    #[error("inconsistent ordering: edge ({x}, {y}) is both required and forbidden")]
    InconsistentOrdering { x: NodeId, y: NodeId },

    #[error("derivative of {ty} with respect to event {event} is undefined")]
    DerivativeError { ty: String, event: String },

    #[error("unexpected tag event during execution at node {node}: {detail}")]
    RuntimeTagError { node: NodeId, detail: String },

    #[error("var node {node} ('{name}') has no bound source iterator")]
    UnboundVar { node: NodeId, name: String },

    #[error("{operation} is not yet implemented for backend {backend}")]
    NotYetImplemented {
        operation: String,
        backend: String,
    },

    #[error("illegal {op}: overlapping free variables between operands")]
    OverlappingVars { op: String },

    #[error("buffer expression evaluation failed: {detail}")]
    BufferEvalError { detail: String },
}

impl CoreError {
    pub fn unification(a: &Type, b: &Type) -> Self {
        CoreError::UnificationError {
            a: format!("{a:?}"),
            b: format!("{b:?}"),
        }
    }
}
