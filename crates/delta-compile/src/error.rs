//! Compile- and run-time error types for the three backends (spec §4.4, §7), grounded on
//! `lmlang-codegen/src/error.rs`'s shape: one enum covering both "this program can't be
//! lowered to this backend" and "this compiled iterator failed while running".

use delta_core::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Direct,
    Cps,
    Coroutine,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Direct => write!(f, "direct"),
            Backend::Cps => write!(f, "cps"),
            Backend::Coroutine => write!(f, "coroutine"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("node {node}: {operation} is not supported by the {backend} backend")]
    NotYetImplemented {
        node: NodeId,
        operation: String,
        backend: Backend,
    },

    #[error("var node {node} ('{name}') has no bound source iterator")]
    UnboundVar { node: NodeId, name: String },

    #[error("unexpected tag event at node {node}: {detail}")]
    UnexpectedTag { node: NodeId, detail: String },

    #[error("step budget of {limit} exhausted without reaching Done (node {node})")]
    StepBudgetExceeded { node: NodeId, limit: usize },

    #[error("buffer expression evaluation failed at node {node}: {detail}")]
    BufferEvalError { node: NodeId, detail: String },
}
