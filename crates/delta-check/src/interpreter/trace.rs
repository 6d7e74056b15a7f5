//! Execution trace recording for the reference interpreter.
//!
//! When tracing is enabled via [`super::state::InterpreterConfig::trace_enabled`], the
//! interpreter records a [`TraceEntry`] for every non-skip `pull`, capturing the node id
//! and the result it produced.

use delta_core::{Event, NodeId};

/// What a single `pull` step produced, for trace purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum TracedResult {
    Done,
    Skip,
    Event(Event),
}

/// A single entry in the execution trace, recording one `pull` call.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// The node that was pulled.
    pub node_id: NodeId,
    /// What the pull produced.
    pub result: TracedResult,
}
