//! The reference interpreter (spec §4.3, §5, §6's Runtime API), driven directly against
//! a [`delta_core::graph::Program`]'s own per-node state.

pub mod state;
pub mod trace;

pub use state::{Interpreter, InterpreterConfig, PullResult};
pub use trace::{TraceEntry, TracedResult};
