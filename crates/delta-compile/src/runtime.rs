//! The Runtime API shared by all three backends (spec §6): bind inputs, pull to the next
//! event or exhaustion, reset. Grounded on `lmlang-codegen`'s `CompiledModule`-style
//! handle returned from its `compile` entry point, generalised from a JIT-executable
//! handle to a plain Rust iterator driver.

use delta_core::{Event, NodeId};

use crate::error::CompileError;

/// One step of a compiled node's evaluation — identical in shape to the reference
/// interpreter's `PullResult`, since the observable contract (spec §4.3) is shared by
/// every implementation of `pull`, compiled or not.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Done,
    Skip,
    Event(Event),
}

/// A compiled program, ready to be driven once its input `Var`s are bound.
pub trait CompiledProgram {
    fn bind(&mut self, var: NodeId, source: Box<dyn Iterator<Item = Event>>);

    /// Pull the output node until it yields an event or is exhausted.
    fn next_event(&mut self) -> Result<Option<Event>, CompileError>;

    /// Restore every node's own state and drop all input bindings.
    fn reset(&mut self);

    fn input_vars(&self) -> &[NodeId];

    /// Drive to exhaustion, collecting every event.
    fn run_to_exhaustion(&mut self) -> Result<Vec<Event>, CompileError> {
        let mut out = Vec::new();
        while let Some(e) = self.next_event()? {
            out.push(e);
        }
        Ok(out)
    }
}
