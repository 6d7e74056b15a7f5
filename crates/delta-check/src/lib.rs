//! The reference interpreter and test tooling for the event-stream combinator system:
//! driving `delta_core::Program`'s `pull` contract to exhaustion (spec §4.3, §5), an
//! execution trace facility, and the random generator behind the Testing API's
//! `events_of_type` (spec §6).

pub mod error;
pub mod interpreter;
pub mod testing;

pub use error::RuntimeError;
pub use interpreter::{Interpreter, InterpreterConfig, PullResult, TraceEntry, TracedResult};
pub use testing::events_of_type;
