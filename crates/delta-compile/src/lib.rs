//! Three ahead-of-time compiled backends over a `delta_core::Program`: direct recursion,
//! a continuation-passing trampoline, and a coroutine-style backend with full
//! `WaitOp`/`EmitOp` semantics. Grounded on `lmlang-codegen`'s multi-strategy compile
//! entry point, generalised from emitting LLVM IR for one target to driving a Rust
//! iterator for one of three execution strategies.
//!
//! None of the three produce machine code: a stream program has no fixed arity or return
//! type to JIT against, so "compiled" here means "validated ahead of time and given its
//! own independent node state", not "lowered to native instructions".

pub mod context;
pub mod coroutine;
pub mod cps;
pub mod direct;
pub mod error;
pub mod runtime;

pub use context::{CompilationContext, CompiledKind, CompiledNode};
pub use coroutine::CoroutineProgram;
pub use cps::CpsProgram;
pub use direct::DirectProgram;
pub use error::{Backend, CompileError};
pub use runtime::{CompiledProgram, StepResult};

use delta_core::Program;

/// Compile `program` for `backend`, performing every ahead-of-time rejection
/// (`WaitOp`/`EmitOp` on [`Backend::Direct`], `Par*` on every backend) before returning.
pub fn compile(program: &Program, backend: Backend) -> Result<Box<dyn CompiledProgram>, CompileError> {
    match backend {
        Backend::Direct => Ok(Box::new(DirectProgram::compile(program)?)),
        Backend::Cps => Ok(Box::new(CpsProgram::compile(program)?)),
        Backend::Coroutine => Ok(Box::new(CoroutineProgram::compile(program)?)),
    }
}
