//! Shared compiled-node state, built once per `compile()` call and read by whichever
//! backend executor drives it. Grounded on `lmlang-codegen/src/compiler.rs`'s separation
//! of a context-building pass from the actual per-target lowering, generalised from
//! LLVM-module-building to allocating this crate's own per-node state blocks — per
//! `delta_core::ir`'s module doc, a compiled iterator never touches the IR's own `Cell`
//! fields, so this mirrors `StreamOpKind`'s shape with independent cells of its own.

use std::cell::{Cell, RefCell};

use delta_core::bufferop::BufferOp;
use delta_core::buffer::{self, WaitBuffer};
use delta_core::ir::{CatRPhase, EmitPhase, StreamOpKind};
use delta_core::{Event, NodeId, Program, Type};

use crate::error::{Backend, CompileError};

/// A compiled node's operator shape and its own independent mutable state. Deliberately
/// excludes `ParR`/`ParProjCoordinator`/`ParProj`: all three backends reject those at
/// `compile()` time (SPEC_FULL.md §2), so no compiled representation of them is ever
/// constructed.
pub enum CompiledKind {
    Var { name: String },
    Eps,
    Singleton { value: delta_core::Value, emitted: Cell<bool> },
    CatR { s1: NodeId, s2: NodeId, phase: Cell<CatRPhase> },
    CatProjCoordinator { s: NodeId, seen_punc: Cell<bool>, exhausted: Cell<bool> },
    CatProj { coordinator: NodeId, position: u8 },
    SumInj { s: NodeId, position: u8, tag_emitted: Cell<bool> },
    CaseOp { s: NodeId, branches: [NodeId; 2], tag_read: Cell<bool>, active: Cell<i8> },
    CondOp { cond: NodeId, branches: [NodeId; 2], active: Cell<i8> },
    UnsafeCast { s: NodeId },
    SinkThen { s1: NodeId, s2: NodeId, first_exhausted: Cell<bool> },
    ResetOp { set: Vec<NodeId> },
    /// Structurally present even on backends that don't give it full semantics (the CPS
    /// backend treats it as a no-op, per SPEC_FULL.md §2) so every backend shares one
    /// compiled shape; the difference lives in the executor, not this context.
    WaitOp { s: NodeId, buffer: RefCell<Box<dyn WaitBuffer>> },
    EmitOp { buffer_op: BufferOp, phase: Cell<EmitPhase>, event_buffer: RefCell<Vec<Event>>, idx: Cell<usize> },
}

pub struct CompiledNode {
    pub stream_type: Type,
    pub kind: CompiledKind,
}

impl CompiledNode {
    /// Restore this node's own state; mirrors `delta_core::ir::StreamNode::reset`.
    pub fn reset(&self) {
        match &self.kind {
            CompiledKind::Var { .. }
            | CompiledKind::Eps
            | CompiledKind::UnsafeCast { .. }
            | CompiledKind::CatProj { .. }
            | CompiledKind::ResetOp { .. } => {}
            CompiledKind::Singleton { emitted, .. } => emitted.set(false),
            CompiledKind::CatR { phase, .. } => phase.set(CatRPhase::First),
            CompiledKind::CatProjCoordinator { seen_punc, exhausted, .. } => {
                seen_punc.set(false);
                exhausted.set(false);
            }
            CompiledKind::SumInj { tag_emitted, .. } => tag_emitted.set(false),
            CompiledKind::CaseOp { tag_read, active, .. } => {
                tag_read.set(false);
                active.set(-1);
            }
            CompiledKind::CondOp { active, .. } => active.set(-1),
            CompiledKind::SinkThen { first_exhausted, .. } => first_exhausted.set(false),
            CompiledKind::WaitOp { buffer, .. } => {
                *buffer.borrow_mut() = buffer::make_buffer(&self.stream_type);
            }
            CompiledKind::EmitOp { phase, event_buffer, idx, .. } => {
                phase.set(EmitPhase::Serializing);
                event_buffer.borrow_mut().clear();
                idx.set(0);
            }
        }
    }
}

/// The result of lowering a `Program` for a given backend: one independent
/// [`CompiledNode`] per arena node, plus the output and input-`Var` ids carried over
/// unchanged from the source graph.
pub struct CompilationContext {
    pub nodes: Vec<CompiledNode>,
    pub output: NodeId,
    pub input_vars: Vec<NodeId>,
}

impl CompilationContext {
    pub fn node(&self, id: NodeId) -> &CompiledNode {
        &self.nodes[id.0 as usize]
    }

    pub fn reset_all(&self) {
        for n in &self.nodes {
            n.reset();
        }
    }

    /// Walk `program` once, building an independent compiled node per arena node. Backend-
    /// specific rejections (`WaitOp`/`EmitOp` on [`Backend::Direct`]; `Par*` on every
    /// backend) are raised here, ahead of any `next()` call, rather than discovered at
    /// run time the way the reference interpreter's `NotYetImplemented` is.
    pub fn build(program: &Program, backend: Backend) -> Result<CompilationContext, CompileError> {
        let mut nodes = Vec::with_capacity(program.node_count());
        for i in 0..program.node_count() {
            let id = NodeId(i as u32);
            let src = program.node(id);
            let kind = match &src.kind {
                StreamOpKind::Var { name } => CompiledKind::Var { name: name.clone() },
                StreamOpKind::Eps => CompiledKind::Eps,
                StreamOpKind::Singleton { value, emitted } => {
                    CompiledKind::Singleton { value: value.clone(), emitted: Cell::new(emitted.get()) }
                }
                StreamOpKind::CatR { s1, s2, phase } => {
                    CompiledKind::CatR { s1: *s1, s2: *s2, phase: Cell::new(phase.get()) }
                }
                StreamOpKind::CatProjCoordinator { s, seen_punc, exhausted } => CompiledKind::CatProjCoordinator {
                    s: *s,
                    seen_punc: Cell::new(seen_punc.get()),
                    exhausted: Cell::new(exhausted.get()),
                },
                StreamOpKind::CatProj { coordinator, position } => {
                    CompiledKind::CatProj { coordinator: *coordinator, position: *position }
                }
                StreamOpKind::SumInj { s, position, tag_emitted } => {
                    CompiledKind::SumInj { s: *s, position: *position, tag_emitted: Cell::new(tag_emitted.get()) }
                }
                StreamOpKind::CaseOp { s, branches, tag_read, active } => CompiledKind::CaseOp {
                    s: *s,
                    branches: *branches,
                    tag_read: Cell::new(tag_read.get()),
                    active: Cell::new(active.get()),
                },
                StreamOpKind::CondOp { cond, branches, active } => {
                    CompiledKind::CondOp { cond: *cond, branches: *branches, active: Cell::new(active.get()) }
                }
                StreamOpKind::UnsafeCast { s } => CompiledKind::UnsafeCast { s: *s },
                StreamOpKind::SinkThen { s1, s2, first_exhausted } => {
                    CompiledKind::SinkThen { s1: *s1, s2: *s2, first_exhausted: Cell::new(first_exhausted.get()) }
                }
                StreamOpKind::ResetOp { set } => CompiledKind::ResetOp { set: set.borrow().clone() },
                StreamOpKind::WaitOp { s, .. } => {
                    if backend == Backend::Direct {
                        return Err(CompileError::NotYetImplemented {
                            node: id,
                            operation: "WaitOp".into(),
                            backend,
                        });
                    }
                    CompiledKind::WaitOp { s: *s, buffer: RefCell::new(buffer::make_buffer(&src.stream_type)) }
                }
                StreamOpKind::EmitOp { buffer_op, .. } => {
                    if backend == Backend::Direct {
                        return Err(CompileError::NotYetImplemented {
                            node: id,
                            operation: "EmitOp".into(),
                            backend,
                        });
                    }
                    CompiledKind::EmitOp {
                        buffer_op: buffer_op.clone(),
                        phase: Cell::new(EmitPhase::Serializing),
                        event_buffer: RefCell::new(Vec::new()),
                        idx: Cell::new(0),
                    }
                }
                StreamOpKind::ParR { .. } => {
                    return Err(CompileError::NotYetImplemented { node: id, operation: "ParR".into(), backend })
                }
                StreamOpKind::ParProjCoordinator { .. } => {
                    return Err(CompileError::NotYetImplemented {
                        node: id,
                        operation: "ParProjCoordinator".into(),
                        backend,
                    })
                }
                StreamOpKind::ParProj { .. } => {
                    return Err(CompileError::NotYetImplemented { node: id, operation: "ParProj".into(), backend })
                }
            };
            nodes.push(CompiledNode { stream_type: src.stream_type.clone(), kind });
        }
        Ok(CompilationContext { nodes, output: program.output(), input_vars: program.input_vars().to_vec() })
    }
}
