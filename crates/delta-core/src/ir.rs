//! The stream IR: ~20 operator variants with per-node mutable state (spec §3.3).
//!
//! Node state here belongs to the IR itself and is shared by the reference interpreter
//! (`delta-check`), which drives `pull`/`reset` directly against it — matching the
//! original prototype's single-live-run-at-a-time model (§5: single-threaded,
//! cooperative, one conceptual task). Compiled backends (`delta-compile`) read this
//! structure to learn operator shape but allocate their own independent state blocks per
//! iterator instance, per spec §9's "node state lives on the iterator, not the IR" note
//! applied to *compiled* iterators specifically.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use crate::buffer::WaitBuffer;
use crate::bufferop::BufferOp;
use crate::id::NodeId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatRPhase {
    First,
    Second,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitPhase {
    Serializing,
    Emitting,
}

/// One of the ~20 operator variants of spec §3.3. Children are referenced by arena
/// [`NodeId`], never owned directly, per the design note on back-edges through `ResetOp`.
pub enum StreamOpKind {
    Var {
        name: String,
    },
    Eps,
    Singleton {
        value: crate::value::Value,
        emitted: Cell<bool>,
    },
    CatR {
        s1: NodeId,
        s2: NodeId,
        phase: Cell<CatRPhase>,
    },
    /// Not directly pulled; `pull_for_position` is called by its two `CatProj` peers.
    CatProjCoordinator {
        s: NodeId,
        seen_punc: Cell<bool>,
        exhausted: Cell<bool>,
    },
    CatProj {
        coordinator: NodeId,
        position: u8,
    },
    SumInj {
        s: NodeId,
        position: u8,
        tag_emitted: Cell<bool>,
    },
    CaseOp {
        s: NodeId,
        branches: [NodeId; 2],
        tag_read: Cell<bool>,
        /// -1 = not yet chosen, else 0/1.
        active: Cell<i8>,
    },
    CondOp {
        cond: NodeId,
        branches: [NodeId; 2],
        active: Cell<i8>,
    },
    UnsafeCast {
        s: NodeId,
    },
    SinkThen {
        s1: NodeId,
        s2: NodeId,
        first_exhausted: Cell<bool>,
    },
    /// Resets every node in `set` on a single pull, yielding a skip. Stores ids, not
    /// owned nodes, since `set` can reference nodes that textually precede it. `set` is
    /// populated once, after the fact, by the builder's reset-block helper (the reset
    /// node must exist, with a usable id, before the body that determines its captured
    /// set has even run) — a `RefCell` for that one post-hoc write, not a sign of
    /// ongoing mutability.
    ResetOp {
        set: RefCell<Vec<NodeId>>,
    },
    WaitOp {
        s: NodeId,
        buffer: RefCell<Box<dyn WaitBuffer>>,
    },
    EmitOp {
        buffer_op: BufferOp,
        phase: Cell<EmitPhase>,
        event_buffer: RefCell<Vec<crate::event::Event>>,
        idx: Cell<usize>,
    },
    /// Interleaves two streams with no ordering between them. Carried for the reference
    /// interpreter and type system only (SPEC_FULL.md §2) — not part of spec.md's
    /// official ~20-variant table, and rejected by every `delta-compile` backend.
    ParR {
        s1: NodeId,
        s2: NodeId,
        s1_done: Cell<bool>,
        s2_done: Cell<bool>,
        next_is_s1: Cell<bool>,
    },
    ParProjCoordinator {
        s: NodeId,
        exhausted: Cell<bool>,
    },
    ParProj {
        coordinator: NodeId,
        position: u8,
    },
}

/// A node in the stream-IR arena: its type, structural identity, free variables, and
/// mutable operator state.
pub struct StreamNode {
    pub stream_type: Type,
    /// `hash(kind, child_1.struct_id, ...)`, except `Eps` (and `ResetOp`, whose identity
    /// derives from captured node ids) which get a fresh id per spec §4.3.
    pub struct_id: u64,
    /// The set of `Var` nodes this node transitively depends on.
    pub vars: BTreeSet<NodeId>,
    pub kind: StreamOpKind,
}

impl StreamNode {
    /// Restore this node's own fields to their initial state. Children are untouched —
    /// recursive resets happen only through `ResetOp`'s captured set, per spec §4.3.
    pub fn reset(&self) {
        match &self.kind {
            StreamOpKind::Var { .. }
            | StreamOpKind::Eps
            | StreamOpKind::UnsafeCast { .. }
            | StreamOpKind::CatProj { .. }
            | StreamOpKind::ParProj { .. }
            | StreamOpKind::ResetOp { .. } => {}
            StreamOpKind::Singleton { emitted, .. } => emitted.set(false),
            StreamOpKind::CatR { phase, .. } => phase.set(CatRPhase::First),
            StreamOpKind::CatProjCoordinator { seen_punc, exhausted, .. } => {
                seen_punc.set(false);
                exhausted.set(false);
            }
            StreamOpKind::SumInj { tag_emitted, .. } => tag_emitted.set(false),
            StreamOpKind::CaseOp { tag_read, active, .. } => {
                tag_read.set(false);
                active.set(-1);
            }
            StreamOpKind::CondOp { active, .. } => active.set(-1),
            StreamOpKind::SinkThen { first_exhausted, .. } => first_exhausted.set(false),
            StreamOpKind::WaitOp { s: _, buffer } => {
                let ty = self.stream_type.clone();
                *buffer.borrow_mut() = crate::buffer::make_buffer(&ty);
            }
            StreamOpKind::EmitOp { phase, event_buffer, idx, .. } => {
                phase.set(EmitPhase::Serializing);
                event_buffer.borrow_mut().clear();
                idx.set(0);
            }
            StreamOpKind::ParR { s1_done, s2_done, next_is_s1, .. } => {
                s1_done.set(false);
                s2_done.set(false);
                next_is_s1.set(true);
            }
            StreamOpKind::ParProjCoordinator { exhausted, .. } => exhausted.set(false),
        }
    }
}
