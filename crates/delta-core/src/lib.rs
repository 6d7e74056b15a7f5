//! Core data model for the event-stream combinator system: the stream-type algebra,
//! events, the stream IR and its arena, the realized-ordering constraint system, and
//! the builder that traces combinator calls into that IR.
//!
//! Grounded throughout on `examples/snowdamiz-lmlang`'s `lmlang-core` crate (see
//! `/root/crate/DESIGN.md` for the module-by-module ledger); reference-interpreter and
//! compiler-backend logic live in the sibling `delta-check`/`delta-compile` crates.

pub mod builder;
pub mod buffer;
pub mod bufferop;
pub mod derivative;
pub mod error;
pub mod event;
pub mod graph;
pub mod id;
pub mod ir;
pub mod ordering;
pub mod partial_order;
pub mod types;
pub mod value;

pub use builder::Builder;
pub use buffer::{make_buffer, value_to_events, WaitBuffer};
pub use bufferop::{BinOp, BufferOp, CmpOp, UnOp};
pub use derivative::{derivative, event_has_type, has_type};
pub use error::CoreError;
pub use event::Event;
pub use graph::Program;
pub use id::{FreshIdSource, NodeId};
pub use ir::{StreamNode, StreamOpKind};
pub use ordering::RealizedOrdering;
pub use partial_order::PartialOrder;
pub use types::{nullable, types_equal, unify, ScalarKind, Type, TypeVar};
pub use value::{Tag, Value};
