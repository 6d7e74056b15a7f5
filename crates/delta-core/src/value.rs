//! Runtime values materialised by buffers (spec §3.5) and serialised back to events by
//! `value_to_events` (spec §4.3, `EmitOp`).

use serde::{Deserialize, Serialize};

use crate::types::ScalarKind;

/// Which side of a `Plus`/`Star` a tagged value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tag {
    Left,
    Right,
}

/// A fully materialised value of some stream type. `Singleton` maps to a scalar, `Cat` to
/// a pair, `Plus` to a tagged value, `Star` to a list, `Eps` to `Unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Int(i64),
    Str(String),
    Bool(bool),
    Pair(Box<Value>, Box<Value>),
    Tagged(Tag, Box<Value>),
    List(Vec<Value>),
}

impl Value {
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Str(_) => Some(ScalarKind::Str),
            Value::Bool(_) => Some(ScalarKind::Bool),
            _ => None,
        }
    }

    pub fn pair(left: Value, right: Value) -> Value {
        Value::Pair(Box::new(left), Box::new(right))
    }

    pub fn tagged(tag: Tag, value: Value) -> Value {
        Value::Tagged(tag, Box::new(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}
