//! Type-directed buffers: value-level accumulators for `WaitOp` and the inverse
//! serialiser used by `EmitOp` (spec §3.5, §4.3), grounded on
//! `original_source/src/python_delta/stream_ops/waitop.py` and `emitop.py`.

use std::fmt;

use crate::error::CoreError;
use crate::event::Event;
use crate::types::Type;
use crate::value::{Tag, Value};

/// A type-directed accumulator consuming one event at a time until a full value of its
/// declared type has been read.
pub trait WaitBuffer: fmt::Debug {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError>;
    fn is_complete(&self) -> bool;
    /// Only valid once `is_complete()`; the caller (`WaitOp`/`EmitOp`) is responsible for
    /// checking that invariant, matching the source's `assert`-guarded access.
    fn get_value(&self) -> Value;
}

#[derive(Debug)]
struct SingletonBuffer {
    kind: crate::types::ScalarKind,
    value: Option<Value>,
}

impl WaitBuffer for SingletonBuffer {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::Base(v) if v.scalar_kind() == Some(self.kind) => {
                self.value = Some(v.clone());
                Ok(())
            }
            other => Err(CoreError::DerivativeError {
                ty: format!("Singleton({})", self.kind),
                event: other.to_string(),
            }),
        }
    }

    fn is_complete(&self) -> bool {
        self.value.is_some()
    }

    fn get_value(&self) -> Value {
        self.value.clone().expect("get_value called before buffer complete")
    }
}

#[derive(Debug, Default)]
struct EpsBuffer;

impl WaitBuffer for EpsBuffer {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError> {
        Err(CoreError::DerivativeError {
            ty: "Eps".into(),
            event: event.to_string(),
        })
    }

    fn is_complete(&self) -> bool {
        true
    }

    fn get_value(&self) -> Value {
        Value::Unit
    }
}

#[derive(Debug)]
struct CatBuffer {
    right_type: Type,
    left: Box<dyn WaitBuffer>,
    right: Option<Box<dyn WaitBuffer>>,
    seen_punc: bool,
}

impl WaitBuffer for CatBuffer {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::CatA(inner) if !self.seen_punc => self.left.poke_event(inner),
            Event::CatPunc if !self.seen_punc => {
                if !self.left.is_complete() {
                    return Err(CoreError::DerivativeError {
                        ty: "Cat".into(),
                        event: event.to_string(),
                    });
                }
                self.seen_punc = true;
                self.right = Some(make_buffer(&self.right_type));
                Ok(())
            }
            other if self.seen_punc => self
                .right
                .as_mut()
                .expect("right buffer allocated at CatPunc")
                .poke_event(other),
            other => Err(CoreError::DerivativeError {
                ty: "Cat".into(),
                event: other.to_string(),
            }),
        }
    }

    fn is_complete(&self) -> bool {
        self.seen_punc && self.right.as_ref().is_some_and(|r| r.is_complete())
    }

    fn get_value(&self) -> Value {
        let right = self.right.as_ref().expect("cat buffer complete implies right allocated");
        Value::pair(self.left.get_value(), right.get_value())
    }
}

#[derive(Debug)]
struct PlusBuffer {
    left_type: Type,
    right_type: Type,
    tag: Option<Tag>,
    inner: Option<Box<dyn WaitBuffer>>,
}

impl WaitBuffer for PlusBuffer {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::PlusA if self.tag.is_none() => {
                self.tag = Some(Tag::Left);
                self.inner = Some(make_buffer(&self.left_type));
                Ok(())
            }
            Event::PlusB if self.tag.is_none() => {
                self.tag = Some(Tag::Right);
                self.inner = Some(make_buffer(&self.right_type));
                Ok(())
            }
            other => self
                .inner
                .as_mut()
                .ok_or_else(|| CoreError::DerivativeError {
                    ty: "Plus".into(),
                    event: other.to_string(),
                })?
                .poke_event(other),
        }
    }

    fn is_complete(&self) -> bool {
        self.inner.as_ref().is_some_and(|b| b.is_complete())
    }

    fn get_value(&self) -> Value {
        let tag = self.tag.expect("plus buffer complete implies tag read");
        let inner = self.inner.as_ref().expect("plus buffer complete implies inner allocated");
        Value::tagged(tag, inner.get_value())
    }
}

#[derive(Debug)]
struct StarBuffer {
    element_type: Type,
    elements: Vec<Value>,
    current: Option<Box<dyn WaitBuffer>>,
    terminated: bool,
}

impl WaitBuffer for StarBuffer {
    fn poke_event(&mut self, event: &Event) -> Result<(), CoreError> {
        match event {
            Event::PlusA if self.current.is_none() && !self.terminated => {
                self.terminated = true;
                Ok(())
            }
            Event::PlusB if self.current.is_none() && !self.terminated => {
                self.current = Some(make_buffer(&self.element_type));
                Ok(())
            }
            Event::CatA(inner) if self.current.is_some() => {
                self.current.as_mut().unwrap().poke_event(inner)
            }
            Event::CatPunc if self.current.is_some() => {
                let current = self.current.take().unwrap();
                if !current.is_complete() {
                    return Err(CoreError::DerivativeError {
                        ty: "Star".into(),
                        event: event.to_string(),
                    });
                }
                self.elements.push(current.get_value());
                Ok(())
            }
            other => Err(CoreError::DerivativeError {
                ty: "Star".into(),
                event: other.to_string(),
            }),
        }
    }

    fn is_complete(&self) -> bool {
        self.terminated
    }

    fn get_value(&self) -> Value {
        Value::List(self.elements.clone())
    }
}

/// Allocate a fresh buffer for `ty`, following `TypeVar` links.
pub fn make_buffer(ty: &Type) -> Box<dyn WaitBuffer> {
    match ty.resolve() {
        Type::Eps => Box::new(EpsBuffer),
        Type::Singleton(k) => Box::new(SingletonBuffer { kind: k, value: None }),
        Type::Cat(l, r) => Box::new(CatBuffer {
            right_type: (*r).clone(),
            left: make_buffer(&l),
            right: None,
            seen_punc: false,
        }),
        Type::Plus(l, r) => Box::new(PlusBuffer {
            left_type: (*l).clone(),
            right_type: (*r).clone(),
            tag: None,
            inner: None,
        }),
        Type::Star(e) => Box::new(StarBuffer {
            element_type: (*e).clone(),
            elements: Vec::new(),
            current: None,
            terminated: false,
        }),
        Type::Par(_, _) => panic!("Par has no buffer representation: wait/emit are not defined over Par"),
        Type::Var(_) => unreachable!("resolve() already followed links"),
    }
}

/// Serialise a materialised value back into the event sequence of `ty`; the inverse of
/// the buffer family, used by `EmitOp`.
pub fn value_to_events(value: &Value, ty: &Type) -> Vec<Event> {
    match ty.resolve() {
        Type::Eps => vec![],
        Type::Singleton(_) => vec![Event::Base(value.clone())],
        Type::Cat(l, r) => {
            let (lv, rv) = match value {
                Value::Pair(l, r) => (l.as_ref(), r.as_ref()),
                _ => unreachable!("Cat value must be a Pair"),
            };
            let mut out: Vec<Event> = value_to_events(lv, &l).into_iter().map(Event::cat_a).collect();
            out.push(Event::CatPunc);
            out.extend(value_to_events(rv, &r));
            out
        }
        Type::Plus(l, r) => match value {
            Value::Tagged(Tag::Left, v) => {
                let mut out = vec![Event::PlusA];
                out.extend(value_to_events(v, &l));
                out
            }
            Value::Tagged(Tag::Right, v) => {
                let mut out = vec![Event::PlusB];
                out.extend(value_to_events(v, &r));
                out
            }
            _ => unreachable!("Plus value must be Tagged"),
        },
        Type::Star(e) => match value {
            Value::List(items) if items.is_empty() => vec![Event::PlusA],
            Value::List(items) => {
                let mut out = vec![Event::PlusB];
                out.extend(value_to_events(&items[0], &e).into_iter().map(Event::cat_a));
                out.push(Event::CatPunc);
                let rest = Value::List(items[1..].to_vec());
                out.extend(value_to_events(&rest, &Type::Star(e.clone())));
                out
            }
            _ => unreachable!("Star value must be a List"),
        },
        Type::Par(_, _) => unreachable!("Par values are not materialised by wait/emit"),
        Type::Var(_) => unreachable!("resolve() already followed links"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    #[test]
    fn singleton_buffer_completes_on_one_event() {
        let mut b = make_buffer(&Type::Singleton(ScalarKind::Int));
        assert!(!b.is_complete());
        b.poke_event(&Event::Base(Value::Int(5))).unwrap();
        assert!(b.is_complete());
        assert_eq!(b.get_value(), Value::Int(5));
    }

    #[test]
    fn cat_buffer_pairs_both_sides() {
        let ty = Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str));
        let mut b = make_buffer(&ty);
        b.poke_event(&Event::cat_a(Event::Base(Value::Int(1)))).unwrap();
        b.poke_event(&Event::CatPunc).unwrap();
        b.poke_event(&Event::Base(Value::Str("x".into()))).unwrap();
        assert!(b.is_complete());
        assert_eq!(b.get_value(), Value::pair(Value::Int(1), Value::Str("x".into())));
    }

    #[test]
    fn star_buffer_accumulates_elements_until_nil() {
        let ty = Type::star(Type::Singleton(ScalarKind::Int));
        let mut b = make_buffer(&ty);
        for v in [1, 2] {
            b.poke_event(&Event::PlusB).unwrap();
            b.poke_event(&Event::cat_a(Event::Base(Value::Int(v)))).unwrap();
            b.poke_event(&Event::CatPunc).unwrap();
        }
        b.poke_event(&Event::PlusA).unwrap();
        assert!(b.is_complete());
        assert_eq!(b.get_value(), Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn value_to_events_is_inverse_of_buffer_consumption() {
        let ty = Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str));
        let value = Value::pair(Value::Int(7), Value::Str("y".into()));
        let events = value_to_events(&value, &ty);

        let mut b = make_buffer(&ty);
        for e in &events {
            b.poke_event(e).unwrap();
        }
        assert!(b.is_complete());
        assert_eq!(b.get_value(), value);
    }

    #[test]
    fn value_to_events_star_nil_is_single_tag() {
        let ty = Type::star(Type::Singleton(ScalarKind::Int));
        assert_eq!(value_to_events(&Value::List(vec![]), &ty), vec![Event::PlusA]);
    }
}
