//! Tagged runtime events (spec §3.2).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Base(Value),
    CatA(Box<Event>),
    CatPunc,
    ParA(Box<Event>),
    ParB(Box<Event>),
    PlusA,
    PlusB,
}

impl Event {
    pub fn cat_a(e: Event) -> Event {
        Event::CatA(Box::new(e))
    }
    pub fn par_a(e: Event) -> Event {
        Event::ParA(Box::new(e))
    }
    pub fn par_b(e: Event) -> Event {
        Event::ParB(Box::new(e))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Base(v) => write!(f, "Base({v:?})"),
            Event::CatA(e) => write!(f, "CatA({e})"),
            Event::CatPunc => write!(f, "CatPunc"),
            Event::ParA(e) => write!(f, "ParA({e})"),
            Event::ParB(e) => write!(f, "ParB({e})"),
            Event::PlusA => write!(f, "PlusA"),
            Event::PlusB => write!(f, "PlusB"),
        }
    }
}
