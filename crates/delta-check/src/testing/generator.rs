//! Random event-sequence generation for a stream type (spec §6's Testing API,
//! `events_of_type`). Grounded on `lmlang-check`'s use of `rand`/`rand_chacha` for its own
//! randomized interpreter fuzzing, generalised to generate type-directed event streams
//! instead of randomized call graphs.
//!
//! Per SPEC_FULL.md §3, the generic hypothesis-style strategy library this would lean on
//! in a fuller test harness is out of scope; this is the single reference generator the
//! Testing API names, used by this crate's own `has_type`-based property tests.

use rand::Rng;

use delta_core::{Event, ScalarKind, Tag, Type, Value};

/// Generate a single random event sequence belonging to `ty`, per spec §3's grammar.
/// `max_depth` bounds `Star`/recursive unrolling so generation always terminates; each
/// `Star` element consumes one unit of remaining depth.
pub fn events_of_type(ty: &Type, max_depth: usize, rng: &mut impl Rng) -> Vec<Event> {
    match ty.resolve() {
        Type::Eps => vec![],
        Type::Singleton(kind) => vec![Event::Base(random_scalar(kind, rng))],
        Type::Cat(l, r) => {
            let mut out: Vec<Event> = events_of_type(&l, max_depth, rng).into_iter().map(Event::cat_a).collect();
            out.push(Event::CatPunc);
            out.extend(events_of_type(&r, max_depth, rng));
            out
        }
        Type::Plus(l, r) => {
            if rng.gen_bool(0.5) {
                let mut out = vec![Event::PlusA];
                out.extend(events_of_type(&l, max_depth, rng));
                out
            } else {
                let mut out = vec![Event::PlusB];
                out.extend(events_of_type(&r, max_depth, rng));
                out
            }
        }
        Type::Star(e) => {
            if max_depth == 0 || rng.gen_bool(0.35) {
                vec![Event::PlusA]
            } else {
                let mut out = vec![Event::PlusB];
                out.extend(events_of_type(&e, max_depth - 1, rng).into_iter().map(Event::cat_a));
                out.push(Event::CatPunc);
                out.extend(events_of_type(&Type::Star(e), max_depth - 1, rng));
                out
            }
        }
        Type::Par(l, r) => interleave(
            events_of_type(&l, max_depth, rng).into_iter().map(Event::par_a).collect(),
            events_of_type(&r, max_depth, rng).into_iter().map(Event::par_b).collect(),
            rng,
        ),
        Type::Var(_) => panic!("events_of_type requires a fully resolved type"),
    }
}

fn random_scalar(kind: ScalarKind, rng: &mut impl Rng) -> Value {
    match kind {
        ScalarKind::Int => Value::Int(rng.gen_range(-100..=100)),
        ScalarKind::Str => {
            let len = rng.gen_range(0..=6);
            let s: String = (0..len).map(|_| rng.gen_range(b'a'..=b'z') as char).collect();
            Value::Str(s)
        }
        ScalarKind::Bool => Value::Bool(rng.gen_bool(0.5)),
    }
}

/// Shuffle two already-tagged event lists together while preserving each list's internal
/// order, matching the nondeterministic-but-order-preserving interleave `ParR` performs at
/// runtime.
fn interleave(mut a: Vec<Event>, mut b: Vec<Event>, rng: &mut impl Rng) -> Vec<Event> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    a.reverse();
    b.reverse();
    while !a.is_empty() || !b.is_empty() {
        let take_a = if a.is_empty() {
            false
        } else if b.is_empty() {
            true
        } else {
            rng.gen_bool(0.5)
        };
        if take_a {
            out.push(a.pop().unwrap());
        } else {
            out.push(b.pop().unwrap());
        }
    }
    out
}

/// Convenience wrapper only used by tests here: generate a value-tagged `Plus` skeleton
/// without descending further, useful for constructing minimal ill-typed inputs for
/// negative test cases.
#[cfg(test)]
fn single_tag(position: u8) -> Event {
    if position == 0 {
        Event::PlusA
    } else {
        Event::PlusB
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_core::has_type;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn generated_singleton_events_have_the_type() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ty = Type::Singleton(ScalarKind::Int);
        for _ in 0..20 {
            let events = events_of_type(&ty, 5, &mut rng);
            assert!(has_type(&events, &ty));
        }
    }

    #[test]
    fn generated_star_events_have_the_type() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let ty = Type::star(Type::Singleton(ScalarKind::Bool));
        for _ in 0..20 {
            let events = events_of_type(&ty, 4, &mut rng);
            assert!(has_type(&events, &ty));
        }
    }

    #[test]
    fn generated_plus_events_have_the_type() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let ty = Type::plus(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str));
        for _ in 0..20 {
            let events = events_of_type(&ty, 4, &mut rng);
            assert!(has_type(&events, &ty));
        }
    }

    #[test]
    fn generated_cat_events_have_the_type() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let ty = Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str));
        for _ in 0..20 {
            let events = events_of_type(&ty, 4, &mut rng);
            assert!(has_type(&events, &ty));
        }
    }

    #[test]
    fn zero_depth_star_always_terminates_immediately() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let ty = Type::star(Type::Singleton(ScalarKind::Int));
        assert_eq!(events_of_type(&ty, 0, &mut rng), vec![Event::PlusA]);
    }

    #[test]
    fn single_tag_helper_matches_position() {
        assert_eq!(single_tag(0), Event::PlusA);
        assert_eq!(single_tag(1), Event::PlusB);
        let _ = Tag::Left;
    }
}
