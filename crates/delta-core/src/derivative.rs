//! Type-directed event semantics: `derivative`, single-event `has_type`, and the
//! sequence-level `has_type` reference oracle (spec §4.1).

use crate::error::CoreError;
use crate::event::Event;
use crate::types::{nullable, Type};

/// The type of the remaining sequence after consuming one event of type `t` asserted to
/// have that type. Per spec §4.1's table; any other `(t, e)` pairing is ill-typed.
pub fn derivative(ty: &Type, event: &Event) -> Result<Type, CoreError> {
    match (ty.resolve(), event) {
        (Type::Singleton(_), Event::Base(_)) => Ok(Type::Eps),
        (Type::Cat(l, r), Event::CatA(e)) => Ok(Type::cat(derivative(&l, e)?, (*r).clone())),
        (Type::Cat(_l, r), Event::CatPunc) => Ok((*r).clone()),
        (Type::Par(l, r), Event::ParA(e)) => Ok(Type::par(derivative(&l, e)?, (*r).clone())),
        (Type::Par(l, r), Event::ParB(e)) => Ok(Type::par((*l).clone(), derivative(&r, e)?)),
        (Type::Plus(l, _r), Event::PlusA) => Ok((*l).clone()),
        (Type::Plus(_l, r), Event::PlusB) => Ok((*r).clone()),
        (Type::Star(_e), Event::PlusA) => Ok(Type::Eps),
        (Type::Star(e), Event::PlusB) => Ok(Type::cat((*e).clone(), Type::Star(e))),
        (ty, event) => Err(CoreError::DerivativeError {
            ty: ty.to_string(),
            event: event.to_string(),
        }),
    }
}

/// Does a single event have type `t`? A `CatPunc` additionally requires the left side of
/// the `Cat` to be nullable. `PlusA`/`PlusB` are valid tags for both `Plus` and `Star`
/// (the nil/cons cases of `Star`).
pub fn event_has_type(event: &Event, ty: &Type) -> bool {
    match (ty.resolve(), event) {
        (Type::Singleton(k), Event::Base(v)) => v.scalar_kind() == Some(k),
        (Type::Cat(l, _r), Event::CatA(e)) => event_has_type(e, &l),
        (Type::Cat(l, _r), Event::CatPunc) => nullable(&l),
        (Type::Par(l, _r), Event::ParA(e)) => event_has_type(e, &l),
        (Type::Par(_l, r), Event::ParB(e)) => event_has_type(e, &r),
        (Type::Plus(_, _), Event::PlusA) => true,
        (Type::Plus(_, _), Event::PlusB) => true,
        (Type::Star(_), Event::PlusA) => true,
        (Type::Star(_), Event::PlusB) => true,
        _ => false,
    }
}

/// The reference oracle used by test generators and assertions (spec §4.1, §6 Testing
/// API): a sequence has type `t` iff empty, or its head has type `t` and its tail has
/// type the derivative of `t` by the head.
pub fn has_type(events: &[Event], ty: &Type) -> bool {
    match events.split_first() {
        None => true,
        Some((head, tail)) => {
            if !event_has_type(head, ty) {
                return false;
            }
            match derivative(ty, head) {
                Ok(rest_ty) => has_type(tail, &rest_ty),
                Err(_) => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use crate::value::Value;

    #[test]
    fn singleton_derivative_is_eps() {
        let t = Type::Singleton(ScalarKind::Str);
        let e = Event::Base(Value::Str("x".into()));
        assert!(matches!(derivative(&t, &e).unwrap(), Type::Eps));
    }

    #[test]
    fn cat_punc_requires_nullable_left() {
        let t = Type::cat(Type::Eps, Type::Singleton(ScalarKind::Int));
        assert!(event_has_type(&Event::CatPunc, &t));

        let t2 = Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Int));
        assert!(!event_has_type(&Event::CatPunc, &t2));
    }

    #[test]
    fn eps_has_no_derivative() {
        let e = Event::Base(Value::Int(1));
        assert!(derivative(&Type::Eps, &e).is_err());
    }

    #[test]
    fn has_type_scenario_passthrough_singleton_str() {
        let t = Type::Singleton(ScalarKind::Str);
        let events = vec![Event::Base(Value::Str("x".into()))];
        assert!(has_type(&events, &t));
    }

    #[test]
    fn has_type_scenario_catr_two_singletons() {
        let t = Type::cat(Type::Singleton(ScalarKind::Str), Type::Singleton(ScalarKind::Str));
        let events = vec![
            Event::cat_a(Event::Base(Value::Str("x".into()))),
            Event::CatPunc,
            Event::Base(Value::Str("y".into())),
        ];
        assert!(has_type(&events, &t));
    }

    #[test]
    fn has_type_scenario_inl() {
        let t = Type::plus(Type::Singleton(ScalarKind::Str), Type::Eps);
        let events = vec![Event::PlusA, Event::Base(Value::Str("asdf".into()))];
        assert!(has_type(&events, &t));
    }

    #[test]
    fn has_type_rejects_wrong_prefix() {
        let t = Type::Singleton(ScalarKind::Int);
        let events = vec![Event::Base(Value::Str("x".into()))];
        assert!(!has_type(&events, &t));
    }

    #[test]
    fn derivative_soundness_round_trip() {
        // P3: has_type([e]+tail, t) should match has_type(tail, derivative(t,e)) given
        // has_type([e], t).
        let t = Type::star(Type::Singleton(ScalarKind::Int));
        let events = vec![
            Event::PlusB,
            Event::cat_a(Event::Base(Value::Int(3))),
            Event::CatPunc,
            Event::PlusA,
        ];
        assert!(has_type(&events, &t));
        let d = derivative(&t, &events[0]).unwrap();
        assert!(has_type(&events[1..], &d));
    }
}
