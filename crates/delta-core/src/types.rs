//! The stream type algebra and unification (spec §3.1, §4.1).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::CoreError;
use crate::id::FreshIdSource;

/// Primitive kind carried by a `Singleton` event. Kept small and closed, matching the
/// teacher's closed `ScalarType` enum (`lmlang-core/src/types.rs`) rather than an open
/// `TypeId` registry — this algebra has no user-defined structs/enums to register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Str,
    Bool,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Str => write!(f, "str"),
            ScalarKind::Bool => write!(f, "bool"),
        }
    }
}

/// A stream type, per spec §3.1.
#[derive(Debug, Clone)]
pub enum Type {
    Eps,
    Singleton(ScalarKind),
    Cat(Box<Type>, Box<Type>),
    /// Interleaved composition. Carried for the type system and reference interpreter
    /// only — see SPEC_FULL.md §2 on `Par`/`parl`/`parr`.
    Par(Box<Type>, Box<Type>),
    Plus(Box<Type>, Box<Type>),
    Star(Box<Type>),
    Var(TypeVar),
}

impl Type {
    pub fn cat(l: Type, r: Type) -> Type {
        Type::Cat(Box::new(l), Box::new(r))
    }
    pub fn par(l: Type, r: Type) -> Type {
        Type::Par(Box::new(l), Box::new(r))
    }
    pub fn plus(l: Type, r: Type) -> Type {
        Type::Plus(Box::new(l), Box::new(r))
    }
    pub fn star(e: Type) -> Type {
        Type::Star(Box::new(e))
    }

    /// Follow `Var` links until a non-variable type or an unlinked variable is reached.
    pub fn resolve(&self) -> Type {
        match self {
            Type::Var(v) => match v.link() {
                Some(linked) => linked.resolve(),
                None => self.clone(),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Eps => write!(f, "Eps"),
            Type::Singleton(k) => write!(f, "Singleton({k})"),
            Type::Cat(l, r) => write!(f, "Cat({l}, {r})"),
            Type::Par(l, r) => write!(f, "Par({l}, {r})"),
            Type::Plus(l, r) => write!(f, "Plus({l}, {r})"),
            Type::Star(e) => write!(f, "Star({e})"),
            Type::Var(v) => match v.link() {
                Some(linked) => write!(f, "{linked}"),
                None => write!(f, "?{}", v.id()),
            },
        }
    }
}

#[derive(Debug)]
struct TypeVarInner {
    id: u64,
    level: u32,
    link: Option<Type>,
}

/// A unification variable: a unique id, a level (the lowest binder depth it has been
/// observed at, via occurs-check), and an optional link. Shared by `Rc<RefCell<_>>` so
/// that linking one occurrence links every clone of the same variable, matching the
/// in-place-mutation aliasing semantics of the original prototype.
#[derive(Debug, Clone)]
pub struct TypeVar(Rc<RefCell<TypeVarInner>>);

impl TypeVar {
    pub fn fresh(ids: &mut FreshIdSource, level: u32) -> Self {
        TypeVar(Rc::new(RefCell::new(TypeVarInner {
            id: ids.next(),
            level,
            link: None,
        })))
    }

    pub fn id(&self) -> u64 {
        self.0.borrow().id
    }

    pub fn level(&self) -> u32 {
        self.0.borrow().level
    }

    pub fn link(&self) -> Option<Type> {
        self.0.borrow().link.clone()
    }

    pub fn is_linked(&self) -> bool {
        self.0.borrow().link.is_some()
    }

    fn set_link(&self, ty: Type) {
        self.0.borrow_mut().link = Some(ty);
    }

    fn lower_level_to(&self, other_level: u32) {
        let mut inner = self.0.borrow_mut();
        inner.level = inner.level.min(other_level);
    }
}

impl PartialEq for TypeVar {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for TypeVar {}

/// `Eps` nullable; `Cat` iff both; `Par` iff both (consuming an interleave fully requires
/// consuming both sides — not spelled out in spec's nullability table since `Par` is
/// carried only for the type system/interpreter, but the same reasoning as `Cat` applies
/// and is recorded as a DESIGN.md decision); `Plus` iff either; `Star` always; `Singleton`
/// and an unlinked `TypeVar` never.
pub fn nullable(ty: &Type) -> bool {
    match ty.resolve() {
        Type::Eps => true,
        Type::Cat(l, r) => nullable(&l) && nullable(&r),
        Type::Par(l, r) => nullable(&l) && nullable(&r),
        Type::Plus(l, r) => nullable(&l) || nullable(&r),
        Type::Star(_) => true,
        Type::Singleton(_) => false,
        Type::Var(_) => false,
    }
}

/// Occurs-check: does variable `v` appear unlinked anywhere in `ty`? Every visited
/// linked variable has its level lowered to at most `v`'s, per spec §4.1.
fn occurs_check(ty: &Type, v: &TypeVar) -> Result<(), CoreError> {
    match ty {
        Type::Var(w) => {
            if let Some(link) = w.link() {
                occurs_check(&link, v)
            } else if w.id() == v.id() {
                Err(CoreError::OccursCheck)
            } else {
                w.lower_level_to(v.level());
                Ok(())
            }
        }
        Type::Cat(l, r) | Type::Par(l, r) | Type::Plus(l, r) => {
            occurs_check(l, v)?;
            occurs_check(r, v)
        }
        Type::Star(e) => occurs_check(e, v),
        Type::Eps | Type::Singleton(_) => Ok(()),
    }
}

/// Unify two stream types in place, per spec §4.1. On success, `a` and `b` compare equal
/// under link-following (property P5).
pub fn unify(a: &Type, b: &Type) -> Result<(), CoreError> {
    let ra = a.resolve();
    let rb = b.resolve();

    match (&ra, &rb) {
        (Type::Var(v), _) if !v.is_linked() => {
            occurs_check(&rb, v)?;
            v.set_link(rb);
            Ok(())
        }
        (_, Type::Var(v)) if !v.is_linked() => {
            occurs_check(&ra, v)?;
            v.set_link(ra);
            Ok(())
        }
        (Type::Eps, Type::Eps) => Ok(()),
        (Type::Singleton(k1), Type::Singleton(k2)) if k1 == k2 => Ok(()),
        (Type::Cat(l1, r1), Type::Cat(l2, r2)) => {
            unify(l1, l2)?;
            unify(r1, r2)
        }
        (Type::Par(l1, r1), Type::Par(l2, r2)) => {
            unify(l1, l2)?;
            unify(r1, r2)
        }
        (Type::Plus(l1, r1), Type::Plus(l2, r2)) => {
            unify(l1, l2)?;
            unify(r1, r2)
        }
        (Type::Star(e1), Type::Star(e2)) => unify(e1, e2),
        _ => Err(CoreError::unification(&ra, &rb)),
    }
}

/// Structural equality after fully resolving links on both sides (used by tests and by
/// P5's "compare equal" assertion; not used by `unify` itself).
pub fn types_equal(a: &Type, b: &Type) -> bool {
    match (a.resolve(), b.resolve()) {
        (Type::Eps, Type::Eps) => true,
        (Type::Singleton(k1), Type::Singleton(k2)) => k1 == k2,
        (Type::Cat(l1, r1), Type::Cat(l2, r2)) => types_equal(&l1, &l2) && types_equal(&r1, &r2),
        (Type::Par(l1, r1), Type::Par(l2, r2)) => types_equal(&l1, &l2) && types_equal(&r1, &r2),
        (Type::Plus(l1, r1), Type::Plus(l2, r2)) => types_equal(&l1, &l2) && types_equal(&r1, &r2),
        (Type::Star(e1), Type::Star(e2)) => types_equal(&e1, &e2),
        (Type::Var(v1), Type::Var(v2)) => v1.id() == v2.id(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(ids: &mut FreshIdSource) -> Type {
        Type::Var(TypeVar::fresh(ids, 0))
    }

    #[test]
    fn unify_identical_nullary_succeeds() {
        assert!(unify(&Type::Eps, &Type::Eps).is_ok());
    }

    #[test]
    fn unify_matching_singleton_kinds_succeeds() {
        assert!(unify(&Type::Singleton(ScalarKind::Int), &Type::Singleton(ScalarKind::Int)).is_ok());
    }

    #[test]
    fn unify_mismatched_singleton_kinds_fails() {
        assert!(unify(&Type::Singleton(ScalarKind::Int), &Type::Singleton(ScalarKind::Str)).is_err());
    }

    #[test]
    fn unify_links_unbound_var() {
        let mut ids = FreshIdSource::new();
        let v = fresh(&mut ids);
        unify(&v, &Type::Singleton(ScalarKind::Bool)).unwrap();
        assert!(types_equal(&v, &Type::Singleton(ScalarKind::Bool)));
    }

    #[test]
    fn unify_descends_into_cat() {
        let mut ids = FreshIdSource::new();
        let v1 = fresh(&mut ids);
        let v2 = fresh(&mut ids);
        let a = Type::cat(v1.clone(), v2.clone());
        let b = Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str));
        unify(&a, &b).unwrap();
        assert!(types_equal(&v1, &Type::Singleton(ScalarKind::Int)));
        assert!(types_equal(&v2, &Type::Singleton(ScalarKind::Str)));
    }

    #[test]
    fn occurs_check_rejects_self_reference() {
        let mut ids = FreshIdSource::new();
        let v = TypeVar::fresh(&mut ids, 0);
        let cyclic = Type::cat(Type::Var(v.clone()), Type::Singleton(ScalarKind::Int));
        let err = unify(&Type::Var(v), &cyclic).unwrap_err();
        assert!(matches!(err, CoreError::OccursCheck));
    }

    #[test]
    fn unify_mismatched_constructors_fails() {
        let err = unify(&Type::Eps, &Type::Singleton(ScalarKind::Int)).unwrap_err();
        assert!(matches!(err, CoreError::UnificationError { .. }));
    }

    #[test]
    fn nullability_table() {
        assert!(nullable(&Type::Eps));
        assert!(!nullable(&Type::Singleton(ScalarKind::Int)));
        assert!(nullable(&Type::star(Type::Singleton(ScalarKind::Int))));
        assert!(nullable(&Type::cat(Type::Eps, Type::Eps)));
        assert!(!nullable(&Type::cat(Type::Eps, Type::Singleton(ScalarKind::Int))));
        assert!(nullable(&Type::plus(Type::Eps, Type::Singleton(ScalarKind::Int))));
        assert!(!nullable(&Type::plus(
            Type::Singleton(ScalarKind::Int),
            Type::Singleton(ScalarKind::Str)
        )));
    }

    #[test]
    fn fresh_type_vars_have_distinct_ids() {
        let mut ids = FreshIdSource::new();
        let v1 = TypeVar::fresh(&mut ids, 0);
        let v2 = TypeVar::fresh(&mut ids, 0);
        assert_ne!(v1.id(), v2.id());
    }
}
