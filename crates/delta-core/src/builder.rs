//! The tracing builder: the combinator surface everything else in this crate compiles
//! or interprets (spec §4.2's "use by the builder", §6 Builder API). Grounded on
//! `original_source/src/python_delta/delta.py`'s `Delta` class.

use crate::bufferop::BufferOp;
use crate::error::CoreError;
use crate::graph::Program;
use crate::id::FreshIdSource;
use crate::ordering::RealizedOrdering;
use crate::types::{unify, ScalarKind, Type, TypeVar};
use crate::value::Value;
use crate::id::NodeId;

/// Traces a stream program into a [`Program`] arena, accumulating a [`RealizedOrdering`]
/// alongside it. One `Builder` corresponds to one traced function body.
pub struct Builder {
    pub program: Program,
    pub ordering: RealizedOrdering,
    type_var_ids: FreshIdSource,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            program: Program::new(),
            ordering: RealizedOrdering::new(),
            type_var_ids: FreshIdSource::new(),
        }
    }

    fn fresh_type_var(&mut self) -> Type {
        Type::Var(TypeVar::fresh(&mut self.type_var_ids, 0))
    }

    fn ty(&self, id: NodeId) -> Type {
        self.program.node(id).stream_type.clone()
    }

    fn vars(&self, id: NodeId) -> Vec<NodeId> {
        self.program.node(id).vars.iter().copied().collect()
    }

    pub fn var(&mut self, name: impl Into<String>, var_type: Option<Type>) -> NodeId {
        let ty = var_type.unwrap_or_else(|| self.fresh_type_var());
        self.program.add_var(name, ty)
    }

    pub fn eps(&mut self) -> NodeId {
        self.program.add_eps()
    }

    pub fn singleton(&mut self, value: Value) -> NodeId {
        let kind = value.scalar_kind().expect("singleton() requires a scalar value");
        self.program.add_singleton(Type::Singleton(kind), value)
    }

    pub fn catr(&mut self, s1: NodeId, s2: NodeId) -> Result<NodeId, CoreError> {
        let (v1, v2) = (self.vars(s1), self.vars(s2));
        if v1.iter().any(|a| v2.contains(a)) {
            return Err(CoreError::OverlappingVars { op: "catr".into() });
        }
        self.ordering.add_all_ordered(&v1, &v2)?;
        let ty = Type::cat(self.ty(s1), self.ty(s2));
        Ok(self.program.add_catr(ty, s1, s2))
    }

    pub fn catl(&mut self, s: NodeId) -> Result<(NodeId, NodeId), CoreError> {
        let left_type = self.fresh_type_var();
        let right_type = self.fresh_type_var();
        unify(&self.ty(s), &Type::cat(left_type.clone(), right_type.clone()))?;

        let svars = self.vars(s);
        let (x, y) = self.program.add_cat_projections(s, left_type, right_type);
        self.ordering.add_ordered(x, y)?;
        self.ordering.add_in_place_of(x, &svars)?;
        self.ordering.add_in_place_of(y, &svars)?;
        Ok((x, y))
    }

    pub fn inl(&mut self, s: NodeId) -> Result<NodeId, CoreError> {
        let right_type = self.fresh_type_var();
        let output_type = Type::plus(self.ty(s), right_type);
        let svars = self.vars(s);
        let z = self.program.add_sum_inj(output_type, s, 0);
        self.ordering.add_in_place_of(z, &svars)?;
        Ok(z)
    }

    pub fn inr(&mut self, s: NodeId) -> Result<NodeId, CoreError> {
        let left_type = self.fresh_type_var();
        let output_type = Type::plus(left_type, self.ty(s));
        let svars = self.vars(s);
        let z = self.program.add_sum_inj(output_type, s, 1);
        self.ordering.add_in_place_of(z, &svars)?;
        Ok(z)
    }

    /// `left_fn`/`right_fn` receive the `UnsafeCast` node standing in for `x` restricted
    /// to that branch's type, per the source's comment: by the time either is pulled the
    /// branch tag has already resolved it, so the cast is safe.
    pub fn case<L, R>(&mut self, x: NodeId, left_fn: L, right_fn: R) -> Result<NodeId, CoreError>
    where
        L: FnOnce(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
        R: FnOnce(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
    {
        let left_type = self.fresh_type_var();
        let right_type = self.fresh_type_var();
        unify(&self.ty(x), &Type::plus(left_type.clone(), right_type.clone()))?;

        let xvars = self.vars(x);
        let x_left = self.program.add_unsafe_cast(left_type, x);
        let x_right = self.program.add_unsafe_cast(right_type, x);
        self.ordering.add_in_place_of(x_left, &xvars)?;
        self.ordering.add_in_place_of(x_right, &xvars)?;

        let left_output = left_fn(self, x_left)?;
        let right_output = right_fn(self, x_right)?;

        self.ordering.add_forbidden(left_output, x)?;
        self.ordering.add_forbidden(right_output, x)?;

        unify(&self.ty(left_output), &self.ty(right_output))?;
        let output_type = self.ty(left_output);
        Ok(self.program.add_case(output_type, x, left_output, right_output))
    }

    pub fn nil(&mut self, element_type: Option<Type>) -> NodeId {
        let element_type = element_type.unwrap_or_else(|| self.fresh_type_var());
        let eps = self.program.add_eps();
        self.program.add_sum_inj(Type::star(element_type), eps, 0)
    }

    pub fn cons(&mut self, head: NodeId, tail: NodeId) -> Result<NodeId, CoreError> {
        let element_type = self.fresh_type_var();
        let star_type = Type::star(element_type.clone());
        unify(&self.ty(head), &element_type)?;
        unify(&self.ty(tail), &star_type)?;
        let catr_node = self.catr(head, tail)?;
        Ok(self.program.add_sum_inj(star_type, catr_node, 1))
    }

    /// Case analysis directly over a `Star`, without routing through a generic `Plus`
    /// `case` (the cons branch needs the `catl`-split head/tail, not an opaque payload).
    pub fn starcase<N, C>(&mut self, x: NodeId, nil_fn: N, cons_fn: C) -> Result<NodeId, CoreError>
    where
        N: FnOnce(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
        C: FnOnce(&mut Builder, NodeId, NodeId) -> Result<NodeId, CoreError>,
    {
        let element_type = self.fresh_type_var();
        let star_type = Type::star(element_type.clone());
        unify(&self.ty(x), &star_type)?;

        let x_nil = self.program.add_unsafe_cast(Type::Eps, x);
        let x_cons = self.program.add_unsafe_cast(Type::cat(element_type, star_type), x);

        let (head, tail) = self.catl(x_cons)?;

        let nil_output = nil_fn(self, x_nil)?;
        let cons_output = cons_fn(self, head, tail)?;
        unify(&self.ty(nil_output), &self.ty(cons_output))?;
        let output_type = self.ty(nil_output);
        Ok(self.program.add_case(output_type, x, nil_output, cons_output))
    }

    pub fn cond(&mut self, b: NodeId, left: NodeId, right: NodeId) -> Result<NodeId, CoreError> {
        unify(&self.ty(b), &Type::Singleton(ScalarKind::Bool))?;
        unify(&self.ty(left), &self.ty(right))?;
        self.ordering.add_forbidden(left, b)?;
        self.ordering.add_forbidden(right, b)?;
        let output_type = self.ty(left);
        Ok(self.program.add_cond(output_type, b, left, right))
    }

    /// `ty` is the output type of the body; the captured set is the set of nodes the
    /// body creates, recorded after the fact since the body needs `reset_node`'s id
    /// before its own captured set can be known (spec §4.2/§9).
    fn reset_block<F>(&mut self, ty: Type, f: F) -> Result<NodeId, CoreError>
    where
        F: FnOnce(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
    {
        let reset_node = self.program.add_reset_op_placeholder(ty);
        let before = self.program.node_count();
        let result = f(self, reset_node)?;
        let after = self.program.node_count();
        let captured: Vec<NodeId> = (before..after).map(|i| NodeId(i as u32)).collect();
        self.program.finalize_reset_set(reset_node, captured);
        Ok(result)
    }

    pub fn map<F>(&mut self, x: NodeId, map_fn: F) -> Result<NodeId, CoreError>
    where
        F: FnOnce(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
    {
        let input_elt_type = self.fresh_type_var();
        unify(&self.ty(x), &Type::star(input_elt_type))?;
        let result_elt_type = self.fresh_type_var();
        let result_star_type = Type::star(result_elt_type.clone());

        self.reset_block(result_star_type.clone(), move |b, reset_node| {
            b.starcase(
                x,
                |b, _| Ok(b.nil(None)),
                move |b, x_head, _x_tail| {
                    let map_output = map_fn(b, x_head)?;
                    unify(&b.ty(map_output), &result_elt_type)?;
                    let sink_then_reset = b.program.add_sink_then(result_star_type.clone(), x_head, reset_node);
                    b.cons(map_output, sink_then_reset)
                },
            )
        })
    }

    pub fn concat(&mut self, xs: NodeId, ys: NodeId) -> Result<NodeId, CoreError> {
        let input_elt_type = self.fresh_type_var();
        let input_star_type = Type::star(input_elt_type);
        unify(&self.ty(xs), &input_star_type)?;
        unify(&self.ty(ys), &input_star_type)?;

        self.reset_block(input_star_type, move |b, reset_node| {
            b.starcase(xs, move |_, _| Ok(ys), move |b, xs_head, _xs_tail| {
                b.cons(xs_head, reset_node)
            })
        })
    }

    pub fn concat_map<F>(&mut self, x: NodeId, map_fn: F) -> Result<NodeId, CoreError>
    where
        F: Fn(&mut Builder, NodeId) -> Result<NodeId, CoreError>,
    {
        let input_elt_type = self.fresh_type_var();
        unify(&self.ty(x), &Type::star(input_elt_type))?;
        let result_elt_type = self.fresh_type_var();
        let result_star_type = Type::star(result_elt_type.clone());

        self.reset_block(result_star_type.clone(), move |b, reset_node| {
            b.starcase(
                x,
                move |b, _| Ok(b.nil(Some(result_elt_type.clone()))),
                move |b, x_head, _x_tail| {
                    let map_output = map_fn(b, x_head)?;
                    unify(&b.ty(map_output), &result_star_type)?;
                    let sink_then_reset = b.program.add_sink_then(result_star_type.clone(), x_head, reset_node);
                    b.concat(map_output, sink_then_reset)
                },
            )
        })
    }

    pub fn zip_with<F>(&mut self, xs: NodeId, ys: NodeId, fn_: F) -> Result<NodeId, CoreError>
    where
        F: Fn(&mut Builder, NodeId, NodeId) -> Result<NodeId, CoreError>,
    {
        let xs_elt_type = self.fresh_type_var();
        unify(&self.ty(xs), &Type::star(xs_elt_type))?;
        let ys_elt_type = self.fresh_type_var();
        unify(&self.ty(ys), &Type::star(ys_elt_type))?;
        let result_elt_type = self.fresh_type_var();
        let result_star_type = Type::star(result_elt_type.clone());

        self.reset_block(result_star_type.clone(), move |b, reset_node| {
            b.starcase(
                xs,
                |b, _| Ok(b.nil(None)),
                move |b, x_head, _x_tail| {
                    let result_elt_type = result_elt_type.clone();
                    let result_star_type = result_star_type.clone();
                    b.starcase(
                        ys,
                        |b, _| Ok(b.nil(None)),
                        move |b, y_head, _y_tail| {
                            let z_output = fn_(b, x_head, y_head)?;
                            unify(&b.ty(z_output), &result_elt_type)?;
                            let y_sink = b.program.add_sink_then(result_star_type.clone(), y_head, reset_node);
                            let x_sink = b.program.add_sink_then(result_star_type.clone(), x_head, y_sink);
                            b.cons(z_output, x_sink)
                        },
                    )
                },
            )
        })
    }

    pub fn wait(&mut self, ty: Type, x: NodeId) -> NodeId {
        self.program.add_wait(ty, x)
    }

    pub fn emit(&mut self, ty: Type, buffer_op: BufferOp) -> NodeId {
        self.program.add_emit(ty, buffer_op)
    }

    /// Splits a stream of ints into two streams — a rewritten copy of the input, and one
    /// flag per element recording whether it was zero — grounded on the same-named
    /// combinator in `delta.py`, one of the richest users of `wait`/`emit`/`cond`.
    pub fn split_z(&mut self, xs: NodeId) -> Result<NodeId, CoreError> {
        let int_ty = Type::Singleton(ScalarKind::Int);
        let xs_type = Type::star(int_ty.clone());
        unify(&self.ty(xs), &xs_type)?;

        self.reset_block(Type::cat(xs_type.clone(), xs_type.clone()), move |b, reset_node| {
            let int_ty = int_ty.clone();
            b.starcase(
                xs,
                move |b, _| {
                    let n1 = b.nil(Some(int_ty.clone()));
                    let n2 = b.nil(Some(int_ty.clone()));
                    b.catr(n1, n2)
                },
                move |b, x_head, xs_tail| {
                    let y = b.wait(int_ty.clone(), x_head);
                    let eqz = BufferOp::Comparison(
                        Box::new(BufferOp::WaitOpBuffer(y)),
                        crate::bufferop::CmpOp::Eq,
                        Box::new(BufferOp::Constant(Value::Int(0))),
                    );
                    let emity = b.emit(int_ty.clone(), BufferOp::WaitOpBuffer(y));
                    let isz = b.emit(Type::Singleton(ScalarKind::Bool), eqz);
                    let nil_catr_xs = {
                        let n = b.nil(Some(int_ty.clone()));
                        b.catr(n, xs_tail)?
                    };

                    let sink_then_reset = b.program.add_sink_then(
                        Type::cat(xs_type.clone(), xs_type.clone()),
                        x_head,
                        reset_node,
                    );
                    let (ys, zs) = b.catl(sink_then_reset)?;
                    let x_cons_ys = b.cons(emity, ys)?;
                    let x_cons_ys_catr_zs = b.catr(x_cons_ys, zs)?;

                    b.cond(isz, nil_catr_xs, x_cons_ys_catr_zs)
                },
            )
        })
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catr_rejects_overlapping_vars() {
        let mut b = Builder::new();
        let x = b.var("x", Some(Type::Singleton(ScalarKind::Int)));
        let err = b.catr(x, x).unwrap_err();
        assert!(matches!(err, CoreError::OverlappingVars { .. }));
    }

    #[test]
    fn catl_orders_left_before_right() {
        let mut b = Builder::new();
        let x = b.var(
            "x",
            Some(Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str))),
        );
        let (left, right) = b.catl(x).unwrap();
        assert!(b.ordering.required.has_edge(left, right));
    }

    #[test]
    fn nil_then_cons_builds_a_star_type() {
        let mut b = Builder::new();
        let head = b.singleton(Value::Int(1));
        let tail = b.nil(Some(Type::Singleton(ScalarKind::Int)));
        let list = b.cons(head, tail).unwrap();
        assert!(matches!(b.ty(list).resolve(), Type::Star(_)));
    }

    #[test]
    fn map_builds_without_error() {
        let mut b = Builder::new();
        let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
        let result = b.map(xs, |b, head| {
            let one = b.singleton(Value::Int(1));
            let _ = one;
            Ok(head)
        });
        assert!(result.is_ok());
    }

    #[test]
    fn split_z_builds_without_error() {
        let mut b = Builder::new();
        let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
        assert!(b.split_z(xs).is_ok());
    }
}
