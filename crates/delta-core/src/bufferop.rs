//! Pure expressions over buffered values (spec §3.3's `BufferOp` row, §4.3's buffer
//! sub-language), grounded on
//! `original_source/src/python_delta/stream_ops/bufferop.py`.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::error::CoreError;
use crate::id::NodeId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// A node in the pure buffer-expression algebra. `WaitOpBuffer` is always the root of any
/// tree built over a single `wait`; composites are built by the builder's arithmetic
/// overloads (spec's "auto-promotion" of raw constants to `Constant`).
#[derive(Debug, Clone)]
pub enum BufferOp {
    Constant(Value),
    /// Points at the `WaitOp` node (by arena id) whose buffer holds this value.
    WaitOpBuffer(NodeId),
    /// A mutable, pre-seeded cell updatable via [`BufferOp::update_register`] — not fed
    /// by any `WaitOp`, so it contributes no sources.
    Register(std::rc::Rc<RefCell<Value>>),
    Binary(Box<BufferOp>, BinOp, Box<BufferOp>),
    Unary(UnOp, Box<BufferOp>),
    Comparison(Box<BufferOp>, CmpOp, Box<BufferOp>),
}

impl BufferOp {
    pub fn register(initial: Value) -> BufferOp {
        BufferOp::Register(std::rc::Rc::new(RefCell::new(initial)))
    }

    /// Mutate a `Register` in place; panics if called on any other variant (mirrors
    /// `RegisterBuffer.update_value`, which is only ever called on a register the
    /// builder itself constructed).
    pub fn update_register(&self, new_value: Value) {
        match self {
            BufferOp::Register(cell) => *cell.borrow_mut() = new_value,
            _ => panic!("update_register called on a non-Register BufferOp"),
        }
    }

    /// Which `WaitOp` nodes must be complete before this expression can be evaluated.
    pub fn get_sources(&self) -> HashSet<NodeId> {
        match self {
            BufferOp::Constant(_) | BufferOp::Register(_) => HashSet::new(),
            BufferOp::WaitOpBuffer(id) => HashSet::from([*id]),
            BufferOp::Binary(l, _, r) => l.get_sources().union(&r.get_sources()).copied().collect(),
            BufferOp::Unary(_, p) => p.get_sources(),
            BufferOp::Comparison(p, _, o) => p.get_sources().union(&o.get_sources()).copied().collect(),
        }
    }

    /// Evaluate this expression given the materialised values of every `WaitOp` it
    /// references (the caller gathers these from the arena before calling `eval`, since
    /// `BufferOp` itself has no access to the graph).
    pub fn eval(&self, waits: &std::collections::HashMap<NodeId, Value>) -> Result<Value, CoreError> {
        match self {
            BufferOp::Constant(v) => Ok(v.clone()),
            BufferOp::Register(cell) => Ok(cell.borrow().clone()),
            BufferOp::WaitOpBuffer(id) => waits.get(id).cloned().ok_or_else(|| CoreError::BufferEvalError {
                detail: format!("wait node {id} has no materialised value"),
            }),
            BufferOp::Binary(l, op, r) => eval_binary(l.eval(waits)?, *op, r.eval(waits)?),
            BufferOp::Unary(op, p) => eval_unary(*op, p.eval(waits)?),
            BufferOp::Comparison(p, op, o) => eval_comparison(p.eval(waits)?, *op, o.eval(waits)?),
        }
    }
}

fn as_int(v: &Value) -> Result<i64, CoreError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(CoreError::BufferEvalError {
            detail: format!("expected an int, got {other:?}"),
        }),
    }
}

fn eval_binary(left: Value, op: BinOp, right: Value) -> Result<Value, CoreError> {
    if op == BinOp::Add {
        if let (Value::Str(a), Value::Str(b)) = (&left, &right) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    let (a, b) = (as_int(&left)?, as_int(&right)?);
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => floor_div(a, b),
        BinOp::Mod => floor_mod(a, b),
        BinOp::Pow => return eval_pow(a, b).map(Value::Int),
    };
    Ok(Value::Int(result))
}

/// Floor toward negative infinity, matching Python's `//` (Rust's `/` truncates toward
/// zero instead).
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Takes the divisor's sign, matching Python's `%` (Rust's `%` takes the dividend's sign
/// instead).
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

fn eval_pow(a: i64, b: i64) -> Result<i64, CoreError> {
    let exp: u32 = b.try_into().map_err(|_| CoreError::BufferEvalError {
        detail: format!("cannot raise {a} to a negative exponent {b}"),
    })?;
    a.checked_pow(exp).ok_or_else(|| CoreError::BufferEvalError {
        detail: format!("{a}.pow({exp}) overflowed an i64"),
    })
}

fn eval_unary(op: UnOp, value: Value) -> Result<Value, CoreError> {
    match op {
        UnOp::Not => match value {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(CoreError::BufferEvalError {
                detail: format!("`not` expects a bool, got {other:?}"),
            }),
        },
        UnOp::Neg => Ok(Value::Int(-as_int(&value)?)),
        UnOp::Pos => Ok(Value::Int(as_int(&value)?)),
        UnOp::BitNot => Ok(Value::Int(!as_int(&value)?)),
    }
}

fn eval_comparison(left: Value, op: CmpOp, right: Value) -> Result<Value, CoreError> {
    let result = match op {
        CmpOp::Eq => left == right,
        CmpOp::Ne => left != right,
        CmpOp::Lt => as_int(&left)? < as_int(&right)?,
        CmpOp::Le => as_int(&left)? <= as_int(&right)?,
        CmpOp::Gt => as_int(&left)? > as_int(&right)?,
        CmpOp::Ge => as_int(&left)? >= as_int(&right)?,
    };
    Ok(Value::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn constant_has_no_sources() {
        let c = BufferOp::Constant(Value::Int(1));
        assert!(c.get_sources().is_empty());
    }

    #[test]
    fn wait_op_buffer_sources_is_itself() {
        let w = BufferOp::WaitOpBuffer(NodeId(3));
        assert_eq!(w.get_sources(), HashSet::from([NodeId(3)]));
    }

    #[test]
    fn binary_union_of_sources() {
        let expr = BufferOp::Binary(
            Box::new(BufferOp::WaitOpBuffer(NodeId(1))),
            BinOp::Add,
            Box::new(BufferOp::WaitOpBuffer(NodeId(2))),
        );
        assert_eq!(expr.get_sources(), HashSet::from([NodeId(1), NodeId(2)]));
    }

    #[test]
    fn eval_plus_one_scenario() {
        // emit(wait(x:int) + 1) on [Base(1)] => Base(2) (spec scenario 6).
        let expr = BufferOp::Binary(
            Box::new(BufferOp::WaitOpBuffer(NodeId(0))),
            BinOp::Add,
            Box::new(BufferOp::Constant(Value::Int(1))),
        );
        let waits = HashMap::from([(NodeId(0), Value::Int(1))]);
        assert_eq!(expr.eval(&waits).unwrap(), Value::Int(2));
    }

    #[test]
    fn comparison_yields_bool() {
        let expr = BufferOp::Comparison(
            Box::new(BufferOp::Constant(Value::Int(0))),
            CmpOp::Eq,
            Box::new(BufferOp::Constant(Value::Int(0))),
        );
        assert_eq!(expr.eval(&HashMap::new()).unwrap(), Value::Bool(true));
    }

    #[test]
    fn register_updates_in_place() {
        let reg = BufferOp::register(Value::Int(0));
        reg.update_register(Value::Int(42));
        assert_eq!(reg.eval(&HashMap::new()).unwrap(), Value::Int(42));
    }

    fn binary(a: i64, op: BinOp, b: i64) -> Result<Value, CoreError> {
        BufferOp::Binary(Box::new(BufferOp::Constant(Value::Int(a))), op, Box::new(BufferOp::Constant(Value::Int(b))))
            .eval(&HashMap::new())
    }

    #[test]
    fn floor_div_matches_python_for_mixed_signs() {
        // -7 // -2 == 3 in Python; `i64::div_euclid` would give 4.
        assert_eq!(binary(-7, BinOp::FloorDiv, -2).unwrap(), Value::Int(3));
        // 7 // -3 == -3 in Python.
        assert_eq!(binary(7, BinOp::FloorDiv, -3).unwrap(), Value::Int(-3));
        // same-sign division is unaffected.
        assert_eq!(binary(7, BinOp::FloorDiv, 2).unwrap(), Value::Int(3));
    }

    #[test]
    fn mod_takes_the_divisors_sign_like_python() {
        // 7 % -3 == -2 in Python; `i64::rem_euclid` would give 1.
        assert_eq!(binary(7, BinOp::Mod, -3).unwrap(), Value::Int(-2));
        assert_eq!(binary(-7, BinOp::Mod, 2).unwrap(), Value::Int(1));
        assert_eq!(binary(6, BinOp::Mod, 3).unwrap(), Value::Int(0));
    }

    #[test]
    fn pow_rejects_negative_exponent_instead_of_panicking() {
        let err = binary(2, BinOp::Pow, -1).unwrap_err();
        assert!(matches!(err, CoreError::BufferEvalError { .. }));
    }

    #[test]
    fn pow_rejects_overflow_instead_of_panicking() {
        let err = binary(2, BinOp::Pow, 100).unwrap_err();
        assert!(matches!(err, CoreError::BufferEvalError { .. }));
    }

    #[test]
    fn pow_computes_normally_for_valid_input() {
        assert_eq!(binary(2, BinOp::Pow, 10).unwrap(), Value::Int(1024));
    }
}
