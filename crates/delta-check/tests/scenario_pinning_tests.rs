//! Interpreter-driven pinning tests for the `map`/`concat`/`zip_with`/`split_z` builder
//! combinators, run to exhaustion through the reference interpreter rather than merely
//! checked for a successful build. These are the concrete scenarios (spec §8, scenarios
//! 4, 5, and 7) that exercise the `ResetOp` reset-block recursion end to end.

use delta_check::{Interpreter, InterpreterConfig};
use delta_core::{BinOp, Builder, BufferOp, Event, NodeId, Program, ScalarKind, Type, Value};

fn run(program: Program, bindings: Vec<(NodeId, Vec<Event>)>) -> Vec<Event> {
    let mut interp = Interpreter::new(program, InterpreterConfig::default());
    for (node, events) in bindings {
        interp.bind(node, events.into_iter());
    }
    interp.run_to_exhaustion().unwrap()
}

/// Encode a `Star(Int)` list as the flat event sequence a `cons`/`nil` chain produces:
/// one `PlusB, CatA(head), CatPunc` per element, terminated by `PlusA`.
fn encode_int_list(values: &[i64]) -> Vec<Event> {
    let mut out = Vec::new();
    for v in values {
        out.push(Event::PlusB);
        out.push(Event::cat_a(Event::Base(Value::Int(*v))));
        out.push(Event::CatPunc);
    }
    out.push(Event::PlusA);
    out
}

#[test]
fn scenario_4_map_identity_over_a_star_reproduces_the_input() {
    let mut b = Builder::new();
    let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let mapped = b.map(xs, |_, head| Ok(head)).unwrap();
    b.program.set_output(mapped);

    let input = encode_int_list(&[3, 4]);
    let out = run(b.program, vec![(xs, input.clone())]);
    assert_eq!(out, input);
}

#[test]
fn scenario_5_concat_flattens_two_stars() {
    let mut b = Builder::new();
    let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let ys = b.var("ys", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let out_node = b.concat(xs, ys).unwrap();
    b.program.set_output(out_node);

    let out = run(
        b.program,
        vec![(xs, encode_int_list(&[1, 2])), (ys, encode_int_list(&[3, 4]))],
    );
    assert_eq!(out, encode_int_list(&[1, 2, 3, 4]));
}

#[test]
fn scenario_7_zip_with_sums_elementwise() {
    let mut b = Builder::new();
    let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let ys = b.var("ys", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let out_node = b
        .zip_with(xs, ys, |b, xh, yh| {
            let wx = b.wait(Type::Singleton(ScalarKind::Int), xh);
            let wy = b.wait(Type::Singleton(ScalarKind::Int), yh);
            let expr = BufferOp::Binary(
                Box::new(BufferOp::WaitOpBuffer(wx)),
                BinOp::Add,
                Box::new(BufferOp::WaitOpBuffer(wy)),
            );
            Ok(b.emit(Type::Singleton(ScalarKind::Int), expr))
        })
        .unwrap();
    b.program.set_output(out_node);

    let out = run(
        b.program,
        vec![(xs, encode_int_list(&[1, 2, 3])), (ys, encode_int_list(&[4, 5, 6]))],
    );
    assert_eq!(out, encode_int_list(&[5, 7, 9]));
}

#[test]
fn split_z_splits_at_the_first_zero() {
    // `split_z` is not a per-element zip: it walks the list until it finds the first
    // zero, returning (everything before the zero, everything strictly after it). The
    // zero itself is dropped. The left projection (ys) is the standard `CatA`-wrapped
    // Cat encoding; the right projection (zs) continues unwrapped, as `catr`'s second
    // half always does.
    let mut b = Builder::new();
    let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let out_node = b.split_z(xs).unwrap();
    b.program.set_output(out_node);

    let out = run(b.program, vec![(xs, encode_int_list(&[0, 5, 6]))]);

    let mut expected = vec![Event::cat_a(Event::PlusA), Event::CatPunc];
    expected.extend(encode_int_list(&[5, 6]));
    assert_eq!(out, expected);
}

#[test]
fn split_z_keeps_everything_before_a_trailing_zero() {
    let mut b = Builder::new();
    let xs = b.var("xs", Some(Type::star(Type::Singleton(ScalarKind::Int))));
    let out_node = b.split_z(xs).unwrap();
    b.program.set_output(out_node);

    let out = run(b.program, vec![(xs, encode_int_list(&[1, 2, 0]))]);

    let mut expected: Vec<Event> = encode_int_list(&[1, 2])
        .into_iter()
        .map(Event::cat_a)
        .collect();
    expected.push(Event::CatPunc);
    expected.push(Event::PlusA);
    assert_eq!(out, expected);
}
