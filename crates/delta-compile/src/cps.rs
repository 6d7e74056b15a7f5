//! The CPS backend: the same operator semantics as the direct backend, but driven by an
//! explicit stack of defunctionalized continuations instead of native Rust recursion —
//! each `pull` is a flat loop over a work stack rather than a call-stack-recursive
//! descent. Grounded in spirit on `lmlang-codegen`'s separate codegen strategies sharing
//! one IR walk; there the strategies differ in emitted instruction shape, here they differ
//! in control-flow shape over the same [`CompilationContext`].
//!
//! Per SPEC_FULL.md §2, `WaitOp`/`EmitOp` are accepted structurally (unlike the direct
//! backend, which rejects them) but behave as no-ops: a `WaitOp` never buffers anything
//! and is immediately `Done`, and an `EmitOp` immediately `Done` without ever evaluating
//! its buffer expression. `Par*` is rejected, as for every backend.

use std::collections::HashMap;

use delta_core::ir::CatRPhase;
use delta_core::{Event, NodeId, Program, Value};

use crate::context::{CompiledKind, CompilationContext};
use crate::error::{Backend, CompileError};
use crate::runtime::{CompiledProgram, StepResult};

/// A continuation awaiting the result of exactly one child pull, represented as data
/// (defunctionalized) rather than a boxed closure.
enum Cont {
    CatRFirst(NodeId),
    CatProjPosition(NodeId, u8),
    CaseSelect(NodeId),
    CondSelect(NodeId),
    SinkThenFirst(NodeId),
}

enum Trampoline {
    Return(StepResult),
    PullNode(NodeId),
}

pub struct CpsProgram {
    ctx: CompilationContext,
    bindings: HashMap<NodeId, Box<dyn Iterator<Item = Event>>>,
}

impl CpsProgram {
    pub fn compile(program: &Program) -> Result<Self, CompileError> {
        let ctx = CompilationContext::build(program, Backend::Cps)?;
        Ok(CpsProgram { ctx, bindings: HashMap::new() })
    }

    fn pull(&mut self, start: NodeId) -> Result<StepResult, CompileError> {
        let mut conts: Vec<Cont> = Vec::new();
        let mut current = start;
        'outer: loop {
            let mut tramp = self.step_node(current, &mut conts)?;
            loop {
                match tramp {
                    Trampoline::PullNode(next) => {
                        current = next;
                        continue 'outer;
                    }
                    Trampoline::Return(result) => match conts.pop() {
                        None => return Ok(result),
                        Some(cont) => tramp = self.apply_cont(cont, result)?,
                    },
                }
            }
        }
    }

    /// The first action for `node`: a leaf resolves immediately, a composite node either
    /// tail-calls a child (no continuation needed) or pushes a [`Cont`] describing how to
    /// interpret that child's result.
    fn step_node(&mut self, node: NodeId, conts: &mut Vec<Cont>) -> Result<Trampoline, CompileError> {
        match &self.ctx.node(node).kind {
            CompiledKind::Var { name } => {
                let next = self
                    .bindings
                    .get_mut(&node)
                    .ok_or_else(|| CompileError::UnboundVar { node, name: name.clone() })?
                    .next();
                Ok(Trampoline::Return(match next {
                    Some(e) => StepResult::Event(e),
                    None => StepResult::Done,
                }))
            }
            CompiledKind::Eps => Ok(Trampoline::Return(StepResult::Done)),
            CompiledKind::Singleton { value, emitted } => {
                if emitted.get() {
                    Ok(Trampoline::Return(StepResult::Done))
                } else {
                    emitted.set(true);
                    Ok(Trampoline::Return(StepResult::Event(Event::Base(value.clone()))))
                }
            }
            CompiledKind::CatR { s1, s2, phase } => match phase.get() {
                CatRPhase::First => {
                    conts.push(Cont::CatRFirst(node));
                    Ok(Trampoline::PullNode(*s1))
                }
                CatRPhase::Second => Ok(Trampoline::PullNode(*s2)),
            },
            CompiledKind::CatProjCoordinator { .. } => {
                unreachable!("CatProjCoordinator is pulled only via its CatProj peers")
            }
            CompiledKind::CatProj { coordinator, position } => {
                let (coordinator, position) = (*coordinator, *position);
                let (s, seen_punc, exhausted) = match &self.ctx.node(coordinator).kind {
                    CompiledKind::CatProjCoordinator { s, seen_punc, exhausted } => {
                        (*s, seen_punc.get(), exhausted.get())
                    }
                    _ => panic!("CatProj must point at a CatProjCoordinator"),
                };
                if exhausted || (position == 0 && seen_punc) {
                    return Ok(Trampoline::Return(StepResult::Done));
                }
                conts.push(Cont::CatProjPosition(coordinator, position));
                Ok(Trampoline::PullNode(s))
            }
            CompiledKind::SumInj { s, position, tag_emitted } => {
                if tag_emitted.get() {
                    Ok(Trampoline::PullNode(*s))
                } else {
                    tag_emitted.set(true);
                    let tag = if *position == 0 { Event::PlusA } else { Event::PlusB };
                    Ok(Trampoline::Return(StepResult::Event(tag)))
                }
            }
            CompiledKind::CaseOp { s, branches, tag_read, active } => {
                if tag_read.get() {
                    Ok(Trampoline::PullNode(branches[active.get() as usize]))
                } else {
                    conts.push(Cont::CaseSelect(node));
                    Ok(Trampoline::PullNode(*s))
                }
            }
            CompiledKind::CondOp { cond, branches, active } => {
                if active.get() >= 0 {
                    Ok(Trampoline::PullNode(branches[active.get() as usize]))
                } else {
                    conts.push(Cont::CondSelect(node));
                    Ok(Trampoline::PullNode(*cond))
                }
            }
            CompiledKind::UnsafeCast { s } => Ok(Trampoline::PullNode(*s)),
            CompiledKind::SinkThen { s1, s2, first_exhausted } => {
                if first_exhausted.get() {
                    Ok(Trampoline::PullNode(*s2))
                } else {
                    conts.push(Cont::SinkThenFirst(node));
                    Ok(Trampoline::PullNode(*s1))
                }
            }
            CompiledKind::ResetOp { set } => {
                for id in set.clone() {
                    self.ctx.node(id).reset();
                }
                Ok(Trampoline::Return(StepResult::Skip))
            }
            // No-op per SPEC_FULL.md §2: neither consumes input nor evaluates its buffer
            // expression.
            CompiledKind::WaitOp { .. } | CompiledKind::EmitOp { .. } => {
                Ok(Trampoline::Return(StepResult::Done))
            }
        }
    }

    fn apply_cont(&mut self, cont: Cont, result: StepResult) -> Result<Trampoline, CompileError> {
        match cont {
            Cont::CatRFirst(node) => match result {
                StepResult::Event(v) => Ok(Trampoline::Return(StepResult::Event(Event::cat_a(v)))),
                StepResult::Skip => Ok(Trampoline::Return(StepResult::Skip)),
                StepResult::Done => {
                    if let CompiledKind::CatR { phase, .. } = &self.ctx.node(node).kind {
                        phase.set(CatRPhase::Second);
                    }
                    Ok(Trampoline::Return(StepResult::Event(Event::CatPunc)))
                }
            },
            Cont::CatProjPosition(coordinator, position) => match result {
                StepResult::Done => {
                    if let CompiledKind::CatProjCoordinator { exhausted, .. } = &self.ctx.node(coordinator).kind {
                        exhausted.set(true);
                    }
                    Ok(Trampoline::Return(StepResult::Done))
                }
                StepResult::Skip => Ok(Trampoline::Return(StepResult::Skip)),
                StepResult::Event(e) => {
                    if position == 0 {
                        match e {
                            Event::CatA(v) => Ok(Trampoline::Return(StepResult::Event(*v))),
                            Event::CatPunc => {
                                if let CompiledKind::CatProjCoordinator { seen_punc, .. } =
                                    &self.ctx.node(coordinator).kind
                                {
                                    seen_punc.set(true);
                                }
                                Ok(Trampoline::Return(StepResult::Done))
                            }
                            _ => Ok(Trampoline::Return(StepResult::Skip)),
                        }
                    } else {
                        let seen_punc = match &self.ctx.node(coordinator).kind {
                            CompiledKind::CatProjCoordinator { seen_punc, .. } => seen_punc.get(),
                            _ => unreachable!(),
                        };
                        if !seen_punc {
                            if matches!(e, Event::CatPunc) {
                                if let CompiledKind::CatProjCoordinator { seen_punc, .. } =
                                    &self.ctx.node(coordinator).kind
                                {
                                    seen_punc.set(true);
                                }
                            }
                            Ok(Trampoline::Return(StepResult::Skip))
                        } else {
                            Ok(Trampoline::Return(StepResult::Event(e)))
                        }
                    }
                }
            },
            Cont::CaseSelect(node) => match result {
                StepResult::Done => Ok(Trampoline::Return(StepResult::Done)),
                StepResult::Skip => Ok(Trampoline::Return(StepResult::Skip)),
                StepResult::Event(Event::PlusA) => {
                    self.set_case_active(node, 0);
                    Ok(Trampoline::Return(StepResult::Skip))
                }
                StepResult::Event(Event::PlusB) => {
                    self.set_case_active(node, 1);
                    Ok(Trampoline::Return(StepResult::Skip))
                }
                StepResult::Event(other) => Err(CompileError::UnexpectedTag {
                    node,
                    detail: format!("expected PlusA/PlusB tag, got {other}"),
                }),
            },
            Cont::CondSelect(node) => match result {
                StepResult::Done => Ok(Trampoline::Return(StepResult::Done)),
                StepResult::Skip => Ok(Trampoline::Return(StepResult::Skip)),
                StepResult::Event(Event::Base(Value::Bool(b))) => {
                    if let CompiledKind::CondOp { active, .. } = &self.ctx.node(node).kind {
                        active.set(if b { 0 } else { 1 });
                    }
                    Ok(Trampoline::Return(StepResult::Skip))
                }
                StepResult::Event(other) => Err(CompileError::UnexpectedTag {
                    node,
                    detail: format!("expected a boolean Base event, got {other}"),
                }),
            },
            Cont::SinkThenFirst(node) => match result {
                StepResult::Done => {
                    if let CompiledKind::SinkThen { first_exhausted, .. } = &self.ctx.node(node).kind {
                        first_exhausted.set(true);
                    }
                    Ok(Trampoline::Return(StepResult::Skip))
                }
                StepResult::Skip => Ok(Trampoline::Return(StepResult::Skip)),
                StepResult::Event(_) => Ok(Trampoline::Return(StepResult::Skip)),
            },
        }
    }

    fn set_case_active(&self, node: NodeId, branch: i8) {
        if let CompiledKind::CaseOp { tag_read, active, .. } = &self.ctx.node(node).kind {
            tag_read.set(true);
            active.set(branch);
        }
    }
}

impl CompiledProgram for CpsProgram {
    fn bind(&mut self, var: NodeId, source: Box<dyn Iterator<Item = Event>>) {
        self.bindings.insert(var, source);
    }

    fn next_event(&mut self) -> Result<Option<Event>, CompileError> {
        loop {
            match self.pull(self.ctx.output)? {
                StepResult::Done => return Ok(None),
                StepResult::Skip => continue,
                StepResult::Event(e) => return Ok(Some(e)),
            }
        }
    }

    fn reset(&mut self) {
        self.ctx.reset_all();
        self.bindings.clear();
    }

    fn input_vars(&self) -> &[NodeId] {
        &self.ctx.input_vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delta_core::{Builder, ScalarKind, Type};

    #[test]
    fn catr_agrees_with_direct_semantics() {
        let mut b = Builder::new();
        let x = b.var("x", Some(Type::Singleton(ScalarKind::Str)));
        let y = b.var("y", Some(Type::Singleton(ScalarKind::Str)));
        let cat = b.catr(x, y).unwrap();
        b.program.set_output(cat);
        let mut prog = CpsProgram::compile(&b.program).unwrap();
        prog.bind(x, Box::new(vec![Event::Base(Value::Str("x".into()))].into_iter()));
        prog.bind(y, Box::new(vec![Event::Base(Value::Str("y".into()))].into_iter()));
        let out = prog.run_to_exhaustion().unwrap();
        assert_eq!(
            out,
            vec![
                Event::cat_a(Event::Base(Value::Str("x".into()))),
                Event::CatPunc,
                Event::Base(Value::Str("y".into())),
            ]
        );
    }

    #[test]
    fn wait_op_is_a_no_op() {
        let mut b = Builder::new();
        let x = b.var("x", Some(Type::Singleton(ScalarKind::Int)));
        let w = b.wait(Type::Singleton(ScalarKind::Int), x);
        b.program.set_output(w);
        let mut prog = CpsProgram::compile(&b.program).unwrap();
        prog.bind(x, Box::new(vec![Event::Base(Value::Int(1))].into_iter()));
        assert_eq!(prog.run_to_exhaustion().unwrap(), Vec::<Event>::new());
    }
}
