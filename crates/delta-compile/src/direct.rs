//! The direct backend: a native-recursion state machine over [`CompilationContext`],
//! closest in shape to the reference interpreter's own `pull` but driven against this
//! crate's independently allocated node state rather than the IR's. Grounded on
//! `lmlang-codegen`'s tree-walking codegen pass, generalised from "emit LLVM IR for this
//! node" to "evaluate this node's next event directly".
//!
//! Per spec §4.4/SPEC_FULL.md §2, `WaitOp`/`EmitOp`/`Par*` are rejected by
//! [`CompilationContext::build`] before a [`DirectProgram`] is ever constructed, so this
//! executor's `pull` never needs arms for them.

use std::collections::HashMap;

use delta_core::ir::CatRPhase;
use delta_core::{Event, NodeId, Program, Value};

use crate::context::{CompiledKind, CompilationContext};
use crate::error::{Backend, CompileError};
use crate::runtime::{CompiledProgram, StepResult};

pub struct DirectProgram {
    ctx: CompilationContext,
    bindings: HashMap<NodeId, Box<dyn Iterator<Item = Event>>>,
}

impl DirectProgram {
    pub fn compile(program: &Program) -> Result<Self, CompileError> {
        let ctx = CompilationContext::build(program, Backend::Direct)?;
        Ok(DirectProgram { ctx, bindings: HashMap::new() })
    }

    fn pull(&mut self, node: NodeId) -> Result<StepResult, CompileError> {
        match &self.ctx.node(node).kind {
            CompiledKind::Var { name } => {
                let next = self
                    .bindings
                    .get_mut(&node)
                    .ok_or_else(|| CompileError::UnboundVar { node, name: name.clone() })?
                    .next();
                Ok(match next {
                    Some(e) => StepResult::Event(e),
                    None => StepResult::Done,
                })
            }
            CompiledKind::Eps => Ok(StepResult::Done),
            CompiledKind::Singleton { value, emitted } => {
                if emitted.get() {
                    Ok(StepResult::Done)
                } else {
                    emitted.set(true);
                    Ok(StepResult::Event(Event::Base(value.clone())))
                }
            }
            CompiledKind::CatR { s1, s2, phase } => {
                let (s1, s2, ph) = (*s1, *s2, phase.get());
                match ph {
                    CatRPhase::First => match self.pull(s1)? {
                        StepResult::Event(v) => Ok(StepResult::Event(Event::cat_a(v))),
                        StepResult::Skip => Ok(StepResult::Skip),
                        StepResult::Done => {
                            if let CompiledKind::CatR { phase, .. } = &self.ctx.node(node).kind {
                                phase.set(CatRPhase::Second);
                            }
                            Ok(StepResult::Event(Event::CatPunc))
                        }
                    },
                    CatRPhase::Second => self.pull(s2),
                }
            }
            CompiledKind::CatProjCoordinator { .. } => {
                unreachable!("CatProjCoordinator is pulled only via its CatProj peers")
            }
            CompiledKind::CatProj { coordinator, position } => {
                self.pull_cat_for_position(*coordinator, *position)
            }
            CompiledKind::SumInj { s, position, tag_emitted } => {
                let (s, position) = (*s, *position);
                if tag_emitted.get() {
                    self.pull(s)
                } else {
                    if let CompiledKind::SumInj { tag_emitted, .. } = &self.ctx.node(node).kind {
                        tag_emitted.set(true);
                    }
                    Ok(StepResult::Event(if position == 0 { Event::PlusA } else { Event::PlusB }))
                }
            }
            CompiledKind::CaseOp { s, branches, tag_read, active } => {
                let (s, branches) = (*s, *branches);
                if tag_read.get() {
                    self.pull(branches[active.get() as usize])
                } else {
                    match self.pull(s)? {
                        StepResult::Done => Ok(StepResult::Done),
                        StepResult::Skip => Ok(StepResult::Skip),
                        StepResult::Event(Event::PlusA) => {
                            self.set_case_active(node, 0);
                            Ok(StepResult::Skip)
                        }
                        StepResult::Event(Event::PlusB) => {
                            self.set_case_active(node, 1);
                            Ok(StepResult::Skip)
                        }
                        StepResult::Event(other) => Err(CompileError::UnexpectedTag {
                            node,
                            detail: format!("expected PlusA/PlusB tag, got {other}"),
                        }),
                    }
                }
            }
            CompiledKind::CondOp { cond, branches, active } => {
                let (cond, branches) = (*cond, *branches);
                if active.get() >= 0 {
                    self.pull(branches[active.get() as usize])
                } else {
                    match self.pull(cond)? {
                        StepResult::Done => Ok(StepResult::Done),
                        StepResult::Skip => Ok(StepResult::Skip),
                        StepResult::Event(Event::Base(Value::Bool(b))) => {
                            if let CompiledKind::CondOp { active, .. } = &self.ctx.node(node).kind {
                                active.set(if b { 0 } else { 1 });
                            }
                            Ok(StepResult::Skip)
                        }
                        StepResult::Event(other) => Err(CompileError::UnexpectedTag {
                            node,
                            detail: format!("expected a boolean Base event, got {other}"),
                        }),
                    }
                }
            }
            CompiledKind::UnsafeCast { s } => self.pull(*s),
            CompiledKind::SinkThen { s1, s2, first_exhausted } => {
                let (s1, s2) = (*s1, *s2);
                if first_exhausted.get() {
                    self.pull(s2)
                } else {
                    match self.pull(s1)? {
                        StepResult::Done => {
                            if let CompiledKind::SinkThen { first_exhausted, .. } = &self.ctx.node(node).kind {
                                first_exhausted.set(true);
                            }
                            Ok(StepResult::Skip)
                        }
                        StepResult::Skip => Ok(StepResult::Skip),
                        StepResult::Event(_) => Ok(StepResult::Skip),
                    }
                }
            }
            CompiledKind::ResetOp { set } => {
                for id in set.clone() {
                    self.ctx.node(id).reset();
                }
                Ok(StepResult::Skip)
            }
            CompiledKind::WaitOp { .. } | CompiledKind::EmitOp { .. } => {
                unreachable!("WaitOp/EmitOp are rejected by CompilationContext::build for the direct backend")
            }
        }
    }

    fn set_case_active(&self, node: NodeId, branch: i8) {
        if let CompiledKind::CaseOp { tag_read, active, .. } = &self.ctx.node(node).kind {
            tag_read.set(true);
            active.set(branch);
        }
    }

    fn pull_cat_for_position(&mut self, coordinator: NodeId, p: u8) -> Result<StepResult, CompileError> {
        let (s, seen_punc, exhausted) = match &self.ctx.node(coordinator).kind {
            CompiledKind::CatProjCoordinator { s, seen_punc, exhausted } => (*s, seen_punc.get(), exhausted.get()),
            _ => panic!("pull_cat_for_position called on a non-coordinator node"),
        };
        if exhausted || (p == 0 && seen_punc) {
            return Ok(StepResult::Done);
        }
        match self.pull(s)? {
            StepResult::Done => {
                if let CompiledKind::CatProjCoordinator { exhausted, .. } = &self.ctx.node(coordinator).kind {
                    exhausted.set(true);
                }
                Ok(StepResult::Done)
            }
            StepResult::Skip => Ok(StepResult::Skip),
            StepResult::Event(e) => {
                if p == 0 {
                    match e {
                        Event::CatA(v) => Ok(StepResult::Event(*v)),
                        Event::CatPunc => {
                            if let CompiledKind::CatProjCoordinator { seen_punc, .. } = &self.ctx.node(coordinator).kind
                            {
                                seen_punc.set(true);
                            }
                            Ok(StepResult::Done)
                        }
                        _ => Ok(StepResult::Skip),
                    }
                } else if !seen_punc {
                    if matches!(e, Event::CatPunc) {
                        if let CompiledKind::CatProjCoordinator { seen_punc, .. } = &self.ctx.node(coordinator).kind {
                            seen_punc.set(true);
                        }
                    }
                    Ok(StepResult::Skip)
                } else {
                    Ok(StepResult::Event(e))
                }
            }
        }
    }
}

impl CompiledProgram for DirectProgram {
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
    fn passthrough_agrees_with_direct_semantics() {
        let mut b = Builder::new();
        let x = b.var("x", Some(Type::Singleton(ScalarKind::Str)));
        b.program.set_output(x);
        let mut prog = DirectProgram::compile(&b.program).unwrap();
        prog.bind(x, Box::new(vec![Event::Base(Value::Str("x".into()))].into_iter()));
        assert_eq!(prog.next_event().unwrap(), Some(Event::Base(Value::Str("x".into()))));
        assert_eq!(prog.next_event().unwrap(), None);
    }

    #[test]
    fn wait_op_is_rejected_at_compile_time() {
        let mut b = Builder::new();
        let x = b.var("x", Some(Type::Singleton(ScalarKind::Int)));
        let w = b.wait(Type::Singleton(ScalarKind::Int), x);
        b.program.set_output(w);
        let err = DirectProgram::compile(&b.program).unwrap_err();
        assert!(matches!(err, CompileError::NotYetImplemented { backend: Backend::Direct, .. }));
    }
}
