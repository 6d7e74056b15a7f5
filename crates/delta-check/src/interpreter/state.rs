//! The reference interpreter: drives the `pull` contract of spec §4.3 to exhaustion
//! against a [`delta_core::graph::Program`], with bound input iterators standing in for
//! `Var` nodes.
//!
//! Grounded on `lmlang-check/src/interpreter/state.rs`'s `Interpreter`/`InterpreterConfig`
//! shape, generalised from a work-list graph interpreter to a single-output pull loop —
//! this system has exactly one conceptual task (spec §5), not a call stack of frames.

use std::collections::{HashMap, VecDeque};

use delta_core::bufferop::BufferOp;
use delta_core::ir::{CatRPhase, EmitPhase, StreamOpKind};
use delta_core::{buffer, Event, NodeId, Program, Value};

use crate::error::RuntimeError;

use super::trace::{TraceEntry, TracedResult};

/// Configuration for the reference interpreter.
///
/// Grounded on `lmlang-check/src/interpreter/state.rs`'s `InterpreterConfig { trace_enabled,
/// max_recursion_depth }`; `max_steps` replaces `max_recursion_depth` because this
/// interpreter's recursion is pull-depth through the IR DAG on a single output node, not
/// call-stack recursion across function frames.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Whether to record a [`TraceEntry`] for every non-skip pull.
    pub trace_enabled: bool,
    /// Upper bound on total pull calls before a run is aborted as non-terminating.
    /// Default: 1_000_000.
    pub max_steps: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            trace_enabled: false,
            max_steps: 1_000_000,
        }
    }
}

/// One step of [`Interpreter::pull`], mirroring spec §4.3's three-way pull contract
/// exactly (`Done | None | event`), kept as its own type instead of `Option<Option<Event>>`
/// so call sites read as the three named cases they are.
#[derive(Debug, Clone, PartialEq)]
pub enum PullResult {
    Done,
    Skip,
    Event(Event),
}

type BoundIterator = Box<dyn Iterator<Item = Event>>;

/// Per-`ParProjCoordinator` event queues, keyed by the coordinator's node id. `Par` has
/// no separator event, so unlike `CatProjCoordinator` (which only ever needs to buffer
/// up to one pending side), a `ParProj` may need to buffer an unbounded run of events
/// belonging to the side nobody has pulled yet. Carried on the interpreter rather than
/// the IR node itself (see `delta_core::ir`'s module doc on compiled-vs-interpreted
/// state ownership) since `Par`/`parl`/`parr` are reference-interpreter-only.
#[derive(Debug, Default)]
struct ParQueues {
    left: VecDeque<Event>,
    right: VecDeque<Event>,
}

/// Drives a [`Program`] by pulling its output node to exhaustion, per spec §4.3 and the
/// Runtime API of §6. One `Interpreter` corresponds to one execution of one program;
/// [`Interpreter::reset`] returns it (and the program's node state) to its initial state
/// for re-driving with fresh input iterators (P6).
pub struct Interpreter {
    program: Program,
    bindings: HashMap<NodeId, BoundIterator>,
    par_queues: HashMap<NodeId, ParQueues>,
    config: InterpreterConfig,
    trace: Vec<TraceEntry>,
    steps: usize,
}

impl Interpreter {
    pub fn new(program: Program, config: InterpreterConfig) -> Self {
        Interpreter {
            program,
            bindings: HashMap::new(),
            par_queues: HashMap::new(),
            config,
            trace: Vec::new(),
            steps: 0,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Bind an input iterator to a `Var` node. Must be called once per entry in
    /// `program.input_vars()` before driving; an unbound `Var` that is pulled raises
    /// [`RuntimeError::UnboundVar`].
    pub fn bind(&mut self, var: NodeId, source: impl Iterator<Item = Event> + 'static) {
        self.bindings.insert(var, Box::new(source));
    }

    /// Restore every node's own state and drop all input bindings and queued trace
    /// entries. Per P6, re-binding the same (restartable) input iterators and re-driving
    /// must reproduce the first run's event sequence.
    pub fn reset(&mut self) {
        for idx in 0..self.program.node_count() {
            self.program.reset_node(NodeId(idx as u32));
        }
        self.bindings.clear();
        self.par_queues.clear();
        self.trace.clear();
        self.steps = 0;
    }

    /// Pull the output node once, discarding skips, until it yields an event or is
    /// exhausted. `None` means the program's output stream has ended.
    pub fn next_event(&mut self) -> Result<Option<Event>, RuntimeError> {
        let output = self.program.output();
        loop {
            match self.pull(output)? {
                PullResult::Done => return Ok(None),
                PullResult::Skip => continue,
                PullResult::Event(e) => return Ok(Some(e)),
            }
        }
    }

    /// Drive the output node to exhaustion, collecting every event (spec §6's Runtime
    /// API `next` loop run to completion).
    pub fn run_to_exhaustion(&mut self) -> Result<Vec<Event>, RuntimeError> {
        let mut out = Vec::new();
        while let Some(e) = self.next_event()? {
            out.push(e);
        }
        Ok(out)
    }

    fn record(&mut self, node: NodeId, result: &PullResult) {
        if !self.config.trace_enabled {
            return;
        }
        let traced = match result {
            PullResult::Done => TracedResult::Done,
            PullResult::Skip => TracedResult::Skip,
            PullResult::Event(e) => TracedResult::Event(e.clone()),
        };
        self.trace.push(TraceEntry { node_id: node, result: traced });
    }

    /// The single non-blocking pull step of spec §4.3, dispatched by operator kind.
    /// Every path returns through here so the step budget and trace are centrally
    /// enforced regardless of how deep the recursion through child nodes goes.
    pub fn pull(&mut self, node: NodeId) -> Result<PullResult, RuntimeError> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(RuntimeError::StepBudgetExceeded { node, limit: self.config.max_steps });
        }
        let result = self.pull_uncounted(node)?;
        self.record(node, &result);
        Ok(result)
    }

    fn pull_uncounted(&mut self, node: NodeId) -> Result<PullResult, RuntimeError> {
        // Operator state is read up front by value/copy so the recursive pulls below
        // don't need to hold a borrow of `self.program` across a call to `self.pull`.
        enum Dispatch {
            Var { name: String },
            Eps,
            Singleton { already_emitted: bool, value: Value },
            CatR { s1: NodeId, s2: NodeId, phase: CatRPhase },
            CatProj { coordinator: NodeId, position: u8 },
            SumInj { s: NodeId, position: u8, already_tagged: bool },
            CaseOp { s: NodeId, branches: [NodeId; 2], tag_read: bool, active: i8 },
            CondOp { cond: NodeId, branches: [NodeId; 2], active: i8 },
            UnsafeCast { s: NodeId },
            SinkThen { s1: NodeId, s2: NodeId, first_exhausted: bool },
            ResetOp { set: Vec<NodeId> },
            WaitOp { s: NodeId, complete: bool },
            EmitOp { phase: EmitPhase, remaining: Option<(Vec<Event>, usize)>, buffer_op: BufferOp },
            ParR { s1: NodeId, s2: NodeId, s1_done: bool, s2_done: bool, next_is_s1: bool },
            ParProj { coordinator: NodeId, position: u8 },
        }

        let dispatch = {
            let n = self.program.node(node);
            match &n.kind {
                StreamOpKind::Var { name } => Dispatch::Var { name: name.clone() },
                StreamOpKind::Eps => Dispatch::Eps,
                StreamOpKind::Singleton { value, emitted } => {
                    Dispatch::Singleton { already_emitted: emitted.get(), value: value.clone() }
                }
                StreamOpKind::CatR { s1, s2, phase } => {
                    Dispatch::CatR { s1: *s1, s2: *s2, phase: phase.get() }
                }
                StreamOpKind::CatProjCoordinator { .. } => {
                    unreachable!("CatProjCoordinator is pulled only via its CatProj peers")
                }
                StreamOpKind::CatProj { coordinator, position } => {
                    Dispatch::CatProj { coordinator: *coordinator, position: *position }
                }
                StreamOpKind::SumInj { s, position, tag_emitted } => {
                    Dispatch::SumInj { s: *s, position: *position, already_tagged: tag_emitted.get() }
                }
                StreamOpKind::CaseOp { s, branches, tag_read, active } => Dispatch::CaseOp {
                    s: *s,
                    branches: *branches,
                    tag_read: tag_read.get(),
                    active: active.get(),
                },
                StreamOpKind::CondOp { cond, branches, active } => {
                    Dispatch::CondOp { cond: *cond, branches: *branches, active: active.get() }
                }
                StreamOpKind::UnsafeCast { s } => Dispatch::UnsafeCast { s: *s },
                StreamOpKind::SinkThen { s1, s2, first_exhausted } => {
                    Dispatch::SinkThen { s1: *s1, s2: *s2, first_exhausted: first_exhausted.get() }
                }
                StreamOpKind::ResetOp { set } => Dispatch::ResetOp { set: set.borrow().clone() },
                StreamOpKind::WaitOp { s, buffer } => {
                    Dispatch::WaitOp { s: *s, complete: buffer.borrow().is_complete() }
                }
                StreamOpKind::EmitOp { buffer_op, phase, event_buffer, idx } => {
                    let remaining = match phase.get() {
                        EmitPhase::Emitting => Some((event_buffer.borrow().clone(), idx.get())),
                        EmitPhase::Serializing => None,
                    };
                    Dispatch::EmitOp { phase: phase.get(), remaining, buffer_op: buffer_op.clone() }
                }
                StreamOpKind::ParR { s1, s2, s1_done, s2_done, next_is_s1 } => Dispatch::ParR {
                    s1: *s1,
                    s2: *s2,
                    s1_done: s1_done.get(),
                    s2_done: s2_done.get(),
                    next_is_s1: next_is_s1.get(),
                },
                StreamOpKind::ParProjCoordinator { .. } => {
                    unreachable!("ParProjCoordinator is pulled only via its ParProj peers")
                }
                StreamOpKind::ParProj { coordinator, position } => {
                    Dispatch::ParProj { coordinator: *coordinator, position: *position }
                }
            }
        };

        match dispatch {
            Dispatch::Var { name } => {
                let next = self
                    .bindings
                    .get_mut(&node)
                    .ok_or_else(|| RuntimeError::UnboundVar { node, name: name.clone() })?
                    .next();
                Ok(match next {
                    Some(e) => PullResult::Event(e),
                    None => PullResult::Done,
                })
            }
            Dispatch::Eps => Ok(PullResult::Done),
            Dispatch::Singleton { already_emitted, value } => {
                if already_emitted {
                    Ok(PullResult::Done)
                } else {
                    self.set_singleton_emitted(node);
                    Ok(PullResult::Event(Event::Base(value)))
                }
            }
            Dispatch::CatR { s1, s2, phase } => match phase {
                CatRPhase::First => match self.pull(s1)? {
                    PullResult::Event(v) => Ok(PullResult::Event(Event::cat_a(v))),
                    PullResult::Skip => Ok(PullResult::Skip),
                    PullResult::Done => {
                        self.set_catr_phase(node, CatRPhase::Second);
                        Ok(PullResult::Event(Event::CatPunc))
                    }
                },
                CatRPhase::Second => self.pull(s2),
            },
            Dispatch::CatProj { coordinator, position } => self.pull_cat_for_position(coordinator, position, node),
            Dispatch::SumInj { s, position, already_tagged } => {
                if !already_tagged {
                    self.set_sum_inj_tagged(node);
                    let tag = if position == 0 { Event::PlusA } else { Event::PlusB };
                    Ok(PullResult::Event(tag))
                } else {
                    self.pull(s)
                }
            }
            Dispatch::CaseOp { s, branches, tag_read, active } => {
                if !tag_read {
                    match self.pull(s)? {
                        PullResult::Done => Ok(PullResult::Done),
                        PullResult::Skip => Ok(PullResult::Skip),
                        PullResult::Event(Event::PlusA) => {
                            self.set_case_active(node, 0);
                            Ok(PullResult::Skip)
                        }
                        PullResult::Event(Event::PlusB) => {
                            self.set_case_active(node, 1);
                            Ok(PullResult::Skip)
                        }
                        PullResult::Event(other) => Err(RuntimeError::UnexpectedTag {
                            node,
                            detail: format!("expected PlusA/PlusB tag, got {other}"),
                        }),
                    }
                } else {
                    self.pull(branches[active as usize])
                }
            }
            Dispatch::CondOp { cond, branches, active } => {
                if active < 0 {
                    match self.pull(cond)? {
                        PullResult::Done => Ok(PullResult::Done),
                        PullResult::Skip => Ok(PullResult::Skip),
                        PullResult::Event(Event::Base(Value::Bool(b))) => {
                            let chosen = if b { 0 } else { 1 };
                            self.set_cond_active(node, chosen);
                            Ok(PullResult::Skip)
                        }
                        PullResult::Event(other) => Err(RuntimeError::UnexpectedTag {
                            node,
                            detail: format!("expected a boolean Base event, got {other}"),
                        }),
                    }
                } else {
                    self.pull(branches[active as usize])
                }
            }
            Dispatch::UnsafeCast { s } => self.pull(s),
            Dispatch::SinkThen { s1, s2, first_exhausted } => {
                if !first_exhausted {
                    match self.pull(s1)? {
                        PullResult::Done => {
                            self.set_sink_then_exhausted(node);
                            Ok(PullResult::Skip)
                        }
                        PullResult::Skip => Ok(PullResult::Skip),
                        PullResult::Event(_) => Ok(PullResult::Skip),
                    }
                } else {
                    self.pull(s2)
                }
            }
            Dispatch::ResetOp { set } => {
                for id in set {
                    self.program.reset_node(id);
                }
                Ok(PullResult::Skip)
            }
            Dispatch::WaitOp { s, complete } => {
                if complete {
                    Ok(PullResult::Done)
                } else {
                    match self.pull(s)? {
                        PullResult::Done => Ok(PullResult::Done),
                        PullResult::Skip => Ok(PullResult::Skip),
                        PullResult::Event(e) => {
                            self.poke_wait_buffer(node, &e, |detail| RuntimeError::IllTypedEvent {
                                node,
                                detail,
                            })?;
                            Ok(PullResult::Skip)
                        }
                    }
                }
            }
            Dispatch::EmitOp { phase, remaining, buffer_op } => match phase {
                EmitPhase::Serializing => {
                    let waits = self.collect_wait_values(&buffer_op, node)?;
                    let value = buffer_op
                        .eval(&waits)
                        .map_err(|e| RuntimeError::BufferEvalError { node, detail: e.to_string() })?;
                    let ty = self.program.node(node).stream_type.clone();
                    let events = buffer::value_to_events(&value, &ty);
                    self.start_emitting(node, events);
                    Ok(PullResult::Skip)
                }
                EmitPhase::Emitting => {
                    let (events, idx) = remaining.expect("Emitting phase always carries a buffer");
                    if idx < events.len() {
                        self.advance_emit_idx(node);
                        Ok(PullResult::Event(events[idx].clone()))
                    } else {
                        Ok(PullResult::Done)
                    }
                }
            },
            Dispatch::ParR { s1, s2, s1_done, s2_done, next_is_s1 } => {
                self.pull_par_r(node, s1, s2, s1_done, s2_done, next_is_s1)
            }
            Dispatch::ParProj { coordinator, position } => self.pull_par_for_position(coordinator, position),
        }
    }

    fn pull_cat_for_position(&mut self, coordinator: NodeId, p: u8, _caller: NodeId) -> Result<PullResult, RuntimeError> {
        let (s, seen_punc, exhausted) = match &self.program.node(coordinator).kind {
            StreamOpKind::CatProjCoordinator { s, seen_punc, exhausted } => (*s, seen_punc.get(), exhausted.get()),
            _ => panic!("pull_cat_for_position called on a non-coordinator node"),
        };
        if exhausted || (p == 0 && seen_punc) {
            return Ok(PullResult::Done);
        }
        match self.pull(s)? {
            PullResult::Done => {
                self.set_cat_coord_exhausted(coordinator);
                Ok(PullResult::Done)
            }
            PullResult::Skip => Ok(PullResult::Skip),
            PullResult::Event(e) => {
                if p == 0 {
                    match e {
                        Event::CatA(v) => Ok(PullResult::Event(*v)),
                        Event::CatPunc => {
                            self.set_cat_coord_seen_punc(coordinator);
                            Ok(PullResult::Done)
                        }
                        _ => Ok(PullResult::Skip),
                    }
                } else if !seen_punc {
                    if matches!(e, Event::CatPunc) {
                        self.set_cat_coord_seen_punc(coordinator);
                    }
                    Ok(PullResult::Skip)
                } else {
                    Ok(PullResult::Event(e))
                }
            }
        }
    }

    fn pull_par_r(
        &mut self,
        node: NodeId,
        s1: NodeId,
        s2: NodeId,
        s1_done: bool,
        s2_done: bool,
        next_is_s1: bool,
    ) -> Result<PullResult, RuntimeError> {
        if s1_done && s2_done {
            return Ok(PullResult::Done);
        }
        let attempt_s1 = if s1_done { false } else if s2_done { true } else { next_is_s1 };
        if attempt_s1 {
            match self.pull(s1)? {
                PullResult::Done => {
                    self.set_par_r_done(node, true);
                    Ok(PullResult::Skip)
                }
                PullResult::Skip => Ok(PullResult::Skip),
                PullResult::Event(e) => {
                    self.set_par_r_next_is_s1(node, false);
                    Ok(PullResult::Event(Event::par_a(e)))
                }
            }
        } else {
            match self.pull(s2)? {
                PullResult::Done => {
                    self.set_par_r_done(node, false);
                    Ok(PullResult::Skip)
                }
                PullResult::Skip => Ok(PullResult::Skip),
                PullResult::Event(e) => {
                    self.set_par_r_next_is_s1(node, true);
                    Ok(PullResult::Event(Event::par_b(e)))
                }
            }
        }
    }

    /// Unlike `CatProjCoordinator` (which only ever has one pending side, bounded by the
    /// single `CatPunc`), a `ParProjCoordinator` may see an arbitrarily long run of
    /// events for the side nobody has asked for yet, so those get queued in
    /// `self.par_queues` until the matching `ParProj` is pulled.
    fn pull_par_for_position(&mut self, coordinator: NodeId, p: u8) -> Result<PullResult, RuntimeError> {
        if let Some(q) = self.par_queues.get_mut(&coordinator) {
            let queue = if p == 0 { &mut q.left } else { &mut q.right };
            if let Some(e) = queue.pop_front() {
                return Ok(PullResult::Event(e));
            }
        }
        let (s, exhausted) = match &self.program.node(coordinator).kind {
            StreamOpKind::ParProjCoordinator { s, exhausted } => (*s, exhausted.get()),
            _ => panic!("pull_par_for_position called on a non-coordinator node"),
        };
        if exhausted {
            return Ok(PullResult::Done);
        }
        match self.pull(s)? {
            PullResult::Done => {
                self.set_par_coord_exhausted(coordinator);
                Ok(PullResult::Done)
            }
            PullResult::Skip => Ok(PullResult::Skip),
            PullResult::Event(Event::ParA(v)) if p == 0 => Ok(PullResult::Event(*v)),
            PullResult::Event(Event::ParB(v)) if p == 1 => Ok(PullResult::Event(*v)),
            PullResult::Event(Event::ParA(v)) => {
                self.par_queues.entry(coordinator).or_default().left.push_back(*v);
                Ok(PullResult::Skip)
            }
            PullResult::Event(Event::ParB(v)) => {
                self.par_queues.entry(coordinator).or_default().right.push_back(*v);
                Ok(PullResult::Skip)
            }
            PullResult::Event(_) => Ok(PullResult::Skip),
        }
    }

    /// Gather the materialised value of every `WaitOp` an `EmitOp`'s buffer expression
    /// reads, by id. Per spec §4.3 these are guaranteed complete by the time this runs,
    /// since the builder's `SinkThen`/reset-block scheduling always places the `WaitOp`s
    /// that feed an `EmitOp` ahead of it.
    fn collect_wait_values(
        &self,
        buffer_op: &BufferOp,
        emit_node: NodeId,
    ) -> Result<HashMap<NodeId, Value>, RuntimeError> {
        let mut out = HashMap::new();
        for id in buffer_op.get_sources() {
            match &self.program.node(id).kind {
                StreamOpKind::WaitOp { buffer, .. } => {
                    let b = buffer.borrow();
                    if !b.is_complete() {
                        return Err(RuntimeError::BufferEvalError {
                            node: emit_node,
                            detail: format!("wait node {id} not complete when its emit was evaluated"),
                        });
                    }
                    out.insert(id, b.get_value());
                }
                _ => {
                    return Err(RuntimeError::BufferEvalError {
                        node: emit_node,
                        detail: format!("buffer source {id} is not a WaitOp"),
                    })
                }
            }
        }
        Ok(out)
    }

    // -- Small state-mutation helpers, kept separate from the `pull` match arms above so
    // that arm bodies read as pure decision logic and the `Cell`/`RefCell` pokes are
    // named by what they do. --

    fn set_singleton_emitted(&self, node: NodeId) {
        if let StreamOpKind::Singleton { emitted, .. } = &self.program.node(node).kind {
            emitted.set(true);
        }
    }

    fn set_catr_phase(&self, node: NodeId, phase: CatRPhase) {
        if let StreamOpKind::CatR { phase: cell, .. } = &self.program.node(node).kind {
            cell.set(phase);
        }
    }

    fn set_sum_inj_tagged(&self, node: NodeId) {
        if let StreamOpKind::SumInj { tag_emitted, .. } = &self.program.node(node).kind {
            tag_emitted.set(true);
        }
    }

    fn set_case_active(&self, node: NodeId, branch: i8) {
        if let StreamOpKind::CaseOp { tag_read, active, .. } = &self.program.node(node).kind {
            tag_read.set(true);
            active.set(branch);
        }
    }

    fn set_cond_active(&self, node: NodeId, branch: i8) {
        if let StreamOpKind::CondOp { active, .. } = &self.program.node(node).kind {
            active.set(branch);
        }
    }

    fn set_sink_then_exhausted(&self, node: NodeId) {
        if let StreamOpKind::SinkThen { first_exhausted, .. } = &self.program.node(node).kind {
            first_exhausted.set(true);
        }
    }

    fn set_cat_coord_exhausted(&self, node: NodeId) {
        if let StreamOpKind::CatProjCoordinator { exhausted, .. } = &self.program.node(node).kind {
            exhausted.set(true);
        }
    }

    fn set_cat_coord_seen_punc(&self, node: NodeId) {
        if let StreamOpKind::CatProjCoordinator { seen_punc, .. } = &self.program.node(node).kind {
            seen_punc.set(true);
        }
    }

    fn set_par_coord_exhausted(&self, node: NodeId) {
        if let StreamOpKind::ParProjCoordinator { exhausted, .. } = &self.program.node(node).kind {
            exhausted.set(true);
        }
    }

    fn set_par_r_done(&self, node: NodeId, first: bool) {
        if let StreamOpKind::ParR { s1_done, s2_done, .. } = &self.program.node(node).kind {
            if first {
                s1_done.set(true);
            } else {
                s2_done.set(true);
            }
        }
    }

    fn set_par_r_next_is_s1(&self, node: NodeId, next_is_s1: bool) {
        if let StreamOpKind::ParR { next_is_s1: cell, .. } = &self.program.node(node).kind {
            cell.set(next_is_s1);
        }
    }

    fn poke_wait_buffer(
        &self,
        node: NodeId,
        event: &Event,
        on_err: impl FnOnce(String) -> RuntimeError,
    ) -> Result<(), RuntimeError> {
        if let StreamOpKind::WaitOp { buffer, .. } = &self.program.node(node).kind {
            buffer.borrow_mut().poke_event(event).map_err(|e| on_err(e.to_string()))
        } else {
            Ok(())
        }
    }

    fn start_emitting(&self, node: NodeId, events: Vec<Event>) {
        if let StreamOpKind::EmitOp { phase, event_buffer, idx, .. } = &self.program.node(node).kind {
            *event_buffer.borrow_mut() = events;
            idx.set(0);
            phase.set(EmitPhase::Emitting);
        }
    }

    fn advance_emit_idx(&self, node: NodeId) {
        if let StreamOpKind::EmitOp { idx, .. } = &self.program.node(node).kind {
            idx.set(idx.get() + 1);
        }
    }
}
