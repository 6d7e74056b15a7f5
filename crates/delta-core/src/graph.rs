//! The stream-IR arena: owns every [`StreamNode`], assigns structural identity, and
//! tracks free variables, per spec §3.3's "implement as indices into an arena" note.
//!
//! Grounded on `lmlang-core`'s `StableGraph`-backed module graph
//! (`examples/snowdamiz-lmlang/crates/lmlang-core/src/graph.rs`), generalised from a
//! function-call graph to a stream-operator DAG.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use petgraph::stable_graph::StableGraph;
use petgraph::Directed;

use crate::id::{FreshIdSource, NodeId};
use crate::ir::{CatRPhase, EmitPhase, StreamNode, StreamOpKind};
use crate::types::Type;

fn hash_of(tag: &str, children: &[u64], extra: &str) -> u64 {
    let mut h = DefaultHasher::new();
    tag.hash(&mut h);
    children.hash(&mut h);
    extra.hash(&mut h);
    h.finish()
}

/// An arena of stream-IR nodes plus the program's designated output and ordered input
/// `Var` list. Logically immutable once built — see [`crate::ir`]'s module doc on why
/// node state nonetheless lives here rather than on a separate iterator.
pub struct Program {
    graph: StableGraph<StreamNode, (), Directed, u32>,
    fresh: FreshIdSource,
    output: Option<NodeId>,
    input_vars: Vec<NodeId>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            graph: StableGraph::default(),
            fresh: FreshIdSource::new(),
            output: None,
            input_vars: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &StreamNode {
        self.graph
            .node_weight(id.into())
            .unwrap_or_else(|| panic!("dangling node id {id}"))
    }

    pub fn set_output(&mut self, id: NodeId) {
        self.output = Some(id);
    }

    pub fn output(&self) -> NodeId {
        self.output.expect("program has no output node set")
    }

    pub fn input_vars(&self) -> &[NodeId] {
        &self.input_vars
    }

    fn insert(&mut self, stream_type: Type, struct_id: u64, vars: BTreeSet<NodeId>, kind: StreamOpKind) -> NodeId {
        let idx = self.graph.add_node(StreamNode {
            stream_type,
            struct_id,
            vars,
            kind,
        });
        NodeId::from(idx)
    }

    fn vars_union(&self, ids: &[NodeId]) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        for &id in ids {
            out.extend(self.node(id).vars.iter().copied());
        }
        out
    }

    pub fn add_var(&mut self, name: impl Into<String>, ty: Type) -> NodeId {
        let name = name.into();
        let struct_id = hash_of("Var", &[], &name);
        let id = self.insert(ty, struct_id, BTreeSet::new(), StreamOpKind::Var { name });
        self.graph.node_weight_mut(id.into()).unwrap().vars = BTreeSet::from([id]);
        self.input_vars.push(id);
        id
    }

    pub fn add_eps(&mut self) -> NodeId {
        let struct_id = u64::MAX - self.fresh.next();
        self.insert(Type::Eps, struct_id, BTreeSet::new(), StreamOpKind::Eps)
    }

    pub fn add_singleton(&mut self, ty: Type, value: crate::value::Value) -> NodeId {
        let struct_id = hash_of("Singleton", &[], &format!("{value:?}"));
        self.insert(
            ty,
            struct_id,
            BTreeSet::new(),
            StreamOpKind::Singleton { value, emitted: Cell::new(false) },
        )
    }

    pub fn add_catr(&mut self, ty: Type, s1: NodeId, s2: NodeId) -> NodeId {
        let s1_id = self.node(s1).struct_id;
        let s2_id = self.node(s2).struct_id;
        let struct_id = hash_of("CatR", &[s1_id, s2_id], "");
        let vars = self.vars_union(&[s1, s2]);
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::CatR { s1, s2, phase: Cell::new(CatRPhase::First) },
        )
    }

    /// Builds the shared coordinator and both projections in one call, since a `CatProj`
    /// is never meaningful without its sibling (mirrors the builder's `catl`/`catr`
    /// pair, which always allocate the coordinator together).
    pub fn add_cat_projections(&mut self, s: NodeId, left_ty: Type, right_ty: Type) -> (NodeId, NodeId) {
        let s_id = self.node(s).struct_id;
        let coord_struct_id = hash_of("CatProjCoordinator", &[s_id], "");
        let vars = self.node(s).vars.clone();
        let coordinator = self.insert(
            self.node(s).stream_type.clone(),
            coord_struct_id,
            vars.clone(),
            StreamOpKind::CatProjCoordinator { s, seen_punc: Cell::new(false), exhausted: Cell::new(false) },
        );

        let coord_id = self.node(coordinator).struct_id;
        let left = self.insert(
            left_ty,
            hash_of("CatProj", &[coord_id], "0"),
            vars.clone(),
            StreamOpKind::CatProj { coordinator, position: 0 },
        );
        let right = self.insert(
            right_ty,
            hash_of("CatProj", &[coord_id], "1"),
            vars,
            StreamOpKind::CatProj { coordinator, position: 1 },
        );
        (left, right)
    }

    pub fn add_sum_inj(&mut self, ty: Type, s: NodeId, position: u8) -> NodeId {
        let s_id = self.node(s).struct_id;
        let struct_id = hash_of("SumInj", &[s_id], &position.to_string());
        let vars = self.node(s).vars.clone();
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::SumInj { s, position, tag_emitted: Cell::new(false) },
        )
    }

    pub fn add_case(&mut self, ty: Type, s: NodeId, b0: NodeId, b1: NodeId) -> NodeId {
        let s_id = self.node(s).struct_id;
        let b0_id = self.node(b0).struct_id;
        let b1_id = self.node(b1).struct_id;
        let struct_id = hash_of("CaseOp", &[s_id, b0_id, b1_id], "");
        let vars = self.vars_union(&[s, b0, b1]);
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::CaseOp { s, branches: [b0, b1], tag_read: Cell::new(false), active: Cell::new(-1) },
        )
    }

    pub fn add_cond(&mut self, ty: Type, cond: NodeId, b0: NodeId, b1: NodeId) -> NodeId {
        let c_id = self.node(cond).struct_id;
        let b0_id = self.node(b0).struct_id;
        let b1_id = self.node(b1).struct_id;
        let struct_id = hash_of("CondOp", &[c_id, b0_id, b1_id], "");
        let vars = self.vars_union(&[cond, b0, b1]);
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::CondOp { cond, branches: [b0, b1], active: Cell::new(-1) },
        )
    }

    pub fn add_unsafe_cast(&mut self, ty: Type, s: NodeId) -> NodeId {
        let s_id = self.node(s).struct_id;
        let struct_id = hash_of("UnsafeCast", &[s_id], "");
        let vars = self.node(s).vars.clone();
        self.insert(ty, struct_id, vars, StreamOpKind::UnsafeCast { s })
    }

    /// `vars` intentionally carries only `s2`'s free variables — see SPEC_FULL.md /
    /// DESIGN.md on the `SinkThen.vars` asymmetry: `s1` is fully drained as a side effect
    /// before `s2` is observed, so `s1`'s inputs don't constrain `SinkThen`'s placement
    /// relative to anything downstream of `s2` alone.
    pub fn add_sink_then(&mut self, ty: Type, s1: NodeId, s2: NodeId) -> NodeId {
        let s1_id = self.node(s1).struct_id;
        let s2_id = self.node(s2).struct_id;
        let struct_id = hash_of("SinkThen", &[s1_id, s2_id], "");
        let vars = self.node(s2).vars.clone();
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::SinkThen { s1, s2, first_exhausted: Cell::new(false) },
        )
    }

    /// Creates a `ResetOp` with an empty captured set, so the builder's reset-block
    /// helper has a valid id to hand to its body before that body has finished creating
    /// the nodes the reset will eventually capture. Call [`Self::finalize_reset_set`]
    /// once the body returns.
    pub fn add_reset_op_placeholder(&mut self, ty: Type) -> NodeId {
        let struct_id = u64::MAX / 2 - self.fresh.next();
        self.insert(
            ty,
            struct_id,
            BTreeSet::new(),
            StreamOpKind::ResetOp { set: std::cell::RefCell::new(Vec::new()) },
        )
    }

    pub fn finalize_reset_set(&self, id: NodeId, set: Vec<NodeId>) {
        match &self.node(id).kind {
            StreamOpKind::ResetOp { set: cell } => *cell.borrow_mut() = set,
            _ => panic!("finalize_reset_set called on a non-ResetOp node"),
        }
    }

    /// Number of nodes currently in the arena; used by the builder's reset-block helper
    /// to identify which nodes a closure created (node ids are assigned monotonically
    /// and the arena never removes nodes, so a before/after range suffices).
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn add_wait(&mut self, ty: Type, s: NodeId) -> NodeId {
        let s_id = self.node(s).struct_id;
        let struct_id = hash_of("WaitOp", &[s_id], "");
        let vars = self.node(s).vars.clone();
        let buffer = crate::buffer::make_buffer(&ty);
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::WaitOp { s, buffer: std::cell::RefCell::new(buffer) },
        )
    }

    pub fn add_emit(&mut self, ty: Type, buffer_op: crate::bufferop::BufferOp) -> NodeId {
        let mut sources: Vec<u64> = buffer_op.get_sources().into_iter().map(|n| n.0 as u64).collect();
        sources.sort_unstable();
        let struct_id = hash_of("EmitOp", &sources, "");
        let vars = buffer_op.get_sources().into_iter().collect();
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::EmitOp {
                buffer_op,
                phase: Cell::new(EmitPhase::Serializing),
                event_buffer: std::cell::RefCell::new(Vec::new()),
                idx: Cell::new(0),
            },
        )
    }

    pub fn add_par_r(&mut self, ty: Type, s1: NodeId, s2: NodeId) -> NodeId {
        let s1_id = self.node(s1).struct_id;
        let s2_id = self.node(s2).struct_id;
        let struct_id = hash_of("ParR", &[s1_id, s2_id], "");
        let vars = self.vars_union(&[s1, s2]);
        self.insert(
            ty,
            struct_id,
            vars,
            StreamOpKind::ParR {
                s1,
                s2,
                s1_done: Cell::new(false),
                s2_done: Cell::new(false),
                next_is_s1: Cell::new(true),
            },
        )
    }

    pub fn add_par_projections(&mut self, s: NodeId, left_ty: Type, right_ty: Type) -> (NodeId, NodeId) {
        let s_id = self.node(s).struct_id;
        let vars = self.node(s).vars.clone();
        let coordinator = self.insert(
            self.node(s).stream_type.clone(),
            hash_of("ParProjCoordinator", &[s_id], ""),
            vars.clone(),
            StreamOpKind::ParProjCoordinator { s, exhausted: Cell::new(false) },
        );
        let coord_id = self.node(coordinator).struct_id;
        let left = self.insert(
            left_ty,
            hash_of("ParProj", &[coord_id], "0"),
            vars.clone(),
            StreamOpKind::ParProj { coordinator, position: 0 },
        );
        let right = self.insert(
            right_ty,
            hash_of("ParProj", &[coord_id], "1"),
            vars,
            StreamOpKind::ParProj { coordinator, position: 1 },
        );
        (left, right)
    }

    pub fn reset_node(&self, id: NodeId) {
        self.node(id).reset();
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use crate::value::Value;

    #[test]
    fn var_is_its_own_free_variable() {
        let mut p = Program::new();
        let v = p.add_var("x", Type::Singleton(ScalarKind::Int));
        assert_eq!(p.node(v).vars, BTreeSet::from([v]));
    }

    #[test]
    fn catr_vars_is_union_of_children() {
        let mut p = Program::new();
        let a = p.add_var("a", Type::Singleton(ScalarKind::Int));
        let b = p.add_var("b", Type::Singleton(ScalarKind::Str));
        let cat = p.add_catr(
            Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str)),
            a,
            b,
        );
        assert_eq!(p.node(cat).vars, BTreeSet::from([a, b]));
    }

    #[test]
    fn sink_then_vars_is_only_second_operand() {
        let mut p = Program::new();
        let a = p.add_var("a", Type::Singleton(ScalarKind::Int));
        let b = p.add_var("b", Type::Singleton(ScalarKind::Str));
        let st = p.add_sink_then(Type::Singleton(ScalarKind::Str), a, b);
        assert_eq!(p.node(st).vars, BTreeSet::from([b]));
    }

    #[test]
    fn two_eps_nodes_have_distinct_struct_ids() {
        let mut p = Program::new();
        let e1 = p.add_eps();
        let e2 = p.add_eps();
        assert_ne!(p.node(e1).struct_id, p.node(e2).struct_id);
    }

    #[test]
    fn identical_singletons_hash_cons_to_same_struct_id() {
        let mut p = Program::new();
        let s1 = p.add_singleton(Type::Singleton(ScalarKind::Int), Value::Int(1));
        let s2 = p.add_singleton(Type::Singleton(ScalarKind::Int), Value::Int(1));
        assert_eq!(p.node(s1).struct_id, p.node(s2).struct_id);
    }

    #[test]
    fn reset_restores_catr_phase() {
        let mut p = Program::new();
        let a = p.add_var("a", Type::Singleton(ScalarKind::Int));
        let b = p.add_var("b", Type::Singleton(ScalarKind::Str));
        let cat = p.add_catr(
            Type::cat(Type::Singleton(ScalarKind::Int), Type::Singleton(ScalarKind::Str)),
            a,
            b,
        );
        if let StreamOpKind::CatR { phase, .. } = &p.node(cat).kind {
            phase.set(CatRPhase::Second);
        }
        p.reset_node(cat);
        if let StreamOpKind::CatR { phase, .. } = &p.node(cat).kind {
            assert_eq!(phase.get(), CatRPhase::First);
        }
    }
}
