//! Twin required/forbidden partial orders with a consistency invariant (spec §3.4, §4.2),
//! grounded on `original_source/src/python_delta/realized_ordering.py`.

use crate::error::CoreError;
use crate::id::NodeId;
use crate::partial_order::PartialOrder;

#[derive(Debug, Clone, Default)]
pub struct RealizedOrdering {
    pub required: PartialOrder,
    pub forbidden: PartialOrder,
}

impl RealizedOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_consistency(&self) -> Result<(), CoreError> {
        for &(x, y) in self.required.edges() {
            if self.forbidden.has_edge(x, y) {
                return Err(CoreError::InconsistentOrdering { x, y });
            }
        }
        Ok(())
    }

    /// `x < y` is required, `y < x` is forbidden.
    pub fn add_ordered(&mut self, x: NodeId, y: NodeId) -> Result<(), CoreError> {
        self.required.add_edge(x, y);
        self.forbidden.add_edge(y, x);
        self.check_consistency()
    }

    pub fn add_all_ordered(&mut self, xs: &[NodeId], ys: &[NodeId]) -> Result<(), CoreError> {
        for &x in xs {
            for &y in ys {
                self.add_ordered(x, y)?;
            }
        }
        Ok(())
    }

    /// Neither direction may hold between `x` and `y`.
    pub fn add_unordered(&mut self, x: NodeId, y: NodeId) -> Result<(), CoreError> {
        self.forbidden.add_edge(x, y);
        self.forbidden.add_edge(y, x);
        self.check_consistency()
    }

    pub fn add_all_unordered(&mut self, xs: &[NodeId], ys: &[NodeId]) -> Result<(), CoreError> {
        for &x in xs {
            for &y in ys {
                self.add_unordered(x, y)?;
            }
        }
        Ok(())
    }

    /// Forbid the single directed edge `x < y`, leaving `y < x` undetermined. Narrower
    /// than [`Self::add_unordered`]; see SPEC_FULL.md §2 and DESIGN.md for why this
    /// primitive exists — `case`/`cond` need to forbid only a branch output from
    /// preceding the scrutinee, not forbid the pair mutually.
    pub fn add_forbidden(&mut self, x: NodeId, y: NodeId) -> Result<(), CoreError> {
        self.forbidden.add_edge(x, y);
        self.check_consistency()
    }

    /// `x` inherits the intersection of the required predecessors, and separately of the
    /// required successors, of every node in `vars`. No-op if `vars` is empty.
    pub fn add_in_place_of(&mut self, x: NodeId, vars: &[NodeId]) -> Result<(), CoreError> {
        if vars.is_empty() {
            return Ok(());
        }

        let mut common_preds = self.required.predecessors(vars[0]);
        let mut common_succs = self.required.successors(vars[0]);
        for &v in &vars[1..] {
            let preds = self.required.predecessors(v);
            let succs = self.required.successors(v);
            common_preds.retain(|p| preds.contains(p));
            common_succs.retain(|s| succs.contains(s));
        }

        for p in common_preds {
            self.required.add_edge(p, x);
        }
        for s in common_succs {
            self.required.add_edge(x, s);
        }

        self.check_consistency()
    }

    pub fn add_all_in_place_of(&mut self, xs: &[NodeId], vars: &[NodeId]) -> Result<(), CoreError> {
        for &x in xs {
            self.add_in_place_of(x, vars)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(i: u32) -> NodeId {
        NodeId(i)
    }

    #[test]
    fn add_ordered_sets_both_orders() {
        let mut ro = RealizedOrdering::new();
        ro.add_ordered(n(1), n(2)).unwrap();
        assert!(ro.required.has_edge(n(1), n(2)));
        assert!(ro.forbidden.has_edge(n(2), n(1)));
    }

    #[test]
    fn conflicting_order_is_rejected() {
        let mut ro = RealizedOrdering::new();
        ro.add_ordered(n(1), n(2)).unwrap();
        let err = ro.add_ordered(n(2), n(1)).unwrap_err();
        assert!(matches!(err, CoreError::InconsistentOrdering { .. }));
    }

    #[test]
    fn add_unordered_forbids_both_directions() {
        let mut ro = RealizedOrdering::new();
        ro.add_unordered(n(1), n(2)).unwrap();
        assert!(ro.forbidden.has_edge(n(1), n(2)));
        assert!(ro.forbidden.has_edge(n(2), n(1)));
    }

    #[test]
    fn add_forbidden_is_single_directional() {
        let mut ro = RealizedOrdering::new();
        ro.add_forbidden(n(1), n(2)).unwrap();
        assert!(ro.forbidden.has_edge(n(1), n(2)));
        assert!(!ro.forbidden.has_edge(n(2), n(1)));
    }

    #[test]
    fn in_place_of_inherits_common_predecessors_and_successors() {
        let mut ro = RealizedOrdering::new();
        ro.add_ordered(n(1), n(10)).unwrap();
        ro.add_ordered(n(1), n(11)).unwrap();
        ro.add_ordered(n(10), n(20)).unwrap();
        ro.add_ordered(n(11), n(20)).unwrap();

        ro.add_in_place_of(n(100), &[n(10), n(11)]).unwrap();

        assert!(ro.required.has_edge(n(1), n(100)));
        assert!(ro.required.has_edge(n(100), n(20)));
    }

    #[test]
    fn in_place_of_noop_on_empty_set() {
        let mut ro = RealizedOrdering::new();
        ro.add_in_place_of(n(1), &[]).unwrap();
        assert!(ro.required.edges().next().is_none());
    }
}
