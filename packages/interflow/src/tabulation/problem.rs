/*
 * Problem contracts for the tabulation solver
 *
 * An IDE problem supplies flow functions (which facts reach which
 * nodes) and edge functions (how lattice values transform along the
 * way). An IFDS problem supplies flow functions only and is lifted into
 * the engine through the classic two-point-lattice reduction.
 *
 * Contract: all flow and edge functions must be monotone. The solver
 * does not (and cannot cheaply) check this at runtime; a non-monotone
 * problem voids the termination guarantee and its results are
 * undefined. Property tests are the intended enforcement.
 */

use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::edgefn::{self, EdgeFn, JoinSemiLattice};
use crate::program::{FunctionId, InstId};

/// Interprocedural distributive-environment problem.
pub trait IdeProblem {
    /// Dataflow fact. A distinguished zero fact represents "no
    /// information" and anchors fact generation.
    type Fact: Clone + Eq + Hash + Debug;

    /// Lattice of values attached to facts.
    type Value: JoinSemiLattice + 'static;

    /// The distinguished zero fact.
    fn zero_value(&self) -> Self::Fact;

    fn is_zero_value(&self, fact: &Self::Fact) -> bool {
        *fact == self.zero_value()
    }

    /// Program points to start from, with their initial facts. The
    /// solver adds the zero fact at every seed point and maps each
    /// seed to the lattice's top value.
    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<Self::Fact>>;

    // ---- flow functions (fact propagation) ----

    fn normal_flow(&self, curr: InstId, succ: InstId, fact: &Self::Fact)
        -> FxHashSet<Self::Fact>;

    /// Map caller-side facts onto callee-entry facts.
    fn call_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    /// Map callee-exit facts back to the call's return site.
    fn return_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        exit: InstId,
        ret_site: InstId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    /// Facts bypassing the callee entirely. Runs for every call,
    /// resolvable or not; an unresolved call relies on it alone.
    fn call_to_ret_flow(
        &self,
        call: InstId,
        ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    /// Optional short-circuit modelling the callee without analyzing
    /// its body (e.g. well-known library functions). `None` = analyze.
    fn summary_flow(
        &self,
        _call: InstId,
        _callee: FunctionId,
        _fact: &Self::Fact,
    ) -> Option<FxHashSet<Self::Fact>> {
        None
    }

    // ---- edge functions (value transformation) ----

    fn normal_edge(
        &self,
        _curr: InstId,
        _curr_fact: &Self::Fact,
        _succ: InstId,
        _succ_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::identity()
    }

    fn call_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _callee: FunctionId,
        _entry_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::identity()
    }

    fn return_edge(
        &self,
        _call: InstId,
        _callee: FunctionId,
        _exit: InstId,
        _exit_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::identity()
    }

    fn call_to_ret_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::identity()
    }

    /// Edge function paired with `summary_flow` facts.
    fn summary_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::identity()
    }

    fn top_element(&self) -> Self::Value {
        Self::Value::top()
    }

    fn bottom_element(&self) -> Self::Value {
        Self::Value::bottom()
    }

    fn join_values(&self, lhs: &Self::Value, rhs: &Self::Value) -> Self::Value {
        lhs.join(rhs)
    }

    /// Canonical all-top edge function.
    fn all_top(&self) -> EdgeFn<Self::Value> {
        edgefn::all_top()
    }
}

/// Reachability-only problem: facts form a subset lattice; the result
/// is membership per program point.
pub trait IfdsProblem {
    type Fact: Clone + Eq + Hash + Debug;

    fn zero_value(&self) -> Self::Fact;

    fn is_zero_value(&self, fact: &Self::Fact) -> bool {
        *fact == self.zero_value()
    }

    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<Self::Fact>>;

    fn normal_flow(&self, curr: InstId, succ: InstId, fact: &Self::Fact)
        -> FxHashSet<Self::Fact>;

    fn call_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    fn return_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        exit: InstId,
        ret_site: InstId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    fn call_to_ret_flow(
        &self,
        call: InstId,
        ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact>;

    fn summary_flow(
        &self,
        _call: InstId,
        _callee: FunctionId,
        _fact: &Self::Fact,
    ) -> Option<FxHashSet<Self::Fact>> {
        None
    }
}

/// Two-point lattice for the IFDS-as-IDE reduction: a fact is either
/// not yet known to hold (Top) or reachable (Bottom).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    Unknown,
    Reachable,
}

impl JoinSemiLattice for Reachability {
    fn top() -> Self {
        Reachability::Unknown
    }

    fn bottom() -> Self {
        Reachability::Reachable
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Reachability::Unknown, Reachability::Unknown) => Reachability::Unknown,
            _ => Reachability::Reachable,
        }
    }
}

/// Lifts an `IfdsProblem` into the IDE engine. Every edge function is
/// the constant all-bottom function, so any fact connected to a seed
/// carries the value `Reachable`.
pub struct IfdsAsIde<P>(pub P);

impl<P: IfdsProblem> IdeProblem for IfdsAsIde<P> {
    type Fact = P::Fact;
    type Value = Reachability;

    fn zero_value(&self) -> Self::Fact {
        self.0.zero_value()
    }

    fn is_zero_value(&self, fact: &Self::Fact) -> bool {
        self.0.is_zero_value(fact)
    }

    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<Self::Fact>> {
        self.0.initial_seeds()
    }

    fn normal_flow(
        &self,
        curr: InstId,
        succ: InstId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact> {
        self.0.normal_flow(curr, succ, fact)
    }

    fn call_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact> {
        self.0.call_flow(call, callee, fact)
    }

    fn return_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        exit: InstId,
        ret_site: InstId,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact> {
        self.0.return_flow(call, callee, exit, ret_site, fact)
    }

    fn call_to_ret_flow(
        &self,
        call: InstId,
        ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        fact: &Self::Fact,
    ) -> FxHashSet<Self::Fact> {
        self.0.call_to_ret_flow(call, ret_site, callees, fact)
    }

    fn summary_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        fact: &Self::Fact,
    ) -> Option<FxHashSet<Self::Fact>> {
        self.0.summary_flow(call, callee, fact)
    }

    fn normal_edge(
        &self,
        _curr: InstId,
        _curr_fact: &Self::Fact,
        _succ: InstId,
        _succ_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::all_bottom()
    }

    fn call_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _callee: FunctionId,
        _entry_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::all_bottom()
    }

    fn return_edge(
        &self,
        _call: InstId,
        _callee: FunctionId,
        _exit: InstId,
        _exit_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::all_bottom()
    }

    fn call_to_ret_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::all_bottom()
    }

    fn summary_edge(
        &self,
        _call: InstId,
        _call_fact: &Self::Fact,
        _ret_site: InstId,
        _ret_fact: &Self::Fact,
    ) -> EdgeFn<Self::Value> {
        edgefn::all_bottom()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reachability_lattice() {
        use Reachability::*;

        assert_eq!(Unknown.join(&Unknown), Unknown);
        assert_eq!(Unknown.join(&Reachable), Reachable);
        assert_eq!(Reachable.join(&Unknown), Reachable);
        assert_eq!(Reachable.join(&Reachable), Reachable);
        assert!(Reachability::top().is_top());
        assert!(Reachability::bottom().is_bottom());
    }
}
