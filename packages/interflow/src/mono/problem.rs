/*
 * Monotone interprocedural problem contract
 *
 * Unlike the tabulation problems, flow functions here transform whole
 * fact sets at once and need not be distributive; monotonicity is the
 * only requirement. The default join is set union and the default
 * comparison is subset inclusion, matching a powerset lattice. Problems
 * with a richer fact ordering override both together.
 */

use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::program::{FunctionId, InstId};

pub trait InterMonoProblem {
    type Fact: Clone + Eq + Hash + Debug;

    /// Program points to start from, with the fact sets holding there.
    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<Self::Fact>>;

    /// Transfer over a non-call instruction.
    fn normal_flow(&self, inst: InstId, input: &FxHashSet<Self::Fact>)
        -> FxHashSet<Self::Fact>;

    /// Map caller facts at a call site into the callee.
    fn call_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        input: &FxHashSet<Self::Fact>,
    ) -> FxHashSet<Self::Fact>;

    /// Map callee facts at an exit back to a return site. `call_facts`
    /// are the caller-side facts at the call, available for
    /// caller-local reconstruction.
    fn return_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        exit: InstId,
        ret_site: InstId,
        callee_facts: &FxHashSet<Self::Fact>,
        call_facts: &FxHashSet<Self::Fact>,
    ) -> FxHashSet<Self::Fact>;

    /// Caller facts surviving the call without entering the callee.
    /// Runs for every call; the sole flow across unresolved ones.
    fn call_to_ret_flow(
        &self,
        call: InstId,
        ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        input: &FxHashSet<Self::Fact>,
    ) -> FxHashSet<Self::Fact>;

    /// Merge at control-flow confluence. Default: set union.
    fn join(
        &self,
        lhs: &FxHashSet<Self::Fact>,
        rhs: &FxHashSet<Self::Fact>,
    ) -> FxHashSet<Self::Fact> {
        lhs.union(rhs).cloned().collect()
    }

    /// Partial-order test used for convergence: `lhs` ⊑ `rhs`.
    /// Default: subset inclusion.
    fn sq_subset_equal(&self, lhs: &FxHashSet<Self::Fact>, rhs: &FxHashSet<Self::Fact>) -> bool {
        lhs.is_subset(rhs)
    }
}
