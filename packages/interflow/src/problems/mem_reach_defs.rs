/*
 * Memory reaching definitions
 *
 * Monotone problem tracking, per abstract memory location, the store
 * instructions whose written value may still be current. A store
 * generates a definition for every location its address may point to
 * and performs a strong update (kill) only where the address must-alias
 * an existing definition's location. Without aliasing information the
 * kill degrades to same-root stores and the gen to the address root
 * itself.
 */

use rustc_hash::{FxHashMap, FxHashSet};

use crate::program::{
    FunctionId, InstId, InstKind, Operand, PointsToOracle, ProgramView, ValueId, ValueKind,
};
use crate::errors::{AnalysisError, Result};
use crate::mono::InterMonoProblem;

/// A definition of `location` written by `def`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemDef {
    pub location: ValueId,
    pub def: InstId,
}

pub struct MemReachDefs<'a, V> {
    view: &'a V,
    oracle: Option<&'a dyn PointsToOracle>,
    seed_at: InstId,
}

impl<'a, V: ProgramView> MemReachDefs<'a, V> {
    pub fn new(
        view: &'a V,
        entry_fn: FunctionId,
        oracle: Option<&'a dyn PointsToOracle>,
    ) -> Result<Self> {
        let seed_at = view.entry_of(entry_fn).ok_or_else(|| {
            AnalysisError::program(format!(
                "entry function '{}' has no body",
                view.function(entry_fn).name
            ))
        })?;
        Ok(Self {
            view,
            oracle,
            seed_at,
        })
    }

    /// Locations a store through `addr` may write.
    fn written_locations(&self, addr: ValueId) -> FxHashSet<ValueId> {
        match self.oracle.and_then(|o| o.points_to(addr)) {
            Some(targets) if !targets.is_empty() => targets.clone(),
            _ => std::iter::once(addr).collect(),
        }
    }

    /// Strong-update criterion: the store certainly writes `location`
    /// and nothing else.
    fn definitely_overwrites(&self, addr: ValueId, location: ValueId) -> bool {
        match self.oracle.and_then(|o| o.points_to(addr)) {
            Some(pts) => pts.len() == 1 && pts.contains(&location),
            None => addr == location,
        }
    }

    /// Pointer-kind arguments of a call paired with callee parameters.
    fn pointer_args(
        &self,
        call: InstId,
        callee: FunctionId,
    ) -> Vec<(ValueId, ValueId)> {
        let Some(site) = self.view.inst(call).as_call() else {
            return Vec::new();
        };
        let params = &self.view.function(callee).params;
        site.args
            .iter()
            .zip(params)
            .filter_map(|(arg, param)| match arg {
                Operand::Value(v) if self.view.value(*v).kind == ValueKind::Ptr => {
                    Some((*v, *param))
                }
                _ => None,
            })
            .collect()
    }
}

impl<V: ProgramView> InterMonoProblem for MemReachDefs<'_, V> {
    type Fact = MemDef;

    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<MemDef>> {
        let mut seeds = FxHashMap::default();
        seeds.insert(self.seed_at, FxHashSet::default());
        seeds
    }

    fn normal_flow(&self, inst: InstId, input: &FxHashSet<MemDef>) -> FxHashSet<MemDef> {
        let InstKind::Store { addr, .. } = self.view.inst(inst) else {
            return input.clone();
        };
        let mut out: FxHashSet<MemDef> = input
            .iter()
            .filter(|d| !self.definitely_overwrites(*addr, d.location))
            .copied()
            .collect();
        for location in self.written_locations(*addr) {
            out.insert(MemDef {
                location,
                def: inst,
            });
        }
        out
    }

    fn call_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        input: &FxHashSet<MemDef>,
    ) -> FxHashSet<MemDef> {
        // Definitions reach the callee only through pointer arguments,
        // renamed to the receiving parameter.
        let mapping = self.pointer_args(call, callee);
        input
            .iter()
            .flat_map(|d| {
                mapping
                    .iter()
                    .filter(move |(arg, _)| *arg == d.location)
                    .map(move |(_, param)| MemDef {
                        location: *param,
                        def: d.def,
                    })
            })
            .collect()
    }

    fn return_flow(
        &self,
        call: InstId,
        callee: FunctionId,
        _exit: InstId,
        _ret_site: InstId,
        callee_facts: &FxHashSet<MemDef>,
        _call_facts: &FxHashSet<MemDef>,
    ) -> FxHashSet<MemDef> {
        // Parameter-rooted definitions map back to the argument; defs
        // on callee locals die with the frame.
        let mapping = self.pointer_args(call, callee);
        callee_facts
            .iter()
            .flat_map(|d| {
                mapping
                    .iter()
                    .filter(move |(_, param)| *param == d.location)
                    .map(move |(arg, _)| MemDef {
                        location: *arg,
                        def: d.def,
                    })
            })
            .collect()
    }

    fn call_to_ret_flow(
        &self,
        call: InstId,
        _ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        input: &FxHashSet<MemDef>,
    ) -> FxHashSet<MemDef> {
        if callees.is_empty() {
            // Unresolved call: no callee model, pass everything.
            return input.clone();
        }
        // Locations handed to some callee travel through it; the rest
        // bypass the call here.
        let passed: FxHashSet<ValueId> = callees
            .iter()
            .flat_map(|callee| self.pointer_args(call, *callee))
            .map(|(arg, _)| arg)
            .collect();
        input
            .iter()
            .filter(|d| !passed.contains(&d.location))
            .copied()
            .collect()
    }
}
