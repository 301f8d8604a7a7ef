/*
 * Linear constant analysis over candidate-value sets
 *
 * IDE instance computing, per variable and program point, the set of
 * constants the variable may hold. Facts are variables (plus the zero
 * fact); values are bounded candidate sets. Constants enter through
 * constant-function edges at definitions; linear operations with one
 * variable operand become pointwise operator edges; anything beyond
 * linear (two variable operands, loads) degrades to all-bottom rather
 * than growing an unbounded expression language.
 */

use rustc_hash::{FxHashMap, FxHashSet};

use super::value_set::{eval_binop, ValueSet};
use crate::config::AnalysisConfig;
use crate::edgefn::{self, EdgeFn, EdgeFunction};
use crate::errors::{AnalysisError, Result};
use crate::program::{BinOpKind, FunctionId, InstId, InstKind, Operand, ProgramView, ValueId};
use crate::tabulation::IdeProblem;

/// Dataflow fact: a variable whose candidate set is being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpFact {
    Zero,
    Var(ValueId),
}

pub struct LinearConstants<'a, V> {
    view: &'a V,
    seed_at: InstId,
    cap: usize,
}

impl<'a, V: ProgramView> LinearConstants<'a, V> {
    /// Analysis rooted at the entry of `entry_fn`.
    pub fn new(view: &'a V, entry_fn: FunctionId, config: &AnalysisConfig) -> Result<Self> {
        let seed_at = view.entry_of(entry_fn).ok_or_else(|| {
            AnalysisError::program(format!(
                "entry function '{}' has no body",
                view.function(entry_fn).name
            ))
        })?;
        Ok(Self {
            view,
            seed_at,
            cap: config.max_set_size,
        })
    }

    /// Like [`LinearConstants::new`], with the entry function looked up
    /// by name.
    pub fn for_entry_named(view: &'a V, name: &str, config: &AnalysisConfig) -> Result<Self> {
        let entry_fn = view
            .function_by_name(name)
            .ok_or_else(|| AnalysisError::EntryPointNotFound(name.to_string()))?;
        Self::new(view, entry_fn, config)
    }

    fn const_edge(&self, c: i64) -> EdgeFn<ValueSet> {
        edgefn::constant(ValueSet::singleton(c, self.cap))
    }
}

fn operand_var(op: &Operand) -> Option<ValueId> {
    match op {
        Operand::Value(v) => Some(*v),
        _ => None,
    }
}

fn operand_const(op: &Operand) -> Option<i64> {
    match op {
        Operand::Const(c) => Some(*c),
        _ => None,
    }
}

/// Pointwise binary operation against a fixed constant operand.
#[derive(Debug)]
struct BinOpEdge {
    op: BinOpKind,
    konst: ValueSet,
    const_on_left: bool,
}

impl EdgeFunction<ValueSet> for BinOpEdge {
    fn apply_to(&self, source: &ValueSet) -> ValueSet {
        if self.const_on_left {
            self.konst.apply_binop(self.op, source)
        } else {
            source.apply_binop(self.op, &self.konst)
        }
    }

    fn equal_to(&self, other: &dyn EdgeFunction<ValueSet>) -> bool {
        other.as_any().downcast_ref::<BinOpEdge>().is_some_and(|o| {
            o.op == self.op && o.konst == self.konst && o.const_on_left == self.const_on_left
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

impl<V: ProgramView> IdeProblem for LinearConstants<'_, V> {
    type Fact = CpFact;
    type Value = ValueSet;

    fn zero_value(&self) -> CpFact {
        CpFact::Zero
    }

    fn initial_seeds(&self) -> FxHashMap<InstId, FxHashSet<CpFact>> {
        let mut seeds = FxHashMap::default();
        seeds.insert(self.seed_at, FxHashSet::default());
        seeds
    }

    fn normal_flow(&self, curr: InstId, _succ: InstId, fact: &CpFact) -> FxHashSet<CpFact> {
        let mut out = FxHashSet::default();
        match self.view.inst(curr) {
            InstKind::Assign { dest, src } => match fact {
                CpFact::Zero => {
                    out.insert(CpFact::Zero);
                    if operand_const(src).is_some() {
                        out.insert(CpFact::Var(*dest));
                    }
                }
                CpFact::Var(v) => {
                    if v != dest {
                        out.insert(*fact);
                    }
                    if operand_var(src) == Some(*v) {
                        out.insert(CpFact::Var(*dest));
                    }
                }
            },
            InstKind::BinOp { dest, lhs, rhs, .. } => {
                let lv = operand_var(lhs);
                let rv = operand_var(rhs);
                match fact {
                    CpFact::Zero => {
                        out.insert(CpFact::Zero);
                        // Dest is carried by a variable operand when
                        // exactly one exists; otherwise it is generated
                        // from zero (constant or unknown result).
                        if lv.is_some() == rv.is_some() {
                            out.insert(CpFact::Var(*dest));
                        }
                    }
                    CpFact::Var(v) => {
                        if v != dest {
                            out.insert(*fact);
                        }
                        let single_var = lv.is_some() != rv.is_some();
                        if single_var && (lv == Some(*v) || rv == Some(*v)) {
                            out.insert(CpFact::Var(*dest));
                        }
                    }
                }
            }
            InstKind::Load { dest, .. } => match fact {
                CpFact::Zero => {
                    out.insert(CpFact::Zero);
                    // Loaded values are untracked.
                    out.insert(CpFact::Var(*dest));
                }
                CpFact::Var(v) => {
                    if v != dest {
                        out.insert(*fact);
                    }
                }
            },
            _ => {
                out.insert(*fact);
            }
        }
        out
    }

    fn call_flow(&self, call: InstId, callee: FunctionId, fact: &CpFact) -> FxHashSet<CpFact> {
        let mut out = FxHashSet::default();
        let Some(site) = self.view.inst(call).as_call() else {
            return out;
        };
        let params = &self.view.function(callee).params;
        match fact {
            CpFact::Zero => {
                out.insert(CpFact::Zero);
                for (arg, param) in site.args.iter().zip(params) {
                    if operand_const(arg).is_some() {
                        out.insert(CpFact::Var(*param));
                    }
                }
            }
            CpFact::Var(v) => {
                for (arg, param) in site.args.iter().zip(params) {
                    if operand_var(arg) == Some(*v) {
                        out.insert(CpFact::Var(*param));
                    }
                }
            }
        }
        out
    }

    fn return_flow(
        &self,
        call: InstId,
        _callee: FunctionId,
        exit: InstId,
        _ret_site: InstId,
        fact: &CpFact,
    ) -> FxHashSet<CpFact> {
        let mut out = FxHashSet::default();
        let Some(site) = self.view.inst(call).as_call() else {
            return out;
        };
        let Some(dest) = site.dest else {
            return out;
        };
        if let InstKind::Return { value: Some(ret) } = self.view.inst(exit) {
            let maps = match fact {
                CpFact::Zero => operand_const(ret).is_some(),
                CpFact::Var(v) => operand_var(ret) == Some(*v),
            };
            if maps {
                out.insert(CpFact::Var(dest));
            }
        }
        out
    }

    fn call_to_ret_flow(
        &self,
        call: InstId,
        _ret_site: InstId,
        callees: &FxHashSet<FunctionId>,
        fact: &CpFact,
    ) -> FxHashSet<CpFact> {
        let mut out = FxHashSet::default();
        let Some(site) = self.view.inst(call).as_call() else {
            return out;
        };
        match fact {
            CpFact::Zero => {
                out.insert(CpFact::Zero);
                // An unresolved call still defines its dest; the value
                // is unknown.
                if callees.is_empty() {
                    if let Some(dest) = site.dest {
                        out.insert(CpFact::Var(dest));
                    }
                }
            }
            CpFact::Var(v) => {
                // The dest (if any) is redefined by the call; every
                // other caller fact survives untouched.
                if Some(*v) != site.dest {
                    out.insert(*fact);
                }
            }
        }
        out
    }

    fn normal_edge(
        &self,
        curr: InstId,
        curr_fact: &CpFact,
        _succ: InstId,
        succ_fact: &CpFact,
    ) -> EdgeFn<ValueSet> {
        match self.view.inst(curr) {
            InstKind::Assign { dest, src } => {
                if *curr_fact == CpFact::Zero && *succ_fact == CpFact::Var(*dest) {
                    if let Some(c) = operand_const(src) {
                        return self.const_edge(c);
                    }
                }
                edgefn::identity()
            }
            InstKind::BinOp { dest, op, lhs, rhs } => {
                if *succ_fact != CpFact::Var(*dest) {
                    return edgefn::identity();
                }
                match (operand_const(lhs), operand_const(rhs)) {
                    (Some(a), Some(b)) => {
                        if *curr_fact == CpFact::Zero {
                            return self.const_edge(eval_binop(*op, a, b));
                        }
                        edgefn::identity()
                    }
                    (Some(c), None) if matches!(curr_fact, CpFact::Var(_)) => {
                        std::sync::Arc::new(BinOpEdge {
                            op: *op,
                            konst: ValueSet::singleton(c, self.cap),
                            const_on_left: true,
                        })
                    }
                    (None, Some(c)) if matches!(curr_fact, CpFact::Var(_)) => {
                        std::sync::Arc::new(BinOpEdge {
                            op: *op,
                            konst: ValueSet::singleton(c, self.cap),
                            const_on_left: false,
                        })
                    }
                    // Both operands variable: product over two facts is
                    // not expressible pointwise, give up the value.
                    _ => edgefn::all_bottom(),
                }
            }
            InstKind::Load { dest, .. } => {
                if *curr_fact == CpFact::Zero && *succ_fact == CpFact::Var(*dest) {
                    return edgefn::all_bottom();
                }
                edgefn::identity()
            }
            _ => edgefn::identity(),
        }
    }

    fn call_edge(
        &self,
        call: InstId,
        call_fact: &CpFact,
        callee: FunctionId,
        entry_fact: &CpFact,
    ) -> EdgeFn<ValueSet> {
        if *call_fact != CpFact::Zero {
            return edgefn::identity();
        }
        let Some(site) = self.view.inst(call).as_call() else {
            return edgefn::identity();
        };
        let params = &self.view.function(callee).params;
        for (arg, param) in site.args.iter().zip(params) {
            if *entry_fact == CpFact::Var(*param) {
                if let Some(c) = operand_const(arg) {
                    return self.const_edge(c);
                }
            }
        }
        edgefn::identity()
    }

    fn return_edge(
        &self,
        _call: InstId,
        _callee: FunctionId,
        exit: InstId,
        exit_fact: &CpFact,
        _ret_site: InstId,
        _ret_fact: &CpFact,
    ) -> EdgeFn<ValueSet> {
        if *exit_fact != CpFact::Zero {
            return edgefn::identity();
        }
        if let InstKind::Return { value: Some(ret) } = self.view.inst(exit) {
            if let Some(c) = operand_const(ret) {
                return self.const_edge(c);
            }
        }
        edgefn::identity()
    }

    fn call_to_ret_edge(
        &self,
        call: InstId,
        call_fact: &CpFact,
        _ret_site: InstId,
        ret_fact: &CpFact,
    ) -> EdgeFn<ValueSet> {
        if *call_fact == CpFact::Zero {
            if let Some(site) = self.view.inst(call).as_call() {
                if site.dest.map(CpFact::Var).as_ref() == Some(ret_fact) {
                    // Unresolved-call dest, generated with unknown value.
                    return edgefn::all_bottom();
                }
            }
        }
        edgefn::identity()
    }
}
