/*
 * Bounded candidate-value-set lattice
 *
 * A value is either Top (nothing observed yet), a finite set of integer
 * candidates, or Bottom (any value possible). Join is set union with a
 * cardinality cap: a union that would exceed the cap widens straight to
 * Bottom instead of growing, which bounds the lattice height and with
 * it the number of joins any fixpoint can take at one cell.
 *
 * Binary operators lift pointwise over the Cartesian product of the
 * operand sets; the product is re-capped, so operators can also widen.
 */

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::edgefn::JoinSemiLattice;
use crate::program::BinOpKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSet {
    /// No candidates observed yet. Join identity.
    Top,

    /// Between 1 and `cap` known candidates.
    Vals { set: BTreeSet<i64>, cap: usize },

    /// Too many candidates to track. Join absorbing.
    Bottom,
}

/// Cap used by the bare `JoinSemiLattice` constructors; analyses build
/// their values through [`ValueSet::singleton`] with the configured cap.
const DEFAULT_CAP: usize = 4;

impl ValueSet {
    pub fn singleton(v: i64, cap: usize) -> Self {
        ValueSet::from_set(std::iter::once(v).collect(), cap)
    }

    /// Normalizing constructor: empty sets read as Top, oversized ones
    /// widen to Bottom.
    pub fn from_set(set: BTreeSet<i64>, cap: usize) -> Self {
        if set.is_empty() {
            ValueSet::Top
        } else if set.len() > cap {
            ValueSet::Bottom
        } else {
            ValueSet::Vals { set, cap }
        }
    }

    pub fn candidates(&self) -> Option<&BTreeSet<i64>> {
        match self {
            ValueSet::Vals { set, .. } => Some(set),
            _ => None,
        }
    }

    /// Pointwise binary operator over the Cartesian product of both
    /// candidate sets. Top stays Top (no candidates to combine yet);
    /// Bottom stays Bottom.
    pub fn apply_binop(&self, op: BinOpKind, rhs: &ValueSet) -> ValueSet {
        match (self, rhs) {
            (ValueSet::Top, _) | (_, ValueSet::Top) => ValueSet::Top,
            (ValueSet::Bottom, _) | (_, ValueSet::Bottom) => ValueSet::Bottom,
            (ValueSet::Vals { set: a, cap }, ValueSet::Vals { set: b, cap: cap_b }) => {
                let cap = (*cap).max(*cap_b);
                let product: BTreeSet<i64> = a
                    .iter()
                    .flat_map(|x| b.iter().map(move |y| eval_binop(op, *x, *y)))
                    .collect();
                ValueSet::from_set(product, cap)
            }
        }
    }
}

/// Concrete integer semantics of the supported operators; comparisons
/// produce 0/1.
pub fn eval_binop(op: BinOpKind, lhs: i64, rhs: i64) -> i64 {
    match op {
        BinOpKind::Add => lhs.wrapping_add(rhs),
        BinOpKind::Sub => lhs.wrapping_sub(rhs),
        BinOpKind::Mul => lhs.wrapping_mul(rhs),
        BinOpKind::Eq => i64::from(lhs == rhs),
        BinOpKind::Lt => i64::from(lhs < rhs),
    }
}

impl JoinSemiLattice for ValueSet {
    fn top() -> Self {
        ValueSet::Top
    }

    fn bottom() -> Self {
        ValueSet::Bottom
    }

    fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (ValueSet::Top, v) | (v, ValueSet::Top) => v.clone(),
            (ValueSet::Bottom, _) | (_, ValueSet::Bottom) => ValueSet::Bottom,
            (ValueSet::Vals { set: a, cap }, ValueSet::Vals { set: b, cap: cap_b }) => {
                let cap = (*cap).max(*cap_b);
                ValueSet::from_set(a.union(b).copied().collect(), cap)
            }
        }
    }

    fn is_top(&self) -> bool {
        matches!(self, ValueSet::Top)
    }

    fn is_bottom(&self) -> bool {
        matches!(self, ValueSet::Bottom)
    }
}

impl Default for ValueSet {
    fn default() -> Self {
        ValueSet::Top
    }
}

/// `JoinSemiLattice::top`/`bottom` construct the extremes; in-between
/// values come through the capped constructors, so `DEFAULT_CAP` only
/// matters for values built outside an analysis run.
impl From<i64> for ValueSet {
    fn from(v: i64) -> Self {
        ValueSet::singleton(v, DEFAULT_CAP)
    }
}
