/*
 * Lattice and edge-function abstraction
 *
 * The value domain is a bounded-height join-semilattice. Top means "no
 * information yet / most precise" and is the identity for join; Bottom
 * means "all information lost" and is absorbing. The induced partial
 * order reads a ≤ b iff join(a, b) == b, so Top is the least element
 * and every join moves toward Bottom.
 *
 * Edge functions are pure lattice transformers attached to exploded
 * supergraph edges. They compose sequentially, join at confluence
 * points, and are memoized in the jump-function table, so they need a
 * structural equality test (`equal_to`) to detect fixpoint convergence.
 *
 * Composition and join normalize aggressively: identity and the
 * canonical all-top/all-bottom functions collapse, constant functions
 * are evaluated eagerly, and any combinator tree deeper than
 * MAX_EDGE_FUNCTION_DEPTH widens to all-bottom. The widening loses
 * precision, never soundness, and keeps the function space finite for
 * problems whose own functions do not collapse.
 */

use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// Bounded-height join-semilattice.
pub trait JoinSemiLattice: Clone + Eq + Debug {
    /// Most precise element, identity for join.
    fn top() -> Self;

    /// Least precise element, absorbing for join.
    fn bottom() -> Self;

    /// Least upper bound. Must be commutative, associative, idempotent
    /// and monotone with respect to the order it induces.
    fn join(&self, other: &Self) -> Self;

    fn is_top(&self) -> bool {
        *self == Self::top()
    }

    fn is_bottom(&self) -> bool {
        *self == Self::bottom()
    }

    /// Partial order induced by join: a ≤ b iff a ⊔ b = b.
    fn leq(&self, other: &Self) -> bool {
        &self.join(other) == other
    }
}

/// Shared handle to an edge function.
pub type EdgeFn<L> = Arc<dyn EdgeFunction<L>>;

/// Pure lattice-value transformer attached to a supergraph edge.
pub trait EdgeFunction<L: JoinSemiLattice>: Debug {
    /// Apply the function to a source value.
    fn apply_to(&self, source: &L) -> L;

    /// Structural equality against another edge function.
    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn is_identity(&self) -> bool {
        false
    }

    /// Canonical "unreachable under these conditions" function.
    fn is_all_top(&self) -> bool {
        false
    }

    fn is_all_bottom(&self) -> bool {
        false
    }

    /// Output independent of input.
    fn is_constant(&self) -> bool {
        false
    }

    /// Size of the combinator tree rooted here; drives widening.
    fn depth(&self) -> usize {
        1
    }
}

/// Combinator trees deeper than this widen to all-bottom.
pub const MAX_EDGE_FUNCTION_DEPTH: usize = 32;

// ---------------------------------------------------------------------------
// Canonical functions
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct IdentityFn<L>(PhantomData<L>);

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for IdentityFn<L> {
    fn apply_to(&self, source: &L) -> L {
        source.clone()
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        other.is_identity()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_identity(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct AllTopFn<L>(PhantomData<L>);

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for AllTopFn<L> {
    fn apply_to(&self, _source: &L) -> L {
        L::top()
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        other.is_all_top()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_all_top(&self) -> bool {
        true
    }

    fn is_constant(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct AllBottomFn<L>(PhantomData<L>);

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for AllBottomFn<L> {
    fn apply_to(&self, _source: &L) -> L {
        L::bottom()
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        other.is_all_bottom()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_all_bottom(&self) -> bool {
        true
    }

    fn is_constant(&self) -> bool {
        true
    }
}

/// Constant function with an explicit value strictly between Top and
/// Bottom (those normalize to the canonical functions).
#[derive(Debug)]
struct ConstantFn<L> {
    value: L,
}

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for ConstantFn<L> {
    fn apply_to(&self, _source: &L) -> L {
        self.value.clone()
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        other.is_constant() && self.value == other.apply_to(&L::top())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_constant(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct ComposedFn<L: JoinSemiLattice> {
    first: EdgeFn<L>,
    second: EdgeFn<L>,
}

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for ComposedFn<L> {
    fn apply_to(&self, source: &L) -> L {
        self.second.apply_to(&self.first.apply_to(source))
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        match other.as_any().downcast_ref::<ComposedFn<L>>() {
            Some(o) => {
                self.first.equal_to(&*o.first) && self.second.equal_to(&*o.second)
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn depth(&self) -> usize {
        self.first.depth() + self.second.depth()
    }
}

#[derive(Debug)]
struct JoinedFn<L: JoinSemiLattice> {
    lhs: EdgeFn<L>,
    rhs: EdgeFn<L>,
}

impl<L: JoinSemiLattice + 'static> EdgeFunction<L> for JoinedFn<L> {
    fn apply_to(&self, source: &L) -> L {
        self.lhs.apply_to(source).join(&self.rhs.apply_to(source))
    }

    fn equal_to(&self, other: &dyn EdgeFunction<L>) -> bool {
        match other.as_any().downcast_ref::<JoinedFn<L>>() {
            Some(o) => {
                (self.lhs.equal_to(&*o.lhs) && self.rhs.equal_to(&*o.rhs))
                    || (self.lhs.equal_to(&*o.rhs) && self.rhs.equal_to(&*o.lhs))
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn depth(&self) -> usize {
        self.lhs.depth() + self.rhs.depth()
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

pub fn identity<L: JoinSemiLattice + 'static>() -> EdgeFn<L> {
    Arc::new(IdentityFn(PhantomData))
}

pub fn all_top<L: JoinSemiLattice + 'static>() -> EdgeFn<L> {
    Arc::new(AllTopFn(PhantomData))
}

pub fn all_bottom<L: JoinSemiLattice + 'static>() -> EdgeFn<L> {
    Arc::new(AllBottomFn(PhantomData))
}

/// Constant function, normalized to the canonical all-top/all-bottom
/// functions at the extremes.
pub fn constant<L: JoinSemiLattice + 'static>(value: L) -> EdgeFn<L> {
    if value.is_top() {
        all_top()
    } else if value.is_bottom() {
        all_bottom()
    } else {
        Arc::new(ConstantFn { value })
    }
}

/// Sequential composition: `first` runs on the source, `second` on its
/// output.
pub fn compose<L: JoinSemiLattice + 'static>(first: EdgeFn<L>, second: EdgeFn<L>) -> EdgeFn<L> {
    if first.is_identity() {
        return second;
    }
    if second.is_identity() {
        return first;
    }
    if second.is_constant() {
        return second;
    }
    if first.is_constant() {
        // The input is irrelevant; evaluate the pipeline once.
        return constant(second.apply_to(&first.apply_to(&L::top())));
    }
    if first.depth() + second.depth() > MAX_EDGE_FUNCTION_DEPTH {
        return all_bottom();
    }
    Arc::new(ComposedFn { first, second })
}

/// Pointwise join of two edge functions, for paths merging at a
/// confluence point.
pub fn join_fns<L: JoinSemiLattice + 'static>(lhs: EdgeFn<L>, rhs: EdgeFn<L>) -> EdgeFn<L> {
    if lhs.equal_to(&*rhs) {
        return lhs;
    }
    if lhs.is_all_top() {
        return rhs;
    }
    if rhs.is_all_top() {
        return lhs;
    }
    if lhs.is_all_bottom() || rhs.is_all_bottom() {
        return all_bottom();
    }
    if lhs.is_constant() && rhs.is_constant() {
        return constant(lhs.apply_to(&L::top()).join(&rhs.apply_to(&L::top())));
    }
    if lhs.depth() + rhs.depth() > MAX_EDGE_FUNCTION_DEPTH {
        return all_bottom();
    }
    Arc::new(JoinedFn { lhs, rhs })
}
