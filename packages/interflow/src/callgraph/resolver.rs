/*
 * Call target resolution strategies
 *
 * A resolver answers "which functions may this call instruction invoke".
 * Direct calls resolve by identity; virtual calls by vtable-slot
 * reasoning over the type hierarchy; function-pointer calls by
 * structural signature matching. Policies are swappable strategies
 * behind one trait, selected at analysis-construction time.
 *
 * Failure policy: a call with no resolvable target yields an empty set,
 * never an error. The solvers treat such calls as having no callee
 * effect and rely on the call-to-return path for soundness.
 */

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::program::{
    CallTargetExpr, FunctionId, InstId, InstKind, Operand, PointsToOracle, ProgramView, Signature,
    TypeId, ValueId,
};

/// Call-resolution strategy.
///
/// `resolve` is the contract; the hooks let a policy keep bookkeeping
/// across the program walk: `other_inst` observes every instruction in
/// a whole-program pass that runs before any call is resolved (e.g.
/// function-valued operands that feed function-pointer resolution),
/// `pre_call` records dispatch-relevant context right before a call is
/// resolved, and `post_call` cleans up after it.
pub trait CallResolver {
    /// Possible targets of a call instruction. Empty set = unresolved.
    fn resolve(&mut self, call: InstId) -> FxHashSet<FunctionId>;

    fn pre_call(&mut self, _call: InstId) {}

    fn post_call(&mut self, _call: InstId) {}

    fn other_inst(&mut self, _inst: InstId) {}

    /// Final filter over the resolved target set.
    fn handle_possible_targets(&mut self, _call: InstId, _targets: &mut FxHashSet<FunctionId>) {}
}

/// Targets whose signature structurally matches `sig`. When the
/// address-taken set is non-empty, only address-taken functions are
/// candidates; otherwise every match is kept. Over-approximate by
/// design.
pub(crate) fn signature_targets<V: ProgramView>(
    view: &V,
    sig: &Signature,
    address_taken: &FxHashSet<FunctionId>,
) -> FxHashSet<FunctionId> {
    view.functions()
        .into_iter()
        .filter(|f| view.function(*f).signature == *sig)
        .filter(|f| address_taken.is_empty() || address_taken.contains(f))
        .collect()
}

/// Every concrete override of `slot` reachable in the subtype cone of
/// `receiver_ty`, including the receiver type itself. Subtypes without
/// their own override inherit the nearest concrete one up the
/// hierarchy; slots that stay abstract contribute nothing.
pub(crate) fn cha_targets<V: ProgramView>(
    view: &V,
    receiver_ty: TypeId,
    slot: usize,
) -> FxHashSet<FunctionId> {
    let th = view.type_hierarchy();
    th.subtype_cone(receiver_ty)
        .into_iter()
        .filter_map(|ty| th.resolve_concrete_entry(ty, slot))
        .collect()
}

/// Record functions whose address is taken by an instruction.
pub(crate) fn record_address_taken<V: ProgramView>(
    view: &V,
    inst: InstId,
    address_taken: &mut FxHashSet<FunctionId>,
) {
    let mut record = |op: &Operand| {
        if let Operand::Func(f) = op {
            address_taken.insert(*f);
        }
    };
    match view.inst(inst) {
        InstKind::Assign { src, .. } | InstKind::Store { src, .. } => record(src),
        InstKind::BinOp { lhs, rhs, .. } => {
            record(lhs);
            record(rhs);
        }
        InstKind::Call(call) => call.args.iter().for_each(record),
        InstKind::Return { value: Some(op) } => record(op),
        _ => {}
    }
}

/// Class-hierarchy-analysis resolver (the default policy).
///
/// Virtual calls resolve against the receiver's *static* type: every
/// concrete override in its subtype cone is a possible target. Sound
/// but imprecise; use `PointsToResolver` to refine with aliasing
/// information.
pub struct ChaResolver<'a, V: ProgramView> {
    view: &'a V,
    address_taken: FxHashSet<FunctionId>,
    /// Receiver context captured by `pre_call`, cleared by `post_call`.
    current_receiver: Option<(ValueId, Option<TypeId>)>,
}

impl<'a, V: ProgramView> ChaResolver<'a, V> {
    pub fn new(view: &'a V) -> Self {
        Self {
            view,
            address_taken: FxHashSet::default(),
            current_receiver: None,
        }
    }

    fn static_receiver_type(&self, receiver: ValueId) -> Option<TypeId> {
        match self.current_receiver {
            Some((v, ty)) if v == receiver => ty,
            _ => self.view.value(receiver).static_type,
        }
    }
}

impl<V: ProgramView> CallResolver for ChaResolver<'_, V> {
    fn resolve(&mut self, call: InstId) -> FxHashSet<FunctionId> {
        let Some(site) = self.view.inst(call).as_call() else {
            return FxHashSet::default();
        };
        match &site.target {
            CallTargetExpr::Direct(f) => std::iter::once(*f).collect(),
            CallTargetExpr::Virtual { receiver, slot } => {
                match self.static_receiver_type(*receiver) {
                    Some(ty) => cha_targets(self.view, ty, *slot),
                    None => {
                        debug!(?call, "virtual call without receiver type; unresolved");
                        FxHashSet::default()
                    }
                }
            }
            CallTargetExpr::Pointer { signature, .. } => {
                signature_targets(self.view, signature, &self.address_taken)
            }
        }
    }

    fn pre_call(&mut self, call: InstId) {
        if let Some(site) = self.view.inst(call).as_call() {
            if let CallTargetExpr::Virtual { receiver, .. } = site.target {
                self.current_receiver = Some((receiver, self.view.value(receiver).static_type));
            }
        }
    }

    fn post_call(&mut self, _call: InstId) {
        self.current_receiver = None;
    }

    fn other_inst(&mut self, inst: InstId) {
        record_address_taken(self.view, inst, &mut self.address_taken);
    }
}

/// Points-to-refined resolver.
///
/// Virtual calls are resolved against the dynamic types the oracle
/// reports for the receiver, intersected with the static subtype cone
/// when a static type is known. Missing oracle data falls back to plain
/// CHA rather than failing the run.
pub struct PointsToResolver<'a, V: ProgramView, O: PointsToOracle> {
    view: &'a V,
    oracle: &'a O,
    address_taken: FxHashSet<FunctionId>,
}

impl<'a, V: ProgramView, O: PointsToOracle> PointsToResolver<'a, V, O> {
    pub fn new(view: &'a V, oracle: &'a O) -> Self {
        Self {
            view,
            oracle,
            address_taken: FxHashSet::default(),
        }
    }
}

impl<V: ProgramView, O: PointsToOracle> CallResolver for PointsToResolver<'_, V, O> {
    fn resolve(&mut self, call: InstId) -> FxHashSet<FunctionId> {
        let Some(site) = self.view.inst(call).as_call() else {
            return FxHashSet::default();
        };
        match &site.target {
            CallTargetExpr::Direct(f) => std::iter::once(*f).collect(),
            CallTargetExpr::Virtual { receiver, slot } => {
                let th = self.view.type_hierarchy();
                let static_ty = self.view.value(*receiver).static_type;
                match self.oracle.types_of(*receiver) {
                    Some(dynamic_types) => dynamic_types
                        .iter()
                        .copied()
                        .filter(|ty| match static_ty {
                            Some(base) => th.is_subtype_of(*ty, base),
                            None => true,
                        })
                        .filter_map(|ty| th.resolve_concrete_entry(ty, *slot))
                        .collect(),
                    None => match static_ty {
                        Some(ty) => {
                            debug!(?call, "no points-to data for receiver; CHA fallback");
                            cha_targets(self.view, ty, *slot)
                        }
                        None => FxHashSet::default(),
                    },
                }
            }
            CallTargetExpr::Pointer { signature, .. } => {
                signature_targets(self.view, signature, &self.address_taken)
            }
        }
    }

    fn other_inst(&mut self, inst: InstId) {
        record_address_taken(self.view, inst, &mut self.address_taken);
    }
}
