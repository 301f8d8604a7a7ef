/*
 * Type hierarchy with virtual-table layouts
 *
 * Supertype/subtype edges plus a per-type vtable mapping slot indices to
 * implementing functions. A `None` vtable entry is an abstract slot: the
 * type declares the method but does not implement it. Resolution walks up
 * the hierarchy to the nearest concrete override; a slot that stays
 * abstract all the way up resolves to nothing.
 *
 * Immutable for the duration of a solver run.
 */

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::model::{FunctionId, TypeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    pub supertypes: Vec<TypeId>,

    /// slot index -> implementing function; `None` = abstract slot.
    pub vtable: Vec<Option<FunctionId>>,
}

/// Supertype/subtype reachability and vtable lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeHierarchy {
    types: Vec<TypeInfo>,

    /// Direct subtype edges, inverse of `TypeInfo::supertypes`.
    subtypes: FxHashMap<TypeId, Vec<TypeId>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. Supertypes must already be registered.
    pub fn add_type(
        &mut self,
        name: impl Into<String>,
        supertypes: Vec<TypeId>,
        vtable: Vec<Option<FunctionId>>,
    ) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        for sup in &supertypes {
            self.subtypes.entry(*sup).or_default().push(id);
        }
        self.types.push(TypeInfo {
            name: name.into(),
            supertypes,
            vtable,
        });
        id
    }

    pub fn type_info(&self, ty: TypeId) -> Option<&TypeInfo> {
        self.types.get(ty.0 as usize)
    }

    pub fn num_types(&self) -> usize {
        self.types.len()
    }

    /// Direct subtypes of `ty`.
    pub fn direct_subtypes(&self, ty: TypeId) -> &[TypeId] {
        self.subtypes.get(&ty).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Reflexive-transitive subtype cone of `ty`, in discovery order.
    pub fn subtype_cone(&self, ty: TypeId) -> Vec<TypeId> {
        let mut cone = vec![ty];
        let mut i = 0;
        while i < cone.len() {
            let current = cone[i];
            for sub in self.direct_subtypes(current) {
                if !cone.contains(sub) {
                    cone.push(*sub);
                }
            }
            i += 1;
        }
        cone
    }

    /// True if `sub` is `sup` or a transitive subtype of it.
    pub fn is_subtype_of(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        let Some(info) = self.type_info(sub) else {
            return false;
        };
        info.supertypes.iter().any(|s| self.is_subtype_of(*s, sup))
    }

    /// Own vtable entry of `ty` at `slot`, without supertype fallback.
    pub fn vtable_entry(&self, ty: TypeId, slot: usize) -> Option<FunctionId> {
        self.type_info(ty)?.vtable.get(slot).copied().flatten()
    }

    /// Nearest concrete override of `slot` reachable from `ty` upward.
    ///
    /// A type that does not implement the slot itself inherits the
    /// implementation of the closest supertype that does. Returns `None`
    /// when the slot is abstract along every path up the hierarchy.
    pub fn resolve_concrete_entry(&self, ty: TypeId, slot: usize) -> Option<FunctionId> {
        if let Some(f) = self.vtable_entry(ty, slot) {
            return Some(f);
        }
        let info = self.type_info(ty)?;
        info.supertypes
            .iter()
            .find_map(|sup| self.resolve_concrete_entry(*sup, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(n: u32) -> FunctionId {
        FunctionId(n)
    }

    #[test]
    fn test_subtype_cone() {
        let mut th = TypeHierarchy::new();
        let base = th.add_type("B", vec![], vec![None]);
        let left = th.add_type("L", vec![base], vec![Some(f(1))]);
        let right = th.add_type("R", vec![base], vec![Some(f(2))]);
        let leaf = th.add_type("LL", vec![left], vec![None]);

        let cone = th.subtype_cone(base);
        assert_eq!(cone.len(), 4);
        assert!(cone.contains(&left));
        assert!(cone.contains(&right));
        assert!(cone.contains(&leaf));

        assert!(th.is_subtype_of(leaf, base));
        assert!(!th.is_subtype_of(base, leaf));
        assert!(!th.is_subtype_of(left, right));
    }

    #[test]
    fn test_concrete_entry_walks_up() {
        let mut th = TypeHierarchy::new();
        let base = th.add_type("B", vec![], vec![Some(f(1))]);
        let mid = th.add_type("M", vec![base], vec![None]);
        let leaf = th.add_type("C", vec![mid], vec![Some(f(2))]);

        // Mid inherits the base implementation.
        assert_eq!(th.resolve_concrete_entry(mid, 0), Some(f(1)));
        // The leaf overrides it.
        assert_eq!(th.resolve_concrete_entry(leaf, 0), Some(f(2)));
    }

    #[test]
    fn test_abstract_slot_resolves_to_nothing() {
        let mut th = TypeHierarchy::new();
        let base = th.add_type("B", vec![], vec![None]);
        let sub = th.add_type("S", vec![base], vec![None]);

        assert_eq!(th.resolve_concrete_entry(base, 0), None);
        assert_eq!(th.resolve_concrete_entry(sub, 0), None);
    }
}
