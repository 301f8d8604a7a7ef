/*
 * Points-to oracle
 *
 * Aliasing information is consumed as an oracle, not computed here. Every
 * query may answer `None` ("no information"); consumers must then fall
 * back to the most conservative interpretation instead of failing the
 * run.
 */

use rustc_hash::{FxHashMap, FxHashSet};

use super::model::{TypeId, ValueId};

/// Read-only aliasing oracle.
pub trait PointsToOracle {
    /// Abstract memory locations `v` may point to. `None` = unknown.
    fn points_to(&self, v: ValueId) -> Option<&FxHashSet<ValueId>>;

    /// Dynamic types the object behind `v` may have, derived from the
    /// allocation sites in its points-to set. `None` = unknown.
    fn types_of(&self, v: ValueId) -> Option<&FxHashSet<TypeId>>;

    /// Must-alias test. Defaults to the singleton criterion: both values
    /// are known to point to exactly one, identical location. Anything
    /// weaker is only may-alias.
    fn must_alias(&self, a: ValueId, b: ValueId) -> bool {
        match (self.points_to(a), self.points_to(b)) {
            (Some(pa), Some(pb)) => pa.len() == 1 && pa == pb,
            _ => a == b,
        }
    }
}

/// Table-backed oracle for tests and precomputed points-to results.
#[derive(Debug, Clone, Default)]
pub struct TablePointsTo {
    points_to: FxHashMap<ValueId, FxHashSet<ValueId>>,
    types: FxHashMap<ValueId, FxHashSet<TypeId>>,
}

impl TablePointsTo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_points_to(&mut self, v: ValueId, target: ValueId) {
        self.points_to.entry(v).or_default().insert(target);
    }

    pub fn add_type(&mut self, v: ValueId, ty: TypeId) {
        self.types.entry(v).or_default().insert(ty);
    }
}

impl PointsToOracle for TablePointsTo {
    fn points_to(&self, v: ValueId) -> Option<&FxHashSet<ValueId>> {
        self.points_to.get(&v)
    }

    fn types_of(&self, v: ValueId) -> Option<&FxHashSet<TypeId>> {
        self.types.get(&v)
    }
}
