/*
 * In-memory program database
 *
 * Arena-backed `ProgramView` implementation. Handles are indices into
 * the arenas, assigned once at build time; the database is immutable
 * afterwards. Used by the problem instances and by every test in this
 * crate; a host compiler would provide its own adapter instead.
 */

use rustc_hash::FxHashMap;

use super::hierarchy::TypeHierarchy;
use super::model::{
    CallTargetExpr, FunctionId, FunctionInfo, InstId, InstKind, Signature, TypeId, ValueId,
    ValueInfo, ValueKind,
};
use super::view::ProgramView;

#[derive(Debug, Clone, Default)]
pub struct ProgramDb {
    functions: Vec<FunctionInfo>,
    function_names: FxHashMap<String, FunctionId>,
    insts: Vec<InstKind>,
    inst_owner: Vec<FunctionId>,
    /// Explicit control-flow edges; instructions without an entry fall
    /// through to the next instruction of their function.
    explicit_succs: FxHashMap<InstId, Vec<InstId>>,
    values: Vec<ValueInfo>,
    hierarchy: TypeHierarchy,
}

impl ProgramView for ProgramDb {
    fn functions(&self) -> Vec<FunctionId> {
        (0..self.functions.len() as u32).map(FunctionId).collect()
    }

    fn function(&self, f: FunctionId) -> &FunctionInfo {
        &self.functions[f.0 as usize]
    }

    fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    fn instructions_of(&self, f: FunctionId) -> &[InstId] {
        &self.functions[f.0 as usize].insts
    }

    fn inst(&self, i: InstId) -> &InstKind {
        &self.insts[i.0 as usize]
    }

    fn function_of(&self, i: InstId) -> FunctionId {
        self.inst_owner[i.0 as usize]
    }

    fn successors_of(&self, i: InstId) -> Vec<InstId> {
        if self.inst(i).is_exit() {
            return Vec::new();
        }
        if let Some(succs) = self.explicit_succs.get(&i) {
            return succs.clone();
        }
        // Fallthrough to the next instruction of the owning function.
        let owner = self.function_of(i);
        let insts = self.instructions_of(owner);
        match insts.iter().position(|x| *x == i) {
            Some(pos) if pos + 1 < insts.len() => vec![insts[pos + 1]],
            _ => Vec::new(),
        }
    }

    fn entry_of(&self, f: FunctionId) -> Option<InstId> {
        self.functions[f.0 as usize].insts.first().copied()
    }

    fn exits_of(&self, f: FunctionId) -> Vec<InstId> {
        self.functions[f.0 as usize]
            .insts
            .iter()
            .copied()
            .filter(|i| self.inst(*i).is_exit())
            .collect()
    }

    fn callees_declared_at(&self, i: InstId) -> Option<FunctionId> {
        match self.inst(i).as_call()?.target {
            CallTargetExpr::Direct(f) => Some(f),
            _ => None,
        }
    }

    fn value(&self, v: ValueId) -> &ValueInfo {
        &self.values[v.0 as usize]
    }

    fn type_hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }
}

/// Builder assembling a `ProgramDb`.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    db: ProgramDb,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integer-kinded value.
    pub fn int_value(&mut self, name: impl Into<String>) -> ValueId {
        self.add_value(name, ValueKind::Int, None)
    }

    /// Register a pointer-kinded value, optionally with a static class
    /// type (required for virtual-call receivers).
    pub fn ptr_value(&mut self, name: impl Into<String>, static_type: Option<TypeId>) -> ValueId {
        self.add_value(name, ValueKind::Ptr, static_type)
    }

    fn add_value(
        &mut self,
        name: impl Into<String>,
        kind: ValueKind,
        static_type: Option<TypeId>,
    ) -> ValueId {
        let id = ValueId(self.db.values.len() as u32);
        self.db.values.push(ValueInfo {
            name: name.into(),
            kind,
            static_type,
        });
        id
    }

    /// Register a function. Parameters are positional.
    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<ValueId>,
        signature: Signature,
    ) -> FunctionId {
        let id = FunctionId(self.db.functions.len() as u32);
        let name = name.into();
        self.db.function_names.insert(name.clone(), id);
        self.db.functions.push(FunctionInfo {
            name,
            params,
            signature,
            insts: Vec::new(),
        });
        id
    }

    /// Register a function that takes no parameters and returns nothing.
    pub fn simple_function(&mut self, name: impl Into<String>) -> FunctionId {
        self.function(name, Vec::new(), Signature::new(Vec::new(), None))
    }

    /// Append an instruction to a function body.
    pub fn inst(&mut self, f: FunctionId, kind: InstKind) -> InstId {
        let id = InstId(self.db.insts.len() as u32);
        self.db.insts.push(kind);
        self.db.inst_owner.push(f);
        self.db.functions[f.0 as usize].insts.push(id);
        id
    }

    /// Add an explicit control-flow edge (branches, joins). Once an
    /// instruction has an explicit edge it no longer falls through.
    pub fn edge(&mut self, from: InstId, to: InstId) {
        self.db.explicit_succs.entry(from).or_default().push(to);
    }

    /// Mutable access to the type hierarchy under construction.
    pub fn hierarchy_mut(&mut self) -> &mut TypeHierarchy {
        &mut self.db.hierarchy
    }

    pub fn build(self) -> ProgramDb {
        self.db
    }
}
