/*
 * Program View protocol
 *
 * Read-only access to functions, instructions, control flow, values and
 * the type hierarchy. Every consumer in this crate (resolvers, both
 * solvers, problem instances) goes through this trait; the host IR is
 * adapted behind it and treated as immutable for the duration of a
 * solver run.
 */

use super::hierarchy::TypeHierarchy;
use super::model::{FunctionId, FunctionInfo, InstId, InstKind, ValueId, ValueInfo};

pub trait ProgramView {
    /// All functions in the program.
    fn functions(&self) -> Vec<FunctionId>;

    /// Metadata of a function.
    fn function(&self, f: FunctionId) -> &FunctionInfo;

    /// Look up a function by name.
    fn function_by_name(&self, name: &str) -> Option<FunctionId>;

    /// Instructions of a function, in order; the first is the entry.
    fn instructions_of(&self, f: FunctionId) -> &[InstId];

    /// Kind of an instruction.
    fn inst(&self, i: InstId) -> &InstKind;

    /// Owning function of an instruction.
    fn function_of(&self, i: InstId) -> FunctionId;

    /// Intra-procedural control-flow successors.
    fn successors_of(&self, i: InstId) -> Vec<InstId>;

    /// Entry instruction of a function, if it has a body.
    fn entry_of(&self, f: FunctionId) -> Option<InstId>;

    /// Exit (return) instructions of a function.
    fn exits_of(&self, f: FunctionId) -> Vec<InstId>;

    /// Statically declared callee, for the direct-call case only.
    fn callees_declared_at(&self, i: InstId) -> Option<FunctionId>;

    /// Metadata of a value.
    fn value(&self, v: ValueId) -> &ValueInfo;

    /// The type hierarchy with vtable layouts.
    fn type_hierarchy(&self) -> &TypeHierarchy;

    fn is_call(&self, i: InstId) -> bool {
        self.inst(i).is_call()
    }

    fn is_exit(&self, i: InstId) -> bool {
        self.inst(i).is_exit()
    }

    /// Return sites of a call: its intra-procedural successors.
    fn return_sites_of(&self, call: InstId) -> Vec<InstId> {
        self.successors_of(call)
    }
}
