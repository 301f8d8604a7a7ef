// Monotone interprocedural framework: bounded call-string contexts,
// the set-level problem contract and the push-based fixpoint solver.

pub mod callstring;
pub mod problem;
pub mod solver;

pub use callstring::CallString;
pub use problem::InterMonoProblem;
pub use solver::{MonoResults, MonoSolver, MonoStats};
