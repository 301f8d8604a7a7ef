// Exploded-supergraph tabulation: problem contracts and the two-phase
// IDE solver, with IFDS handled through the two-point-lattice reduction.

pub mod problem;
pub mod solver;

pub use problem::{IdeProblem, IfdsAsIde, IfdsProblem, Reachability};
pub use solver::{SolverResults, SolverStats, TabulationSolver};
