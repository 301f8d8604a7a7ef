/*
 * Interflow - Interprocedural Dataflow Analysis Framework
 *
 * Layered architecture:
 * - program/   : IR adapter surface (handles, program view, hierarchy, oracle)
 * - callgraph/ : Call target resolution policies and the materialized graph
 * - edgefn/    : Join-semilattice and edge-function abstraction
 * - tabulation/: IFDS/IDE exploded-supergraph solver (RHS tabulation)
 * - mono/      : Monotone framework with bounded call-string contexts
 * - problems/  : Shipped analysis instances
 *
 * Both engines consume the same program view and call graph; an
 * analysis picks the tabulation engine when its flow functions are
 * distributive over facts and the monotone engine otherwise.
 */

#![allow(clippy::too_many_arguments)] // Interprocedural edges carry many coordinates

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports
// ═══════════════════════════════════════════════════════════════════════════

/// Program model: handles, instructions, program view, type hierarchy,
/// points-to oracle.
pub mod program;

/// Call-graph construction and resolution policies.
pub mod callgraph;

/// Lattice and edge-function abstraction.
pub mod edgefn;

/// IFDS/IDE tabulation solver.
pub mod tabulation;

/// Monotone interprocedural framework.
pub mod mono;

/// Shipped analysis instances.
pub mod problems;

/// Solver configuration.
pub mod config;

/// Error types.
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use callgraph::{CallGraph, CallResolver, ChaResolver, PointsToResolver};
pub use config::AnalysisConfig;
pub use edgefn::{EdgeFn, EdgeFunction, JoinSemiLattice};
pub use errors::{AnalysisError, Result};
pub use mono::{CallString, InterMonoProblem, MonoResults, MonoSolver};
pub use program::{
    FunctionId, InstId, PointsToOracle, ProgramBuilder, ProgramDb, ProgramView, TypeId, ValueId,
};
pub use tabulation::{
    IdeProblem, IfdsAsIde, IfdsProblem, SolverResults, SolverStats, TabulationSolver,
};
