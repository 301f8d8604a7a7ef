// Shipped analysis instances: a linear constant analysis for the
// tabulation engine and memory reaching definitions for the monotone
// one, plus the candidate-value-set lattice they share.

pub mod constant_propagation;
pub mod mem_reach_defs;
pub mod value_set;

pub use constant_propagation::{CpFact, LinearConstants};
pub use mem_reach_defs::{MemDef, MemReachDefs};
pub use value_set::ValueSet;
