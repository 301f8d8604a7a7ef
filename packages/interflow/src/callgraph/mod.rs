// Call-graph resolution: swappable per-call target resolution policies
// and the materialized call graph the solvers consult.

pub mod graph;
pub mod resolver;

pub use graph::CallGraph;
pub use resolver::{CallResolver, ChaResolver, PointsToResolver};
