// Program View: stable handles, instruction model, type hierarchy,
// points-to oracle, and the in-memory database adapter.

pub mod db;
pub mod hierarchy;
pub mod model;
pub mod oracle;
pub mod view;

pub use db::{ProgramBuilder, ProgramDb};
pub use hierarchy::{TypeHierarchy, TypeInfo};
pub use model::{
    BinOpKind, CallSite, CallTargetExpr, FunctionId, FunctionInfo, InstId, InstKind, Operand,
    Signature, TypeId, ValueId, ValueInfo, ValueKind,
};
pub use oracle::{PointsToOracle, TablePointsTo};
pub use view::ProgramView;
