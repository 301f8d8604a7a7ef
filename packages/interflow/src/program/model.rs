/*
 * Program model (IR adapter surface)
 *
 * Stable integer handles for every program entity. Handles are arena
 * indices assigned once when the program view is loaded; maps keyed by a
 * handle hash and compare independently of any memory layout.
 */

use serde::{Deserialize, Serialize};

/// Handle of a function in the program view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Handle of an instruction. Instructions form a control-flow graph
/// within their owning function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstId(pub u32);

/// Handle of a type in the type hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

/// Handle of an IR value (variable, parameter, memory root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// Coarse value kind, used for signature matching and for deciding which
/// facts may cross a call boundary (only pointer-typed carriers can).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Ptr,
}

/// Structural call signature: parameter kinds plus return kind.
///
/// Function-pointer resolution matches candidates on this shape only,
/// which is deliberately over-approximate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<ValueKind>,
    pub ret: Option<ValueKind>,
}

impl Signature {
    pub fn new(params: Vec<ValueKind>, ret: Option<ValueKind>) -> Self {
        Self { params, ret }
    }
}

/// Instruction operand: a literal constant, an IR value, or the address
/// of a function (function-pointer creation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Const(i64),
    Value(ValueId),
    Func(FunctionId),
}

/// Binary operations understood by the illustrative problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
}

/// How a call instruction names its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallTargetExpr {
    /// Direct call, resolved by identity lookup.
    Direct(FunctionId),

    /// Virtual-dispatch call through `slot` of the receiver's vtable.
    Virtual { receiver: ValueId, slot: usize },

    /// Indirect call through a function-pointer value.
    Pointer { callee: ValueId, signature: Signature },
}

/// A call instruction: target expression, positional arguments and the
/// value receiving the return (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub target: CallTargetExpr,
    pub args: Vec<Operand>,
    pub dest: Option<ValueId>,
}

/// Instruction kinds exposed by the program view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstKind {
    /// `dest = src`
    Assign { dest: ValueId, src: Operand },

    /// `dest = lhs op rhs`
    BinOp {
        dest: ValueId,
        op: BinOpKind,
        lhs: Operand,
        rhs: Operand,
    },

    /// `dest = *addr`
    Load { dest: ValueId, addr: ValueId },

    /// `*addr = src`
    Store { addr: ValueId, src: Operand },

    /// Call through any target expression.
    Call(CallSite),

    /// Function exit, optionally carrying a return value.
    Return { value: Option<Operand> },

    /// No dataflow effect (placeholder, branch anchor).
    Nop,
}

impl InstKind {
    pub fn is_call(&self) -> bool {
        matches!(self, InstKind::Call(_))
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, InstKind::Return { .. })
    }

    pub fn as_call(&self) -> Option<&CallSite> {
        match self {
            InstKind::Call(call) => Some(call),
            _ => None,
        }
    }
}

/// Metadata of an IR value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub kind: ValueKind,

    /// Static class type, for receiver values of virtual calls.
    pub static_type: Option<TypeId>,
}

/// Metadata of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<ValueId>,
    pub signature: Signature,

    /// Instructions in insertion order; the first is the entry point.
    pub insts: Vec<InstId>,
}
