//! The supported C expression and statement subset.
//!
//! Expressions reference each other through arena ids rather than boxes so
//! that analysis results can be memoized per stable integer id. Anything the
//! frontend saw that falls outside the subset arrives as `Opaque` and is
//! never transformed into.

use serde::{Deserialize, Serialize};

use crate::syntax::ExprId;

/// Storage class of a referenced variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    Global,
    Local,
    /// A function-scoped static. Counts as local capture: the synthesized
    /// definition is emitted at file scope and cannot name it.
    StaticLocal,
}

impl Storage {
    pub fn is_global(&self) -> bool {
        matches!(self, Storage::Global)
    }
}

/// A reference to a named variable together with its storage class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    pub storage: Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// One expression node in the supported subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Num(i64),
    Var(VarRef),
    Paren(ExprId),
    Unary { op: UnOp, operand: ExprId },
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Assign { target: VarRef, value: ExprId },
    Call { callee: String, args: Vec<ExprId> },
    /// An expression outside the subset. Never transformable, conservatively
    /// treated as side-effecting and capturing.
    Opaque,
}

impl Expr {
    /// Node kind name for diagnostics and logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Num(_) => "Num",
            Expr::Var(_) => "Var",
            Expr::Paren(_) => "Paren",
            Expr::Unary { .. } => "Unary",
            Expr::Binary { .. } => "Binary",
            Expr::Assign { .. } => "Assign",
            Expr::Call { .. } => "Call",
            Expr::Opaque => "Opaque",
        }
    }
}

/// A statement in a function body. The transformer walks these to reach every
/// expression in the translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(ExprId),
    If {
        cond: ExprId,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: ExprId,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
}

/// A function definition in the main file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub body: Stmt,
}
