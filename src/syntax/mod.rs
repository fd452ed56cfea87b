//! The data model shared with the external parser/type-checker collaborator.
//!
//! This module defines the C-subset syntax tree, canonical type model, and
//! translation-unit facts that the frontend hands to the transformer. The
//! frontend itself (parsing, type checking, preprocessing) lives outside this
//! crate; everything here is plain, serde-serializable data.

use serde::{Deserialize, Serialize};

pub mod arena;
pub mod expr;
pub mod facts;
pub mod types;

pub use arena::{ExprArena, ExprId, ExprNode};
pub use expr::{BinOp, Expr, FunctionDef, Stmt, Storage, UnOp, VarRef};
pub use facts::{Symbol, SymbolKind, TranslationUnit};
pub use types::{BuiltinType, CType, Qualifier};

/// A byte range in the source text.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether a position lies inside this range.
    pub fn contains_pos(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Whether this range fully covers `other` (equality allowed).
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether this range covers `other` and is strictly larger.
    ///
    /// Expansion ranges in one translation unit either coincide, nest
    /// strictly, or are disjoint; partial overlap never occurs.
    pub fn strictly_contains(&self, other: Span) -> bool {
        self.contains(other) && *self != other
    }
}
