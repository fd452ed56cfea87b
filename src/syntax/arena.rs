//! Expression arena with stable integer ids.
//!
//! Analysis results are memoized per `ExprId`, so ids must stay stable for
//! the lifetime of one transformation pass. The arena is rebuilt from scratch
//! for every pass; ids never outlive it.

use serde::{Deserialize, Serialize};

use crate::syntax::{CType, Expr, Span};

/// Index of an expression node within its arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One arena slot: the expression, its canonical-izable semantic type, and
/// its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprNode {
    pub expr: Expr,
    pub ty: CType,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: Expr, ty: CType, span: Span) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode { expr, ty, span });
        id
    }

    pub fn get(&self, id: ExprId) -> &ExprNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &ExprNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ExprId(i as u32), node))
    }

    /// All nodes whose span exactly matches the given range. This is how
    /// preprocessor expansion ranges are attributed to syntax-tree nodes;
    /// more than one hit signals an ambiguous expansion.
    pub fn nodes_at(&self, span: Span) -> Vec<ExprId> {
        self.iter()
            .filter(|(_, node)| node.span == span)
            .map(|(id, _)| id)
            .collect()
    }
}
