//! Eligibility analysis: deciding which expansions can be rewritten.
//!
//! Every expression node's facts (subset membership, classification, side
//! effects, local capture) are computed in one bottom-up traversal and
//! memoized per arena id, so no node is ever re-derived. On top of the facts,
//! `Analyzer::analyze` runs the per-expansion decision sequence and yields
//! either an eligible record with resolved types or the full list of
//! rejection reasons.

use std::fmt;

use tracing::debug;

use crate::errors::{to_source_span, ErrorReporting, UnmacroError};
use crate::forest::{ExpansionId, MacroForest, MacroKind, MacroTable};
use crate::syntax::{CType, Expr, ExprArena, ExprId};

// ============================================================================
// EXPRESSION FACTS
// ============================================================================

/// Classification of an expression node, mirroring the supported subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprClass {
    Num,
    Var,
    Paren,
    UnExpr,
    BinExpr,
    Assign,
    CallOrInvocation,
    Invalid,
}

/// Everything analysis needs to know about one expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExprFacts {
    /// The node and all of its descendants fall within the supported subset.
    pub in_subset: bool,
    pub class: ExprClass,
    /// The node or any descendant writes state or calls a function.
    pub has_side_effects: bool,
    /// The node or any descendant names a local or static-local variable.
    pub captures_locals: bool,
}

/// Memoized facts, indexed by arena id. Scoped to one pass; the arena is
/// rebuilt between passes, so the cache never goes stale.
#[derive(Debug, Default)]
pub struct FactsCache {
    slots: Vec<Option<ExprFacts>>,
}

impl FactsCache {
    pub fn for_arena(arena: &ExprArena) -> Self {
        FactsCache {
            slots: vec![None; arena.len()],
        }
    }

    /// Facts for one node, computing and caching the whole subtree on the
    /// first visit.
    pub fn facts(&mut self, arena: &ExprArena, id: ExprId) -> ExprFacts {
        if let Some(cached) = self.slots[id.index()] {
            return cached;
        }
        let facts = self.compute(arena, id);
        self.slots[id.index()] = Some(facts);
        facts
    }

    fn compute(&mut self, arena: &ExprArena, id: ExprId) -> ExprFacts {
        match &arena.get(id).expr {
            Expr::Num(_) => ExprFacts {
                in_subset: true,
                class: ExprClass::Num,
                has_side_effects: false,
                captures_locals: false,
            },
            Expr::Var(var) => ExprFacts {
                in_subset: true,
                class: ExprClass::Var,
                has_side_effects: false,
                captures_locals: !var.storage.is_global(),
            },
            Expr::Paren(inner) => {
                let inner = self.facts(arena, *inner);
                ExprFacts {
                    class: ExprClass::Paren,
                    ..inner
                }
            }
            Expr::Unary { operand, .. } => {
                let operand = self.facts(arena, *operand);
                ExprFacts {
                    class: ExprClass::UnExpr,
                    ..operand
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                let (lhs, rhs) = (*lhs, *rhs);
                let lhs = self.facts(arena, lhs);
                let rhs = self.facts(arena, rhs);
                ExprFacts {
                    in_subset: lhs.in_subset && rhs.in_subset,
                    class: ExprClass::BinExpr,
                    has_side_effects: lhs.has_side_effects || rhs.has_side_effects,
                    captures_locals: lhs.captures_locals || rhs.captures_locals,
                }
            }
            Expr::Assign { target, value } => {
                let target_local = !target.storage.is_global();
                let value = self.facts(arena, *value);
                ExprFacts {
                    in_subset: value.in_subset,
                    class: ExprClass::Assign,
                    has_side_effects: true,
                    captures_locals: target_local || value.captures_locals,
                }
            }
            Expr::Call { args, .. } => {
                let args = args.clone();
                let mut in_subset = true;
                let mut captures = false;
                for arg in args {
                    let facts = self.facts(arena, arg);
                    in_subset &= facts.in_subset;
                    captures |= facts.captures_locals;
                }
                ExprFacts {
                    in_subset,
                    class: ExprClass::CallOrInvocation,
                    has_side_effects: true,
                    captures_locals: captures,
                }
            }
            // Outside the subset: assume the worst on every axis.
            Expr::Opaque => ExprFacts {
                in_subset: false,
                class: ExprClass::Invalid,
                has_side_effects: true,
                captures_locals: true,
            },
        }
    }
}

// ============================================================================
// ELIGIBILITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    AmbiguousExpansion,
    ContainsNestedInvocation,
    IsNestedInvocation,
    MultiplyDefinedMacro,
    NonUnaryFunctionLikeMacro,
    MultipleDistinctExpansions,
    HasSideEffects,
    CapturesLocalState,
    NotExpressionContext,
    DefinedInStdHeader,
    /// The expansion or an argument has a non-builtin, array, or function
    /// type the synthesizer cannot reify.
    UnsupportedType,
}

impl RejectionReason {
    /// Whether the transformer should still descend into sub-expressions of a
    /// rejected expression. Structural rejections poison the whole range;
    /// semantic ones may leave transformable inner expansions.
    pub fn recurses_into_children(&self) -> bool {
        matches!(
            self,
            RejectionReason::HasSideEffects
                | RejectionReason::CapturesLocalState
                | RejectionReason::MultiplyDefinedMacro
                | RejectionReason::MultipleDistinctExpansions
                | RejectionReason::DefinedInStdHeader
                | RejectionReason::UnsupportedType
        )
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::AmbiguousExpansion => "ambiguous expansion",
            RejectionReason::ContainsNestedInvocation => {
                "expansion contains a nested macro invocation"
            }
            RejectionReason::IsNestedInvocation => "expansion is nested inside another invocation",
            RejectionReason::MultiplyDefinedMacro => "macro is defined more than once",
            RejectionReason::NonUnaryFunctionLikeMacro => {
                "function-like macro is not a unary identity"
            }
            RejectionReason::MultipleDistinctExpansions => {
                "macro expands to multiple distinct ranges"
            }
            RejectionReason::HasSideEffects => "rewrite would change side-effect evaluation",
            RejectionReason::CapturesLocalState => "expansion captures local state",
            RejectionReason::NotExpressionContext => "expansion is not in an expression context",
            RejectionReason::DefinedInStdHeader => "macro is defined in a standard header",
            RejectionReason::UnsupportedType => "expansion involves a non-builtin type",
        };
        f.write_str(text)
    }
}

/// Resolved types for an expansion cleared for transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibleExpansion {
    /// The expression node attributed to the whole expansion.
    pub node: ExprId,
    /// Canonical type of the expansion expression.
    pub ty: CType,
    /// Canonical type per macro argument, in formal-parameter order.
    pub arg_types: Vec<CType>,
}

/// Outcome of analyzing one expansion. Rejections carry every applicable
/// reason; the first is the primary one for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    Eligible(EligibleExpansion),
    Rejected(Vec<RejectionReason>),
}

impl Eligibility {
    fn rejected(reason: RejectionReason) -> Self {
        Eligibility::Rejected(vec![reason])
    }
}

// ============================================================================
// ANALYZER
// ============================================================================

pub struct Analyzer<'a> {
    arena: &'a ExprArena,
    forest: &'a MacroForest,
    table: &'a MacroTable,
    /// When false, macros from standard headers are rejected outright.
    transform_std_header_macros: bool,
    cache: FactsCache,
    ctx: &'a dyn ErrorReporting,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        arena: &'a ExprArena,
        forest: &'a MacroForest,
        table: &'a MacroTable,
        transform_std_header_macros: bool,
        ctx: &'a dyn ErrorReporting,
    ) -> Self {
        Analyzer {
            arena,
            forest,
            table,
            transform_std_header_macros,
            cache: FactsCache::for_arena(arena),
            ctx,
        }
    }

    pub fn facts(&mut self, id: ExprId) -> ExprFacts {
        self.cache.facts(self.arena, id)
    }

    /// Runs the decision sequence for one expansion. Structural defects end
    /// analysis immediately; semantic defects accumulate so diagnostics can
    /// report every applicable reason.
    pub fn analyze(&mut self, id: ExpansionId) -> Result<Eligibility, UnmacroError> {
        let node = self.forest.get(id);
        debug!(name = %node.name, span = ?node.span, "analyzing expansion");

        // Attribution: exactly one expression node, exactly one macro name.
        if node.nodes.is_empty() {
            return Ok(Eligibility::rejected(RejectionReason::NotExpressionContext));
        }
        if node.nodes.len() > 1 || self.forest.names_starting_at(node.span.start).len() > 1 {
            return Ok(Eligibility::rejected(RejectionReason::AmbiguousExpansion));
        }
        let expr_id = node.nodes[0];

        if node.has_nested {
            for arg in &node.args {
                if let Some(nested) = arg.nested {
                    debug!(
                        arg = %arg.name,
                        nested = %self.forest.get(nested).name,
                        "argument text carries a nested invocation"
                    );
                }
            }
            return Ok(Eligibility::rejected(
                RejectionReason::ContainsNestedInvocation,
            ));
        }
        if node.is_nested {
            return Ok(Eligibility::rejected(RejectionReason::IsNestedInvocation));
        }

        // Every argument's spelling must come from this invocation's own
        // range. A range outside it, or inside another recorded expansion of
        // the same macro, means begin and end resolved to different
        // invocations.
        for arg in &node.args {
            let outside = !node.span.contains(arg.span);
            let foreign = self
                .forest
                .ranges_of(&node.name)
                .iter()
                .any(|range| *range != node.span && range.contains(arg.span));
            if outside || foreign {
                return Ok(Eligibility::rejected(
                    RejectionReason::MultipleDistinctExpansions,
                ));
            }
        }

        if self.table.is_multiply_defined(&node.name) {
            return Ok(Eligibility::rejected(RejectionReason::MultiplyDefinedMacro));
        }

        // The forest only records expansions of macros the definition stream
        // reported, so a miss here is a corrupt facts value.
        let record = match self.table.lookup(&node.name) {
            Some(record) => record,
            None => {
                return Err(self.ctx.internal_error(
                    &format!("no definition recorded for macro '{}'", node.name),
                    to_source_span(node.span),
                ))
            }
        };

        if record.defined_in_std_header && !self.transform_std_header_macros {
            return Ok(Eligibility::rejected(RejectionReason::DefinedInStdHeader));
        }

        if record.kind.param_count() > 1 {
            return Ok(Eligibility::rejected(
                RejectionReason::NonUnaryFunctionLikeMacro,
            ));
        }

        // One argument record per formal parameter; anything else means the
        // event stream misattributed the invocation.
        if node.args.len() != record.kind.param_count() {
            return Ok(Eligibility::rejected(RejectionReason::AmbiguousExpansion));
        }

        let facts = self.facts(expr_id);
        if !facts.in_subset || facts.class == ExprClass::Invalid {
            return Ok(Eligibility::rejected(RejectionReason::NotExpressionContext));
        }

        let mut reasons = Vec::new();

        // A side-effecting expansion is only a problem when the rewrite would
        // change how often the effects run: a variable initializer runs once
        // for all uses, and a function evaluates its argument once even when
        // the macro body mentioned the parameter repeatedly.
        if facts.has_side_effects && self.rewrite_changes_evaluation(&record.kind, &record.body) {
            reasons.push(RejectionReason::HasSideEffects);
        }
        if facts.captures_locals {
            reasons.push(RejectionReason::CapturesLocalState);
        }
        if !reasons.is_empty() {
            return Ok(Eligibility::Rejected(reasons));
        }

        // Unary macros are limited to identity bodies; anything richer would
        // need argument substitution the rewriter does not perform.
        if let MacroKind::FunctionLike { params } = &record.kind {
            if params.len() == 1 && !is_identity_body(&record.body, &params[0]) {
                return Ok(Eligibility::rejected(
                    RejectionReason::NonUnaryFunctionLikeMacro,
                ));
            }
        }

        // Types: the expansion's own type, plus one consistent canonical type
        // per argument.
        let ty = self.arena.get(expr_id).ty.canonical();
        let mut arg_types = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            match self.consistent_arg_type(&arg.nodes) {
                Some(arg_ty) => arg_types.push(arg_ty),
                None => {
                    return Ok(Eligibility::rejected(RejectionReason::AmbiguousExpansion))
                }
            }
        }

        Ok(Eligibility::Eligible(EligibleExpansion {
            node: expr_id,
            ty,
            arg_types,
        }))
    }

    fn rewrite_changes_evaluation(&self, kind: &MacroKind, body: &str) -> bool {
        match kind {
            MacroKind::ObjectLike => true,
            MacroKind::FunctionLike { params } => params
                .iter()
                .any(|p| count_token_occurrences(body, p) > 1),
        }
    }

    /// The single canonical type shared by all of an argument's nodes, or
    /// `None` when the nodes disagree or the argument resolved to nothing.
    fn consistent_arg_type(&self, nodes: &[ExprId]) -> Option<CType> {
        let first = nodes.first()?;
        let ty = self.arena.get(*first).ty.canonical();
        for id in &nodes[1..] {
            if self.arena.get(*id).ty.canonical() != ty {
                return None;
            }
        }
        Some(ty)
    }
}

// ============================================================================
// TOKEN HELPERS
// ============================================================================

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Counts whole-token occurrences of an identifier in macro body text.
pub fn count_token_occurrences(body: &str, token: &str) -> usize {
    if token.is_empty() {
        return 0;
    }
    let bytes = body.as_bytes();
    let mut count = 0;
    let mut start = 0;
    while let Some(pos) = body[start..].find(token) {
        let at = start + pos;
        let end = at + token.len();
        let before_ok = at == 0 || !is_ident_char(bytes[at - 1] as char);
        let after_ok = end == bytes.len() || !is_ident_char(bytes[end] as char);
        if before_ok && after_ok {
            count += 1;
        }
        start = at + 1;
    }
    count
}

/// True when a macro body is the parameter itself, up to whitespace and
/// balanced outer parentheses.
pub fn is_identity_body(body: &str, param: &str) -> bool {
    let mut text = body.trim();
    loop {
        if text == param {
            return true;
        }
        let stripped = text
            .strip_prefix('(')
            .and_then(|t| t.strip_suffix(')'))
            .map(str::trim);
        match stripped {
            Some(inner) if balanced(inner) => text = inner,
            _ => return false,
        }
    }
}

fn balanced(text: &str) -> bool {
    let mut depth: i32 = 0;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Span, Storage, VarRef};

    fn var(name: &str, storage: Storage) -> Expr {
        Expr::Var(VarRef {
            name: name.to_string(),
            storage,
        })
    }

    #[test]
    fn facts_propagate_bottom_up() {
        let mut arena = ExprArena::new();
        let x = arena.alloc(var("x", Storage::Local), CType::int(), Span::new(0, 1));
        let one = arena.alloc(Expr::Num(1), CType::int(), Span::new(4, 5));
        let sum = arena.alloc(
            Expr::Binary {
                op: crate::syntax::BinOp::Add,
                lhs: x,
                rhs: one,
            },
            CType::int(),
            Span::new(0, 5),
        );
        let mut cache = FactsCache::for_arena(&arena);
        let facts = cache.facts(&arena, sum);
        assert!(facts.in_subset);
        assert_eq!(facts.class, ExprClass::BinExpr);
        assert!(!facts.has_side_effects);
        assert!(facts.captures_locals);
    }

    #[test]
    fn assignment_is_effectful_and_captures_local_target() {
        let mut arena = ExprArena::new();
        let one = arena.alloc(Expr::Num(1), CType::int(), Span::new(4, 5));
        let assign = arena.alloc(
            Expr::Assign {
                target: VarRef {
                    name: "x".to_string(),
                    storage: Storage::Local,
                },
                value: one,
            },
            CType::int(),
            Span::new(0, 5),
        );
        let mut cache = FactsCache::for_arena(&arena);
        let facts = cache.facts(&arena, assign);
        assert!(facts.has_side_effects);
        assert!(facts.captures_locals);
    }

    #[test]
    fn opaque_nodes_poison_every_axis() {
        let mut arena = ExprArena::new();
        let opaque = arena.alloc(Expr::Opaque, CType::int(), Span::new(0, 3));
        let mut cache = FactsCache::for_arena(&arena);
        let facts = cache.facts(&arena, opaque);
        assert!(!facts.in_subset);
        assert!(facts.has_side_effects);
        assert!(facts.captures_locals);
    }

    #[test]
    fn token_counting_matches_whole_identifiers_only() {
        assert_eq!(count_token_occurrences("(x = x + 1)", "x"), 2);
        assert_eq!(count_token_occurrences("(xx + x_1)", "x"), 0);
        assert_eq!(count_token_occurrences("(x)", "x"), 1);
    }

    #[test]
    fn identity_bodies_allow_outer_parens() {
        assert!(is_identity_body("(x)", "x"));
        assert!(is_identity_body("  (( x ))  ", "x"));
        assert!(!is_identity_body("(x + 1)", "x"));
        assert!(!is_identity_body("(y)", "x"));
    }

    #[test]
    fn semantic_rejections_recurse_but_structural_do_not() {
        assert!(RejectionReason::HasSideEffects.recurses_into_children());
        assert!(RejectionReason::MultiplyDefinedMacro.recurses_into_children());
        assert!(!RejectionReason::AmbiguousExpansion.recurses_into_children());
        assert!(!RejectionReason::ContainsNestedInvocation.recurses_into_children());
    }
}
