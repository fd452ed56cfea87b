//! Expansion forest: reconstructing macro invocation nesting.
//!
//! The preprocessor reports expansions as a flat event stream. This module
//! rebuilds the nesting structure: which invocations contain which, which
//! macro names begin at a given position, and which syntax-tree nodes each
//! expansion produced. Only the roots of the resulting forest are ever
//! offered for transformation; nested invocations wait for a later pass of
//! the fixpoint loop.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::syntax::{ExprArena, ExprId, Span};

// ============================================================================
// PREPROCESSOR EVENTS
// ============================================================================

/// Object-like vs function-like, with formal parameter names for the latter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MacroKind {
    ObjectLike,
    FunctionLike { params: Vec<String> },
}

impl MacroKind {
    pub fn is_function_like(&self) -> bool {
        matches!(self, MacroKind::FunctionLike { .. })
    }

    pub fn param_count(&self) -> usize {
        match self {
            MacroKind::ObjectLike => 0,
            MacroKind::FunctionLike { params } => params.len(),
        }
    }
}

/// One `#define` directive as reported by the preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroRecord {
    pub name: String,
    pub kind: MacroKind,
    /// The macro's replacement text, as written.
    pub body: String,
    /// Span of the whole directive.
    pub span: Span,
    /// Position just past the end of the directive; synthesized definitions
    /// are inserted here so they are visible everywhere the macro was.
    pub insertion_point: usize,
    /// Whether the directive lives in a standard/system header. Such macros
    /// are excluded from transformation unless configuration opts in.
    pub defined_in_std_header: bool,
}

/// One argument of a function-like expansion, as spelled at the call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentEvent {
    /// Formal parameter name this argument binds.
    pub name: String,
    /// The argument's source spelling, unmodified.
    pub spelling: String,
    pub span: Span,
}

/// One macro expansion as reported by the preprocessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionEvent {
    pub name: String,
    /// Full source range of the invocation, from the macro name through the
    /// closing parenthesis of its argument list (if any).
    pub span: Span,
    pub args: Vec<ArgumentEvent>,
}

// ============================================================================
// MACRO TABLE
// ============================================================================

/// All macro definitions of one translation unit, with multiply-defined
/// tracking. A later definition overwrites the record; that is fine because
/// multiply-defined macros are never transformed.
#[derive(Debug, Default)]
pub struct MacroTable {
    records: HashMap<String, MacroRecord>,
    multiply_defined: HashSet<String>,
}

impl MacroTable {
    pub fn from_events(defs: &[MacroRecord]) -> Self {
        let mut table = MacroTable::default();
        for def in defs {
            if table.records.contains_key(&def.name) {
                table.multiply_defined.insert(def.name.clone());
            }
            table.records.insert(def.name.clone(), def.clone());
        }
        table
    }

    pub fn lookup(&self, name: &str) -> Option<&MacroRecord> {
        self.records.get(name)
    }

    pub fn is_multiply_defined(&self, name: &str) -> bool {
        self.multiply_defined.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn multiply_defined_names(&self) -> impl Iterator<Item = &String> {
        self.multiply_defined.iter()
    }
}

// ============================================================================
// EXPANSION NODES AND FOREST
// ============================================================================

/// Index of an expansion node within its forest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpansionId(pub usize);

/// One argument of a concrete invocation, resolved against the syntax tree.
#[derive(Debug, Clone)]
pub struct ExpansionArg {
    pub name: String,
    pub spelling: String,
    /// Source range of the argument text as spelled at the call site.
    pub span: Span,
    /// Expression nodes attributed to the argument. May be plural when the
    /// macro body mentions the parameter more than once.
    pub nodes: Vec<ExprId>,
    /// The nested invocation inside the argument text, if any.
    pub nested: Option<ExpansionId>,
}

/// One concrete invocation of a macro at a source location. Immutable once
/// the forest is built; owned by the forest for the duration of one pass.
#[derive(Debug, Clone)]
pub struct MacroExpansionNode {
    pub name: String,
    pub span: Span,
    /// Syntax-tree expression nodes the substitution ultimately produced.
    /// Normally exactly one; more signals ambiguity, zero a non-expression
    /// context.
    pub nodes: Vec<ExprId>,
    pub args: Vec<ExpansionArg>,
    /// Another expansion starts inside this one.
    pub has_nested: bool,
    /// This expansion starts inside another one.
    pub is_nested: bool,
    /// The smallest expansion range strictly containing this one.
    pub parent: Option<ExpansionId>,
}

/// The set of expansion nodes for one translation unit.
#[derive(Debug, Default)]
pub struct MacroForest {
    nodes: Vec<MacroExpansionNode>,
    /// Expansion start position -> names of all macros starting there.
    names_at_start: HashMap<usize, Vec<String>>,
    /// Macro name -> all of its expansion ranges.
    ranges_by_name: HashMap<String, Vec<Span>>,
}

impl MacroForest {
    /// Builds the forest from the raw event stream, attributing expression
    /// nodes by exact span match against the arena.
    pub fn build(events: &[ExpansionEvent], arena: &ExprArena) -> Self {
        let mut forest = MacroForest::default();

        // First sweep: record every expansion and the two indexes.
        for event in events {
            forest
                .names_at_start
                .entry(event.span.start)
                .or_default()
                .push(event.name.clone());
            forest
                .ranges_by_name
                .entry(event.name.clone())
                .or_default()
                .push(event.span);

            let args = event
                .args
                .iter()
                .map(|arg| ExpansionArg {
                    name: arg.name.clone(),
                    spelling: arg.spelling.clone(),
                    span: arg.span,
                    nodes: arena.nodes_at(arg.span),
                    nested: None,
                })
                .collect();

            forest.nodes.push(MacroExpansionNode {
                name: event.name.clone(),
                span: event.span,
                nodes: arena.nodes_at(event.span),
                args,
                has_nested: false,
                is_nested: false,
                parent: None,
            });
        }

        forest.link_parents();
        forest.link_nested_args(events);
        forest
    }

    /// Fixes up containment: each node's parent is the minimal strictly
    /// enclosing range. Partial overlap cannot occur, so "minimal by length"
    /// is well defined.
    fn link_parents(&mut self) {
        let spans: Vec<Span> = self.nodes.iter().map(|n| n.span).collect();
        for (i, span) in spans.iter().enumerate() {
            let mut parent: Option<usize> = None;
            for (j, other) in spans.iter().enumerate() {
                if i == j || !other.strictly_contains(*span) {
                    continue;
                }
                match parent {
                    Some(p) if spans[p].len() <= other.len() => {}
                    _ => parent = Some(j),
                }
            }
            if let Some(p) = parent {
                debug!(
                    inner = %self.nodes[i].name,
                    outer = %self.nodes[p].name,
                    "expansion nests inside another expansion"
                );
                self.nodes[i].is_nested = true;
                self.nodes[i].parent = Some(ExpansionId(p));
                self.nodes[p].has_nested = true;
            }
        }
    }

    /// Points each argument at the nested invocation inside its text, if any.
    fn link_nested_args(&mut self, events: &[ExpansionEvent]) {
        let spans: Vec<Span> = self.nodes.iter().map(|n| n.span).collect();
        for (i, event) in events.iter().enumerate() {
            for (arg_index, arg) in event.args.iter().enumerate() {
                let nested = spans
                    .iter()
                    .enumerate()
                    .filter(|(j, s)| *j != i && arg.span.contains(**s))
                    .min_by_key(|(_, s)| s.start);
                if let Some((j, _)) = nested {
                    self.nodes[i].args[arg_index].nested = Some(ExpansionId(j));
                }
            }
        }
    }

    pub fn nodes(&self) -> &[MacroExpansionNode] {
        &self.nodes
    }

    pub fn get(&self, id: ExpansionId) -> &MacroExpansionNode {
        &self.nodes[id.0]
    }

    /// Expansions with no enclosing expansion; the only transformation
    /// candidates within one pass.
    pub fn roots(&self) -> impl Iterator<Item = ExpansionId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| ExpansionId(i))
    }

    /// Names of all macros whose expansion begins at the given position.
    /// More than one means the invocation cannot be disambiguated.
    pub fn names_starting_at(&self, pos: usize) -> &[String] {
        self.names_at_start
            .get(&pos)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All expansion ranges recorded for a macro name.
    pub fn ranges_of(&self, name: &str) -> &[Span] {
        self.ranges_by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The expansion node covering exactly the given range under the given
    /// name, if one exists.
    pub fn node_at(&self, name: &str, span: Span) -> Option<ExpansionId> {
        self.nodes
            .iter()
            .position(|n| n.name == name && n.span == span)
            .map(ExpansionId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ExprArena;

    fn event(name: &str, start: usize, end: usize) -> ExpansionEvent {
        ExpansionEvent {
            name: name.to_string(),
            span: Span::new(start, end),
            args: Vec::new(),
        }
    }

    #[test]
    fn roots_have_no_strict_superset() {
        let arena = ExprArena::new();
        let events = vec![event("A", 0, 30), event("B", 5, 10), event("C", 40, 50)];
        let forest = MacroForest::build(&events, &arena);
        let roots: Vec<_> = forest.roots().collect();
        assert_eq!(roots, vec![ExpansionId(0), ExpansionId(2)]);
        assert!(forest.get(ExpansionId(0)).has_nested);
        assert!(forest.get(ExpansionId(1)).is_nested);
        assert_eq!(forest.get(ExpansionId(1)).parent, Some(ExpansionId(0)));
    }

    #[test]
    fn parent_is_minimal_enclosing_range() {
        let arena = ExprArena::new();
        // C nests in B nests in A; C's parent must be B, not A.
        let events = vec![event("A", 0, 100), event("B", 10, 60), event("C", 20, 30)];
        let forest = MacroForest::build(&events, &arena);
        assert_eq!(forest.get(ExpansionId(2)).parent, Some(ExpansionId(1)));
        assert_eq!(forest.get(ExpansionId(1)).parent, Some(ExpansionId(0)));
        assert_eq!(forest.get(ExpansionId(0)).parent, None);
    }

    #[test]
    fn event_order_does_not_change_parents() {
        let arena = ExprArena::new();
        let events = vec![event("C", 20, 30), event("A", 0, 100), event("B", 10, 60)];
        let forest = MacroForest::build(&events, &arena);
        let c = forest.node_at("C", Span::new(20, 30)).unwrap();
        let b = forest.node_at("B", Span::new(10, 60)).unwrap();
        assert_eq!(forest.get(c).parent, Some(b));
    }

    #[test]
    fn two_names_at_one_start_are_both_indexed() {
        let arena = ExprArena::new();
        let events = vec![event("X", 5, 12), event("Y", 5, 12)];
        let forest = MacroForest::build(&events, &arena);
        assert_eq!(forest.names_starting_at(5), ["X", "Y"]);
    }

    #[test]
    fn macro_table_tracks_redefinitions() {
        let def = |name: &str| MacroRecord {
            name: name.to_string(),
            kind: MacroKind::ObjectLike,
            body: "1".to_string(),
            span: Span::default(),
            insertion_point: 0,
            defined_in_std_header: false,
        };
        let table = MacroTable::from_events(&[def("ONE"), def("TWO"), def("ONE")]);
        assert!(table.is_multiply_defined("ONE"));
        assert!(!table.is_multiply_defined("TWO"));
    }
}
