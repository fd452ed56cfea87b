//! The transformer pass and the fixpoint driver.
//!
//! One pass walks every function body of a translation unit, offers each root
//! expansion to the analyzer, synthesizes definitions for the eligible ones,
//! and applies all resulting edits in a single batch. Nested invocations are
//! untouched within a pass; driving the rewritten source through the frontend
//! again surfaces them as roots, so repeated passes converge on a fixpoint.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::analysis::{Analyzer, Eligibility, EligibleExpansion, RejectionReason};
use crate::errors::{
    to_source_span, unspanned, ErrorKind, ErrorReporting, PhaseContext, UnmacroError,
};
use crate::forest::{ExpansionId, MacroForest, MacroKind, MacroTable};
use crate::rewrite::EditScript;
use crate::synth::{IdentifierUniverse, TransformedDefinition};
use crate::syntax::{Expr, ExprId, Span, Stmt, TranslationUnit};

// ============================================================================
// SETTINGS AND OUTCOMES
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct TransformSettings {
    pub overwrite_files: bool,
    pub verbose: bool,
    /// Transform macros defined in standard headers too.
    pub transform_std_header_macros: bool,
}

/// One definition the pass emitted, with enough context for deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedDefinition {
    pub definition: TransformedDefinition,
    /// File the definition was inserted into.
    pub file: String,
    /// Offset of the insertion point in the pre-edit buffer; orders survivor
    /// selection during deduplication.
    pub insertion_offset: usize,
    /// The exact inserted text, marker included.
    pub text: String,
    /// Original range of the rewritten call site.
    pub call_site: Span,
}

/// Why one expansion was left untransformed.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectionDiagnostic {
    pub macro_name: String,
    pub span: Span,
    /// All applicable reasons; the first is primary.
    pub reasons: Vec<RejectionReason>,
}

#[derive(Debug)]
pub struct PassOutcome {
    pub rewritten: String,
    pub definitions: Vec<EmittedDefinition>,
    pub rejections: Vec<RejectionDiagnostic>,
    /// Edits withheld because their ranges could not be honored. Each aborts
    /// only its own expansion.
    pub edit_failures: Vec<UnmacroError>,
    pub transformations: usize,
}

// ============================================================================
// TRANSFORMER PASS
// ============================================================================

pub struct TransformerPass {
    settings: TransformSettings,
}

impl TransformerPass {
    pub fn new(settings: TransformSettings) -> Self {
        TransformerPass { settings }
    }

    /// Runs one full pass over a translation unit.
    pub fn run(&self, unit: &TranslationUnit) -> Result<PassOutcome, UnmacroError> {
        let table = MacroTable::from_events(&unit.macro_defs);
        let forest = MacroForest::build(&unit.expansions, &unit.arena);
        let universe = IdentifierUniverse::collect(unit, &table);
        let ctx = PhaseContext::new(unit.source_context(), "transform");
        let analyzer = Analyzer::new(
            &unit.arena,
            &forest,
            &table,
            self.settings.transform_std_header_macros,
            &ctx,
        );

        let mut root_of: HashMap<ExprId, ExpansionId> = HashMap::new();
        for root in forest.roots() {
            for node in &forest.get(root).nodes {
                root_of.insert(*node, root);
            }
        }

        let mut state = PassState {
            unit,
            table: &table,
            forest: &forest,
            analyzer,
            universe,
            root_of,
            visited: HashSet::new(),
            consumed: Vec::new(),
            script: EditScript::new(),
            definitions: Vec::new(),
            rejections: Vec::new(),
            edit_failures: Vec::new(),
            transformations: 0,
            ctx: &ctx,
        };

        for function in &unit.functions {
            debug!(function = %function.name, "walking function body");
            state.walk_stmt(&function.body)?;
        }

        // Expansions the statement walk never reached sit outside any
        // expression context we can rewrite.
        let unvisited: Vec<ExpansionId> = forest
            .roots()
            .filter(|root| !state.visited.contains(root))
            .collect();
        for root in unvisited {
            let node = forest.get(root);
            state.rejections.push(RejectionDiagnostic {
                macro_name: node.name.clone(),
                span: node.span,
                reasons: vec![RejectionReason::NotExpressionContext],
            });
        }

        let rewritten = state.script.apply(&unit.source, state.ctx)?;
        info!(
            file = %unit.file,
            transformations = state.transformations,
            rejections = state.rejections.len(),
            "pass complete"
        );
        Ok(PassOutcome {
            rewritten,
            definitions: state.definitions,
            rejections: state.rejections,
            edit_failures: state.edit_failures,
            transformations: state.transformations,
        })
    }
}

/// Working state of one pass, borrowing the unit and the structures built
/// from it.
struct PassState<'a> {
    unit: &'a TranslationUnit,
    table: &'a MacroTable,
    forest: &'a MacroForest,
    analyzer: Analyzer<'a>,
    universe: IdentifierUniverse,
    root_of: HashMap<ExprId, ExpansionId>,
    visited: HashSet<ExpansionId>,
    consumed: Vec<Span>,
    script: EditScript,
    definitions: Vec<EmittedDefinition>,
    rejections: Vec<RejectionDiagnostic>,
    edit_failures: Vec<UnmacroError>,
    transformations: usize,
    ctx: &'a PhaseContext,
}

impl PassState<'_> {
    fn walk_stmt(&mut self, stmt: &Stmt) -> Result<(), UnmacroError> {
        match stmt {
            Stmt::Expr(expr) => self.transform_expr(*expr),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.transform_expr(*cond)?;
                self.walk_stmt(then_branch)?;
                if let Some(els) = else_branch {
                    self.walk_stmt(els)?;
                }
                Ok(())
            }
            Stmt::While { cond, body } => {
                self.transform_expr(*cond)?;
                self.walk_stmt(body)
            }
            Stmt::Block(stmts) => {
                for stmt in stmts {
                    self.walk_stmt(stmt)?;
                }
                Ok(())
            }
        }
    }

    /// Offers the expression to the transformer if it is the top of a root
    /// expansion; otherwise, or after a recoverable rejection, descends into
    /// its sub-expressions looking for smaller transformable expansions.
    fn transform_expr(&mut self, id: ExprId) -> Result<(), UnmacroError> {
        if let Some(&expansion) = self.root_of.get(&id) {
            if self.visited.insert(expansion) {
                match self.analyzer.analyze(expansion)? {
                    Eligibility::Eligible(eligible) => {
                        self.emit(expansion, eligible)?;
                        // The whole range is replaced; nothing inside
                        // survives to transform.
                        return Ok(());
                    }
                    Eligibility::Rejected(reasons) => {
                        let node = self.forest.get(expansion);
                        debug!(
                            name = %node.name,
                            reason = %reasons[0],
                            "expansion rejected"
                        );
                        let recurse = reasons.iter().any(RejectionReason::recurses_into_children);
                        self.rejections.push(RejectionDiagnostic {
                            macro_name: node.name.clone(),
                            span: node.span,
                            reasons,
                        });
                        if !recurse {
                            return Ok(());
                        }
                    }
                }
            }
        }
        self.descend(id)
    }

    fn descend(&mut self, id: ExprId) -> Result<(), UnmacroError> {
        match self.unit.arena.get(id).expr.clone() {
            Expr::Paren(inner) => self.transform_expr(inner),
            Expr::Unary { operand, .. } => self.transform_expr(operand),
            Expr::Binary { lhs, rhs, .. } => {
                self.transform_expr(lhs)?;
                self.transform_expr(rhs)
            }
            Expr::Assign { value, .. } => self.transform_expr(value),
            Expr::Call { args, .. } => {
                for arg in args {
                    self.transform_expr(arg)?;
                }
                Ok(())
            }
            Expr::Num(_) | Expr::Var(_) | Expr::Opaque => Ok(()),
        }
    }

    /// Synthesizes the definition and submits both edits for one eligible
    /// expansion. Range conflicts withhold the expansion's edits without
    /// failing the pass.
    fn emit(
        &mut self,
        expansion: ExpansionId,
        eligible: EligibleExpansion,
    ) -> Result<(), UnmacroError> {
        let node = self.forest.get(expansion);
        let record = match self.table.lookup(&node.name) {
            Some(record) => record,
            None => {
                return Err(self.ctx.internal_error(
                    &format!("no definition recorded for macro '{}'", node.name),
                    to_source_span(node.span),
                ))
            }
        };

        let mut definition = TransformedDefinition::new(
            record,
            eligible.ty,
            eligible.arg_types,
            expansion,
            self.ctx,
            to_source_span(node.span),
        )?;
        if definition.has_non_builtin_types()
            || definition.has_array_types()
            || definition.has_function_types()
        {
            self.rejections.push(RejectionDiagnostic {
                macro_name: node.name.clone(),
                span: node.span,
                reasons: vec![RejectionReason::UnsupportedType],
            });
            return Ok(());
        }
        definition.assign_name(&mut self.universe);

        let call_text = match &record.kind {
            MacroKind::ObjectLike => definition.emitted_name.clone(),
            MacroKind::FunctionLike { params } if params.is_empty() => {
                format!("{}()", definition.emitted_name)
            }
            MacroKind::FunctionLike { .. } => {
                format!("{}({})", definition.emitted_name, node.args[0].spelling)
            }
        };

        let span = node.span;
        let source_len = self.unit.source.len();
        let locatable = span.end <= source_len && record.insertion_point <= source_len;
        let free = !self
            .consumed
            .iter()
            .any(|prior| span.start < prior.end && prior.start < span.end);
        if !locatable || !free {
            let kind = if locatable {
                ErrorKind::ConsumedRange {
                    start: span.start,
                    end: span.end,
                }
            } else {
                ErrorKind::UnlocatableRange {
                    start: span.start,
                    end: span.end,
                }
            };
            warn!(name = %node.name, "withholding edits for one expansion");
            self.edit_failures
                .push(self.ctx.report(kind, to_source_span(span)));
            return Ok(());
        }
        self.consumed.push(span);

        let text = definition.definition_text(self.ctx, to_source_span(span))?;
        self.script.insert_after(record.insertion_point, &text);
        self.script.replace(span, &call_text);
        info!(
            macro_name = %node.name,
            emitted = %definition.emitted_name,
            "transformed expansion"
        );
        self.definitions.push(EmittedDefinition {
            definition,
            file: self.unit.file.clone(),
            insertion_offset: record.insertion_point,
            text,
            call_site: span,
        });
        self.transformations += 1;
        Ok(())
    }
}

// ============================================================================
// FIXPOINT DRIVER
// ============================================================================

/// Produces translation-unit facts from source text. The real frontend is an
/// external parser invocation; tests drive the loop with an in-memory one.
pub trait Frontend {
    fn parse(&mut self, source: &str) -> Result<TranslationUnit, UnmacroError>;
}

/// Divergence guard for the fixpoint loop. Each pass strictly reduces the
/// number of untransformed eligible expansions, so a well-behaved frontend
/// converges far earlier.
pub const MAX_FIXPOINT_PASSES: usize = 64;

#[derive(Debug)]
pub struct FixpointOutcome {
    pub source: String,
    /// Passes run, the final zero-transformation pass included.
    pub passes: usize,
    pub definitions: Vec<EmittedDefinition>,
    /// Rejections reported by the final pass.
    pub rejections: Vec<RejectionDiagnostic>,
}

/// Re-parses and re-transforms until a pass performs zero transformations.
pub fn drive_to_fixpoint(
    frontend: &mut dyn Frontend,
    source: &str,
    settings: TransformSettings,
) -> Result<FixpointOutcome, UnmacroError> {
    let pass = TransformerPass::new(settings);
    let mut current = source.to_string();
    let mut definitions = Vec::new();
    for passes in 1..=MAX_FIXPOINT_PASSES {
        let unit = frontend.parse(&current)?;
        let outcome = pass.run(&unit)?;
        definitions.extend(outcome.definitions);
        if outcome.transformations == 0 {
            debug!(passes, "fixpoint reached");
            return Ok(FixpointOutcome {
                source: current,
                passes,
                definitions,
                rejections: outcome.rejections,
            });
        }
        current = outcome.rewritten;
    }
    let ctx = PhaseContext::new(
        crate::errors::SourceContext::from_file("driver", source),
        "driver",
    );
    Err(ctx.report(
        ErrorKind::FixpointDiverged {
            passes: MAX_FIXPOINT_PASSES,
        },
        unspanned(),
    ))
}
