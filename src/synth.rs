//! Definition synthesis: turning an eligible expansion into C text.
//!
//! Object-like macros reify as `const` file-scope variables, unary
//! function-like macros as global functions. Emitted names are drawn from an
//! explicit identifier universe so they can never collide with anything the
//! program already declares, nor with each other.

use std::collections::HashSet;

use miette::SourceSpan;
use tracing::debug;

use crate::annotations::annotation_for;
use crate::errors::{ErrorKind, ErrorReporting, UnmacroError};
use crate::forest::{ExpansionId, MacroKind, MacroRecord, MacroTable};
use crate::syntax::{CType, TranslationUnit};

// ============================================================================
// IDENTIFIER UNIVERSE
// ============================================================================

/// Every identifier already taken in the translation unit: declared symbols,
/// macro names, and names this pass has emitted so far. An explicit value,
/// rebuilt per pass, never process state.
#[derive(Debug, Default)]
pub struct IdentifierUniverse {
    taken: HashSet<String>,
}

impl IdentifierUniverse {
    pub fn collect(unit: &TranslationUnit, table: &MacroTable) -> Self {
        let mut universe = IdentifierUniverse::default();
        for symbol in &unit.symbols {
            universe.taken.insert(symbol.name.clone());
        }
        for function in &unit.functions {
            universe.taken.insert(function.name.clone());
        }
        for name in table.names() {
            universe.taken.insert(name.clone());
        }
        universe
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Accepts the candidate if free, otherwise appends the first numeric
    /// suffix that makes it unique. The accepted name is recorded, so the
    /// result is collision-free across repeated reservations.
    pub fn reserve(&mut self, candidate: &str) -> String {
        if self.taken.insert(candidate.to_string()) {
            return candidate.to_string();
        }
        let mut n = 0usize;
        loop {
            let name = format!("{}{}", candidate, n);
            if self.taken.insert(name.clone()) {
                return name;
            }
            n += 1;
        }
    }

    pub fn reserve_variable(&mut self, macro_name: &str) -> String {
        self.reserve(&format!("{}_var", macro_name))
    }

    pub fn reserve_function(&mut self, macro_name: &str) -> String {
        self.reserve(&format!("{}_function", macro_name))
    }
}

// ============================================================================
// TRANSFORMED DEFINITION
// ============================================================================

/// A synthesized replacement definition for one eligible expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedDefinition {
    pub macro_name: String,
    /// Object-like macros become variables; function-like become functions.
    pub is_variable: bool,
    /// Variable type or function return type, canonical.
    pub ty: CType,
    /// Canonical argument types, in formal-parameter order.
    pub arg_types: Vec<CType>,
    /// Formal parameter names from the macro definition.
    pub params: Vec<String>,
    /// The macro's replacement text, used verbatim as initializer or return
    /// expression.
    pub body: String,
    /// Empty until `assign_name` runs.
    pub emitted_name: String,
    /// The expansion this definition was synthesized for.
    pub expansion: ExpansionId,
}

impl TransformedDefinition {
    pub fn new(
        record: &MacroRecord,
        ty: CType,
        arg_types: Vec<CType>,
        expansion: ExpansionId,
        ctx: &dyn ErrorReporting,
        span: SourceSpan,
    ) -> Result<Self, UnmacroError> {
        let params = match &record.kind {
            MacroKind::ObjectLike => Vec::new(),
            MacroKind::FunctionLike { params } => params.clone(),
        };
        // The analyzer filters these out; reaching here with more than one
        // parameter is an internal defect.
        if params.len() > 1 {
            return Err(ctx.report(
                ErrorKind::NonUnaryMacroInSynthesis {
                    macro_name: record.name.clone(),
                    params: params.len(),
                },
                span,
            ));
        }
        Ok(TransformedDefinition {
            macro_name: record.name.clone(),
            is_variable: !record.kind.is_function_like(),
            ty,
            arg_types,
            params,
            body: record.body.trim().to_string(),
            emitted_name: String::new(),
            expansion,
        })
    }

    pub fn assign_name(&mut self, universe: &mut IdentifierUniverse) {
        self.emitted_name = if self.is_variable {
            universe.reserve_variable(&self.macro_name)
        } else {
            universe.reserve_function(&self.macro_name)
        };
        debug!(macro_name = %self.macro_name, emitted = %self.emitted_name, "assigned name");
    }

    /// Declaration-signature text. With `can_be_anonymous` the name slot may
    /// be empty (used for dedup keys); otherwise an unassigned name is an
    /// error.
    pub fn signature(
        &self,
        can_be_anonymous: bool,
        ctx: &dyn ErrorReporting,
        span: SourceSpan,
    ) -> Result<String, UnmacroError> {
        if self.emitted_name.is_empty() && !can_be_anonymous {
            return Err(ctx.report(
                ErrorKind::UnassignedName {
                    macro_name: self.macro_name.clone(),
                },
                span,
            ));
        }
        Ok(self.render_signature(&self.emitted_name))
    }

    /// Name-independent signature text, the middle component of a dedup key.
    pub fn type_signature(&self) -> String {
        self.render_signature("")
    }

    fn render_signature(&self, name: &str) -> String {
        if self.is_variable {
            return format!("{} {}", self.ty, name).trim_end().to_string();
        }
        let params: Vec<String> = self
            .arg_types
            .iter()
            .zip(self.params.iter().chain(std::iter::repeat(&String::new())))
            .map(|(ty, param)| format!("{} {}", ty, param).trim_end().to_string())
            .collect();
        format!("{} {}({})", self.ty, name, params.join(", "))
            .replace("  ", " ")
    }

    /// Full replacement text, marker comment included, ready for insertion
    /// after the macro's definition.
    pub fn definition_text(
        &self,
        ctx: &dyn ErrorReporting,
        span: SourceSpan,
    ) -> Result<String, UnmacroError> {
        let signature = self.signature(false, ctx, span)?;
        let text = if self.is_variable {
            format!(
                "\n{} const {} = {};",
                annotation_for(&self.macro_name),
                signature,
                self.body
            )
        } else {
            format!(
                "\n{} {} {{ return {}; }}",
                annotation_for(&self.macro_name),
                signature,
                self.body
            )
        };
        Ok(text)
    }

    fn all_types(&self) -> impl Iterator<Item = &CType> {
        std::iter::once(&self.ty).chain(self.arg_types.iter())
    }

    /// Any type outside the builtin scalars. Such definitions cannot be
    /// reified without declaration-ordering knowledge the tool lacks.
    pub fn has_non_builtin_types(&self) -> bool {
        self.all_types().any(|ty| !ty.is_builtin())
    }

    pub fn has_array_types(&self) -> bool {
        self.all_types().any(CType::is_array)
    }

    pub fn has_function_types(&self) -> bool {
        self.all_types().any(CType::is_function_like)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{unspanned, PhaseContext, SourceContext};
    use crate::syntax::Span;

    fn ctx() -> PhaseContext {
        PhaseContext::new(SourceContext::fallback("synth tests"), "synthesis")
    }

    fn object_macro(name: &str, body: &str) -> MacroRecord {
        MacroRecord {
            name: name.to_string(),
            kind: MacroKind::ObjectLike,
            body: body.to_string(),
            span: Span::default(),
            insertion_point: 0,
            defined_in_std_header: false,
        }
    }

    fn unary_macro(name: &str, param: &str, body: &str) -> MacroRecord {
        MacroRecord {
            name: name.to_string(),
            kind: MacroKind::FunctionLike {
                params: vec![param.to_string()],
            },
            body: body.to_string(),
            span: Span::default(),
            insertion_point: 0,
            defined_in_std_header: false,
        }
    }

    #[test]
    fn reserve_appends_suffixes_until_unique() {
        let mut universe = IdentifierUniverse::default();
        assert_eq!(universe.reserve("ONE_var"), "ONE_var");
        assert_eq!(universe.reserve("ONE_var"), "ONE_var0");
        assert_eq!(universe.reserve("ONE_var"), "ONE_var1");
    }

    #[test]
    fn variable_definition_text() {
        let ctx = ctx();
        let mut universe = IdentifierUniverse::default();
        let mut def = TransformedDefinition::new(
            &object_macro("ONE", "1"),
            CType::int(),
            Vec::new(),
            ExpansionId(0),
            &ctx,
            unspanned(),
        )
        .unwrap();
        def.assign_name(&mut universe);
        assert_eq!(
            def.definition_text(&ctx, unspanned()).unwrap(),
            "\n/* unmacro: ONE */ const int ONE_var = 1;"
        );
    }

    #[test]
    fn function_definition_text() {
        let ctx = ctx();
        let mut universe = IdentifierUniverse::default();
        let mut def = TransformedDefinition::new(
            &unary_macro("ID", "x", "(x)"),
            CType::int(),
            vec![CType::int()],
            ExpansionId(0),
            &ctx,
            unspanned(),
        )
        .unwrap();
        def.assign_name(&mut universe);
        assert_eq!(
            def.definition_text(&ctx, unspanned()).unwrap(),
            "\n/* unmacro: ID */ int ID_function(int x) { return (x); }"
        );
    }

    #[test]
    fn unassigned_name_is_an_error_unless_anonymous() {
        let ctx = ctx();
        let def = TransformedDefinition::new(
            &object_macro("ONE", "1"),
            CType::int(),
            Vec::new(),
            ExpansionId(0),
            &ctx,
            unspanned(),
        )
        .unwrap();
        assert!(def.signature(false, &ctx, unspanned()).is_err());
        assert_eq!(def.signature(true, &ctx, unspanned()).unwrap(), "int");
        assert_eq!(def.type_signature(), "int");
    }

    #[test]
    fn type_signature_is_name_independent() {
        let ctx = ctx();
        let mut universe = IdentifierUniverse::default();
        let mut a = TransformedDefinition::new(
            &unary_macro("ID", "x", "(x)"),
            CType::int(),
            vec![CType::int()],
            ExpansionId(0),
            &ctx,
            unspanned(),
        )
        .unwrap();
        let b = a.clone();
        a.assign_name(&mut universe);
        assert_eq!(a.type_signature(), b.type_signature());
        assert_eq!(a.type_signature(), "int (int x)");
    }

    #[test]
    fn binary_macro_is_rejected_in_synthesis() {
        let ctx = ctx();
        let record = MacroRecord {
            name: "MAX".to_string(),
            kind: MacroKind::FunctionLike {
                params: vec!["a".to_string(), "b".to_string()],
            },
            body: "((a) > (b) ? (a) : (b))".to_string(),
            span: Span::default(),
            insertion_point: 0,
            defined_in_std_header: false,
        };
        let result = TransformedDefinition::new(
            &record,
            CType::int(),
            vec![CType::int(), CType::int()],
            ExpansionId(0),
            &ctx,
            unspanned(),
        );
        assert!(result.is_err());
    }
}
