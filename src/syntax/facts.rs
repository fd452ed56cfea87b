//! Translation-unit facts: everything the frontend reports about one parse.
//!
//! A facts value is the complete input to one transformation pass: raw source
//! text, the expression arena with canonical types, function bodies, declared
//! symbols, and the preprocessor's macro definition and expansion event
//! streams. The CLI loads facts from JSON emitted by the frontend.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{unspanned, ErrorKind, ErrorReporting, PhaseContext, SourceContext, UnmacroError};
use crate::forest::{ExpansionEvent, MacroRecord};
use crate::syntax::{ExprArena, FunctionDef, Storage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
}

/// A variable or function declared anywhere in the program. Feeds the
/// identifier universe so synthesized names never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub storage: Storage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    /// Path of the C file these facts describe.
    pub file: String,
    /// The file's full source text; all spans index into this.
    pub source: String,
    pub arena: ExprArena,
    pub functions: Vec<FunctionDef>,
    pub symbols: Vec<Symbol>,
    /// Macro definition events, in directive order.
    pub macro_defs: Vec<MacroRecord>,
    /// Macro expansion events, in expansion order.
    pub expansions: Vec<ExpansionEvent>,
}

impl TranslationUnit {
    pub fn from_json(name: &str, json: &str) -> Result<Self, UnmacroError> {
        serde_json::from_str(json).map_err(|e| {
            let ctx = PhaseContext::new(SourceContext::from_file(name, json), "input");
            ctx.report(
                ErrorKind::MalformedFacts {
                    detail: e.to_string(),
                },
                unspanned(),
            )
        })
    }

    pub fn to_json(&self) -> Result<String, UnmacroError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            let ctx = PhaseContext::new(SourceContext::fallback(&self.file), "input");
            ctx.internal_error(&format!("facts serialization failed: {}", e), unspanned())
        })
    }

    pub fn source_context(&self) -> SourceContext {
        SourceContext::from_file(self.file.clone(), self.source.clone())
    }

    /// Every name the unit declares itself: symbols and function names.
    /// Deduplication consults this before repointing call sites into a unit.
    pub fn declared_names(&self) -> HashSet<String> {
        self.symbols
            .iter()
            .map(|s| s.name.clone())
            .chain(self.functions.iter().map(|f| f.name.clone()))
            .collect()
    }
}
