//! Unified error handling for unmacro.
//!
//! Rejection outcomes (a macro left untransformed for a hygiene reason) are
//! ordinary data and never travel through this module; see
//! `analysis::Eligibility`. Errors here are real failures: unreadable facts
//! files, edits the rewriter cannot apply, internal invariant violations.

use std::fmt;
use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

use crate::syntax::Span;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source text plus a display name, attached to errors so miette can render
/// labeled snippets.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content.
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable.
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "fallback".to_string(),
            content: format!("// {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("default context")
    }
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// The single error type: what went wrong, where, and how to help.
#[derive(Debug)]
pub struct UnmacroError {
    pub kind: ErrorKind,
    pub source_info: SourceInfo,
    pub diagnostic_info: DiagnosticInfo,
}

/// All failure modes as a clean enum.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ErrorKind {
    // Input errors - loading and decoding translation-unit facts
    #[error("cannot read '{path}': {detail}")]
    Io { path: String, detail: String },
    #[error("malformed facts file: {detail}")]
    MalformedFacts { detail: String },

    // Rewrite failures - edits the rewriter refuses
    #[error("edit range {start}..{end} cannot be located in the source buffer")]
    UnlocatableRange { start: usize, end: usize },
    #[error("edit range {start}..{end} was already consumed by a prior edit")]
    ConsumedRange { start: usize, end: usize },

    // Synthesis failures - invariant violations inside one expansion
    #[error("macro '{macro_name}' has no emitted name yet")]
    UnassignedName { macro_name: String },
    #[error("macro '{macro_name}' with {params} parameters reached the synthesizer")]
    NonUnaryMacroInSynthesis { macro_name: String, params: usize },

    // Driver failures
    #[error("transformation did not reach a fixpoint after {passes} passes")]
    FixpointDiverged { passes: usize },

    // Configuration errors - fatal at startup
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Context-specific source information.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Rewrite,
    Synthesis,
    Driver,
    Config,
    Internal,
}

impl ErrorKind {
    /// Error category, used by tests and by the CLI exit policy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Io { .. } | Self::MalformedFacts { .. } => ErrorCategory::Input,
            Self::UnlocatableRange { .. } | Self::ConsumedRange { .. } => ErrorCategory::Rewrite,
            Self::UnassignedName { .. } | Self::NonUnaryMacroInSynthesis { .. } => {
                ErrorCategory::Synthesis
            }
            Self::FixpointDiverged { .. } => ErrorCategory::Driver,
            Self::Config { .. } => ErrorCategory::Config,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::MalformedFacts { .. } => "malformed_facts",
            Self::UnlocatableRange { .. } => "unlocatable_range",
            Self::ConsumedRange { .. } => "consumed_range",
            Self::UnassignedName { .. } => "unassigned_name",
            Self::NonUnaryMacroInSynthesis { .. } => "non_unary_in_synthesis",
            Self::FixpointDiverged { .. } => "fixpoint_diverged",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
        }
    }
}

impl std::error::Error for UnmacroError {}

impl fmt::Display for UnmacroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Diagnostic for UnmacroError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.kind.to_string()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

// ============================================================================
// ERROR CREATION
// ============================================================================

/// Context-aware error creation: each pipeline phase knows how to attach the
/// right source and diagnostic code to an `ErrorKind`.
pub trait ErrorReporting {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> UnmacroError;

    fn internal_error(&self, message: &str, span: SourceSpan) -> UnmacroError {
        self.report(
            ErrorKind::Internal {
                message: message.to_string(),
            },
            span,
        )
    }
}

/// General-purpose reporting context carrying a source buffer and phase name.
pub struct PhaseContext {
    pub source: SourceContext,
    pub phase: String,
}

impl PhaseContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }
}

impl ErrorReporting for PhaseContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> UnmacroError {
        let error_code = format!("unmacro::{}::{}", self.phase, kind.code_suffix());
        UnmacroError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

/// Placeholder span for errors not tied to a source location, such as I/O
/// failures. Makes the intent of an empty span explicit and searchable.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

/// Converts a syntax `Span` to a miette `SourceSpan`.
pub fn to_source_span(span: Span) -> SourceSpan {
    SourceSpan::from(span.start..span.end)
}

/// Prints an UnmacroError with full miette diagnostics.
pub fn print_error(error: UnmacroError) {
    use miette::Report;
    let report = Report::new(error);
    eprintln!("{report:?}");
}
