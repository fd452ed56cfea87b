//! Text edits over one source buffer.
//!
//! The transformer never mutates source directly; it submits edits to an
//! `EditScript`, which validates every range against the buffer and against
//! ranges consumed by earlier edits, then applies everything back-to-front so
//! earlier offsets stay valid throughout.

use tracing::debug;

use crate::errors::{to_source_span, ErrorKind, ErrorReporting, UnmacroError};
use crate::syntax::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Replace the text covered by `span` with `text`.
    Replace { span: Span, text: String },
    /// Insert `text` immediately after position `pos`.
    InsertAfter { pos: usize, text: String },
}

impl Edit {
    fn span(&self) -> Span {
        match self {
            Edit::Replace { span, .. } => *span,
            Edit::InsertAfter { pos, .. } => Span::new(*pos, *pos),
        }
    }
}

/// An ordered batch of edits against one buffer. Submission order is
/// remembered only for diagnostics; application is positional.
#[derive(Debug, Default)]
pub struct EditScript {
    edits: Vec<Edit>,
}

impl EditScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.edits.push(Edit::Replace {
            span,
            text: text.into(),
        });
    }

    pub fn insert_after(&mut self, pos: usize, text: impl Into<String>) {
        self.edits.push(Edit::InsertAfter {
            pos,
            text: text.into(),
        });
    }

    pub fn extend(&mut self, other: EditScript) {
        self.edits.extend(other.edits);
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Validates and applies the whole batch. Any unlocatable range or
    /// overlap with an already-consumed range fails the entire apply;
    /// partial application never happens.
    pub fn apply(
        &self,
        source: &str,
        ctx: &dyn ErrorReporting,
    ) -> Result<String, UnmacroError> {
        let mut consumed: Vec<Span> = Vec::new();
        for edit in &self.edits {
            let span = edit.span();
            if span.start > span.end || span.end > source.len() {
                return Err(ctx.report(
                    ErrorKind::UnlocatableRange {
                        start: span.start,
                        end: span.end,
                    },
                    to_source_span(span),
                ));
            }
            // Replacements may not touch text a prior replacement consumed.
            // Pure insertions at a boundary are fine.
            let collides = consumed.iter().any(|prior| {
                span.start < prior.end && prior.start < span.end
            });
            if collides {
                return Err(ctx.report(
                    ErrorKind::ConsumedRange {
                        start: span.start,
                        end: span.end,
                    },
                    to_source_span(span),
                ));
            }
            if !span.is_empty() {
                consumed.push(span);
            }
        }

        let mut ordered: Vec<&Edit> = self.edits.iter().collect();
        // Applied back-to-front, so at equal start positions a replacement
        // must sort after an insertion: the replacement then consumes the
        // original text and the insertion lands before it, regardless of
        // submission order. Stable sort keeps submission order otherwise.
        ordered.sort_by_key(|e| (e.span().start, matches!(e, Edit::Replace { .. }) as u8));

        let mut out = source.to_string();
        for edit in ordered.iter().rev() {
            match edit {
                Edit::Replace { span, text } => {
                    debug!(start = span.start, end = span.end, "applying replacement");
                    out.replace_range(span.start..span.end, text);
                }
                Edit::InsertAfter { pos, text } => {
                    debug!(pos, "applying insertion");
                    out.insert_str(*pos, text);
                }
            }
        }
        Ok(out)
    }
}
