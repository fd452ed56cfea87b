//! unmacro: rewrites C preprocessor macro expansions into ordinary
//! definitions.
//!
//! An external frontend parses and preprocesses each translation unit and
//! hands over a facts value: the syntax tree with canonical types, declared
//! symbols, and the raw macro definition and expansion event streams. From
//! those this crate rebuilds the expansion nesting forest, decides per root
//! expansion whether a rewrite preserves the program's meaning, synthesizes
//! `const` variables and global functions for the eligible ones, edits the
//! source text, and finally deduplicates identical definitions across units.
//!
//! The pipeline, in module order:
//!
//! - [`syntax`]: the data model shared with the frontend
//! - [`forest`]: expansion events to nesting forest
//! - [`analysis`]: memoized expression facts and eligibility decisions
//! - [`synth`]: identifier universe and definition text
//! - [`rewrite`]: validated text edits
//! - [`transform`]: the per-unit pass and the fixpoint driver
//! - [`dedup`]: cross-unit definition merging
//! - [`annotations`]: marker comments on emitted definitions

pub mod analysis;
pub mod annotations;
pub mod cli;
pub mod dedup;
pub mod errors;
pub mod forest;
pub mod rewrite;
pub mod synth;
pub mod syntax;
pub mod transform;

pub use errors::{ErrorCategory, ErrorKind, UnmacroError};
pub use transform::{drive_to_fixpoint, Frontend, TransformSettings, TransformerPass};
