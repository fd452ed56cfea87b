//! Cross-unit deduplication of synthesized definitions.
//!
//! Two definitions are duplicates when they reify the same macro name with
//! the same canonical signature and the same body text. Out of each duplicate
//! group exactly one physical definition survives; the others are deleted
//! from their buffers and every reference to a deleted name is repointed to
//! the survivor.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::errors::{unspanned, ErrorReporting, PhaseContext, SourceContext, UnmacroError};
use crate::transform::EmittedDefinition;

/// Identity of a synthesized definition for deduplication purposes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DedupKey {
    pub macro_name: String,
    /// Name-independent signature text.
    pub signature: String,
    pub body: String,
}

impl DedupKey {
    pub fn of(def: &EmittedDefinition) -> Self {
        DedupKey {
            macro_name: def.definition.macro_name.clone(),
            signature: def.definition.type_signature(),
            body: def.definition.body.clone(),
        }
    }
}

/// One rewritten translation unit awaiting deduplication.
#[derive(Debug)]
pub struct ProcessedUnit {
    pub file: String,
    pub source: String,
    pub definitions: Vec<EmittedDefinition>,
    /// Names the unit declares itself. A duplicate is never merged when the
    /// survivor's name would rebind to one of these inside the unit.
    pub declared: HashSet<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct DedupReport {
    /// Duplicate groups that had more than one member.
    pub groups_merged: usize,
    /// Definitions physically removed.
    pub definitions_removed: usize,
    /// Duplicates left in place because repointing would have rebound their
    /// call sites to a different declaration.
    pub skipped_collisions: usize,
}

static IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*")
        .unwrap_or_else(|e| panic!("invalid identifier pattern: {}", e))
});

/// Merges duplicate definitions across the given units, editing their source
/// buffers in place.
pub fn deduplicate(units: &mut [ProcessedUnit]) -> Result<DedupReport, UnmacroError> {
    // Key -> occurrences in (unit order, insertion offset) order. BTreeMap
    // keeps group iteration deterministic.
    let mut groups: BTreeMap<DedupKey, Vec<(usize, usize)>> = BTreeMap::new();
    for (unit_index, unit) in units.iter().enumerate() {
        for (def_index, def) in unit.definitions.iter().enumerate() {
            groups.entry(DedupKey::of(def)).or_default().push((
                unit_index,
                def_index,
            ));
        }
    }

    let mut report = DedupReport::default();
    for (key, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|&(unit_index, def_index)| {
            (unit_index, units[unit_index].definitions[def_index].insertion_offset)
        });
        let (survivor_unit, survivor_def) = members[0];
        let survivor_name = units[survivor_unit].definitions[survivor_def]
            .definition
            .emitted_name
            .clone();
        debug!(
            macro_name = %key.macro_name,
            survivor = %survivor_name,
            duplicates = members.len() - 1,
            "merging duplicate definitions"
        );

        let mut removed_any = false;
        for &(unit_index, def_index) in &members[1..] {
            let loser_name = units[unit_index].definitions[def_index]
                .definition
                .emitted_name
                .clone();
            let loser_text = units[unit_index].definitions[def_index].text.clone();

            // Repointing must not capture an unrelated declaration. When the
            // survivor's name already means something else in this unit, the
            // duplicate stays.
            if loser_name != survivor_name && rebinds(&units[unit_index], &survivor_name, &key) {
                debug!(
                    macro_name = %key.macro_name,
                    name = %survivor_name,
                    file = %units[unit_index].file,
                    "survivor name collides in unit, keeping duplicate"
                );
                report.skipped_collisions += 1;
                continue;
            }
            let unit = &mut units[unit_index];

            if let Some(at) = unit.source.find(&loser_text) {
                unit.source.replace_range(at..at + loser_text.len(), "");
            } else {
                let ctx = PhaseContext::new(
                    SourceContext::from_file(unit.file.clone(), unit.source.clone()),
                    "dedup",
                );
                return Err(ctx.internal_error(
                    &format!("definition text for '{}' not found in buffer", loser_name),
                    unspanned(),
                ));
            }
            if loser_name != survivor_name {
                unit.source = repoint(&unit.source, &loser_name, &survivor_name);
            }
            report.definitions_removed += 1;
            removed_any = true;
        }
        if removed_any {
            report.groups_merged += 1;
        }
    }
    info!(
        groups = report.groups_merged,
        removed = report.definitions_removed,
        "deduplication complete"
    );
    Ok(report)
}

/// True when the given name already denotes something other than this
/// duplicate group inside the unit: a declared symbol or function, or a
/// definition emitted for a different group.
fn rebinds(unit: &ProcessedUnit, name: &str, key: &DedupKey) -> bool {
    unit.declared.contains(name)
        || unit
            .definitions
            .iter()
            .any(|d| d.definition.emitted_name == name && DedupKey::of(d) != *key)
}

/// Replaces whole-identifier occurrences of one emitted name with another.
fn repoint(source: &str, from: &str, to: &str) -> String {
    IDENT
        .replace_all(source, |caps: &regex::Captures<'_>| {
            let ident = &caps[0];
            if ident == from {
                to.to_string()
            } else {
                ident.to_string()
            }
        })
        .into_owned()
}
