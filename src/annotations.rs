//! Marker comments on synthesized definitions.
//!
//! Every definition the tool emits is preceded by `/* unmacro: NAME */` so a
//! reader (or a later run) can tell tool output from hand-written code. The
//! `remove-annotations` command strips the markers once a transformation is
//! accepted.

use once_cell::sync::Lazy;
use regex::Regex;

static ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\* unmacro: [A-Za-z_][A-Za-z0-9_]* \*/ ?")
        .unwrap_or_else(|e| panic!("invalid annotation pattern: {}", e))
});

/// The marker comment for one macro name.
pub fn annotation_for(macro_name: &str) -> String {
    format!("/* unmacro: {} */", macro_name)
}

/// Strips every marker comment, leaving the definitions themselves intact.
pub fn remove_annotations(source: &str) -> String {
    ANNOTATION.replace_all(source, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remover_strips_only_markers() {
        let source = "\
#define ONE 1
/* unmacro: ONE */ const int ONE_var = 1;
/* a real comment */
int x = ONE_var;";
        let cleaned = remove_annotations(source);
        assert!(!cleaned.contains("unmacro:"));
        assert!(cleaned.contains("const int ONE_var = 1;"));
        assert!(cleaned.contains("/* a real comment */"));
    }

    #[test]
    fn marker_round_trips_through_remover() {
        let marked = format!("{} int ID_function(int x);", annotation_for("ID"));
        assert_eq!(remove_annotations(&marked), "int ID_function(int x);");
    }
}
