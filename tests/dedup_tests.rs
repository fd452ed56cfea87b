//! Deduplication across call sites and translation units.

mod common;

use common::Facts;
use unmacro::dedup::{deduplicate, ProcessedUnit};
use unmacro::syntax::{Stmt, Storage};
use unmacro::transform::{TransformSettings, TransformerPass};

fn process(facts: Facts) -> ProcessedUnit {
    let unit = facts.build();
    let outcome = TransformerPass::new(TransformSettings::default())
        .run(&unit)
        .expect("pass failed");
    assert!(outcome.edit_failures.is_empty());
    ProcessedUnit {
        declared: unit.declared_names(),
        file: unit.file,
        source: outcome.rewritten,
        definitions: outcome.definitions,
    }
}

fn one_unit(file: &str) -> Facts {
    let src = "#define ONE 1\nint x;\nvoid f(void) { x = ONE; }\n";
    let mut facts = Facts::new(file, src);
    facts.define_object("ONE", "1");
    let span = facts.span_of_last("ONE");
    let num = facts.num(1, span);
    let stmt = facts.span_of("x = ONE");
    let assign = facts.assign("x", Storage::Global, num, stmt);
    facts.expand("ONE", span, vec![]);
    facts.global_var("x");
    facts.function("f", Stmt::Expr(assign));
    facts
}

#[test]
fn repeated_expansions_share_one_definition() {
    let src = "#define ONE 1\nint x;\nvoid f(void) { x = ONE; x = ONE; }\n";
    let mut facts = Facts::new("one.c", src);
    facts.define_object("ONE", "1");
    let first = facts.span_of_nth("ONE", 1);
    let second = facts.span_of_nth("ONE", 2);
    let a = facts.num(1, first);
    let b = facts.num(1, second);
    let stmt_a = facts.span_of_nth("x = ONE", 0);
    let stmt_b = facts.span_of_nth("x = ONE", 1);
    let assign_a = facts.assign("x", Storage::Global, a, stmt_a);
    let assign_b = facts.assign("x", Storage::Global, b, stmt_b);
    facts.expand("ONE", first, vec![]);
    facts.expand("ONE", second, vec![]);
    facts.global_var("x");
    facts.function(
        "f",
        Stmt::Block(vec![Stmt::Expr(assign_a), Stmt::Expr(assign_b)]),
    );

    let mut units = vec![process(facts)];
    let report = deduplicate(&mut units).expect("dedup failed");
    assert_eq!(report.groups_merged, 1);
    assert_eq!(report.definitions_removed, 1);
    assert_eq!(
        units[0].source,
        "#define ONE 1\n\
         /* unmacro: ONE */ const int ONE_var = 1;\n\
         int x;\nvoid f(void) { x = ONE_var; x = ONE_var; }\n"
    );
}

#[test]
fn cross_unit_duplicates_collapse_onto_the_first_unit() {
    let mut units = vec![process(one_unit("a.c")), process(one_unit("b.c"))];
    let report = deduplicate(&mut units).expect("dedup failed");
    assert_eq!(report.groups_merged, 1);
    assert_eq!(report.definitions_removed, 1);
    assert!(units[0].source.contains("const int ONE_var = 1;"));
    assert!(!units[1].source.contains("const int ONE_var"));
    assert!(units[1].source.contains("x = ONE_var;"));
}

#[test]
fn colliding_survivor_name_keeps_the_duplicate() {
    // The second unit declares its own `ONE_var`, so its emitted definition
    // is named `ONE_var0` and repointing it to the survivor would rebind the
    // call site to the unit's mutable global. The duplicate must stay.
    let clash = {
        let src = "#define ONE 1\nint ONE_var;\nvoid g(void) { ONE_var = ONE; }\n";
        let mut facts = Facts::new("b.c", src);
        facts.define_object("ONE", "1");
        let span = facts.span_of_last("ONE");
        let num = facts.num(1, span);
        let stmt = facts.span_of("ONE_var = ONE");
        let assign = facts.assign("ONE_var", Storage::Global, num, stmt);
        facts.expand("ONE", span, vec![]);
        facts.global_var("ONE_var");
        facts.function("g", Stmt::Expr(assign));
        facts
    };

    let mut units = vec![process(one_unit("a.c")), process(clash)];
    // The second unit's universe forces a different emitted name.
    assert!(units[1].source.contains("ONE_var0"));

    let report = deduplicate(&mut units).expect("dedup failed");
    assert_eq!(report.groups_merged, 0);
    assert_eq!(report.definitions_removed, 0);
    assert_eq!(report.skipped_collisions, 1);
    assert!(units[0].source.contains("const int ONE_var = 1;"));
    assert!(units[1].source.contains("const int ONE_var0 = 1;"));
    assert!(units[1].source.contains("ONE_var = ONE_var0;"));
}

#[test]
fn distinct_definitions_are_left_alone() {
    let src = "#define ONE 1\n#define TWO 2\nint x;\nvoid f(void) { x = ONE; x = TWO; }\n";
    let mut facts = Facts::new("both.c", src);
    facts.define_object("ONE", "1");
    facts.define_object("TWO", "2");
    let one_span = facts.span_of_last("ONE");
    let two_span = facts.span_of_last("TWO");
    let one = facts.num(1, one_span);
    let two = facts.num(2, two_span);
    let stmt_one = facts.span_of("x = ONE");
    let stmt_two = facts.span_of("x = TWO");
    let assign_one = facts.assign("x", Storage::Global, one, stmt_one);
    let assign_two = facts.assign("x", Storage::Global, two, stmt_two);
    facts.expand("ONE", one_span, vec![]);
    facts.expand("TWO", two_span, vec![]);
    facts.global_var("x");
    facts.function(
        "f",
        Stmt::Block(vec![Stmt::Expr(assign_one), Stmt::Expr(assign_two)]),
    );

    let mut units = vec![process(facts)];
    let before = units[0].source.clone();
    let report = deduplicate(&mut units).expect("dedup failed");
    assert_eq!(report.groups_merged, 0);
    assert_eq!(report.definitions_removed, 0);
    assert_eq!(units[0].source, before);
}
