//! End-to-end behavior of the engine: locate, annotate, resolve

use revisor_editor::{EditError, Engine, EngineOptions, Operation, Target};
use serde_json::json;

fn open(markup: &str) -> Engine {
    Engine::open("report.docx", markup, EngineOptions::default()).unwrap()
}

fn replace(search: &str, replacement: &str) -> Operation {
    Operation::new("replace_text", Target::text(search), json!({ "replace": replacement }))
}

#[test]
fn test_exact_replace_then_accept() {
    let mut engine = open("<p>Hello world.</p>");
    let result = engine.apply(&[replace("world", "earth")], false);

    assert!(result.success);
    assert_eq!(result.count(), 1);
    let id = result.change_ids()[0].clone();
    assert_eq!(
        engine.serialize(),
        format!("<p>Hello <del change=\"{id}\">world</del><ins change=\"{id}\">earth</ins>.</p>\n")
    );
    assert_eq!(engine.get_latest_plain_text(), "Hello earth.");

    let change = &engine.list()[0];
    assert_eq!(change.before_preview, "world");
    assert_eq!(change.after_preview, "earth");
    assert_eq!(change.match_count, 1);

    engine.accept(&id).unwrap();
    assert_eq!(engine.serialize(), "<p>Hello earth.</p>\n");
    assert!(engine.list().is_empty());
}

#[test]
fn test_exact_replace_then_reject() {
    let mut engine = open("<p>Hello world.</p>");
    let result = engine.apply(&[replace("world", "earth")], false);

    engine.reject(&result.change_ids()[0]).unwrap();
    assert_eq!(engine.serialize(), "<p>Hello world.</p>\n");
    assert_eq!(engine.get_latest_plain_text(), "Hello world.");
    assert!(engine.list().is_empty());
}

#[test]
fn test_dry_run_changes_nothing() {
    let mut engine = open("<p>Hello world. Hello again.</p>");
    let before = engine.serialize();

    let result = engine.apply(&[replace("Hello", "Hi")], true);

    assert!(result.success);
    assert_eq!(result.count(), 2);
    assert!(result.change_ids().is_empty());
    assert!(result.outcomes[0].dry_run);
    assert_eq!(engine.serialize(), before);
    assert!(engine.list().is_empty());
    assert_eq!(engine.version(), 0);
}

#[test]
fn test_per_operation_dry_run() {
    let mut engine = open("<p>Hello world.</p>");
    let mut preview = replace("world", "earth");
    preview.dry_run = true;

    let result = engine.apply(&[preview, replace("Hello", "Hi")], false);

    assert!(result.success);
    assert!(result.outcomes[0].dry_run);
    assert_eq!(engine.list().len(), 1);
    assert_eq!(engine.get_latest_plain_text(), "Hi world.");
}

#[test]
fn test_match_crosses_formatting_runs() {
    let mut engine = open("<p>Hello <b>wor</b>ld.</p>");
    let result = engine.apply(&[replace("world", "earth")], false);

    assert!(result.success);
    assert_eq!(result.count(), 1);
    assert_eq!(engine.get_latest_plain_text(), "Hello earth.");

    engine.accept_all();
    assert_eq!(engine.serialize(), "<p>Hello <b>earth</b>.</p>\n");
}

#[test]
fn test_fuzzy_whitespace_fallback() {
    let mut engine = open("<p>quarterly   revenue grew</p>");
    let result = engine.apply(&[replace("quarterly revenue", "annual revenue")], false);

    assert!(result.success);
    assert_eq!(result.count(), 1);
    assert_eq!(engine.get_latest_plain_text(), "annual revenue grew");
}

#[test]
fn test_fuzzy_whitespace_can_be_disabled() {
    let options = EngineOptions {
        fuzzy_whitespace: false,
        ..EngineOptions::default()
    };
    let mut engine = Engine::open("report.docx", "<p>quarterly   revenue grew</p>", options).unwrap();
    let result = engine.apply(&[replace("quarterly revenue", "annual revenue")], false);

    assert!(!result.success);
    assert_eq!(result.outcomes[0].error.as_deref(), Some("not_found"));
}

#[test]
fn test_match_never_spans_blocks() {
    let mut engine = open("<p>Hello</p><p>world</p>");
    let result = engine.apply(&[replace("Hello world", "x")], false);

    assert!(!result.success);
    assert_eq!(result.count(), 0);
    assert_eq!(result.outcomes[0].error.as_deref(), Some("not_found"));
    assert_eq!(engine.serialize(), "<p>Hello</p>\n<p>world</p>\n");
}

#[test]
fn test_resolving_twice_reports_missing_change() {
    let mut engine = open("<p>Hello world.</p>");
    let result = engine.apply(&[replace("world", "earth")], false);
    let id = result.change_ids()[0].clone();

    engine.accept(&id).unwrap();
    let err = engine.accept(&id).unwrap_err();
    assert!(matches!(err, EditError::ResolutionNotFound(_)));
    assert_eq!(engine.serialize(), "<p>Hello earth.</p>\n");
}

#[test]
fn test_accept_all_clears_every_change() {
    let mut engine = open("<p>one two one</p><p>one more</p>");
    let result = engine.apply(&[replace("one", "1")], false);
    assert_eq!(result.count(), 3);
    assert_eq!(engine.list().len(), 3);

    let resolved = engine.accept_all();
    assert_eq!(resolved.len(), 3);
    assert!(engine.list().is_empty());
    assert_eq!(engine.serialize(), "<p>1 two 1</p>\n<p>1 more</p>\n");
}

#[test]
fn test_accept_all_mixed_batch_leaves_no_markers() {
    let mut engine = open("<p>alpha beta</p><p>Closing words</p>");
    let result = engine.apply(
        &[
            replace("alpha", "first"),
            replace("beta", "second"),
            Operation::new("format_paragraph", Target::anchor("Closing"), json!({ "align": "right" })),
        ],
        false,
    );
    assert!(result.success);
    assert_eq!(engine.list().len(), 3);

    engine.accept_all();

    let markup = engine.serialize();
    assert!(engine.list().is_empty());
    assert!(!markup.contains("change="));
    assert!(!markup.contains("<ins"));
    assert!(!markup.contains("<del"));
    assert_eq!(markup, "<p>first second</p>\n<p align=\"right\">Closing words</p>\n");
}

#[test]
fn test_reject_all_restores_original() {
    let mut engine = open("<p>one two one</p>");
    engine.apply(&[replace("one", "1"), replace("two", "2")], false);

    engine.reject_all();
    assert_eq!(engine.serialize(), "<p>one two one</p>\n");
}

#[test]
fn test_sequential_ops_see_earlier_results() {
    let mut engine = open("<p>Q1 report</p>");
    let ops = vec![replace("Q1", "Q2"), replace("Q2 report", "Q3 report")];
    let result = engine.apply(&ops, false);

    assert!(result.success);
    assert_eq!(result.outcomes[1].match_count, 1);
    assert_eq!(engine.get_latest_plain_text(), "Q3 report");

    let first = result.outcomes[0].change_ids[0].clone();
    let second = result.outcomes[1].change_ids[0].clone();
    assert_eq!(engine.get(&second).unwrap().depends_on, vec![first.clone()]);

    let resolved = engine.accept(&second).unwrap();
    assert_eq!(resolved, vec![first, second]);
    assert_eq!(engine.serialize(), "<p>Q3 report</p>\n");
}

#[test]
fn test_rejecting_a_base_change_rejects_dependents() {
    let mut engine = open("<p>Q1 report</p>");
    let result = engine.apply(&[replace("Q1", "Q2"), replace("Q2 report", "Q3 report")], false);
    let first = result.outcomes[0].change_ids[0].clone();

    let resolved = engine.reject(&first).unwrap();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[1], first);
    assert_eq!(engine.serialize(), "<p>Q1 report</p>\n");
    assert!(engine.list().is_empty());
}

#[test]
fn test_separate_batches_share_state() {
    let mut engine = open("<p>Q1 report</p>");
    engine.apply(&[replace("Q1", "Q2")], false);
    let result = engine.apply(&[replace("Q2 report", "Q3 report")], false);

    assert!(result.success);
    assert_eq!(result.count(), 1);
    assert_eq!(engine.version(), 2);
}

#[test]
fn test_pending_text_alone_is_not_a_target() {
    let mut engine = open("<p>Hello world.</p>");
    engine.apply(&[replace("world", "earth")], false);

    let result = engine.apply(&[replace("earth", "mars")], false);
    assert!(!result.success);
    assert_eq!(result.outcomes[0].error.as_deref(), Some("not_found"));
}

#[test]
fn test_replace_first_only() {
    let mut engine = open("<p>a b a b</p>");
    let op = Operation::new("replace_text", Target::text("a"), json!({ "replace": "x", "all": false }));
    let result = engine.apply(&[op], false);

    assert_eq!(result.count(), 1);
    assert_eq!(engine.get_latest_plain_text(), "x b a b");
}

#[test]
fn test_empty_replacement_deletes() {
    let mut engine = open("<p>Hello cruel world.</p>");
    let result = engine.apply(&[replace("cruel ", "")], false);
    let id = result.change_ids()[0].clone();

    assert_eq!(
        engine.serialize(),
        format!("<p>Hello <del change=\"{id}\">cruel </del>world.</p>\n")
    );
    assert_eq!(engine.list()[0].summary, "Delete \"cruel \"");
}

#[test]
fn test_orphan_markers_are_recovered() {
    let markup = r#"<p>Start <del change="x-1">old</del><ins change="x-1">new</ins> end</p>"#;
    let mut engine = open(markup);

    let recovered = &engine.list()[0];
    assert_eq!(recovered.id, "x-1");
    assert_eq!(recovered.kind.as_str(), "recovered");

    engine.reject("x-1").unwrap();
    assert_eq!(engine.serialize(), "<p>Start old end</p>\n");
}

#[test]
fn test_unknown_operation_is_skipped() {
    let mut engine = open("<p>Hello world.</p>");
    let ops = vec![
        Operation::new("rewrite_everything", Target::document(), json!({})),
        replace("Hello", "Hi"),
    ];
    let result = engine.apply(&ops, false);

    assert!(!result.success);
    assert_eq!(result.outcomes[0].error.as_deref(), Some("unknown_op_type"));
    assert!(result.outcomes[1].success);
}

#[test]
fn test_malformed_operation_is_skipped() {
    let mut engine = open("<p>Hello world.</p>");
    let result = engine
        .apply_json(
            r#"[
                {"type": "replace_text", "target": {"text": "world"}, "params": {"replace": 7}},
                {"target": {"text": "world"}},
                {"type": "replace_text", "target": {"text": "world"}, "params": {"replace": "earth"}}
            ]"#,
            false,
        )
        .unwrap();

    assert_eq!(result.outcomes[0].error.as_deref(), Some("invalid_op_shape"));
    assert_eq!(result.outcomes[1].error.as_deref(), Some("invalid_op_shape"));
    assert_eq!(result.outcomes[1].op_type, "<unknown>");
    assert!(result.outcomes[2].success);
    assert_eq!(engine.get_latest_plain_text(), "Hello earth.");
}

#[test]
fn test_empty_search_is_rejected() {
    let mut engine = open("<p>Hello</p>");
    let result = engine.apply(&[replace("", "x")], false);
    assert_eq!(result.outcomes[0].error.as_deref(), Some("empty_input"));
}

#[test]
fn test_anchor_scope_limits_search() {
    let mut engine = open("<p>Intro: fee is 5</p><p>Appendix: fee is 5</p>");
    let op = Operation::new(
        "replace_text",
        Target::anchor("Appendix"),
        json!({ "search": "5", "replace": "7" }),
    );
    let result = engine.apply(&[op], false);

    assert_eq!(result.count(), 1);
    assert_eq!(engine.get_latest_plain_text(), "Intro: fee is 5\nAppendix: fee is 7");
}

#[test]
fn test_selection_scope() {
    let mut engine = open("<p>alpha</p><p>alpha</p>");
    let second = engine.document().blocks[1].id.clone();
    engine.select(&[second]).unwrap();

    let op = Operation::new("replace_text", Target::selection(), json!({ "search": "alpha", "replace": "beta" }));
    let result = engine.apply(&[op], false);

    assert_eq!(result.count(), 1);
    assert_eq!(engine.get_latest_plain_text(), "alpha\nbeta");
}

#[test]
fn test_new_change_ids_skip_recovered_ones() {
    let seed = revisor_editor::markup::IDGenerator::new("report.docx").seed().to_string();
    let markup = format!(r#"<p><ins change="{seed}-c-4">x</ins> y</p>"#);
    let mut engine = open(&markup);

    let result = engine.apply(&[replace("y", "z")], false);
    assert_eq!(result.change_ids(), vec![format!("{seed}-c-5")]);
}
