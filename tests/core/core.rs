use planfs::core::diff::{apply_unified, build_patch, unified_diff};
use planfs::core::document::{self, Metadata};
use planfs::core::error::PlanfsError;
use planfs::core::executor::{apply_plan, apply_plan_opts};
use planfs::core::plan::{Context, Plan, Write, WriteEvent, WritePolicy};
use planfs::core::receipt::{self, FsOpKind, JournalEntry};
use planfs::core::saga::Saga;
use planfs::core::time;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    let mut map = Metadata::new();
    for (key, value) in pairs {
        document::set_meta(&mut map, key, *value);
    }
    map
}

fn write_instruction(path: &Path, content: &str, policy: WritePolicy, event: WriteEvent) -> Write {
    Write {
        path: path.to_path_buf(),
        content: content.to_string(),
        policy,
        event,
        doc_type: "design".to_string(),
        timestamp: time::now_utc(),
        metadata: meta(&[("id", "demo")]),
    }
}

#[test]
fn codec_round_trip_preserves_metadata_and_body() {
    let metadata = meta(&[("id", "demo"), ("title", "Demo"), ("summary", "s")]);
    let composed = document::compose(&metadata, "First line\n\nSecond block").expect("compose");
    let parsed = document::parse(&composed);
    assert_eq!(parsed.metadata, metadata);
    assert_eq!(parsed.body, "First line\n\nSecond block\n");

    // Composing the parse output again is byte-identical.
    let recomposed = document::compose(&parsed.metadata, &parsed.body).expect("recompose");
    assert_eq!(recomposed, composed);
}

#[test]
fn codec_leaves_hand_authored_thematic_breaks_alone() {
    let text = "---\n# Not metadata\n---\n\nA document that merely starts with a break.\n";
    let parsed = document::parse(text);
    assert!(parsed.metadata.is_empty());
    assert_eq!(parsed.body, text);
}

#[test]
fn diff_engine_is_idempotent_on_unchanged_text() {
    let patch = build_patch(
        Path::new("doc.md"),
        "same content\n",
        "same content\n",
        "overview",
        time::now_utc(),
        WritePolicy::Modifiable,
        Metadata::new(),
        None,
        WriteEvent::Modified,
    );
    assert!(patch.is_none());
}

#[test]
fn diff_text_is_the_audit_record() {
    let patch = build_patch(
        Path::new("doc.md"),
        "status: queued\n",
        "status: running\n",
        "overview",
        time::now_utc(),
        WritePolicy::Modifiable,
        Metadata::new(),
        Some("status flip".to_string()),
        WriteEvent::Modified,
    )
    .expect("patch for changed text");
    assert!(patch.diff.contains("-status: queued"));
    assert!(patch.diff.contains("+status: running"));
}

#[test]
fn apply_plan_creates_file_and_reports_ops() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("docs").join("foo.md");

    let mut plan = Plan::new(Context::new("task", "design").selector("task", "demo"));
    plan.ensure_dir(target.parent().unwrap());
    plan.push_write(write_instruction(
        &target,
        "---\nid: demo\n---\n\nBody\n",
        WritePolicy::WriteOnce,
        WriteEvent::Created,
    ));

    let receipt = apply_plan(&plan).expect("apply");
    assert!(target.exists());
    assert_eq!(receipt.fs_ops.len(), 2);
    assert_eq!(receipt.fs_ops[0].kind, FsOpKind::Ensure);
    assert_eq!(receipt.fs_ops[1].kind, FsOpKind::Write);
    assert_eq!(receipt.fs_ops[1].event.as_deref(), Some("created"));
    assert!(receipt.fs_ops[1].hash.is_some());

    let value = receipt.to_value();
    assert!(value["applied_at"].is_string());
    assert_eq!(value["context"]["object_type"], "task");
    assert_eq!(value["fs_ops"][1]["kind"], "write");
}

#[test]
fn write_once_violation_leaves_original_bytes() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("foo.md");
    fs::write(&target, "original bytes").expect("seed");

    let mut plan = Plan::new(Context::new("task", "design"));
    plan.push_write(write_instruction(
        &target,
        "replacement",
        WritePolicy::WriteOnce,
        WriteEvent::Created,
    ));

    let err = apply_plan(&plan).expect_err("write-once must fail");
    assert!(matches!(err, PlanfsError::PreconditionViolation(_)));
    assert_eq!(fs::read_to_string(&target).expect("read"), "original bytes");
}

#[test]
fn modifiable_write_replaces_unconditionally() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("foo.md");
    fs::write(&target, "old").expect("seed");

    let mut plan = Plan::new(Context::new("task", "overview"));
    plan.push_write(write_instruction(
        &target,
        "new",
        WritePolicy::Modifiable,
        WriteEvent::Modified,
    ));
    apply_plan(&plan).expect("apply");
    assert_eq!(fs::read_to_string(&target).expect("read"), "new");
}

#[test]
fn move_without_overwrite_touches_nothing() {
    let tmp = tempdir().expect("tempdir");
    let src = tmp.path().join("src.md");
    let dest = tmp.path().join("dest.md");
    fs::write(&src, "source").expect("seed src");
    fs::write(&dest, "dest").expect("seed dest");

    let mut plan = Plan::new(Context::new("task", "update-status"));
    plan.push_move(&src, &dest, false);

    let err = apply_plan(&plan).expect_err("move must fail");
    assert!(matches!(err, PlanfsError::PreconditionViolation(_)));
    assert_eq!(fs::read_to_string(&src).expect("src intact"), "source");
    assert_eq!(fs::read_to_string(&dest).expect("dest intact"), "dest");
}

#[test]
fn patch_applies_minimal_edit() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("doc.md");
    let original = "line one\nline two\nline three\n";
    fs::write(&target, original).expect("seed");

    let updated = "line one\nline 2\nline three\n";
    let patch = build_patch(
        &target,
        original,
        updated,
        "overview",
        time::now_utc(),
        WritePolicy::Modifiable,
        Metadata::new(),
        None,
        WriteEvent::Modified,
    )
    .expect("patch");

    let mut plan = Plan::new(Context::new("task", "overview"));
    plan.push_patch(patch);
    apply_plan(&plan).expect("apply");
    assert_eq!(fs::read_to_string(&target).expect("read"), updated);
}

#[test]
fn patch_conflict_when_disk_content_drifts() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("doc.md");
    let original = "line one\nline two\n";
    fs::write(&target, original).expect("seed");

    let patch = build_patch(
        &target,
        original,
        "line one\nline TWO\n",
        "overview",
        time::now_utc(),
        WritePolicy::Modifiable,
        Metadata::new(),
        None,
        WriteEvent::Modified,
    )
    .expect("patch");

    // Another writer mutates the document between build and apply.
    fs::write(&target, "line one\nline two drifted\n").expect("drift");

    let mut plan = Plan::new(Context::new("task", "overview"));
    plan.push_patch(patch);
    let err = apply_plan(&plan).expect_err("conflict expected");
    assert!(matches!(err, PlanfsError::DiffConflictError(_)));
    assert_eq!(
        fs::read_to_string(&target).expect("read"),
        "line one\nline two drifted\n"
    );
}

#[test]
fn dry_run_does_not_mutate() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("foo.md");

    let mut plan = Plan::new(Context::new("task", "design"));
    plan.ensure_dir(tmp.path().join("subdir"));
    plan.push_write(write_instruction(
        &target,
        "content",
        WritePolicy::WriteOnce,
        WriteEvent::Created,
    ));

    let receipt = apply_plan_opts(&plan, true).expect("dry run");
    assert!(!target.exists());
    assert!(!tmp.path().join("subdir").exists());
    assert!(receipt.fs_ops.is_empty());
}

#[test]
fn unchanged_append_entry_emits_no_op() {
    let tmp = tempdir().expect("tempdir");
    let target = tmp.path().join("backlog.md");
    fs::write(&target, "existing\n").expect("seed");

    let mut plan = Plan::new(Context::new("task", "backlog"));
    plan.push_write(Write {
        event: WriteEvent::Unchanged,
        ..write_instruction(&target, "ignored", WritePolicy::AppendEntry, WriteEvent::Unchanged)
    });

    let receipt = apply_plan(&plan).expect("apply");
    assert!(receipt.fs_ops.is_empty());
    assert_eq!(fs::read_to_string(&target).expect("read"), "existing\n");
}

#[test]
fn journal_round_trips_and_only_appends() {
    let tmp = tempdir().expect("tempdir");
    let journal_path = tmp.path().join("journal.jsonl");

    let entry = |path: &str| JournalEntry {
        event_id: time::new_event_id(),
        timestamp: time::iso_z(time::now_utc()),
        object_type: "task".to_string(),
        function: "backlog".to_string(),
        path: path.to_string(),
        event: "appended".to_string(),
        doc_type: "backlog".to_string(),
        summary: None,
    };

    receipt::append_journal(&journal_path, &[entry("a.md")]).expect("append 1");
    receipt::append_journal(&journal_path, &[entry("b.md"), entry("c.md")]).expect("append 2");

    let entries = receipt::read_journal(&journal_path).expect("read");
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].path, "a.md");
    assert_eq!(entries[2].path, "c.md");
}

#[test]
fn saga_stops_on_first_failure_and_keeps_partial_journal() {
    let tmp = tempdir().expect("tempdir");
    let first = tmp.path().join("first.md");
    let blocked = tmp.path().join("blocked.md");
    fs::write(&blocked, "already here").expect("seed");

    let mut ok_plan = Plan::new(Context::new("task", "step-one"));
    ok_plan.push_write(write_instruction(
        &first,
        "first\n",
        WritePolicy::WriteOnce,
        WriteEvent::Created,
    ));

    let mut failing_plan = Plan::new(Context::new("task", "step-two"));
    failing_plan.push_write(write_instruction(
        &blocked,
        "second\n",
        WritePolicy::WriteOnce,
        WriteEvent::Created,
    ));

    let mut saga = Saga::new();
    saga.try_apply(&ok_plan).expect("first plan applies");
    let err = saga.try_apply(&failing_plan).expect_err("second plan fails");

    assert!(matches!(err.error, PlanfsError::PreconditionViolation(_)));
    assert_eq!(err.journal.len(), 1);
    assert!(err.journal[0].path.ends_with("first.md"));
    assert!(first.exists(), "committed step is not rolled back");
    assert_eq!(
        fs::read_to_string(&blocked).expect("read"),
        "already here"
    );
}

#[test]
fn unified_diff_round_trips_multi_hunk_edits() {
    let original: String = (0..30).map(|i| format!("row {i}\n")).collect();
    let mut lines: Vec<String> = (0..30).map(|i| format!("row {i}\n")).collect();
    lines[1] = "row one edited\n".to_string();
    lines.remove(20);
    let updated: String = lines.concat();

    let diff = unified_diff(&original, &updated, "grid.md");
    let applied = apply_unified(&original, &diff, "grid.md").expect("apply");
    assert_eq!(applied, updated);
}
