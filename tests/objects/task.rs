use planfs::core::document;
use planfs::core::error::PlanfsError;
use planfs::core::store::Store;
use planfs::objects::task;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn store() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());
    (tmp, store)
}

fn overview_metadata(task_dir: &Path) -> document::Metadata {
    let text = fs::read_to_string(task_dir.join("OVERVIEW.md")).expect("overview readable");
    document::parse(&text).metadata
}

#[test]
fn create_queued_task_lands_in_pending_bucket() {
    let (_tmp, store) = store();
    let payload = task::create_task(
        &store,
        "demo",
        "first-task",
        Some("First Task"),
        "queued",
        "high",
        "kick things off",
        "tester",
    )
    .expect("create");

    let task_dir = store.tasks_root("demo").join("_pending").join("first-task");
    assert!(task_dir.join("OVERVIEW.md").exists());
    assert_eq!(payload["status"], "queued");

    let metadata = overview_metadata(&task_dir);
    assert_eq!(document::meta_str(&metadata, "status"), Some("queued"));
    assert_eq!(document::meta_str(&metadata, "priority"), Some("high"));

    // Creation is write-once.
    let err = task::create_task(
        &store,
        "demo",
        "first-task",
        None,
        "queued",
        "medium",
        "",
        "tester",
    )
    .expect_err("duplicate create must fail");
    assert!(matches!(err, PlanfsError::PreconditionViolation(_)));
}

#[test]
fn update_status_moves_bucket_marks_overview_and_logs_backlog() {
    let (_tmp, store) = store();
    task::create_task(
        &store,
        "demo",
        "first-task",
        Some("First Task"),
        "queued",
        "medium",
        "",
        "tester",
    )
    .expect("create");

    let payload = task::update_status(
        &store,
        "demo",
        "first-task",
        "running",
        "picked up by agent",
        false,
        "tester",
    )
    .expect("update-status");

    assert_eq!(payload["previous_status"], "queued");
    assert_eq!(payload["new_status"], "running");
    assert_eq!(payload["move_required"], true);

    // Directory moved out of the pending bucket.
    let old_dir = store.tasks_root("demo").join("_pending").join("first-task");
    let new_dir = store.tasks_root("demo").join("first-task");
    assert!(!old_dir.exists());
    assert!(new_dir.exists());

    // Overview carries the authoritative status plus the reason entry.
    let metadata = overview_metadata(&new_dir);
    assert_eq!(document::meta_str(&metadata, "status"), Some("running"));
    let body = document::parse(&fs::read_to_string(new_dir.join("OVERVIEW.md")).unwrap()).body;
    assert!(body.contains("## Status Updates"));
    assert!(body.contains("Running: picked up by agent"));

    // Today's backlog gained the transition reason.
    let backlog_dir = new_dir.join("backlog");
    let backlog_files: Vec<_> = fs::read_dir(&backlog_dir)
        .expect("backlog dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(backlog_files.len(), 1);
    let backlog_text = fs::read_to_string(&backlog_files[0]).expect("backlog");
    assert!(backlog_text.contains("Status changed to running"));
    assert!(backlog_text.contains("Reason: picked up by agent"));

    // The journal recorded the overview and backlog writes.
    let journal = payload["journal"].as_array().expect("journal array");
    assert!(journal.iter().any(|e| e["doc_type"] == "overview"));
    assert!(journal.iter().any(|e| e["doc_type"] == "backlog"));
    assert!(new_dir.join("journal.jsonl").exists());
}

#[test]
fn update_status_to_finished_sets_completed_and_moves_to_completed_bucket() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "t", None, "running", "medium", "", "x").expect("create");

    task::update_status(&store, "demo", "t", "finished_succeeded", "done", false, "x")
        .expect("finish");

    let dir = store.tasks_root("demo").join("_completed").join("t");
    assert!(dir.exists());
    let metadata = overview_metadata(&dir);
    assert_eq!(
        document::meta_str(&metadata, "status"),
        Some("finished_succeeded")
    );
    assert!(document::meta_str(&metadata, "completed").is_some());
}

#[test]
fn same_status_update_without_reason_or_force_is_rejected() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "t", None, "queued", "medium", "", "x").expect("create");

    let err = task::update_status(&store, "demo", "t", "queued", "", false, "x")
        .expect_err("same status should fail");
    assert!(matches!(err.error, PlanfsError::ValidationError(_)));
    assert!(err.journal.is_empty(), "nothing committed");
}

#[test]
fn backlog_appends_preserve_prior_entries_in_order() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "t", None, "running", "medium", "", "x").expect("create");

    task::task_backlog(&store, "demo", "t", "", "", "- first entry", "x").expect("first");
    task::task_backlog(&store, "demo", "t", "", "", "- second entry", "x").expect("second");

    let backlog_dir = store.tasks_root("demo").join("t").join("backlog");
    let files: Vec<_> = fs::read_dir(&backlog_dir)
        .expect("dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(files.len(), 1, "same-day entries share one document");

    let text = fs::read_to_string(&files[0]).expect("read");
    let first = text.find("- first entry").expect("first entry present");
    let second = text.find("- second entry").expect("second entry present");
    assert!(first < second, "entries stay in append order");
}

#[test]
fn overview_merges_sections_and_collapses_unchanged_updates() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "t", None, "running", "medium", "", "x").expect("create");

    let payload = task::task_overview(
        &store,
        "demo",
        "t",
        "Task T",
        "",
        "## Objectives\n- ship the thing\n\n## Next Steps\n- write tests",
        "x",
    )
    .expect("overview update");
    assert_eq!(payload["event"], "modified");

    let dir = store.tasks_root("demo").join("t");
    let body = document::parse(&fs::read_to_string(dir.join("OVERVIEW.md")).unwrap()).body;
    let status_pos = body.find("## Status").expect("status section");
    let objectives_pos = body.find("## Objectives").expect("objectives section");
    let next_pos = body.find("## Next Steps").expect("next steps section");
    assert!(status_pos < objectives_pos && objectives_pos < next_pos);
    assert!(body.contains("- ship the thing"));

    // Submitting the same update again produces no instruction.
    let payload = task::task_overview(
        &store,
        "demo",
        "t",
        "Task T",
        "",
        "## Objectives\n- ship the thing\n\n## Next Steps\n- write tests",
        "x",
    )
    .expect("idempotent overview update");
    assert_eq!(payload["event"], "unchanged");
}

#[test]
fn task_document_is_write_once_and_timestamped() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "t", None, "running", "medium", "", "x").expect("create");

    let payload = task::task_document(
        &store,
        "demo",
        "t",
        "design",
        "design",
        "Storage Layout",
        None,
        "how documents are laid out",
        "Details...",
        "x",
    )
    .expect("document");

    let path = payload["path"].as_str().expect("path");
    assert!(path.contains("/design/"));
    assert!(path.ends_with("-storage-layout.md"));

    let metadata = document::parse(&fs::read_to_string(path).unwrap()).metadata;
    assert_eq!(document::meta_str(&metadata, "version"), Some("0.0.0"));
    assert_eq!(document::meta_str(&metadata, "slug"), Some("storage-layout"));
}

#[test]
fn list_tasks_reads_status_from_overview_metadata() {
    let (_tmp, store) = store();
    task::create_task(&store, "demo", "a", None, "queued", "medium", "", "x").expect("a");
    task::create_task(&store, "demo", "b", None, "running", "medium", "", "x").expect("b");

    let all = task::list_tasks(&store, "demo", None).expect("list");
    assert_eq!(all["tasks"].as_array().unwrap().len(), 2);

    let queued = task::list_tasks(&store, "demo", Some("queued")).expect("filter");
    let tasks = queued["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task"], "a");
    assert_eq!(tasks[0]["bucket"], "_pending");
}
