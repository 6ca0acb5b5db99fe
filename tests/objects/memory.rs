use planfs::core::document;
use planfs::core::store::Store;
use planfs::objects::memory;
use std::fs;
use std::thread::sleep;
use std::time::Duration;
use tempfile::tempdir;

fn store() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());
    (tmp, store)
}

#[test]
fn write_working_creates_then_updates_preserving_created_stamp() {
    let (_tmp, store) = store();
    memory::write_working(&store, "a1", "main", "t1", "initial focus", "tester")
        .expect("first write");

    let path = store
        .thread_memory_dir("a1", "main", "t1")
        .join("working_memory.md");
    let first = document::parse(&fs::read_to_string(&path).unwrap());
    let created = document::meta_str(&first.metadata, "created")
        .expect("created stamp")
        .to_string();
    assert_eq!(first.body, "initial focus\n");

    sleep(Duration::from_millis(1100));
    memory::write_working(&store, "a1", "main", "t1", "new focus", "tester")
        .expect("second write");

    let second = document::parse(&fs::read_to_string(&path).unwrap());
    assert_eq!(second.body, "new focus\n");
    assert_eq!(
        document::meta_str(&second.metadata, "created"),
        Some(created.as_str()),
        "created survives rewrites"
    );
    assert_ne!(
        document::meta_str(&second.metadata, "updated"),
        Some(created.as_str()),
        "updated moves forward"
    );
}

#[test]
fn episodic_appends_yield_distinct_ordered_files_and_history_limits() {
    let (_tmp, store) = store();
    memory::append_episodic(
        &store, "a1", "main", "t1", "First Session", "first body", None, None, "tester",
    )
    .expect("first append");
    sleep(Duration::from_millis(1100));
    memory::append_episodic(
        &store,
        "a1",
        "main",
        "t1",
        "Second Session",
        "second body",
        Some("debug"),
        Some("high"),
        "tester",
    )
    .expect("second append");

    let episodic_dir = store.thread_memory_dir("a1", "main", "t1").join("episodic");
    let mut files: Vec<_> = fs::read_dir(&episodic_dir)
        .expect("episodic dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    files.sort();
    assert_eq!(files.len(), 2, "one immutable file per entry");
    assert!(files[0].ends_with("-first-session.md"));
    assert!(files[1].ends_with("-second-session.md"));

    let history = memory::history(&store, "a1", "main", "t1", 1).expect("history");
    let entries = history["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 1, "limit applies");
    assert_eq!(entries[0]["title"], "Second Session", "newest first");
    assert_eq!(entries[0]["session_type"], "debug");

    let full = memory::history(&store, "a1", "main", "t1", 10).expect("full history");
    assert_eq!(full["entries"].as_array().unwrap().len(), 2);
}

#[test]
fn status_summarizes_working_memory_and_episodic_log() {
    let (_tmp, store) = store();
    let empty = memory::status(&store, "a1", "main", "t1", 5).expect("empty status");
    assert!(empty["working_memory"].is_null());
    assert_eq!(empty["episodic_count"], 0);

    memory::write_working(&store, "a1", "main", "t1", "focus", "tester").expect("write");
    memory::append_episodic(&store, "a1", "main", "t1", "Entry", "body", None, None, "tester")
        .expect("append");

    let status = memory::status(&store, "a1", "main", "t1", 5).expect("status");
    assert!(status["working_memory"]["updated"].is_string());
    assert_eq!(status["episodic_count"], 1);
    assert_eq!(status["recent"].as_array().unwrap().len(), 1);
}
