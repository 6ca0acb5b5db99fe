use planfs::core::error::PlanfsError;
use planfs::core::store::Store;
use planfs::objects::terminal::{self, SessionHandle, SessionProvider};
use planfs::objects::thread;
use std::fs;
use tempfile::tempdir;

struct FixedProvider;

impl SessionProvider for FixedProvider {
    fn resolve(&self, _thread_id: &str, _terminal_id: &str) -> Result<SessionHandle, PlanfsError> {
        Ok(SessionHandle {
            session_id: "11111111-2222-3333-4444-555555555555".to_string(),
            socket_path: Some("/tmp/fixed.sock".to_string()),
        })
    }
}

fn logged_in_store() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());
    thread::login(
        &store,
        "a1",
        "main",
        "t1",
        "tmux",
        "term-main",
        false,
        &FixedProvider,
    )
    .expect("login");
    (tmp, store)
}

#[test]
fn create_terminal_writes_descriptor_and_pane_scaffolding() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());
    thread::scaffold_thread(&store, "main", "t1").expect("scaffold");

    let payload = terminal::create_terminal(&store, "main/t1", "term-aux").expect("create");
    assert_eq!(payload["terminal_id"], "term-aux");

    let descriptor_path = store.terminal_descriptor_path("main/t1", "term-aux");
    let descriptor = terminal::load_descriptor(&descriptor_path)
        .expect("load")
        .expect("descriptor present");
    assert_eq!(descriptor.id, "term-aux");
    assert_eq!(descriptor.thread_id, "main/t1");
    assert!(descriptor.session_id.is_none());

    let entry = thread::get_thread(&store, "main/t1").expect("entry");
    assert!(entry.branch_file("terminal-term-aux").exists());
    assert!(entry.pane_manifest_file("terminal-term-aux").exists());

    // Creation is write-once: a second create is rejected.
    let err = terminal::create_terminal(&store, "main/t1", "term-aux")
        .expect_err("duplicate create fails");
    assert!(matches!(err, PlanfsError::PreconditionViolation(_)));
}

#[test]
fn delete_with_remove_session_archives_files_and_detaches_participant() {
    let (_tmp, store) = logged_in_store();
    let entry = thread::get_thread(&store, "main/t1").expect("entry");
    let descriptor_path = store.terminal_descriptor_path("main/t1", "term-main");
    assert!(descriptor_path.exists());

    let payload =
        terminal::delete_terminal(&store, "main/t1", "term-main", true).expect("delete");
    assert_eq!(payload["removed_session"], true);

    // Originals are gone; nothing was unlinked, everything moved aside.
    assert!(!descriptor_path.exists());
    assert!(!entry.branch_file("terminal-term-main").exists());
    assert!(!entry.pane_manifest_file("terminal-term-main").exists());

    let archives = payload["archives"].as_array().expect("archives");
    assert_eq!(archives.len(), 3);
    let mut names = std::collections::HashSet::new();
    for archive in archives {
        let to = archive["to"].as_str().expect("archive path");
        assert!(to.contains("/.deleted/"), "archived under .deleted: {to}");
        assert!(fs::metadata(to).is_ok(), "archive file exists: {to}");
        names.insert(to.to_string());
    }
    assert_eq!(names.len(), 3, "archive names are distinct");

    // Owning participant lost its session binding.
    let manifest = thread::load_participants(&entry).expect("manifest");
    let participant = manifest
        .participants
        .iter()
        .find(|p| p.agent == "a1")
        .expect("participant");
    assert!(participant.session.is_none());
    assert_eq!(participant.status, thread::ParticipantStatus::Detached);
}

#[test]
fn delete_without_remove_session_keeps_participant_bound() {
    let (_tmp, store) = logged_in_store();
    terminal::delete_terminal(&store, "main/t1", "term-main", false).expect("delete");

    let entry = thread::get_thread(&store, "main/t1").expect("entry");
    let manifest = thread::load_participants(&entry).expect("manifest");
    let participant = manifest
        .participants
        .iter()
        .find(|p| p.agent == "a1")
        .expect("participant");
    assert!(participant.session.is_some(), "binding left for operator cleanup");
}

#[test]
fn delete_missing_terminal_is_a_clean_not_found() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());
    thread::scaffold_thread(&store, "main", "t1").expect("scaffold");

    let err = terminal::delete_terminal(&store, "main/t1", "ghost", false)
        .expect_err("missing terminal");
    assert!(matches!(err.error, PlanfsError::NotFound(_)));
    assert!(err.journal.is_empty());
}
