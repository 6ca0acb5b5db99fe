use planfs::core::error::PlanfsError;
use planfs::core::receipt;
use planfs::core::store::Store;
use planfs::objects::terminal::{self, SessionHandle, SessionProvider};
use planfs::objects::thread;
use tempfile::tempdir;

struct FixedProvider;

impl SessionProvider for FixedProvider {
    fn resolve(&self, _thread_id: &str, _terminal_id: &str) -> Result<SessionHandle, PlanfsError> {
        Ok(SessionHandle {
            session_id: "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_string(),
            socket_path: Some("/tmp/fixed.sock".to_string()),
        })
    }
}

struct DownProvider;

impl SessionProvider for DownProvider {
    fn resolve(&self, _thread_id: &str, _terminal_id: &str) -> Result<SessionHandle, PlanfsError> {
        Err(PlanfsError::NotFound("daemon not running".to_string()))
    }
}

#[test]
fn scaffold_creates_identity_and_empty_manifest() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());

    let payload = thread::scaffold_thread(&store, "main", "t1").expect("scaffold");
    assert_eq!(payload["thread"], "main/t1");

    let entry = thread::get_thread(&store, "main/t1").expect("resolvable");
    assert!(entry.directory.join("thread.json").exists());
    let manifest = thread::load_participants(&entry).expect("manifest");
    assert!(manifest.participants.is_empty());
    assert!(manifest.updated_at.is_some());

    let err = thread::scaffold_thread(&store, "main", "t1").expect_err("already scaffolded");
    assert!(matches!(err, PlanfsError::PreconditionViolation(_)));
}

#[test]
fn login_scaffolds_registers_and_binds_session() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());

    let payload = thread::login(
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

    assert_eq!(payload["thread"], "main/t1");
    assert_eq!(
        payload["session"]["session_id"],
        "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee"
    );

    // Scaffold, descriptor, and manifest all exist afterwards.
    let entry = thread::get_thread(&store, "main/t1").expect("entry");
    let descriptor = terminal::load_descriptor(
        &store.terminal_descriptor_path("main/t1", "term-main"),
    )
    .expect("load")
    .expect("descriptor");
    assert_eq!(descriptor.provider.as_deref(), Some("tmux"));
    assert_eq!(
        descriptor.session_id.as_deref(),
        Some("aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee")
    );

    let manifest = thread::load_participants(&entry).expect("manifest");
    assert_eq!(manifest.participants.len(), 1);
    let participant = &manifest.participants[0];
    assert_eq!(participant.agent, "a1");
    assert_eq!(participant.status, thread::ParticipantStatus::Active);
    let session = participant.session.as_ref().expect("session bound");
    assert_eq!(session.provider, "tmux");

    // The saga journaled every document write in order.
    let journal = receipt::read_journal(&entry.journal_path()).expect("journal");
    assert!(journal.len() >= 4, "identity, manifest, descriptor, bind");
    assert!(journal.iter().any(|e| e.doc_type == "thread-identity"));
    assert!(journal.iter().any(|e| e.doc_type == "terminal-descriptor"));
    assert!(journal.iter().any(|e| e.doc_type == "thread-participants"));
}

#[test]
fn second_login_reuses_scaffold_and_participant() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());

    thread::login(&store, "a1", "main", "t1", "tmux", "term-main", false, &FixedProvider)
        .expect("first login");
    thread::login(&store, "a1", "main", "t1", "tmux", "term-main", false, &FixedProvider)
        .expect("second login");

    let entry = thread::get_thread(&store, "main/t1").expect("entry");
    let manifest = thread::load_participants(&entry).expect("manifest");
    assert_eq!(manifest.participants.len(), 1, "participant not duplicated");
}

#[test]
fn login_with_down_provider_surfaces_partial_journal() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());

    let err = thread::login(
        &store,
        "a1",
        "main",
        "t1",
        "tmux",
        "term-main",
        false,
        &DownProvider,
    )
    .expect_err("resolve failure stops the saga");

    assert!(matches!(err.error, PlanfsError::ValidationError(_)));
    // Everything before session resolution committed and is reported.
    assert!(err.journal.iter().any(|e| e.doc_type == "thread-identity"));
    assert!(err
        .journal
        .iter()
        .any(|e| e.doc_type == "terminal-descriptor"));

    // The descriptor exists but carries no session; the state is
    // self-describing and a later login can finish the job.
    let descriptor = terminal::load_descriptor(
        &store.terminal_descriptor_path("main/t1", "term-main"),
    )
    .expect("load")
    .expect("descriptor exists");
    assert!(descriptor.session_id.is_none());

    thread::login(&store, "a1", "main", "t1", "tmux", "term-main", false, &FixedProvider)
        .expect("retry succeeds");
}

#[test]
fn login_allows_missing_session_when_opted_in() {
    let tmp = tempdir().expect("tempdir");
    let store = Store::new(tmp.path());

    let payload = thread::login(
        &store,
        "a1",
        "main",
        "t1",
        "tmux",
        "term-main",
        true,
        &DownProvider,
    )
    .expect("login without session");
    assert!(payload["session"].is_null());

    let descriptor = terminal::load_descriptor(
        &store.terminal_descriptor_path("main/t1", "term-main"),
    )
    .expect("load")
    .expect("descriptor");
    assert_eq!(descriptor.provider.as_deref(), Some("tmux"));
    assert!(descriptor.session_id.is_none());
}
