//! Thread runtime scaffolds and participant manifests.
//!
//! Each runtime thread owns a directory with a `thread.json` identity
//! document (write-once), a `participants.json` manifest (modifiable), and
//! pane/branch state written by the terminal handlers. The login saga wires
//! an agent participant to a terminal session across several plans.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

use crate::core::error::PlanfsError;
use crate::core::plan::{Context, Plan, Write, WriteEvent, WritePolicy};
use crate::core::saga::{Saga, SagaError};
use crate::core::store::Store;
use crate::core::time;
use crate::objects::terminal::{self, SessionProvider};

#[derive(Parser, Debug)]
#[clap(name = "thread", about = "Runtime thread scaffolds and participants.")]
pub struct ThreadCli {
    #[clap(subcommand)]
    command: ThreadCommand,
}

#[derive(Subcommand, Debug)]
pub enum ThreadCommand {
    /// Create the runtime scaffold for a thread.
    Scaffold {
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
    },
    /// Log an agent participant into a thread terminal session.
    Login {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
        #[clap(long)]
        provider: String,
        #[clap(long, default_value = "term-main")]
        terminal_id: String,
        /// Continue without a session binding when the provider has none.
        #[clap(long)]
        allow_missing_session: bool,
    },
    /// Show a thread's manifest state.
    Show {
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
    },
}

pub fn run_thread_cli(store: &Store, cli: ThreadCli) -> Result<serde_json::Value, PlanfsError> {
    match cli.command {
        ThreadCommand::Scaffold { process, thread } => scaffold_thread(store, &process, &thread),
        ThreadCommand::Login {
            agent,
            process,
            thread,
            provider,
            terminal_id,
            allow_missing_session,
        } => {
            let session_provider = terminal::StubSessionProvider::new(&store.root);
            login(
                store,
                &agent,
                &process,
                &thread,
                &provider,
                &terminal_id,
                allow_missing_session,
                &session_provider,
            )
            .map_err(|e| PlanfsError::ValidationError(e.to_string()))
        }
        ThreadCommand::Show { process, thread } => show_thread(store, &process, &thread),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBinding {
    pub provider: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantStatus {
    Active,
    Detached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadParticipant {
    pub participant_id: String,
    pub agent: String,
    pub process: String,
    pub thread: String,
    pub status: ParticipantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionBinding>,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParticipantsManifest {
    #[serde(default)]
    pub participants: Vec<ThreadParticipant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Resolved runtime thread location.
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    pub process_slug: String,
    pub thread_slug: String,
    pub directory: PathBuf,
}

impl ThreadEntry {
    pub fn thread_id(&self) -> String {
        format!("{}/{}", self.process_slug, self.thread_slug)
    }

    pub fn participants_path(&self) -> PathBuf {
        self.directory.join("participants.json")
    }

    pub fn branch_file(&self, pane_kind: &str) -> PathBuf {
        self.directory
            .join("branches")
            .join(format!("{}.json", pane_kind.to_lowercase()))
    }

    pub fn pane_manifest_file(&self, pane_kind: &str) -> PathBuf {
        self.directory
            .join("pane_manifests")
            .join(format!("{}.json", pane_kind.to_lowercase()))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.directory.join("journal.jsonl")
    }
}

/// Resolve `process/thread` to its runtime scaffold, if present.
pub fn get_thread(store: &Store, identifier: &str) -> Option<ThreadEntry> {
    let (process, thread) = identifier.split_once('/')?;
    let directory = store.thread_runtime_dir(process, thread);
    if !directory.join("thread.json").exists() {
        return None;
    }
    Some(ThreadEntry {
        process_slug: process.to_string(),
        thread_slug: thread.to_string(),
        directory,
    })
}

/// Explicit lookup: a missing or unreadable manifest is an empty one only
/// when the file does not exist; malformed JSON propagates as an error.
pub fn load_participants(entry: &ThreadEntry) -> Result<ParticipantsManifest, PlanfsError> {
    let path = entry.participants_path();
    if !path.exists() {
        return Ok(ParticipantsManifest::default());
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

fn thread_context(function: &str, thread_id: &str) -> Context {
    Context::new("thread", function).selector("thread", thread_id)
}

/// Plan that rewrites the participants manifest as a pretty-JSON sibling doc.
pub fn plan_participants_manifest(
    entry: &ThreadEntry,
    function: &str,
    manifest: &mut ParticipantsManifest,
) -> Result<Plan, PlanfsError> {
    let now = time::now_utc();
    manifest.updated_at = Some(time::iso_z(now));
    let content = serde_json::to_string_pretty(&manifest)? + "\n";

    let mut plan = Plan::new(thread_context(function, &entry.thread_id()));
    plan.ensure_dir(&entry.directory);
    plan.push_write(Write {
        path: entry.participants_path(),
        content,
        policy: WritePolicy::Modifiable,
        event: if entry.participants_path().exists() {
            WriteEvent::Modified
        } else {
            WriteEvent::Created
        },
        doc_type: "thread-participants".to_string(),
        timestamp: now,
        metadata: Default::default(),
    });
    Ok(plan)
}

/// Plan that creates the runtime scaffold: `thread.json` identity document
/// plus an empty participants manifest.
pub fn plan_thread_scaffold(
    store: &Store,
    process: &str,
    thread: &str,
) -> Result<(Plan, ThreadEntry), PlanfsError> {
    let directory = store.thread_runtime_dir(process, thread);
    let entry = ThreadEntry {
        process_slug: process.to_string(),
        thread_slug: thread.to_string(),
        directory: directory.clone(),
    };
    let now = time::now_utc();
    let identity = json!({
        "id": entry.thread_id(),
        "process": process,
        "thread": thread,
        "created_at": time::iso_z(now),
    });

    let mut plan = Plan::new(thread_context("scaffold", &entry.thread_id()));
    plan.ensure_dir(&directory);
    plan.push_write(Write {
        path: directory.join("thread.json"),
        content: serde_json::to_string_pretty(&identity)? + "\n",
        policy: WritePolicy::WriteOnce,
        event: WriteEvent::Created,
        doc_type: "thread-identity".to_string(),
        timestamp: now,
        metadata: Default::default(),
    });
    Ok((plan, entry))
}

pub fn scaffold_thread(
    store: &Store,
    process: &str,
    thread: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let identifier = format!("{process}/{thread}");
    if get_thread(store, &identifier).is_some() {
        return Err(PlanfsError::PreconditionViolation(format!(
            "thread '{identifier}' already scaffolded"
        )));
    }
    let (plan, entry) = plan_thread_scaffold(store, process, thread)?;
    let mut saga = Saga::new();
    saga.apply(&plan)?;

    let mut manifest = ParticipantsManifest::default();
    let manifest_plan = plan_participants_manifest(&entry, "scaffold", &mut manifest)?;
    saga.apply(&manifest_plan)?;

    let journal = saga.commit_journal(&entry.journal_path())?;
    Ok(json!({
        "thread": entry.thread_id(),
        "path": entry.directory.to_string_lossy(),
        "receipts": saga.receipts().iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        "journal": journal,
    }))
}

/// Ensure `participant_id` is present in the manifest, appending a fresh
/// record when missing. Returns whether the manifest changed.
fn ensure_participant(
    manifest: &mut ParticipantsManifest,
    participant_id: &str,
    agent: &str,
    process: &str,
    thread: &str,
    now_iso: &str,
) -> bool {
    if manifest
        .participants
        .iter()
        .any(|p| p.participant_id == participant_id)
    {
        return false;
    }
    manifest.participants.push(ThreadParticipant {
        participant_id: participant_id.to_string(),
        agent: agent.to_string(),
        process: process.to_string(),
        thread: thread.to_string(),
        status: ParticipantStatus::Active,
        session: None,
        last_seen: now_iso.to_string(),
    });
    true
}

/// Login saga: scaffold the runtime thread when missing, register the agent
/// participant, ensure a terminal descriptor exists, resolve a session from
/// the provider, then bind the session onto the descriptor and manifest.
/// Plans run strictly in that order; the bind plans read documents the
/// earlier plans just wrote.
#[allow(clippy::too_many_arguments)]
pub fn login(
    store: &Store,
    agent: &str,
    process: &str,
    thread: &str,
    provider: &str,
    terminal_id: &str,
    allow_missing_session: bool,
    session_provider: &dyn SessionProvider,
) -> Result<serde_json::Value, SagaError> {
    let mut saga = Saga::new();
    let bare = |e: PlanfsError| SagaError {
        error: e,
        journal: Vec::new(),
    };

    if provider.is_empty() {
        return Err(bare(PlanfsError::ValidationError(
            "provider slug is required for login".to_string(),
        )));
    }

    let identifier = format!("{process}/{thread}");
    let entry = match get_thread(store, &identifier) {
        Some(entry) => entry,
        None => {
            let (plan, entry) = plan_thread_scaffold(store, process, thread).map_err(bare)?;
            saga.try_apply(&plan)?;
            entry
        }
    };

    let now_iso = time::iso_z(time::now_utc());
    let participant_id = format!("apt-{agent}-{process}-{thread}");
    let mut manifest = load_participants(&entry).map_err(|e| saga.fail(e))?;
    if ensure_participant(&mut manifest, &participant_id, agent, process, thread, &now_iso) {
        let plan =
            plan_participants_manifest(&entry, "login", &mut manifest).map_err(|e| saga.fail(e))?;
        saga.try_apply(&plan)?;
    }

    // Terminal descriptor, created on first login.
    let descriptor_path = store.terminal_descriptor_path(&entry.thread_id(), terminal_id);
    let descriptor = terminal::load_descriptor(&descriptor_path).map_err(|e| saga.fail(e))?;
    let descriptor = match descriptor {
        Some(descriptor) => descriptor,
        None => {
            let (plans, descriptor) =
                terminal::plan_create_terminal(store, &entry, terminal_id).map_err(|e| saga.fail(e))?;
            for plan in &plans {
                saga.try_apply(plan)?;
            }
            descriptor
        }
    };

    // Session resolution is a collaborator call, not a plan.
    let session = match session_provider.resolve(&entry.thread_id(), terminal_id) {
        Ok(handle) => Some(handle),
        Err(err) => {
            if allow_missing_session {
                None
            } else {
                return Err(saga.fail(PlanfsError::ValidationError(format!(
                    "session resolve failed: {err}"
                ))));
            }
        }
    };

    let bind_plans = terminal::plan_bind_session(
        store,
        &entry,
        &descriptor,
        provider,
        session.as_ref(),
        &participant_id,
    )
    .map_err(|e| saga.fail(e))?;
    for plan in &bind_plans {
        saga.try_apply(plan)?;
    }

    let journal = saga
        .commit_journal(&entry.journal_path())
        .map_err(|e| saga.fail(e))?;

    Ok(json!({
        "thread": entry.thread_id(),
        "participant_id": participant_id,
        "terminal_id": terminal_id,
        "provider": provider,
        "session": session.map(|s| json!({
            "session_id": s.session_id,
            "socket_path": s.socket_path,
        })),
        "descriptor_path": descriptor_path.to_string_lossy(),
        "receipts": saga.receipts().iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        "journal": journal,
    }))
}

pub fn show_thread(
    store: &Store,
    process: &str,
    thread: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let identifier = format!("{process}/{thread}");
    let entry = get_thread(store, &identifier).ok_or_else(|| {
        PlanfsError::NotFound(format!("thread '{identifier}' has no runtime scaffold"))
    })?;
    let manifest = load_participants(&entry)?;
    Ok(json!({
        "thread": entry.thread_id(),
        "path": entry.directory.to_string_lossy(),
        "participants": manifest.participants,
        "updated_at": manifest.updated_at,
    }))
}
