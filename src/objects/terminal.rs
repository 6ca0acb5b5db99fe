//! Terminal descriptors, pane manifests, and the teardown saga.
//!
//! A terminal is a JSON descriptor bound to a runtime thread plus branch and
//! pane-manifest sibling documents. The session daemon is an opaque provider
//! behind [`SessionProvider`]; this crate only stores the ids it returns.
//! Deletion never unlinks: documents move into a sibling `.deleted/` archive.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::PlanfsError;
use crate::core::plan::{Context, Plan, Write, WriteEvent, WritePolicy};
use crate::core::saga::{Saga, SagaError};
use crate::core::store::{archive_path, Store};
use crate::core::time;
use crate::objects::thread::{
    get_thread, load_participants, plan_participants_manifest, ParticipantStatus, SessionBinding,
    ThreadEntry,
};

#[derive(Parser, Debug)]
#[clap(name = "terminal", about = "Terminal descriptors and session bindings.")]
pub struct TerminalCli {
    #[clap(subcommand)]
    command: TerminalCommand,
}

#[derive(Subcommand, Debug)]
pub enum TerminalCommand {
    /// Create a terminal descriptor with pane scaffolding.
    Create {
        /// Thread identifier as `process/thread`.
        #[clap(long)]
        thread: String,
        #[clap(long, default_value = "term-main")]
        terminal_id: String,
    },
    /// Show a descriptor.
    Show {
        #[clap(long)]
        thread: String,
        #[clap(long)]
        terminal_id: String,
    },
    /// Soft-delete a terminal (descriptor, branch, pane manifest).
    Delete {
        #[clap(long)]
        thread: String,
        #[clap(long)]
        terminal_id: String,
        /// Also detach the owning participant's session binding.
        #[clap(long)]
        remove_session: bool,
    },
}

pub fn run_terminal_cli(store: &Store, cli: TerminalCli) -> Result<serde_json::Value, PlanfsError> {
    match cli.command {
        TerminalCommand::Create {
            thread,
            terminal_id,
        } => create_terminal(store, &thread, &terminal_id),
        TerminalCommand::Show {
            thread,
            terminal_id,
        } => show_terminal(store, &thread, &terminal_id),
        TerminalCommand::Delete {
            thread,
            terminal_id,
            remove_session,
        } => delete_terminal(store, &thread, &terminal_id, remove_session)
            .map_err(|e| PlanfsError::ValidationError(e.to_string())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalDescriptor {
    pub id: String,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Handle returned by the session collaborator.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub session_id: String,
    pub socket_path: Option<String>,
}

/// Opaque session daemon seam. Planfs never talks to a terminal itself; it
/// records whatever ids the provider hands back.
pub trait SessionProvider {
    fn resolve(&self, thread_id: &str, terminal_id: &str) -> Result<SessionHandle, PlanfsError>;
}

/// Deterministic in-process provider used by the CLI and tests.
pub struct StubSessionProvider {
    socket_dir: PathBuf,
}

impl StubSessionProvider {
    pub fn new(root: &Path) -> Self {
        StubSessionProvider {
            socket_dir: root.join("runtime").join("sockets"),
        }
    }
}

impl SessionProvider for StubSessionProvider {
    fn resolve(&self, thread_id: &str, terminal_id: &str) -> Result<SessionHandle, PlanfsError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let socket_name = format!("{}-{terminal_id}.sock", thread_id.replace('/', "__"));
        Ok(SessionHandle {
            session_id,
            socket_path: Some(self.socket_dir.join(socket_name).to_string_lossy().to_string()),
        })
    }
}

/// Explicit descriptor lookup: `Ok(None)` when absent, errors propagate.
pub fn load_descriptor(path: &Path) -> Result<Option<TerminalDescriptor>, PlanfsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn terminal_context(function: &str, thread_id: &str, terminal_id: &str) -> Context {
    Context::new("terminal", function)
        .selector("thread", thread_id)
        .selector("terminal", terminal_id)
}

/// Plan that writes the descriptor document. Creation is write-once; every
/// later rewrite is a modifiable full write of the small JSON document.
pub fn plan_descriptor_write(
    function: &str,
    descriptor_path: &Path,
    descriptor: &TerminalDescriptor,
    event: WriteEvent,
) -> Result<Plan, PlanfsError> {
    let policy = if event == WriteEvent::Created {
        WritePolicy::WriteOnce
    } else {
        WritePolicy::Modifiable
    };
    let content = serde_json::to_string_pretty(descriptor)? + "\n";

    let mut plan = Plan::new(terminal_context(function, &descriptor.thread_id, &descriptor.id));
    if let Some(parent) = descriptor_path.parent() {
        plan.ensure_dir(parent);
    }
    plan.push_write(Write {
        path: descriptor_path.to_path_buf(),
        content,
        policy,
        event,
        doc_type: "terminal-descriptor".to_string(),
        timestamp: time::now_utc(),
        metadata: Default::default(),
    });
    Ok(plan)
}

/// Plan that writes the branch and pane-manifest documents for a pane,
/// merged over whatever already exists on disk.
pub fn plan_pane_manifest(
    entry: &ThreadEntry,
    function: &str,
    pane_kind: &str,
    pane_payload: Option<serde_json::Value>,
) -> Result<Plan, PlanfsError> {
    let branch_path = entry.branch_file(pane_kind);
    let manifest_path = entry.pane_manifest_file(pane_kind);

    let read_json = |path: &Path| -> Result<serde_json::Map<String, serde_json::Value>, PlanfsError> {
        if !path.exists() {
            return Ok(Default::default());
        }
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(value.as_object().cloned().unwrap_or_default())
    };

    let mut branch = read_json(&branch_path)?;
    let now_iso = time::iso_z(time::now_utc());
    let branch_id = branch
        .get("branch_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    branch.insert("branch_id".to_string(), json!(branch_id));
    branch.entry("pane_kind".to_string()).or_insert(json!(pane_kind));
    branch.entry("created_at".to_string()).or_insert(json!(now_iso));
    branch.insert("updated_at".to_string(), json!(now_iso));
    branch.entry("is_main".to_string()).or_insert(json!(false));

    let mut pane_manifest = read_json(&manifest_path)?;
    pane_manifest
        .entry("pane_kind".to_string())
        .or_insert(json!(pane_kind));
    pane_manifest.insert("branch_id".to_string(), json!(branch_id));
    pane_manifest
        .entry("manifest_version".to_string())
        .or_insert(json!(1));
    match pane_payload {
        Some(payload) => {
            pane_manifest.insert("payload".to_string(), payload);
        }
        None => {
            pane_manifest.entry("payload".to_string()).or_insert(json!({}));
        }
    }

    let now = time::now_utc();
    let mut plan = Plan::new(
        Context::new("terminal", function)
            .selector("thread", &entry.thread_id())
            .selector("pane", pane_kind),
    );
    plan.ensure_dir(branch_path.parent().unwrap_or(&entry.directory));
    plan.ensure_dir(manifest_path.parent().unwrap_or(&entry.directory));
    plan.push_write(Write {
        path: branch_path,
        content: serde_json::to_string_pretty(&serde_json::Value::Object(branch))? + "\n",
        policy: WritePolicy::Modifiable,
        event: WriteEvent::Modified,
        doc_type: "terminal-branch".to_string(),
        timestamp: now,
        metadata: Default::default(),
    });
    plan.push_write(Write {
        path: manifest_path,
        content: serde_json::to_string_pretty(&serde_json::Value::Object(pane_manifest))? + "\n",
        policy: WritePolicy::Modifiable,
        event: WriteEvent::Modified,
        doc_type: "terminal-pane-manifest".to_string(),
        timestamp: now,
        metadata: Default::default(),
    });
    Ok(plan)
}

/// Build the creation plans for a terminal: descriptor write-once plus pane
/// scaffolding. Returns the plans unapplied so sagas can sequence them.
pub fn plan_create_terminal(
    store: &Store,
    entry: &ThreadEntry,
    terminal_id: &str,
) -> Result<(Vec<Plan>, TerminalDescriptor), PlanfsError> {
    let descriptor_path = store.terminal_descriptor_path(&entry.thread_id(), terminal_id);
    if descriptor_path.exists() {
        return Err(PlanfsError::PreconditionViolation(format!(
            "terminal '{terminal_id}' already exists for thread '{}'",
            entry.thread_id()
        )));
    }
    let now_iso = time::iso_z(time::now_utc());
    let descriptor = TerminalDescriptor {
        id: terminal_id.to_string(),
        thread_id: entry.thread_id(),
        provider: None,
        session_id: None,
        socket_path: None,
        created_at: now_iso.clone(),
        updated_at: now_iso,
    };

    let descriptor_plan =
        plan_descriptor_write("create", &descriptor_path, &descriptor, WriteEvent::Created)?;
    let pane_plan = plan_pane_manifest(entry, "create", &format!("terminal-{terminal_id}"), None)?;
    Ok((vec![descriptor_plan, pane_plan], descriptor))
}

pub fn create_terminal(
    store: &Store,
    thread_identifier: &str,
    terminal_id: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let entry = get_thread(store, thread_identifier).ok_or_else(|| {
        PlanfsError::NotFound(format!(
            "thread '{thread_identifier}' not found; scaffold it first"
        ))
    })?;
    let (plans, descriptor) = plan_create_terminal(store, &entry, terminal_id)?;

    let mut saga = Saga::new();
    for plan in &plans {
        saga.apply(plan)?;
    }
    let journal = saga.commit_journal(&entry.journal_path())?;

    Ok(json!({
        "thread": entry.thread_id(),
        "terminal_id": terminal_id,
        "descriptor_path": store
            .terminal_descriptor_path(&entry.thread_id(), terminal_id)
            .to_string_lossy(),
        "terminal": descriptor,
        "receipts": saga.receipts().iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        "journal": journal,
    }))
}

/// Plans that bind a resolved session onto the descriptor and the owning
/// participant. The descriptor rewrite is built from the document the create
/// plan just wrote.
pub fn plan_bind_session(
    store: &Store,
    entry: &ThreadEntry,
    descriptor: &TerminalDescriptor,
    provider: &str,
    session: Option<&SessionHandle>,
    participant_id: &str,
) -> Result<Vec<Plan>, PlanfsError> {
    let descriptor_path = store.terminal_descriptor_path(&entry.thread_id(), &descriptor.id);
    let now_iso = time::iso_z(time::now_utc());

    let mut updated = descriptor.clone();
    updated.provider = Some(provider.to_string());
    updated.session_id = session.map(|s| s.session_id.clone());
    updated.socket_path = session.and_then(|s| s.socket_path.clone());
    updated.updated_at = now_iso.clone();

    let mut plans = vec![plan_descriptor_write(
        "bind",
        &descriptor_path,
        &updated,
        WriteEvent::Modified,
    )?];

    let mut manifest = load_participants(entry)?;
    let mut changed = false;
    for participant in &mut manifest.participants {
        if participant.participant_id == participant_id {
            participant.session = session.map(|s| SessionBinding {
                provider: provider.to_string(),
                session_id: s.session_id.clone(),
                socket_path: s.socket_path.clone(),
            });
            participant.status = ParticipantStatus::Active;
            participant.last_seen = now_iso.clone();
            changed = true;
        }
    }
    if changed {
        plans.push(plan_participants_manifest(entry, "bind", &mut manifest)?);
    }
    Ok(plans)
}

pub fn show_terminal(
    store: &Store,
    thread_identifier: &str,
    terminal_id: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let entry = get_thread(store, thread_identifier)
        .ok_or_else(|| PlanfsError::NotFound(format!("thread '{thread_identifier}' not found")))?;
    let path = store.terminal_descriptor_path(&entry.thread_id(), terminal_id);
    let descriptor = load_descriptor(&path)?.ok_or_else(|| {
        PlanfsError::NotFound(format!(
            "terminal '{terminal_id}' not found for thread '{}'",
            entry.thread_id()
        ))
    })?;
    Ok(json!({
        "descriptor_path": path.to_string_lossy(),
        "terminal": descriptor,
    }))
}

/// Teardown saga: archive the descriptor, branch, and pane manifest into
/// `.deleted/` (distinct archive names), then detach the owning
/// participant's session when requested. Archives commit before the manifest
/// update, so a failure in between leaves the terminal gone but the
/// participant still bound; the manifest itself records the stale session id
/// an operator would clean up.
pub fn delete_terminal(
    store: &Store,
    thread_identifier: &str,
    terminal_id: &str,
    remove_session: bool,
) -> Result<serde_json::Value, SagaError> {
    let bare = |e: PlanfsError| SagaError {
        error: e,
        journal: Vec::new(),
    };

    let entry = get_thread(store, thread_identifier)
        .ok_or_else(|| bare(PlanfsError::NotFound(format!(
            "thread '{thread_identifier}' not found"
        ))))?;
    let descriptor_path = store.terminal_descriptor_path(&entry.thread_id(), terminal_id);
    let descriptor = load_descriptor(&descriptor_path)
        .map_err(bare)?
        .ok_or_else(|| {
            bare(PlanfsError::NotFound(format!(
                "terminal '{terminal_id}' not found for thread '{}'",
                entry.thread_id()
            )))
        })?;

    let now = time::now_utc();
    let pane_kind = format!("terminal-{terminal_id}");
    let branch_path = entry.branch_file(&pane_kind);
    let pane_path = entry.pane_manifest_file(&pane_kind);

    let mut archive_plan = Plan::new(
        terminal_context("delete", &entry.thread_id(), terminal_id).selector("step", "archive"),
    );
    let mut archives: Vec<(PathBuf, PathBuf)> = Vec::new();
    for original in [&descriptor_path, &branch_path, &pane_path] {
        if original.exists() {
            let dest = archive_path(original, now);
            if let Some(parent) = dest.parent() {
                archive_plan.ensure_dir(parent);
            }
            archive_plan.push_move(original, &dest, true);
            archives.push((original.clone(), dest));
        }
    }

    let mut saga = Saga::new();
    saga.try_apply(&archive_plan)?;

    let mut removed_session = false;
    if remove_session {
        if let Some(session_id) = &descriptor.session_id {
            let mut manifest = load_participants(&entry).map_err(|e| saga.fail(e))?;
            let now_iso = time::iso_z(now);
            for participant in &mut manifest.participants {
                let bound = participant
                    .session
                    .as_ref()
                    .is_some_and(|s| &s.session_id == session_id);
                if bound {
                    participant.session = None;
                    participant.status = ParticipantStatus::Detached;
                    participant.last_seen = now_iso.clone();
                    removed_session = true;
                }
            }
            if removed_session {
                let plan = plan_participants_manifest(&entry, "delete", &mut manifest)
                    .map_err(|e| saga.fail(e))?;
                saga.try_apply(&plan)?;
            }
        }
    }

    let journal = saga
        .commit_journal(&entry.journal_path())
        .map_err(|e| saga.fail(e))?;

    Ok(json!({
        "thread": entry.thread_id(),
        "terminal_id": terminal_id,
        "session_id": descriptor.session_id,
        "removed_session": removed_session,
        "archives": archives
            .iter()
            .map(|(src, dest)| json!({
                "from": src.to_string_lossy(),
                "to": dest.to_string_lossy(),
            }))
            .collect::<Vec<_>>(),
        "receipts": saga.receipts().iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        "journal": journal,
    }))
}
