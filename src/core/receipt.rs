//! Receipts and the append-only journal.
//!
//! A Receipt records what one applied plan actually did: one FsOp per
//! instruction that ran, no-ops omitted. Receipts flatten into journal
//! entries, one row per write/patch, appended to a per-task/thread JSONL
//! file that is never rewritten in place.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::Path;

use crate::core::error::PlanfsError;
use crate::core::plan::{Context, Patch, PlanState, Write, WritePolicy};
use crate::core::time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsOpKind {
    Ensure,
    Move,
    Write,
    Patch,
}

/// One filesystem effect, in the wire shape callers embed in responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsOp {
    pub kind: FsOpKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<WritePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl FsOp {
    pub fn ensure(path: &Path) -> Self {
        FsOp {
            kind: FsOpKind::Ensure,
            path: path.to_string_lossy().to_string(),
            event: None,
            policy: None,
            doc_type: None,
            summary: None,
            hash: None,
            timestamp: None,
        }
    }

    pub fn moved(src: &Path, dest: &Path) -> Self {
        FsOp {
            kind: FsOpKind::Move,
            path: dest.to_string_lossy().to_string(),
            event: None,
            policy: None,
            doc_type: None,
            summary: Some(format!("moved from {}", src.display())),
            hash: None,
            timestamp: None,
        }
    }

    pub fn write(instruction: &Write, hash: String) -> Self {
        FsOp {
            kind: FsOpKind::Write,
            path: instruction.path.to_string_lossy().to_string(),
            event: Some(instruction.event.as_str().to_string()),
            policy: Some(instruction.policy),
            doc_type: Some(instruction.doc_type.clone()),
            summary: None,
            hash: Some(hash),
            timestamp: Some(time::iso_z(instruction.timestamp)),
        }
    }

    pub fn patch(instruction: &Patch, hash: String) -> Self {
        FsOp {
            kind: FsOpKind::Patch,
            path: instruction.path.to_string_lossy().to_string(),
            event: Some(instruction.event.as_str().to_string()),
            policy: Some(instruction.policy),
            doc_type: Some(instruction.doc_type.clone()),
            summary: instruction.summary.clone(),
            hash: Some(hash),
            timestamp: Some(time::iso_z(instruction.timestamp)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
    pub fs_ops: Vec<FsOp>,
    pub applied_at: String,
    #[serde(skip, default = "default_state")]
    pub state: PlanState,
}

fn default_state() -> PlanState {
    PlanState::Applied
}

impl Receipt {
    pub fn new(context: Option<Context>, fs_ops: Vec<FsOp>) -> Self {
        Receipt::with_state(context, fs_ops, PlanState::Applied)
    }

    pub fn with_state(context: Option<Context>, fs_ops: Vec<FsOp>, state: PlanState) -> Self {
        Receipt {
            context,
            fs_ops,
            applied_at: time::iso_z(time::now_utc()),
            state,
        }
    }

    /// Stable JSON projection embedded in handler responses.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Flatten to one journal row per write/patch op. Ensure/move ops are
    /// infrastructure and do not appear in the journal.
    pub fn journal_entries(&self) -> Vec<JournalEntry> {
        let (object_type, function) = match &self.context {
            Some(ctx) => (ctx.object_type.clone(), ctx.function.clone()),
            None => (String::new(), String::new()),
        };
        self.fs_ops
            .iter()
            .filter(|op| matches!(op.kind, FsOpKind::Write | FsOpKind::Patch))
            .map(|op| JournalEntry {
                event_id: time::new_event_id(),
                timestamp: op.timestamp.clone().unwrap_or_else(|| self.applied_at.clone()),
                object_type: object_type.clone(),
                function: function.clone(),
                path: op.path.clone(),
                event: op.event.clone().unwrap_or_default(),
                doc_type: op.doc_type.clone().unwrap_or_default(),
                summary: op.summary.clone(),
            })
            .collect()
    }
}

/// One audit row in a per-task/thread journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub event_id: String,
    pub timestamp: String,
    pub object_type: String,
    pub function: String,
    pub path: String,
    pub event: String,
    pub doc_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Append entries to a JSONL journal. The file only ever grows.
pub fn append_journal(path: &Path, entries: &[JournalEntry]) -> Result<(), PlanfsError> {
    if entries.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    for entry in entries {
        writeln!(f, "{}", serde_json::to_string(entry)?)?;
    }
    Ok(())
}

/// Read a journal back, skipping blank lines.
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>, PlanfsError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }
    Ok(entries)
}
