//! Operation plans: pure-data descriptions of filesystem mutations.
//!
//! A Plan is built entirely from content the caller has already read; building
//! one never touches disk. The executor applies instructions in a fixed order
//! (ensure dirs, moves, writes, patches) and turns what actually happened into
//! a Receipt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::core::document::Metadata;

/// Write policy governing how a document may change over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Target must not exist; the only legal event is `created`.
    WriteOnce,
    /// Freely replaced; `created` or `modified`.
    Modifiable,
    /// Grows by accretion; `created`, `appended`, or `unchanged`.
    AppendEntry,
}

impl WritePolicy {
    pub fn allows(self, event: WriteEvent) -> bool {
        match self {
            WritePolicy::WriteOnce => matches!(event, WriteEvent::Created),
            WritePolicy::Modifiable => {
                matches!(event, WriteEvent::Created | WriteEvent::Modified)
            }
            WritePolicy::AppendEntry => matches!(
                event,
                WriteEvent::Created | WriteEvent::Appended | WriteEvent::Unchanged
            ),
        }
    }
}

/// What a write/patch did to its target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteEvent {
    Created,
    Modified,
    Appended,
    Unchanged,
}

impl WriteEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WriteEvent::Created => "created",
            WriteEvent::Modified => "modified",
            WriteEvent::Appended => "appended",
            WriteEvent::Unchanged => "unchanged",
        }
    }
}

/// mkdir -p for a directory the plan is about to populate.
#[derive(Debug, Clone)]
pub struct EnsureDir {
    pub path: PathBuf,
}

/// Full-content write of a document.
#[derive(Debug, Clone)]
pub struct Write {
    pub path: PathBuf,
    pub content: String,
    pub policy: WritePolicy,
    pub event: WriteEvent,
    pub doc_type: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

/// Minimal edit of an existing document, carried as a unified diff. The diff
/// text itself is the audit record of what changed.
#[derive(Debug, Clone)]
pub struct Patch {
    pub path: PathBuf,
    pub diff: String,
    pub policy: WritePolicy,
    pub doc_type: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
    pub summary: Option<String>,
    pub event: WriteEvent,
}

/// Rename, used for bucket transitions and soft-delete archiving.
#[derive(Debug, Clone)]
pub struct Move {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub overwrite: bool,
}

/// Identifies the logical operation for audit purposes only; selectors are
/// never used for addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub object_type: String,
    pub function: String,
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
}

impl Context {
    pub fn new(object_type: &str, function: &str) -> Self {
        Context {
            object_type: object_type.to_string(),
            function: function.to_string(),
            selectors: BTreeMap::new(),
        }
    }

    pub fn selector(mut self, key: &str, value: &str) -> Self {
        self.selectors.insert(key.to_string(), value.to_string());
        self
    }
}

/// Ordered instructions for one logical operation.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub context: Option<Context>,
    pub ensure_dirs: Vec<EnsureDir>,
    pub moves: Vec<Move>,
    pub writes: Vec<Write>,
    pub patches: Vec<Patch>,
}

impl Plan {
    pub fn new(context: Context) -> Self {
        Plan {
            context: Some(context),
            ..Plan::default()
        }
    }

    pub fn ensure_dir(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        if !self.ensure_dirs.iter().any(|e| e.path == path) {
            self.ensure_dirs.push(EnsureDir { path });
        }
        self
    }

    pub fn push_move(&mut self, src: impl Into<PathBuf>, dest: impl Into<PathBuf>, overwrite: bool) -> &mut Self {
        self.moves.push(Move {
            src: src.into(),
            dest: dest.into(),
            overwrite,
        });
        self
    }

    pub fn push_write(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    pub fn push_patch(&mut self, patch: Patch) -> &mut Self {
        self.patches.push(patch);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ensure_dirs.is_empty()
            && self.moves.is_empty()
            && self.writes.is_empty()
            && self.patches.is_empty()
    }
}

/// Per-plan lifecycle tracked by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Built,
    Applying,
    Applied,
    Failed,
}
