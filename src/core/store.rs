//! Store abstraction for Planfs state management.
//!
//! A Store is a handle on one workspace root. Every handler receives a Store
//! explicitly; there is no process-global environment cache. All path
//! conventions (project/task layout, runtime scaffolds, terminal descriptors,
//! soft-delete archives, journals) live here so object handlers never
//! hand-assemble paths.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::core::time;

/// Task bucket directories. A bucket is a status-indicating subdirectory the
/// task directory currently occupies; the overview `status:` field stays
/// authoritative when the two disagree.
pub const PENDING_BUCKET: &str = "_pending";
pub const COMPLETED_BUCKET: &str = "_completed";

/// Store handle representing a Planfs workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the workspace root directory.
    pub root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Store { root: root.into() }
    }

    pub fn projects_root(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn tasks_root(&self, project: &str) -> PathBuf {
        self.projects_root().join(project).join("tasks")
    }

    /// Identity-side thread directory holding memory documents.
    pub fn thread_memory_dir(&self, agent: &str, process: &str, thread: &str) -> PathBuf {
        self.root
            .join("agents")
            .join(agent)
            .join("runtime")
            .join("process")
            .join(process)
            .join("threads")
            .join(thread)
    }

    /// Runtime-side thread scaffold holding manifests and pane state.
    pub fn thread_runtime_dir(&self, process: &str, thread: &str) -> PathBuf {
        self.root
            .join("runtime")
            .join("threads")
            .join(process)
            .join(thread)
    }

    pub fn terminals_dir(&self, thread_id: &str) -> PathBuf {
        let safe = thread_id.replace('/', "__");
        self.root.join("runtime").join("terminals").join(safe)
    }

    pub fn terminal_descriptor_path(&self, thread_id: &str, terminal_id: &str) -> PathBuf {
        self.terminals_dir(thread_id).join(format!("{terminal_id}.json"))
    }
}

/// Soft-delete target for `original`: a sibling `.deleted/` directory with a
/// `<stem>-<YYYYMMDDHHMMSS>-<8 hex><ext>` name. Documents are never unlinked.
pub fn archive_path(original: &Path, ts: DateTime<Utc>) -> PathBuf {
    let parent = original.parent().unwrap_or_else(|| Path::new("."));
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    parent.join(".deleted").join(format!(
        "{stem}-{stamp}-{suffix}{ext}",
        stamp = time::archive_stamp(ts),
        suffix = time::short_hex(),
    ))
}
