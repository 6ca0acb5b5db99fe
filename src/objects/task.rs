//! Task lifecycle: creation, status transitions, documents, backlog, overview.
//!
//! Tasks live at `projects/<project>/tasks/[<bucket>/]<task>/` where the
//! bucket (`_pending`, `_completed`, or none) mirrors status. The overview's
//! `status:` field is authoritative; the bucket is derived, so a partially
//! applied transition stays self-describing and recoverable.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use regex::Regex;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::diff::build_patch;
use crate::core::document::{self, set_meta, set_meta_default, Metadata};
use crate::core::error::PlanfsError;
use crate::core::executor::apply_plan;
use crate::core::plan::{Context, Plan, Write, WriteEvent, WritePolicy};
use crate::core::saga::{Saga, SagaError};
use crate::core::store::{Store, COMPLETED_BUCKET, PENDING_BUCKET};
use crate::core::time;

pub const FINISHED_STATUSES: [&str; 2] = ["finished_succeeded", "finished_failed"];
const KNOWN_STATUSES: [&str; 5] = [
    "queued",
    "running",
    "blocked",
    "finished_succeeded",
    "finished_failed",
];
const DEFAULT_OVERVIEW_SECTIONS: [&str; 3] = ["Status", "Objectives", "Next Steps"];

#[derive(Parser, Debug)]
#[clap(name = "task", about = "Manage task documents and status transitions.")]
pub struct TaskCli {
    #[clap(subcommand)]
    command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Create a task with an initial overview document.
    Create {
        #[clap(long)]
        project: String,
        #[clap(long)]
        task: String,
        #[clap(long)]
        title: Option<String>,
        #[clap(long, default_value = "queued")]
        status: String,
        #[clap(long, default_value = "medium")]
        priority: String,
        #[clap(long, default_value = "")]
        summary: String,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// Move a task to a new status (bucket move + overview + backlog).
    UpdateStatus {
        #[clap(long)]
        project: String,
        #[clap(long)]
        task: String,
        #[clap(long)]
        status: String,
        #[clap(long, default_value = "")]
        reason: String,
        #[clap(long)]
        force: bool,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// Add a timestamped analysis or design document.
    Document {
        #[clap(long)]
        project: String,
        #[clap(long)]
        task: String,
        /// Document kind: analysis | design
        #[clap(long)]
        kind: String,
        #[clap(long)]
        title: String,
        #[clap(long)]
        slug: Option<String>,
        #[clap(long, default_value = "")]
        summary: String,
        #[clap(long, default_value = "")]
        content: String,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// Append an entry to today's backlog document.
    Backlog {
        #[clap(long)]
        project: String,
        #[clap(long)]
        task: String,
        #[clap(long, default_value = "")]
        title: String,
        #[clap(long, default_value = "")]
        summary: String,
        #[clap(long, default_value = "")]
        content: String,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// Merge section updates into the task overview.
    Overview {
        #[clap(long)]
        project: String,
        #[clap(long)]
        task: String,
        #[clap(long, default_value = "")]
        title: String,
        #[clap(long, default_value = "")]
        summary: String,
        #[clap(long, default_value = "")]
        content: String,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// List tasks with status derived from overview metadata.
    List {
        #[clap(long)]
        project: String,
        #[clap(long)]
        status: Option<String>,
    },
}

pub fn run_task_cli(store: &Store, cli: TaskCli) -> Result<serde_json::Value, PlanfsError> {
    match cli.command {
        TaskCommand::Create {
            project,
            task,
            title,
            status,
            priority,
            summary,
            author,
        } => create_task(
            store,
            &project,
            &task,
            title.as_deref(),
            &status,
            &priority,
            &summary,
            &author,
        ),
        TaskCommand::UpdateStatus {
            project,
            task,
            status,
            reason,
            force,
            author,
        } => update_status(store, &project, &task, &status, &reason, force, &author)
            .map_err(saga_to_error),
        TaskCommand::Document {
            project,
            task,
            kind,
            title,
            slug,
            summary,
            content,
            author,
        } => {
            let subdir = match kind.as_str() {
                "analysis" | "design" => kind.clone(),
                other => {
                    return Err(PlanfsError::ValidationError(format!(
                        "unknown document kind '{other}'; expected analysis or design"
                    )))
                }
            };
            task_document(
                store,
                &project,
                &task,
                &subdir,
                &kind,
                &title,
                slug.as_deref(),
                &summary,
                &content,
                &author,
            )
        }
        TaskCommand::Backlog {
            project,
            task,
            title,
            summary,
            content,
            author,
        } => task_backlog(store, &project, &task, &title, &summary, &content, &author),
        TaskCommand::Overview {
            project,
            task,
            title,
            summary,
            content,
            author,
        } => task_overview(store, &project, &task, &title, &summary, &content, &author),
        TaskCommand::List { project, status } => list_tasks(store, &project, status.as_deref()),
    }
}

fn saga_to_error(err: SagaError) -> PlanfsError {
    PlanfsError::ValidationError(err.to_string())
}

pub fn normalize_status(value: &str) -> Result<String, PlanfsError> {
    let lowered = value.trim().to_lowercase().replace('-', "_");
    let canonical = match lowered.as_str() {
        "done" | "finished" | "succeeded" => "finished_succeeded".to_string(),
        "failed" => "finished_failed".to_string(),
        "pending" => "queued".to_string(),
        other => other.to_string(),
    };
    if KNOWN_STATUSES.contains(&canonical.as_str()) {
        Ok(canonical)
    } else {
        Err(PlanfsError::ValidationError(format!(
            "unknown status '{value}'; expected one of {KNOWN_STATUSES:?}"
        )))
    }
}

/// Bucket a status maps to, or `None` for unbucketed (active) statuses.
pub fn status_bucket(status: &str) -> Option<&'static str> {
    match status {
        "queued" => Some(PENDING_BUCKET),
        s if FINISHED_STATUSES.contains(&s) => Some(COMPLETED_BUCKET),
        _ => None,
    }
}

fn status_display_name(status: &str) -> String {
    status
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn slugify(value: &str) -> String {
    let lowered = value.trim().to_lowercase().replace([' ', '/'], "-");
    let re = Regex::new(r"[^a-z0-9\-]+").unwrap();
    let cleaned = re.replace_all(&lowered, "-");
    let squeezed = Regex::new(r"-{2,}").unwrap().replace_all(&cleaned, "-");
    let trimmed = squeezed.trim_matches('-');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

fn merge_body(existing: &str, addition: &str) -> String {
    let existing = existing.trim_end();
    let addition = addition.trim_end();
    if addition.is_empty() {
        return existing.to_string();
    }
    if existing.is_empty() {
        return format!("{addition}\n");
    }
    format!("{existing}\n\n{addition}\n")
}

fn author_meta(author: &str) -> serde_yaml::Value {
    let mut map = Metadata::new();
    set_meta(&mut map, "name", author);
    serde_yaml::Value::Mapping(map)
}

/// Locate a task directory across the unbucketed and bucketed locations.
pub fn find_task_dir(store: &Store, project: &str, task: &str) -> Result<PathBuf, PlanfsError> {
    let tasks_root = store.tasks_root(project);
    let candidates = [
        tasks_root.join(task),
        tasks_root.join(PENDING_BUCKET).join(task),
        tasks_root.join(COMPLETED_BUCKET).join(task),
    ];
    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
            PlanfsError::NotFound(format!("task '{task}' not found under project '{project}'"))
        })
}

fn current_bucket(store: &Store, project: &str, task_dir: &Path) -> String {
    let tasks_root = store.tasks_root(project);
    task_dir
        .strip_prefix(&tasks_root)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .filter(|first| first == PENDING_BUCKET || first == COMPLETED_BUCKET)
        .unwrap_or_default()
}

fn task_context(project: &str, task: &str, function: &str, bucket: &str) -> Context {
    Context::new("task", function)
        .selector("project", project)
        .selector("task", task)
        .selector("task_bucket", bucket)
}

fn load_overview(task_dir: &Path) -> Result<(Metadata, String, String), PlanfsError> {
    let path = task_dir.join("OVERVIEW.md");
    if !path.exists() {
        return Ok((Metadata::new(), String::new(), String::new()));
    }
    let text = fs::read_to_string(&path)?;
    let parsed = document::parse(&text);
    Ok((parsed.metadata, parsed.body, text))
}

#[allow(clippy::too_many_arguments)]
pub fn create_task(
    store: &Store,
    project: &str,
    task: &str,
    title: Option<&str>,
    status: &str,
    priority: &str,
    summary: &str,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let status = normalize_status(status)?;
    let tasks_root = store.tasks_root(project);
    if find_task_dir(store, project, task).is_ok() {
        return Err(PlanfsError::PreconditionViolation(format!(
            "task '{project}/{task}' already exists"
        )));
    }
    let bucket = status_bucket(&status).unwrap_or("");
    let task_dir = if bucket.is_empty() {
        tasks_root.join(task)
    } else {
        tasks_root.join(bucket).join(task)
    };

    let now = time::now_utc();
    let iso = time::iso_z(now);
    let title = title.map(str::to_string).unwrap_or_else(|| {
        status_display_name(&task.replace('-', "_"))
    });

    let mut metadata = Metadata::new();
    set_meta(&mut metadata, "id", task);
    set_meta(&mut metadata, "slug", task);
    set_meta(&mut metadata, "title", title.trim());
    set_meta(&mut metadata, "status", status.as_str());
    set_meta(&mut metadata, "priority", priority);
    set_meta(&mut metadata, "created", iso.as_str());
    set_meta(&mut metadata, "updated", iso.as_str());
    set_meta(&mut metadata, "author", author_meta(author));
    set_meta(&mut metadata, "summary", summary);

    let body = render_overview_body(
        &DEFAULT_OVERVIEW_SECTIONS.map(String::from),
        &|heading| {
            if heading == "Status" && !summary.is_empty() {
                summary.to_string()
            } else {
                String::new()
            }
        },
    );
    let content = document::compose(&metadata, &body)?;
    let overview_path = task_dir.join("OVERVIEW.md");

    let mut plan = Plan::new(task_context(project, task, "create", bucket));
    plan.ensure_dir(&task_dir);
    plan.push_write(Write {
        path: overview_path.clone(),
        content,
        policy: WritePolicy::WriteOnce,
        event: WriteEvent::Created,
        doc_type: "overview".to_string(),
        timestamp: now,
        metadata: metadata.clone(),
    });

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &task_dir.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "project": project,
        "task": task,
        "status": status,
        "path": overview_path.to_string_lossy(),
        "receipt": receipt.to_value(),
    }))
}

/// Status transition saga: ensure target dir, move the task directory into
/// its new bucket, rewrite the overview with the new status (plus a "Status
/// Updates" entry when a reason is given), and append the transition to
/// today's backlog. Stops at the first failing plan; committed steps stay.
#[allow(clippy::too_many_arguments)]
pub fn update_status(
    store: &Store,
    project: &str,
    task: &str,
    target_status: &str,
    reason: &str,
    force: bool,
    author: &str,
) -> Result<serde_json::Value, SagaError> {
    let bare = |e: PlanfsError| SagaError {
        error: e,
        journal: Vec::new(),
    };

    let target_status = normalize_status(target_status).map_err(bare)?;
    let current_dir = find_task_dir(store, project, task).map_err(bare)?;
    let bucket = current_bucket(store, project, &current_dir);

    let (mut metadata, body, _) = load_overview(&current_dir).map_err(bare)?;
    let bucket_status = match bucket.as_str() {
        PENDING_BUCKET => "queued",
        COMPLETED_BUCKET => "finished_succeeded",
        _ => "running",
    };
    let current_status = document::meta_str(&metadata, "status")
        .unwrap_or(bucket_status)
        .to_string();

    let reason = reason.trim();
    if current_status == target_status && !force && reason.is_empty() {
        return Err(bare(PlanfsError::ValidationError(format!(
            "task '{project}/{task}' already in status '{current_status}'"
        ))));
    }

    let tasks_root = store.tasks_root(project);
    let target_bucket = status_bucket(&target_status).unwrap_or("");
    let target_dir = if target_bucket.is_empty() {
        tasks_root.join(task)
    } else {
        tasks_root.join(target_bucket).join(task)
    };
    let move_required = current_dir != target_dir;

    let now = time::now_utc();
    let iso = time::iso_z(now);

    let mut saga = Saga::new();

    // Plan 1: bucket move. No-op plan when the bucket is unchanged.
    if move_required {
        let mut move_plan = Plan::new(
            task_context(project, task, "update-status", target_bucket).selector("step", "move"),
        );
        if let Some(parent) = target_dir.parent() {
            move_plan.ensure_dir(parent);
        }
        move_plan.push_move(&current_dir, &target_dir, false);
        saga.try_apply(&move_plan)?;
    }

    // Plan 2: overview rewrite, built against the document the move just
    // relocated. Status lives in metadata, so even if this plan fails the
    // prior state remains readable from the overview itself.
    set_meta_default(&mut metadata, "id", task);
    set_meta_default(&mut metadata, "slug", task);
    set_meta_default(&mut metadata, "title", status_display_name(&task.replace('-', "_")));
    set_meta_default(&mut metadata, "priority", "medium");
    set_meta(&mut metadata, "status", target_status.as_str());
    set_meta(&mut metadata, "updated", iso.as_str());
    set_meta(&mut metadata, "author", author_meta(author));
    if FINISHED_STATUSES.contains(&target_status.as_str()) {
        set_meta(&mut metadata, "completed", iso.as_str());
    }

    let mut body_text = body.trim_end().to_string();
    if !reason.is_empty() {
        let marker = "## Status Updates";
        let display = status_display_name(&target_status);
        if !body_text.contains(marker) {
            if body_text.is_empty() {
                body_text = format!("{marker}\n");
            } else {
                body_text = format!("{}\n\n{marker}\n", body_text.trim_end());
            }
        }
        body_text = format!(
            "{}\n- {iso} -> {display}: {reason}\n",
            body_text.trim_end()
        );
    } else if !body_text.is_empty() {
        body_text.push('\n');
    }

    let overview_path = target_dir.join("OVERVIEW.md");
    let updated_doc = document::compose(&metadata, &body_text).map_err(|e| saga.fail(e))?;
    let mut overview_plan = Plan::new(
        task_context(project, task, "update-status", target_bucket).selector("step", "overview"),
    );
    overview_plan.ensure_dir(&target_dir);
    let overview_event;
    if overview_path.exists() {
        let original_text = fs::read_to_string(&overview_path).map_err(|e| saga.fail(e.into()))?;
        match build_patch(
            &overview_path,
            &original_text,
            &updated_doc,
            "overview",
            now,
            WritePolicy::Modifiable,
            metadata.clone(),
            Some(format!("status {current_status}->{target_status}")),
            WriteEvent::Modified,
        ) {
            Some(patch) => {
                overview_plan.push_patch(patch);
                overview_event = "modified";
            }
            None => overview_event = "unchanged",
        }
    } else {
        overview_plan.push_write(Write {
            path: overview_path.clone(),
            content: updated_doc,
            policy: WritePolicy::Modifiable,
            event: WriteEvent::Created,
            doc_type: "overview".to_string(),
            timestamp: now,
            metadata: metadata.clone(),
        });
        overview_event = "created";
    }
    if !overview_plan.is_empty() {
        saga.try_apply(&overview_plan)?;
    }

    // Plan 3: backlog entry for the transition reason.
    let mut backlog_payload = serde_json::Value::Null;
    if !reason.is_empty() {
        let summary = format!("Status updated to {target_status}");
        let entry_line = format!(
            "- Status changed to {target_status} ({}). Reason: {reason}",
            status_display_name(&target_status)
        );
        let backlog_plan = build_backlog_plan(
            &target_dir,
            project,
            task,
            "update-status",
            target_bucket,
            &summary,
            &summary,
            &entry_line,
            author,
            now,
        )
        .map_err(|e| saga.fail(e))?;
        if !backlog_plan.is_empty() {
            saga.try_apply(&backlog_plan)?;
        }
        backlog_payload = json!({
            "summary": summary,
            "body": entry_line,
            "dir": target_dir.join("backlog").to_string_lossy(),
        });
    }

    let journal = saga
        .commit_journal(&target_dir.join("journal.jsonl"))
        .map_err(|e| saga.fail(e))?;

    Ok(json!({
        "project": project,
        "task": task,
        "previous_status": current_status,
        "new_status": target_status,
        "move_required": move_required,
        "overview_event": overview_event,
        "from_path": current_dir.to_string_lossy(),
        "to_path": target_dir.to_string_lossy(),
        "backlog": backlog_payload,
        "receipts": saga.receipts().iter().map(|r| r.to_value()).collect::<Vec<_>>(),
        "journal": journal,
        "timestamp": iso,
    }))
}

/// Build the per-day backlog AppendEntry plan. The entry is `[iso]` stamped;
/// composing an identical document collapses to an `unchanged` no-op.
#[allow(clippy::too_many_arguments)]
fn build_backlog_plan(
    task_dir: &Path,
    project: &str,
    task: &str,
    function: &str,
    bucket: &str,
    title: &str,
    summary: &str,
    entry_body: &str,
    author: &str,
    now: DateTime<Utc>,
) -> Result<Plan, PlanfsError> {
    let iso = time::iso_z(now);
    let date = time::date_stamp(now);
    let backlog_dir = task_dir.join("backlog");
    let target = backlog_dir.join(format!("{date}.md"));
    let addition = format!("[{iso}]\n{}\n", entry_body.trim_end());

    let mut plan = Plan::new(task_context(project, task, function, bucket).selector("step", "backlog"));
    plan.ensure_dir(&backlog_dir);

    if !target.exists() {
        let mut metadata = Metadata::new();
        set_meta(&mut metadata, "id", time::new_doc_id().as_str());
        set_meta(&mut metadata, "title", title.trim());
        set_meta(&mut metadata, "slug", format!("{task}-backlog-{date}").as_str());
        set_meta(&mut metadata, "created", iso.as_str());
        set_meta(&mut metadata, "updated", iso.as_str());
        set_meta(&mut metadata, "author", author_meta(author));
        set_meta(&mut metadata, "summary", summary);
        let content = document::compose(&metadata, &addition)?;
        plan.push_write(Write {
            path: target,
            content,
            policy: WritePolicy::AppendEntry,
            event: WriteEvent::Created,
            doc_type: "backlog".to_string(),
            timestamp: now,
            metadata,
        });
        return Ok(plan);
    }

    let original_text = fs::read_to_string(&target)?;
    let parsed = document::parse(&original_text);
    let mut metadata = parsed.metadata.clone();
    set_meta_default(&mut metadata, "id", time::new_doc_id().as_str());
    set_meta_default(&mut metadata, "title", title.trim());
    set_meta(&mut metadata, "slug", format!("{task}-backlog-{date}").as_str());
    set_meta(&mut metadata, "author", author_meta(author));
    if !summary.is_empty() {
        set_meta(&mut metadata, "summary", summary);
    } else {
        set_meta_default(&mut metadata, "summary", "");
    }

    let combined = merge_body(&parsed.body, &addition);
    let provisional = document::compose(&metadata, &combined)?;
    if provisional == original_text {
        return Ok(plan); // unchanged; no instruction emitted
    }

    set_meta(&mut metadata, "updated", iso.as_str());
    let updated_doc = document::compose(&metadata, &combined)?;
    let summary_text = if summary.is_empty() {
        entry_body.lines().next().unwrap_or_default().to_string()
    } else {
        summary.to_string()
    };
    if let Some(patch) = build_patch(
        &target,
        &original_text,
        &updated_doc,
        "backlog",
        now,
        WritePolicy::AppendEntry,
        metadata,
        Some(summary_text),
        WriteEvent::Appended,
    ) {
        plan.push_patch(patch);
    }
    Ok(plan)
}

#[allow(clippy::too_many_arguments)]
pub fn task_document(
    store: &Store,
    project: &str,
    task: &str,
    subdir: &str,
    doc_type: &str,
    title: &str,
    slug: Option<&str>,
    summary: &str,
    content: &str,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let task_dir = find_task_dir(store, project, task)?;
    let bucket = current_bucket(store, project, &task_dir);
    let now = time::now_utc();
    let iso = time::iso_z(now);

    let resolved_slug = slug
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(title));
    let filename = format!("{}-{resolved_slug}.md", iso.replace(':', "-"));
    let target = task_dir.join(subdir).join(&filename);

    let mut metadata = Metadata::new();
    set_meta(&mut metadata, "id", time::new_doc_id().as_str());
    set_meta(&mut metadata, "title", title.trim());
    set_meta(&mut metadata, "slug", resolved_slug.as_str());
    set_meta(&mut metadata, "created", iso.as_str());
    set_meta(&mut metadata, "updated", iso.as_str());
    set_meta(&mut metadata, "author", author_meta(author));
    set_meta(&mut metadata, "summary", summary);
    if doc_type == "design" {
        set_meta(&mut metadata, "version", "0.0.0");
    }

    let text = document::compose(&metadata, content)?;
    let mut plan = Plan::new(task_context(project, task, doc_type, &bucket));
    plan.ensure_dir(target.parent().unwrap_or(&task_dir));
    plan.push_write(Write {
        path: target.clone(),
        content: text,
        policy: WritePolicy::WriteOnce,
        event: WriteEvent::Created,
        doc_type: doc_type.to_string(),
        timestamp: now,
        metadata: metadata.clone(),
    });

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &task_dir.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "project": project,
        "task": task,
        "doc_type": doc_type,
        "path": target.to_string_lossy(),
        "slug": resolved_slug,
        "title": title.trim(),
        "created": iso,
        "receipt": receipt.to_value(),
    }))
}

#[allow(clippy::too_many_arguments)]
pub fn task_backlog(
    store: &Store,
    project: &str,
    task: &str,
    title: &str,
    summary: &str,
    content: &str,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let task_dir = find_task_dir(store, project, task)?;
    let bucket = current_bucket(store, project, &task_dir);
    let now = time::now_utc();
    let date = time::date_stamp(now);

    let entry_body = if !content.is_empty() {
        content.to_string()
    } else if !summary.is_empty() {
        summary.to_string()
    } else {
        "- backlog entry".to_string()
    };
    let title = if title.is_empty() {
        format!("{task} backlog {date}")
    } else {
        title.to_string()
    };

    let plan = build_backlog_plan(
        &task_dir, project, task, "backlog", &bucket, &title, summary, &entry_body, author, now,
    )?;
    let event = if plan.writes.is_empty() && plan.patches.is_empty() {
        "unchanged"
    } else if plan.writes.is_empty() {
        "appended"
    } else {
        "created"
    };

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &task_dir.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "project": project,
        "task": task,
        "doc_type": "backlog",
        "path": task_dir.join("backlog").join(format!("{date}.md")).to_string_lossy(),
        "event": event,
        "receipt": receipt.to_value(),
    }))
}

// ---- overview section handling ----

fn canonical_heading(name: &str) -> String {
    let base = name.split(':').next().unwrap_or(name).trim();
    match base.to_lowercase().as_str() {
        "status" => "Status".to_string(),
        "objectives" => "Objectives".to_string(),
        "next steps" => "Next Steps".to_string(),
        _ => base.to_string(),
    }
}

fn parse_heading_line(line: &str) -> Option<(String, Option<String>)> {
    let stripped = line.trim();
    let candidate = stripped.strip_prefix("##")?.trim();
    match candidate.split_once(':') {
        Some((head, rest)) => Some((canonical_heading(head), Some(rest.trim().to_string()))),
        None => Some((canonical_heading(candidate), None)),
    }
}

fn flush_section(
    heading: Option<String>,
    buffer: &mut Vec<String>,
    order: &mut Vec<String>,
    sections: &mut std::collections::BTreeMap<String, String>,
) {
    if let Some(heading) = heading {
        let content = buffer.join("\n").trim_matches('\n').to_string();
        if !order.contains(&heading) {
            order.push(heading.clone());
        }
        sections.insert(heading, content);
    }
    buffer.clear();
}

/// Split a body into ordered `## Heading` sections. Preface text before the
/// first heading lands in Status; timestamped log lines (`[2026-...]`) are
/// left out of section capture so status-update history is not re-merged.
fn collect_body_sections(body: &str) -> (Vec<String>, impl Fn(&str) -> String) {
    let stamp_re = Regex::new(r"^\[\d{4}-\d{2}-\d{2}T").unwrap();
    let mut order: Vec<String> = Vec::new();
    let mut sections: std::collections::BTreeMap<String, String> = Default::default();
    let mut current: Option<String> = None;
    let mut buffer: Vec<String> = Vec::new();
    let mut preface: Vec<String> = Vec::new();

    for line in body.lines() {
        if stamp_re.is_match(line.trim()) {
            if current.is_some() {
                flush_section(current.take(), &mut buffer, &mut order, &mut sections);
            }
            continue;
        }
        if let Some((heading, inline)) = parse_heading_line(line) {
            if current.is_none() && !preface.is_empty() {
                let content = preface.join("\n").trim_matches('\n').to_string();
                if !content.is_empty() {
                    order.push("Status".to_string());
                    sections.insert("Status".to_string(), content);
                }
                preface.clear();
            }
            flush_section(current.take(), &mut buffer, &mut order, &mut sections);
            current = Some(heading);
            if let Some(text) = inline {
                if !text.is_empty() {
                    buffer.push(text);
                }
            }
            continue;
        }
        if current.is_none() {
            preface.push(line.to_string());
        } else {
            buffer.push(line.to_string());
        }
    }
    if current.is_none() && !preface.is_empty() {
        let content = preface.join("\n").trim_matches('\n').to_string();
        if !content.is_empty() && !order.contains(&"Status".to_string()) {
            order.push("Status".to_string());
            sections.insert("Status".to_string(), content);
        }
    }
    flush_section(current.take(), &mut buffer, &mut order, &mut sections);

    let lookup = move |heading: &str| sections.get(heading).cloned().unwrap_or_default();
    (order, lookup)
}

fn render_overview_body(order: &[String], lookup: &dyn Fn(&str) -> String) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for heading in order {
        let body = lookup(heading);
        if body.is_empty() {
            blocks.push(format!("## {heading}"));
        } else {
            blocks.push(format!("## {heading}\n{}", body.trim_end()));
        }
    }
    let rendered = blocks.join("\n\n").trim_end().to_string();
    if rendered.is_empty() {
        rendered
    } else {
        format!("{rendered}\n")
    }
}

fn canonical_section_order(existing: &[String], updates: &[String]) -> Vec<String> {
    let mut ordered: Vec<String> = DEFAULT_OVERVIEW_SECTIONS.map(String::from).to_vec();
    for heading in existing.iter().chain(updates) {
        if !ordered.contains(heading) {
            ordered.push(heading.clone());
        }
    }
    ordered
}

fn parse_overview_updates(content: &str) -> Vec<(String, String)> {
    let text = content.trim_matches('\n');
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut order: Vec<String> = Vec::new();
    let mut sections: std::collections::BTreeMap<String, String> = Default::default();
    let mut current: Option<String> = None;
    let mut buffer: Vec<String> = Vec::new();

    for line in text.lines() {
        if let Some((heading, inline)) = parse_heading_line(line) {
            flush_section(current.take(), &mut buffer, &mut order, &mut sections);
            current = Some(heading);
            if let Some(text) = inline {
                if !text.is_empty() {
                    buffer.push(text);
                }
            }
            continue;
        }
        if current.is_none() {
            current = Some("Status".to_string());
        }
        buffer.push(line.to_string());
    }
    flush_section(current.take(), &mut buffer, &mut order, &mut sections);

    order
        .into_iter()
        .map(|h| {
            let body = sections.get(&h).cloned().unwrap_or_default();
            (h, body)
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub fn task_overview(
    store: &Store,
    project: &str,
    task: &str,
    title: &str,
    summary: &str,
    content: &str,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let task_dir = find_task_dir(store, project, task)?;
    let bucket = current_bucket(store, project, &task_dir);
    let path = task_dir.join("OVERVIEW.md");
    let now = time::now_utc();
    let iso = time::iso_z(now);
    let title = if title.is_empty() { task } else { title };
    let resolved_slug = slugify(title);

    let mut plan = Plan::new(task_context(project, task, "overview", &bucket));
    plan.ensure_dir(&task_dir);

    let updates = parse_overview_updates(content);
    let update_headings: Vec<String> = updates.iter().map(|(h, _)| h.clone()).collect();
    let event;

    if !path.exists() {
        let mut metadata = Metadata::new();
        set_meta(&mut metadata, "id", time::new_doc_id().as_str());
        set_meta(&mut metadata, "title", title.trim());
        set_meta(&mut metadata, "slug", resolved_slug.as_str());
        set_meta(&mut metadata, "created", iso.as_str());
        set_meta(&mut metadata, "updated", iso.as_str());
        set_meta(&mut metadata, "author", author_meta(author));
        set_meta(&mut metadata, "summary", summary);

        let order = canonical_section_order(&[], &update_headings);
        let updates_map: std::collections::BTreeMap<String, String> =
            updates.into_iter().collect();
        let default_status = content.trim_matches('\n').to_string();
        let body = render_overview_body(&order, &|heading| {
            if let Some(update) = updates_map.get(heading) {
                update.trim_end().to_string()
            } else if heading == "Status" && updates_map.is_empty() && !default_status.is_empty() {
                default_status.clone()
            } else if heading == "Status" && default_status.is_empty() && !summary.is_empty() {
                summary.trim().to_string()
            } else {
                String::new()
            }
        });
        let text = document::compose(&metadata, &body)?;
        plan.push_write(Write {
            path: path.clone(),
            content: text,
            policy: WritePolicy::Modifiable,
            event: WriteEvent::Created,
            doc_type: "overview".to_string(),
            timestamp: now,
            metadata,
        });
        event = "created";
    } else {
        let original_text = fs::read_to_string(&path)?;
        let parsed = document::parse(&original_text);
        let mut metadata = parsed.metadata.clone();
        set_meta_default(&mut metadata, "id", time::new_doc_id().as_str());
        set_meta_default(&mut metadata, "title", title.trim());
        set_meta(&mut metadata, "slug", resolved_slug.as_str());
        set_meta(&mut metadata, "author", author_meta(author));
        if !summary.is_empty() {
            set_meta(&mut metadata, "summary", summary);
        } else {
            set_meta_default(&mut metadata, "summary", "");
        }

        let (existing_order, existing_lookup) = collect_body_sections(&parsed.body);
        let order = canonical_section_order(&existing_order, &update_headings);
        let updates_map: std::collections::BTreeMap<String, String> =
            updates.into_iter().collect();
        let body = render_overview_body(&order, &|heading| {
            if let Some(update) = updates_map.get(heading) {
                update.trim_end().to_string()
            } else {
                existing_lookup(heading)
            }
        });

        let provisional = document::compose(&metadata, &body)?;
        if provisional == original_text {
            event = "unchanged";
        } else {
            set_meta(&mut metadata, "updated", iso.as_str());
            let updated_doc = document::compose(&metadata, &body)?;
            let summary_text = if summary.is_empty() {
                format!("Updated overview for {task}")
            } else {
                summary.to_string()
            };
            match build_patch(
                &path,
                &original_text,
                &updated_doc,
                "overview",
                now,
                WritePolicy::Modifiable,
                metadata,
                Some(summary_text),
                WriteEvent::Modified,
            ) {
                Some(patch) => {
                    plan.push_patch(patch);
                    event = "modified";
                }
                None => event = "unchanged",
            }
        }
    }

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &task_dir.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "project": project,
        "task": task,
        "doc_type": "overview",
        "path": path.to_string_lossy(),
        "event": event,
        "receipt": receipt.to_value(),
    }))
}

pub fn list_tasks(
    store: &Store,
    project: &str,
    status_filter: Option<&str>,
) -> Result<serde_json::Value, PlanfsError> {
    let tasks_root = store.tasks_root(project);
    if !tasks_root.exists() {
        return Err(PlanfsError::NotFound(format!(
            "project '{project}' has no tasks directory"
        )));
    }
    let filter = match status_filter {
        Some(value) => Some(normalize_status(value)?),
        None => None,
    };

    let mut entries = Vec::new();
    let mut roots = vec![(tasks_root.clone(), String::new())];
    for bucket in [PENDING_BUCKET, COMPLETED_BUCKET] {
        let dir = tasks_root.join(bucket);
        if dir.exists() {
            roots.push((dir, bucket.to_string()));
        }
    }

    for (root, bucket) in roots {
        for entry in fs::read_dir(&root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name == PENDING_BUCKET || name == COMPLETED_BUCKET || name.starts_with('.') {
                continue;
            }
            let (metadata, _, _) = load_overview(&path)?;
            // The metadata field is authoritative; fall back to the bucket
            // only for tasks that predate status metadata.
            let status = document::meta_str(&metadata, "status")
                .map(str::to_string)
                .unwrap_or_else(|| match bucket.as_str() {
                    PENDING_BUCKET => "queued".to_string(),
                    COMPLETED_BUCKET => "finished_succeeded".to_string(),
                    _ => "running".to_string(),
                });
            if let Some(wanted) = &filter {
                if &status != wanted {
                    continue;
                }
            }
            entries.push(json!({
                "project": project,
                "task": name,
                "status": status,
                "title": document::meta_str(&metadata, "title"),
                "priority": document::meta_str(&metadata, "priority"),
                "updated": document::meta_str(&metadata, "updated"),
                "bucket": bucket,
                "path": path.to_string_lossy(),
            }));
        }
    }

    entries.sort_by(|a, b| {
        a["task"]
            .as_str()
            .unwrap_or_default()
            .cmp(b["task"].as_str().unwrap_or_default())
    });
    Ok(json!({ "tasks": entries }))
}
