//! Agent-thread memory: a mutable working-memory document plus an accretive
//! episodic log, one write-once file per entry.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

use crate::core::document::{self, set_meta, set_meta_default, Metadata};
use crate::core::error::PlanfsError;
use crate::core::executor::apply_plan;
use crate::core::plan::{Context, Plan, Write, WriteEvent, WritePolicy};
use crate::core::store::Store;
use crate::core::time;

#[derive(Parser, Debug)]
#[clap(name = "memory", about = "Agent-thread working memory and episodic log.")]
pub struct MemoryCli {
    #[clap(subcommand)]
    command: MemoryCommand,
}

#[derive(Subcommand, Debug)]
pub enum MemoryCommand {
    /// Replace the thread's working memory document.
    WriteWorking {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
        #[clap(long)]
        content: String,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// Append a new episodic entry (one immutable file per entry).
    AppendEpisodic {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
        #[clap(long)]
        title: String,
        #[clap(long)]
        content: String,
        #[clap(long)]
        session_type: Option<String>,
        #[clap(long)]
        significance: Option<String>,
        #[clap(long, default_value = "planfs")]
        author: String,
    },
    /// List episodic entries, newest first.
    History {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
        #[clap(long, default_value = "20")]
        limit: usize,
    },
    /// Working-memory presence plus recent episodic summary.
    Status {
        #[clap(long)]
        agent: String,
        #[clap(long)]
        process: String,
        #[clap(long)]
        thread: String,
        #[clap(long, default_value = "5")]
        limit: usize,
    },
}

pub fn run_memory_cli(store: &Store, cli: MemoryCli) -> Result<serde_json::Value, PlanfsError> {
    match cli.command {
        MemoryCommand::WriteWorking {
            agent,
            process,
            thread,
            content,
            author,
        } => write_working(store, &agent, &process, &thread, &content, &author),
        MemoryCommand::AppendEpisodic {
            agent,
            process,
            thread,
            title,
            content,
            session_type,
            significance,
            author,
        } => append_episodic(
            store,
            &agent,
            &process,
            &thread,
            &title,
            &content,
            session_type.as_deref(),
            significance.as_deref(),
            &author,
        ),
        MemoryCommand::History {
            agent,
            process,
            thread,
            limit,
        } => history(store, &agent, &process, &thread, limit),
        MemoryCommand::Status {
            agent,
            process,
            thread,
            limit,
        } => status(store, &agent, &process, &thread, limit),
    }
}

fn memory_context(function: &str, agent: &str, process: &str, thread: &str) -> Context {
    Context::new("agent-thread-memory", function)
        .selector("agent", agent)
        .selector("process", process)
        .selector("thread", thread)
}

pub fn write_working(
    store: &Store,
    agent: &str,
    process: &str,
    thread: &str,
    content: &str,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let thread_root = store.thread_memory_dir(agent, process, thread);
    let working_path = thread_root.join("working_memory.md");
    let now = time::now_utc();
    let iso = time::iso_z(now);

    let mut metadata = if working_path.exists() {
        document::parse(&fs::read_to_string(&working_path)?).metadata
    } else {
        Metadata::new()
    };
    set_meta_default(
        &mut metadata,
        "id",
        format!("working-memory-{thread}-{process}").as_str(),
    );
    let mut author_map = Metadata::new();
    set_meta(&mut author_map, "name", author);
    set_meta(&mut metadata, "author", serde_yaml::Value::Mapping(author_map));
    set_meta(&mut metadata, "updated", iso.as_str());
    set_meta_default(&mut metadata, "created", iso.as_str());

    let text = document::compose(&metadata, content)?;
    let mut plan = Plan::new(memory_context("write-working", agent, process, thread));
    plan.ensure_dir(&thread_root);
    plan.push_write(Write {
        path: working_path.clone(),
        content: text,
        policy: WritePolicy::Modifiable,
        event: if working_path.exists() {
            WriteEvent::Modified
        } else {
            WriteEvent::Created
        },
        doc_type: "working-memory".to_string(),
        timestamp: now,
        metadata,
    });

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &thread_root.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "agent": agent,
        "process": process,
        "thread": thread,
        "path": working_path.to_string_lossy(),
        "updated": iso,
        "receipt": receipt.to_value(),
    }))
}

#[allow(clippy::too_many_arguments)]
pub fn append_episodic(
    store: &Store,
    agent: &str,
    process: &str,
    thread: &str,
    title: &str,
    content: &str,
    session_type: Option<&str>,
    significance: Option<&str>,
    author: &str,
) -> Result<serde_json::Value, PlanfsError> {
    let thread_root = store.thread_memory_dir(agent, process, thread);
    let episodic_dir = thread_root.join("episodic");
    let now = time::now_utc();
    let stamp = time::file_stamp(now);
    let safe_title = {
        let slug = crate::objects::task::slugify(title);
        if slug == "untitled" {
            "entry".to_string()
        } else {
            slug
        }
    };
    let filename = format!("{stamp}-{safe_title}.md");
    let path = episodic_dir.join(&filename);

    let mut metadata = Metadata::new();
    set_meta(
        &mut metadata,
        "id",
        format!("episodic-{thread}-{stamp}-{safe_title}").as_str(),
    );
    let mut author_map = Metadata::new();
    set_meta(&mut author_map, "name", author);
    set_meta(&mut metadata, "author", serde_yaml::Value::Mapping(author_map));
    set_meta(&mut metadata, "title", title.trim());
    set_meta(&mut metadata, "timestamp", time::iso_z(now).as_str());
    if let Some(session_type) = session_type {
        set_meta(&mut metadata, "session_type", session_type);
    }
    if let Some(significance) = significance {
        set_meta(&mut metadata, "significance", significance);
    }

    let text = document::compose(&metadata, content)?;
    let mut plan = Plan::new(memory_context("append-episodic", agent, process, thread));
    plan.ensure_dir(&episodic_dir);
    plan.push_write(Write {
        path: path.clone(),
        content: text,
        policy: WritePolicy::WriteOnce,
        event: WriteEvent::Created,
        doc_type: "episodic-entry".to_string(),
        timestamp: now,
        metadata,
    });

    let receipt = apply_plan(&plan)?;
    crate::core::receipt::append_journal(
        &thread_root.join("journal.jsonl"),
        &receipt.journal_entries(),
    )?;

    Ok(json!({
        "agent": agent,
        "process": process,
        "thread": thread,
        "path": path.to_string_lossy(),
        "title": title.trim(),
        "timestamp": time::iso_z(now),
        "receipt": receipt.to_value(),
    }))
}

fn episodic_files(episodic_dir: &PathBuf) -> Result<Vec<PathBuf>, PlanfsError> {
    let mut files = Vec::new();
    if !episodic_dir.exists() {
        return Ok(files);
    }
    for entry in fs::read_dir(episodic_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    // Filenames start with a sortable stamp, so name order is time order.
    files.sort();
    files.reverse();
    Ok(files)
}

pub fn history(
    store: &Store,
    agent: &str,
    process: &str,
    thread: &str,
    limit: usize,
) -> Result<serde_json::Value, PlanfsError> {
    let episodic_dir = store
        .thread_memory_dir(agent, process, thread)
        .join("episodic");
    let mut entries = Vec::new();
    for path in episodic_files(&episodic_dir)?.into_iter().take(limit) {
        let parsed = document::parse(&fs::read_to_string(&path)?);
        entries.push(json!({
            "path": path.to_string_lossy(),
            "id": document::meta_str(&parsed.metadata, "id"),
            "title": document::meta_str(&parsed.metadata, "title"),
            "timestamp": document::meta_str(&parsed.metadata, "timestamp"),
            "session_type": document::meta_str(&parsed.metadata, "session_type"),
            "significance": document::meta_str(&parsed.metadata, "significance"),
            "body": parsed.body,
        }));
    }
    Ok(json!({
        "agent": agent,
        "process": process,
        "thread": thread,
        "entries": entries,
    }))
}

pub fn status(
    store: &Store,
    agent: &str,
    process: &str,
    thread: &str,
    limit: usize,
) -> Result<serde_json::Value, PlanfsError> {
    let thread_root = store.thread_memory_dir(agent, process, thread);
    let working_path = thread_root.join("working_memory.md");
    let working = if working_path.exists() {
        let parsed = document::parse(&fs::read_to_string(&working_path)?);
        json!({
            "path": working_path.to_string_lossy(),
            "updated": document::meta_str(&parsed.metadata, "updated"),
            "bytes": parsed.body.len(),
        })
    } else {
        serde_json::Value::Null
    };

    let episodic_dir = thread_root.join("episodic");
    let files = episodic_files(&episodic_dir)?;
    let recent: Vec<serde_json::Value> = files
        .iter()
        .take(limit)
        .map(|p| json!(p.file_name().map(|n| n.to_string_lossy().to_string())))
        .collect();

    Ok(json!({
        "agent": agent,
        "process": process,
        "thread": thread,
        "working_memory": working,
        "episodic_count": files.len(),
        "recent": recent,
    }))
}
