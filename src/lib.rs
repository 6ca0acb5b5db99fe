//! Planfs: a filesystem-native state plane for agent runtime objects.
//!
//! **Planfs is a daemonless, local-first document store that agents call on
//! demand.** Tasks, thread memory, terminals, and participant manifests live
//! as plain documents (YAML frontmatter + Markdown, or pretty JSON) on one
//! filesystem. There is no database and no transaction manager.
//!
//! # Core Principles
//!
//! - **Plan first**: every mutation is built as a pure-data operation plan
//!   before anything touches disk
//! - **Receipts, not logs**: applying a plan yields a structured receipt;
//!   receipts flatten into append-only journals
//! - **Minimal edits**: mutable documents change via unified-diff patches,
//!   so the audit trail records *what* changed
//! - **Sagas over transactions**: multi-document workflows stop on first
//!   failure and surface the partial journal; nothing is rolled back
//!
//! # Architecture
//!
//! - [`core`]: document codec, diff engine, plan model, executor, receipts,
//!   saga composer
//! - [`objects`]: task, memory, thread, and terminal handlers built on the
//!   core
//!
//! # Examples
//!
//! ```bash
//! # Initialize a workspace
//! planfs init
//!
//! # Create a task and move it through its lifecycle
//! planfs task create --project demo --task first-task
//! planfs task update-status --project demo --task first-task --status running --reason "picked up"
//!
//! # Append to a thread's episodic memory
//! planfs memory append-episodic --agent a1 --process main --thread t1 \
//!     --title "Session recap" --content "..."
//! ```

pub mod core;
pub mod objects;

use crate::core::error::PlanfsError;
use crate::core::receipt;
use crate::core::store::Store;
use crate::objects::{memory, task, terminal, thread};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(
    name = "planfs",
    version = env!("CARGO_PKG_VERSION"),
    about = "Planfs is the daemonless, filesystem-native state plane for agent runtime objects: declarative operation plans, audited receipts, and saga-composed workflows over plain documents. 🦀"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a Planfs workspace in the current directory
    #[clap(name = "init", visible_alias = "i")]
    Init {
        /// Directory to initialize (defaults to current working directory).
        #[clap(short, long)]
        dir: Option<PathBuf>,
    },
    /// Task documents and status transitions
    #[clap(name = "task", visible_alias = "t")]
    Task(task::TaskCli),
    /// Agent-thread working memory and episodic log
    #[clap(name = "memory", visible_alias = "m")]
    Memory(memory::MemoryCli),
    /// Runtime thread scaffolds, participants, login
    #[clap(name = "thread")]
    Thread(thread::ThreadCli),
    /// Terminal descriptors and session bindings
    #[clap(name = "terminal")]
    Terminal(terminal::TerminalCli),
    /// Render a task or thread journal
    #[clap(name = "journal", visible_alias = "j")]
    Journal(JournalCli),
    /// Show version information
    #[clap(name = "version")]
    Version,
}

#[derive(clap::Args, Debug)]
struct JournalCli {
    /// Project slug (with --task).
    #[clap(long)]
    project: Option<String>,
    /// Task slug (with --project).
    #[clap(long)]
    task: Option<String>,
    /// Process slug (with --thread).
    #[clap(long)]
    process: Option<String>,
    /// Thread slug (with --process).
    #[clap(long)]
    thread: Option<String>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
    /// Limit to the N most recent entries.
    #[clap(long, default_value = "100")]
    limit: usize,
}

fn find_workspace_root(start_dir: &Path) -> Result<PathBuf, PlanfsError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(".planfs").exists() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(PlanfsError::NotFound(
                "'.planfs' directory not found in current or parent directories. Run `planfs init` first.".to_string(),
            ));
        }
    }
}

fn run_init(dir: Option<PathBuf>) -> Result<(), PlanfsError> {
    let target_dir = match dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };
    let target_dir = std::fs::canonicalize(&target_dir)?;
    let data_root = target_dir.join(".planfs").join("data");

    if data_root.exists() {
        println!(
            "{} Workspace already initialized at {}",
            "✓".bright_green(),
            data_root.display()
        );
        return Ok(());
    }

    std::fs::create_dir_all(&data_root)?;
    for subdir in ["projects", "agents", "runtime"] {
        std::fs::create_dir_all(data_root.join(subdir))?;
    }

    println!("{}", "PLANFS WORKSPACE INITIALIZED".bright_cyan().bold());
    println!();
    println!("  {} {}", "●".bright_green(), "projects/".bright_white());
    println!("  {} {}", "●".bright_green(), "agents/".bright_white());
    println!("  {} {}", "●".bright_green(), "runtime/".bright_white());
    println!();
    println!(
        "  {} Store root: {}",
        "▸".bright_cyan(),
        data_root.display()
    );
    Ok(())
}

fn run_journal(store: &Store, cli: JournalCli) -> Result<(), PlanfsError> {
    let journal_path = match (&cli.project, &cli.task, &cli.process, &cli.thread) {
        (Some(project), Some(task), None, None) => {
            task::find_task_dir(store, project, task)?.join("journal.jsonl")
        }
        (None, None, Some(process), Some(thread)) => {
            store.thread_runtime_dir(process, thread).join("journal.jsonl")
        }
        _ => {
            return Err(PlanfsError::ValidationError(
                "pass either --project with --task, or --process with --thread".to_string(),
            ))
        }
    };

    let entries = receipt::read_journal(&journal_path)?;
    let shown: Vec<_> = entries
        .iter()
        .rev()
        .take(cli.limit)
        .rev()
        .cloned()
        .collect();

    if cli.format == "json" {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    println!("{}", "JOURNAL".bright_cyan().bold());
    println!("{}", journal_path.display().to_string().bright_black());
    println!();
    if shown.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    println!(
        "{:<22} {:<22} {:<10} {:<16} PATH",
        "TIME", "FUNCTION", "EVENT", "DOC TYPE"
    );
    for entry in &shown {
        println!(
            "{:<22} {:<22} {:<10} {:<16} {}",
            entry.timestamp,
            format!("{}.{}", entry.object_type, entry.function),
            entry.event,
            entry.doc_type,
            entry.path,
        );
    }
    Ok(())
}

pub fn run() -> Result<(), PlanfsError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init { dir } => run_init(dir),
        command => {
            let workspace_root = find_workspace_root(&current_dir)?;
            let store = Store::new(workspace_root.join(".planfs").join("data"));

            let payload = match command {
                Command::Task(task_cli) => task::run_task_cli(&store, task_cli)?,
                Command::Memory(memory_cli) => memory::run_memory_cli(&store, memory_cli)?,
                Command::Thread(thread_cli) => thread::run_thread_cli(&store, thread_cli)?,
                Command::Terminal(terminal_cli) => {
                    terminal::run_terminal_cli(&store, terminal_cli)?
                }
                Command::Journal(journal_cli) => {
                    run_journal(&store, journal_cli)?;
                    return Ok(());
                }
                Command::Init { .. } | Command::Version => unreachable!(),
            };

            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
    }
}
