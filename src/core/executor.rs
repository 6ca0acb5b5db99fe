//! Plan executor: turns a built Plan into filesystem state and a Receipt.
//!
//! Instructions run in a fixed order, each step a precondition for the next:
//! ensure dirs, moves, writes, patches. The first failing instruction aborts
//! the plan; instructions already applied are not rolled back. Retry safety is
//! the caller's job (idempotent content generation plus the WriteOnce
//! duplicate guard cover the common cases).

use std::fs;
use std::path::Path;

use crate::core::diff;
use crate::core::document;
use crate::core::error::PlanfsError;
use crate::core::plan::{Plan, PlanState, WriteEvent, WritePolicy};
use crate::core::receipt::{FsOp, Receipt};
use crate::core::time;

/// Write `content` to `path` via a temp file in the same directory followed
/// by an atomic rename, so readers never observe a half-written document.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), PlanfsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_name = format!(
        "{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string()),
        time::new_event_id()
    );
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Apply a plan and return the receipt of what actually happened.
pub fn apply_plan(plan: &Plan) -> Result<Receipt, PlanfsError> {
    apply_plan_opts(plan, false)
}

/// `dry_run` walks the same state machine but performs no mutation and
/// returns an empty receipt. The plan moves `Built -> Applying -> Applied`,
/// or `-> Failed` at the first erroring instruction.
pub fn apply_plan_opts(plan: &Plan, dry_run: bool) -> Result<Receipt, PlanfsError> {
    if dry_run {
        return Ok(Receipt::new(plan.context.clone(), Vec::new()));
    }

    let mut fs_ops: Vec<FsOp> = Vec::new();
    run_instructions(plan, &mut fs_ops)?;
    Ok(Receipt::with_state(
        plan.context.clone(),
        fs_ops,
        PlanState::Applied,
    ))
}

fn run_instructions(plan: &Plan, fs_ops: &mut Vec<FsOp>) -> Result<(), PlanfsError> {
    // Step 1: directories. Failure here aborts before any mutation below.
    for ensure in &plan.ensure_dirs {
        fs::create_dir_all(&ensure.path)?;
        fs_ops.push(FsOp::ensure(&ensure.path));
    }

    // Step 2: moves.
    for mv in &plan.moves {
        if !mv.src.exists() {
            return Err(PlanfsError::PlanValidationError(format!(
                "move source does not exist: {}",
                mv.src.display()
            )));
        }
        if mv.dest.exists() && !mv.overwrite {
            return Err(PlanfsError::PreconditionViolation(format!(
                "move destination already exists: {}",
                mv.dest.display()
            )));
        }
        if let Some(parent) = mv.dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&mv.src, &mv.dest)?;
        fs_ops.push(FsOp::moved(&mv.src, &mv.dest));
    }

    // Step 3: writes.
    for write in &plan.writes {
        if !write.policy.allows(write.event) {
            return Err(PlanfsError::PlanValidationError(format!(
                "event '{}' is not legal under policy {:?} for {}",
                write.event.as_str(),
                write.policy,
                write.path.display()
            )));
        }
        if write.policy == WritePolicy::WriteOnce && write.path.exists() {
            // Duplicate-creation race guard: the original bytes stay put.
            return Err(PlanfsError::PreconditionViolation(format!(
                "write-once target already exists: {}",
                write.path.display()
            )));
        }
        if write.event == WriteEvent::Unchanged {
            continue;
        }
        write_text_atomic(&write.path, &write.content)?;
        fs_ops.push(FsOp::write(write, document::content_hash(&write.content)));
    }

    // Step 4: patches. The file is re-read so the diff is verified against
    // current content, not against what the plan builder saw.
    for patch in &plan.patches {
        if !patch.path.exists() {
            return Err(PlanfsError::PlanValidationError(format!(
                "patch target does not exist: {}",
                patch.path.display()
            )));
        }
        let current = fs::read_to_string(&patch.path)?;
        let updated = diff::apply_unified(&current, &patch.diff, &patch.path.to_string_lossy())?;
        write_text_atomic(&patch.path, &updated)?;
        fs_ops.push(FsOp::patch(patch, document::content_hash(&updated)));
    }

    Ok(())
}
