//! Unified diff construction and application.
//!
//! Patches carry their own audit record: the diff text states exactly what
//! changed. Application verifies every context and removed line against the
//! on-disk base, so a document that drifted between plan build and plan apply
//! fails with a conflict instead of being silently clobbered.

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::core::document::Metadata;
use crate::core::error::PlanfsError;
use crate::core::plan::{Patch, WriteEvent, WritePolicy};

const CONTEXT_LINES: usize = 3;

/// Build a Patch describing the diff between two text blobs.
///
/// Returns `None` when the texts are equal, so callers skip emitting an
/// instruction entirely; this is what keeps repeated idempotent calls from
/// producing receipt entries.
#[allow(clippy::too_many_arguments)]
pub fn build_patch(
    path: &Path,
    original: &str,
    updated: &str,
    doc_type: &str,
    timestamp: DateTime<Utc>,
    policy: WritePolicy,
    metadata: Metadata,
    summary: Option<String>,
    event: WriteEvent,
) -> Option<Patch> {
    if original == updated {
        return None;
    }
    let diff = unified_diff(original, updated, &path.to_string_lossy());
    if diff.trim().is_empty() {
        return None;
    }
    Some(Patch {
        path: path.to_path_buf(),
        diff,
        policy,
        doc_type: doc_type.to_string(),
        timestamp,
        metadata,
        summary,
        event,
    })
}

fn split_keepends(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Opcode over line ranges: Equal/Delete/Insert/Replace, difflib-style.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Tag {
    Equal,
    Delete,
    Insert,
    Replace,
}

#[derive(Debug, Clone, Copy)]
struct OpCode {
    tag: Tag,
    a1: usize,
    a2: usize,
    b1: usize,
    b2: usize,
}

fn opcodes(a: &[&str], b: &[&str]) -> Vec<OpCode> {
    // Longest-common-subsequence table over lines. Documents here are small
    // (frontmatter + prose), so the quadratic table is fine.
    let n = a.len();
    let m = b.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            let (a1, b1) = (i, j);
            while i < n && j < m && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            ops.push(OpCode { tag: Tag::Equal, a1, a2: i, b1, b2: j });
        } else {
            let (a1, b1) = (i, j);
            while i < n && (j >= m || lcs[i + 1][j] >= lcs[i][j + 1]) {
                if j < m && a[i] == b[j] {
                    break;
                }
                i += 1;
            }
            while j < m && (i >= n || lcs[i][j + 1] > lcs[i + 1][j]) {
                if i < n && a[i] == b[j] {
                    break;
                }
                j += 1;
            }
            let tag = match (i > a1, j > b1) {
                (true, true) => Tag::Replace,
                (true, false) => Tag::Delete,
                (false, true) => Tag::Insert,
                (false, false) => break,
            };
            ops.push(OpCode { tag, a1, a2: i, b1, b2: j });
        }
    }
    ops
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push('\n');
    }
}

/// Standard unified diff with `--- path` / `+++ path` headers and three
/// context lines per hunk.
pub fn unified_diff(original: &str, updated: &str, path: &str) -> String {
    let a = split_keepends(original);
    let b = split_keepends(updated);
    let ops = opcodes(&a, &b);
    if ops.iter().all(|op| op.tag == Tag::Equal) {
        return String::new();
    }

    // Group opcodes into hunks separated by more than 2*CONTEXT equal lines.
    let mut hunks: Vec<Vec<OpCode>> = Vec::new();
    let mut current: Vec<OpCode> = Vec::new();
    for (idx, op) in ops.iter().enumerate() {
        if op.tag == Tag::Equal {
            let span = op.a2 - op.a1;
            if current.is_empty() {
                if span > CONTEXT_LINES {
                    let trimmed = OpCode {
                        a1: op.a2 - CONTEXT_LINES,
                        b1: op.b2 - CONTEXT_LINES,
                        ..*op
                    };
                    if idx + 1 < ops.len() {
                        current.push(trimmed);
                    }
                } else if idx + 1 < ops.len() {
                    current.push(*op);
                }
            } else if span > CONTEXT_LINES * 2 {
                current.push(OpCode {
                    a2: op.a1 + CONTEXT_LINES,
                    b2: op.b1 + CONTEXT_LINES,
                    ..*op
                });
                hunks.push(std::mem::take(&mut current));
                if idx + 1 < ops.len() {
                    current.push(OpCode {
                        a1: op.a2 - CONTEXT_LINES,
                        b1: op.b2 - CONTEXT_LINES,
                        ..*op
                    });
                }
            } else {
                current.push(*op);
            }
        } else {
            current.push(*op);
        }
    }
    if current.iter().any(|op| op.tag != Tag::Equal) {
        hunks.push(current);
    }

    let mut out = String::new();
    out.push_str(&format!("--- {path}\n"));
    out.push_str(&format!("+++ {path}\n"));

    for hunk in hunks {
        let a1 = hunk.first().map(|op| op.a1).unwrap_or(0);
        let a2 = hunk.last().map(|op| op.a2).unwrap_or(0);
        let b1 = hunk.first().map(|op| op.b1).unwrap_or(0);
        let b2 = hunk.last().map(|op| op.b2).unwrap_or(0);
        let a_len = a2 - a1;
        let b_len = b2 - b1;
        let a_start = if a_len == 0 { a1 } else { a1 + 1 };
        let b_start = if b_len == 0 { b1 } else { b1 + 1 };
        out.push_str(&format!("@@ -{a_start},{a_len} +{b_start},{b_len} @@\n"));

        for op in hunk {
            match op.tag {
                Tag::Equal => {
                    for line in &a[op.a1..op.a2] {
                        push_line(&mut out, ' ', line);
                    }
                }
                Tag::Delete => {
                    for line in &a[op.a1..op.a2] {
                        push_line(&mut out, '-', line);
                    }
                }
                Tag::Insert => {
                    for line in &b[op.b1..op.b2] {
                        push_line(&mut out, '+', line);
                    }
                }
                Tag::Replace => {
                    for line in &a[op.a1..op.a2] {
                        push_line(&mut out, '-', line);
                    }
                    for line in &b[op.b1..op.b2] {
                        push_line(&mut out, '+', line);
                    }
                }
            }
        }
    }
    out
}

fn conflict(path_hint: &str, detail: String) -> PlanfsError {
    PlanfsError::DiffConflictError(format!("{path_hint}: {detail}"))
}

/// Apply a unified diff to `original`, verifying every context/removed line
/// against the base text. Any mismatch means the on-disk document no longer
/// matches what the plan was built against.
pub fn apply_unified(original: &str, diff: &str, path_hint: &str) -> Result<String, PlanfsError> {
    let base = split_keepends(original);
    let mut out = String::new();
    let mut cursor = 0usize; // next unconsumed base line

    let mut lines = diff.split_inclusive('\n').peekable();
    while let Some(line) = lines.next() {
        if line.starts_with("--- ") || line.starts_with("+++ ") {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@ ") {
            let (old_start, old_len) = parse_hunk_range(header)
                .ok_or_else(|| conflict(path_hint, format!("malformed hunk header {header:?}")))?;
            let hunk_base = if old_len == 0 {
                old_start
            } else {
                old_start.saturating_sub(1)
            };
            if hunk_base < cursor || hunk_base > base.len() {
                return Err(conflict(
                    path_hint,
                    format!("hunk starts at line {old_start} outside remaining document"),
                ));
            }
            out.extend(base[cursor..hunk_base].iter().copied());
            cursor = hunk_base;

            // Consume hunk body lines until the next header or end.
            while let Some(body) = lines.peek() {
                let body = *body;
                if body.starts_with("@@ ") || body.starts_with("--- ") {
                    break;
                }
                lines.next();
                let (prefix, content) = body.split_at(1);
                match prefix {
                    " " | "-" => {
                        let expected = content;
                        let actual = base.get(cursor).copied().unwrap_or("");
                        if actual.trim_end_matches('\n') != expected.trim_end_matches('\n') {
                            return Err(conflict(
                                path_hint,
                                format!(
                                    "expected {:?} at line {}, found {:?}",
                                    expected.trim_end_matches('\n'),
                                    cursor + 1,
                                    actual.trim_end_matches('\n')
                                ),
                            ));
                        }
                        if prefix == " " {
                            out.push_str(actual);
                        }
                        cursor += 1;
                    }
                    "+" => out.push_str(content),
                    _ => {
                        return Err(conflict(
                            path_hint,
                            format!("unexpected diff line {body:?}"),
                        ));
                    }
                }
            }
        } else if !line.trim().is_empty() {
            return Err(conflict(path_hint, format!("unexpected diff line {line:?}")));
        }
    }

    out.extend(base[cursor..].iter().copied());
    Ok(out)
}

fn parse_hunk_range(header: &str) -> Option<(usize, usize)> {
    // "-12,3 +14,4 @@" -> (12, 3)
    let old = header.split_whitespace().next()?.strip_prefix('-')?;
    let mut parts = old.splitn(2, ',');
    let start = parts.next()?.parse().ok()?;
    let len = match parts.next() {
        Some(n) => n.parse().ok()?,
        None => 1,
    };
    Some((start, len))
}
