//! Frontmatter document codec.
//!
//! Runtime documents are UTF-8 text with an optional YAML metadata block
//! delimited by bare `---` lines, a blank line, then a Markdown/plain body.
//! `compose` is byte-stable for equal inputs, which is what makes patch-based
//! updates meaningful: two composes of the same metadata and body produce the
//! same bytes, so an empty diff means a no-op.

use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};

use crate::core::error::PlanfsError;

/// Ordered metadata map. `serde_yaml::Mapping` preserves insertion order,
/// matching the order keys were set by the plan builder.
pub type Metadata = Mapping;

/// Parse result: metadata (empty when no frontmatter) and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub metadata: Metadata,
    pub body: String,
}

/// Serialize metadata and body into canonical frontmatter form:
/// `---\n<yaml>\n---\n\n<body>\n`, header alone when the body is empty.
pub fn compose(metadata: &Metadata, body: &str) -> Result<String, PlanfsError> {
    let header = serde_yaml::to_string(metadata)?;
    let header = header.trim_end();
    let trimmed = body.trim_end();
    if trimmed.is_empty() {
        Ok(format!("---\n{header}\n---\n"))
    } else {
        Ok(format!("---\n{header}\n---\n\n{trimmed}\n"))
    }
}

/// Heuristic: a `---`-delimited block that contains Markdown structure is a
/// thematic break in a hand-authored document, not frontmatter.
fn looks_like_markdown(block: &str) -> bool {
    for raw_line in block.lines() {
        let stripped = raw_line.trim();
        if stripped.is_empty() {
            continue;
        }
        if stripped.starts_with('#')
            || stripped.starts_with("```")
            || stripped.starts_with('>')
            || stripped.starts_with("- **")
        {
            return true;
        }
    }
    false
}

fn split_frontmatter(text: &str) -> Option<(String, String)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim() != "---" {
        return None;
    }
    let mut header = String::new();
    for line in lines {
        if line.trim() == "---" {
            if looks_like_markdown(&header) {
                return None;
            }
            let consumed = first.len() + header.len() + line.len();
            return Some((header, text[consumed..].to_string()));
        }
        header.push_str(line);
    }
    None
}

/// Parse a document into metadata and body. A leading `---` block counts as
/// frontmatter only when it parses as a YAML mapping and does not look like
/// ordinary Markdown. On YAML failure the whole text becomes the body; this
/// function never fails.
pub fn parse(text: &str) -> ParsedDocument {
    let Some((header, body)) = split_frontmatter(text) else {
        return ParsedDocument {
            metadata: Metadata::new(),
            body: text.to_string(),
        };
    };

    let metadata = match serde_yaml::from_str::<Value>(&header) {
        Ok(Value::Mapping(map)) => map,
        Ok(_) | Err(_) => {
            return ParsedDocument {
                metadata: Metadata::new(),
                body: text.to_string(),
            };
        }
    };

    ParsedDocument {
        metadata,
        body: body.trim_start_matches('\n').to_string(),
    }
}

/// Hex SHA-256 of document content, recorded on write/patch receipts.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// String-valued metadata lookup; non-string values return `None`.
pub fn meta_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata
        .get(&Value::String(key.to_string()))
        .and_then(Value::as_str)
}

pub fn set_meta(metadata: &mut Metadata, key: &str, value: impl Into<Value>) {
    metadata.insert(Value::String(key.to_string()), value.into());
}

/// Insert only when the key is absent, preserving existing values and order.
pub fn set_meta_default(metadata: &mut Metadata, key: &str, value: impl Into<Value>) {
    let key = Value::String(key.to_string());
    if !metadata.contains_key(&key) {
        metadata.insert(key, value.into());
    }
}
