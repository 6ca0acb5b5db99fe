//! Shared timestamp/id helpers for deterministic documents and journals.

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use ulid::Ulid;

/// Current UTC time, truncated to whole seconds so document stamps stay stable
/// across compose/parse round-trips.
pub fn now_utc() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Second-precision ISO-8601 with `Z` suffix (e.g. `2026-08-08T12:30:05Z`).
pub fn iso_z(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Filename-safe stamp used for episodic entries (`2026-08-08-12-30-05`).
pub fn file_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Day stamp used for backlog documents (`2026-08-08`).
pub fn date_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Compact stamp used in soft-delete archive names (`20260808123005`).
pub fn archive_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M%S").to_string()
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Eight hex chars for archive-name uniqueness.
pub fn short_hex() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub fn new_doc_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Best-effort parse of timestamps found in document metadata. Accepts the
/// formats this crate writes plus common hand-authored variants.
pub fn parse_flexible(value: &str) -> Option<DateTime<Utc>> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let bare = text.trim_end_matches('Z');
    for fmt in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d-%H-%M-%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(bare, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(bare, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}
