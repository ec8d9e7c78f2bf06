//! Maps raw record fields onto the canonical event schema.
//!
//! Every function here is pure. A malformed field degrades to a default;
//! only a missing or non-numeric event id drops the whole record.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::{EventLevel, LogChannel, NewEvent};
use crate::source::{fields, RawRecord};

pub const MAX_PROVIDER_CHARS: usize = 500;
pub const MAX_COMPUTER_CHARS: usize = 255;

/// Normalizes one record for `log_file_id`. Returns `None` when the record
/// has no usable event id.
pub fn normalize(record: &RawRecord, log_file_id: i64) -> Option<NewEvent> {
    let event_id = extract_event_id(record.get(fields::EVENT_ID))?;

    Some(NewEvent {
        log_file_id,
        event_id,
        level: extract_level(record.get(fields::LEVEL)),
        time_created: extract_time_created(record.get(fields::TIME_CREATED)),
        provider: record
            .get(fields::PROVIDER)
            .map(|p| truncate_chars(p, MAX_PROVIDER_CHARS)),
        computer: record
            .get(fields::COMPUTER)
            .map(|c| truncate_chars(c, MAX_COMPUTER_CHARS)),
        message: record.get(fields::MESSAGE).map(str::to_string),
        channel: extract_channel(record.get(fields::CHANNEL)),
    })
}

pub fn extract_event_id(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse::<i64>().ok()
}

/// Numeric codes 0..=3 map in order; a known name maps case-insensitively;
/// anything else is `INFORMATION`.
pub fn extract_level(raw: Option<&str>) -> EventLevel {
    let Some(raw) = raw.map(str::trim) else {
        return EventLevel::Information;
    };
    if let Ok(code) = raw.parse::<i64>() {
        return EventLevel::from_code(code).unwrap_or(EventLevel::Information);
    }
    EventLevel::from_name(raw).unwrap_or(EventLevel::Information)
}

/// ISO-8601 with an optional space separator, trailing `Z` or explicit
/// offset. Falls back to the current UTC time.
pub fn extract_time_created(raw: Option<&str>) -> NaiveDateTime {
    raw.and_then(parse_timestamp)
        .unwrap_or_else(|| Utc::now().naive_utc())
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let candidate = raw.trim().replacen(' ', "T", 1);
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(&candidate) {
        return Some(with_offset.with_timezone(&Utc).naive_utc());
    }

    let local = candidate.strip_suffix('Z').unwrap_or(&candidate);
    NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Exact match after upper-casing and `-`/space → `_`, then substring
/// heuristics, then `SYSTEM`.
pub fn extract_channel(raw: Option<&str>) -> LogChannel {
    let Some(raw) = raw else {
        return LogChannel::System;
    };
    let key: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();

    if let Some(channel) = LogChannel::from_name(&key) {
        return channel;
    }

    if key.contains("APPLICATION") {
        LogChannel::Application
    } else if key.contains("SECURITY") {
        LogChannel::Security
    } else if key.contains("SETUP") {
        LogChannel::Setup
    } else if key.contains("FORWARDED") {
        LogChannel::ForwardedEvents
    } else {
        LogChannel::System
    }
}

/// Keeps at most `max` characters.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
