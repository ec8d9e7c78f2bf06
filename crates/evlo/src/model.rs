//! Domain types shared by the pipeline stages and the store.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsing status of an uploaded log file.
///
/// `InProgress` is the only non-terminal state; a file moves to
/// `Completed` or `Failed` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParsingStatus {
    InProgress,
    Completed,
    Failed,
}

impl ParsingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsingStatus::InProgress => "IN_PROGRESS",
            ParsingStatus::Completed => "COMPLETED",
            ParsingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(ParsingStatus::InProgress),
            "COMPLETED" => Some(ParsingStatus::Completed),
            "FAILED" => Some(ParsingStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParsingStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Information,
    Warning,
    Error,
    Critical,
}

impl EventLevel {
    pub const ALL: [EventLevel; 4] = [
        EventLevel::Information,
        EventLevel::Warning,
        EventLevel::Error,
        EventLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Information => "INFORMATION",
            EventLevel::Warning => "WARNING",
            EventLevel::Error => "ERROR",
            EventLevel::Critical => "CRITICAL",
        }
    }

    /// Case-insensitive lookup by level name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(name))
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(EventLevel::Information),
            1 => Some(EventLevel::Warning),
            2 => Some(EventLevel::Error),
            3 => Some(EventLevel::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogChannel {
    System,
    Application,
    Security,
    Setup,
    ForwardedEvents,
}

impl LogChannel {
    pub const ALL: [LogChannel; 5] = [
        LogChannel::System,
        LogChannel::Application,
        LogChannel::Security,
        LogChannel::Setup,
        LogChannel::ForwardedEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogChannel::System => "SYSTEM",
            LogChannel::Application => "APPLICATION",
            LogChannel::Security => "SECURITY",
            LogChannel::Setup => "SETUP",
            LogChannel::ForwardedEvents => "FORWARDED_EVENTS",
        }
    }

    /// Exact lookup by enumeration name (already upper-cased).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.as_str() == name)
    }
}

/// One uploaded artifact and its ingestion status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFile {
    pub id: i64,
    pub filename: String,
    pub file_size: u64,
    pub parsing_status: ParsingStatus,
    pub uploaded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A normalized event that has not been written yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub log_file_id: i64,
    pub event_id: i64,
    pub level: EventLevel,
    pub time_created: NaiveDateTime,
    pub provider: Option<String>,
    pub computer: Option<String>,
    pub message: Option<String>,
    pub channel: LogChannel,
}

/// A persisted event row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub log_file_id: i64,
    pub event_id: i64,
    pub level: EventLevel,
    pub time_created: NaiveDateTime,
    pub provider: Option<String>,
    pub computer: Option<String>,
    pub message: Option<String>,
    pub channel: LogChannel,
    pub created_at: DateTime<Utc>,
}
