//! Event repository: batched inserts and per-file queries on the `events` table.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Row};

use super::log_file_repo::parse_timestamp;
use super::{Database, DatabaseError};
use crate::model::{Event, EventLevel, LogChannel, NewEvent};

/// Storage format for `time_created`. Lexicographic order matches time order.
pub const TIME_CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

struct EventRow {
    id: i64,
    log_file_id: i64,
    event_id: i64,
    level: String,
    time_created: String,
    provider: Option<String>,
    computer: Option<String>,
    message: Option<String>,
    channel: String,
    created_at: String,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            log_file_id: row.get("log_file_id")?,
            event_id: row.get("event_id")?,
            level: row.get("level")?,
            time_created: row.get("time_created")?,
            provider: row.get("provider")?,
            computer: row.get("computer")?,
            message: row.get("message")?,
            channel: row.get("channel")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_event(self) -> Result<Event, DatabaseError> {
        let level = EventLevel::from_name(&self.level).ok_or(DatabaseError::CorruptValue {
            column: "level",
            value: self.level.clone(),
        })?;
        let channel = LogChannel::from_name(&self.channel).ok_or(DatabaseError::CorruptValue {
            column: "channel",
            value: self.channel.clone(),
        })?;
        let time_created = NaiveDateTime::parse_from_str(&self.time_created, TIME_CREATED_FORMAT)
            .map_err(|_| DatabaseError::CorruptValue {
            column: "time_created",
            value: self.time_created.clone(),
        })?;
        Ok(Event {
            id: self.id,
            log_file_id: self.log_file_id,
            event_id: self.event_id,
            level,
            time_created,
            provider: self.provider,
            computer: self.computer,
            message: self.message,
            channel,
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

/// Writes all events in one transaction. Either every row lands or none do.
pub fn insert_batch(db: &Database, events: &[NewEvent]) -> Result<usize, DatabaseError> {
    if events.is_empty() {
        return Ok(0);
    }
    let created_at = Utc::now().to_rfc3339();
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events (log_file_id, event_id, level, time_created, provider,
                 computer, message, channel, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.log_file_id,
                    event.event_id,
                    event.level.as_str(),
                    event.time_created.format(TIME_CREATED_FORMAT).to_string(),
                    event.provider,
                    event.computer,
                    event.message,
                    event.channel.as_str(),
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(events.len())
    })
}

/// Counts events belonging to a log file.
pub fn count_by_log_file(db: &Database, log_file_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE log_file_id = ?1",
            params![log_file_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Lists events of a log file in insertion order.
pub fn list_by_log_file(db: &Database, log_file_id: i64) -> Result<Vec<Event>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM events WHERE log_file_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![log_file_id], EventRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(EventRow::into_event).collect()
}

/// Removes every event of a log file. Returns the number of rows removed.
pub fn delete_by_log_file(db: &Database, log_file_id: i64) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM events WHERE log_file_id = ?1",
            params![log_file_id],
        )?;
        Ok(removed)
    })
}
