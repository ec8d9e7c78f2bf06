//! Log file repository: CRUD operations for the `log_files` table.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::model::{LogFile, ParsingStatus};

/// A raw log file row from the database.
#[derive(Debug, Clone)]
struct LogFileRow {
    id: i64,
    filename: String,
    file_size: i64,
    parsing_status: String,
    uploaded_at: String,
    created_at: String,
}

impl LogFileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            filename: row.get("filename")?,
            file_size: row.get("file_size")?,
            parsing_status: row.get("parsing_status")?,
            uploaded_at: row.get("uploaded_at")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_log_file(self) -> Result<LogFile, DatabaseError> {
        let parsing_status =
            ParsingStatus::parse(&self.parsing_status).ok_or(DatabaseError::CorruptValue {
                column: "parsing_status",
                value: self.parsing_status.clone(),
            })?;
        Ok(LogFile {
            id: self.id,
            filename: self.filename,
            file_size: u64::try_from(self.file_size).map_err(|_| DatabaseError::CorruptValue {
                column: "file_size",
                value: self.file_size.to_string(),
            })?,
            parsing_status,
            uploaded_at: parse_timestamp("uploaded_at", &self.uploaded_at)?,
            created_at: parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(
    column: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::CorruptValue {
            column,
            value: value.to_string(),
        })
}

/// Inserts a new log file row with status `IN_PROGRESS` and returns it.
pub fn insert(
    db: &Database,
    filename: &str,
    file_size: u64,
    uploaded_at: DateTime<Utc>,
) -> Result<LogFile, DatabaseError> {
    let created_at = Utc::now();
    let size = i64::try_from(file_size).map_err(|_| DatabaseError::CorruptValue {
        column: "file_size",
        value: file_size.to_string(),
    })?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO log_files (filename, file_size, parsing_status, uploaded_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                filename,
                size,
                ParsingStatus::InProgress.as_str(),
                uploaded_at.to_rfc3339(),
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(LogFile {
            id: conn.last_insert_rowid(),
            filename: filename.to_string(),
            file_size,
            parsing_status: ParsingStatus::InProgress,
            uploaded_at,
            created_at,
        })
    })
}

/// Finds a log file by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<LogFile>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM log_files WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], LogFileRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;
    row.map(LogFileRow::into_log_file).transpose()
}

/// Lists all log files, newest first.
pub fn list(db: &Database) -> Result<Vec<LogFile>, DatabaseError> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM log_files ORDER BY id DESC")?;
        let rows = stmt
            .query_map([], LogFileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;
    rows.into_iter().map(LogFileRow::into_log_file).collect()
}

/// Moves an `IN_PROGRESS` row to a terminal status. Returns `false` if no
/// row matched the id.
///
/// Fails with [`DatabaseError::InvalidTransition`] when the row already
/// reached a terminal status or `status` is not terminal, so each file is
/// finished exactly once.
pub fn update_status(
    db: &Database,
    id: i64,
    status: ParsingStatus,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let current: Option<String> = conn
            .query_row(
                "SELECT parsing_status FROM log_files WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(false);
        };
        let current = ParsingStatus::parse(&current).ok_or(DatabaseError::CorruptValue {
            column: "parsing_status",
            value: current.clone(),
        })?;

        if current.is_terminal() || !status.is_terminal() {
            return Err(DatabaseError::InvalidTransition {
                id,
                current,
                requested: status,
            });
        }

        let changed = conn.execute(
            "UPDATE log_files SET parsing_status = ?2
             WHERE id = ?1 AND parsing_status = ?3",
            params![id, status.as_str(), ParsingStatus::InProgress.as_str()],
        )?;
        if changed == 0 {
            return Err(DatabaseError::InvalidTransition {
                id,
                current,
                requested: status,
            });
        }
        Ok(true)
    })
}

/// Deletes a log file. Its events go with it via `ON DELETE CASCADE`.
/// Returns `false` if no row matched.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM log_files WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}
