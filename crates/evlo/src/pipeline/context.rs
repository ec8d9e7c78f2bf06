use std::path::Path;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::IngestError;
use crate::model::{LogFile, ParsingStatus};
use crate::progress::FileMeta;

/// An uploaded file as handed over by the caller.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
    /// Size announced by the caller; must equal `bytes.len()`.
    pub size: u64,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            filename: Some(filename.into()),
            bytes,
            size,
        }
    }

    /// Reads a file from disk, keeping its base name as the upload name.
    pub async fn from_path(path: &Path) -> Result<Self, IngestError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IngestError::Staging {
                path: path.to_path_buf(),
                source: e,
            })?;
        let size = bytes.len() as u64;
        Ok(Self {
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().to_string()),
            bytes,
            size,
        })
    }
}

/// Outcome of one completed ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub log_file: LogFile,
    pub records_parsed: usize,
    pub events_persisted: usize,
    pub records_dropped: usize,
    pub bytes: u64,
}

/// Polling view combining the durable status and the advisory percentage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub log_file_id: i64,
    pub status: ParsingStatus,
    pub percent: f64,
    #[serde(skip)]
    pub meta: Option<FileMeta>,
}

/// An accepted upload whose remaining stages run in the background.
pub struct Submitted {
    pub log_file: LogFile,
    /// May be dropped; the task keeps running.
    pub task: JoinHandle<()>,
}

/// Counters collected while the stages of one file run.
#[derive(Debug, Default)]
pub(crate) struct IngestContext {
    pub records_parsed: usize,
    pub records_dropped: usize,
    pub events_persisted: usize,
    pub persistence_started: bool,
}
