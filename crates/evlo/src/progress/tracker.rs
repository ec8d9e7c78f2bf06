use std::sync::Arc;
use std::time::Duration;

use log::warn;

use super::store::KeyValueStore;

const PROGRESS_PREFIX: &str = "upload:progress:";
const META_PREFIX: &str = "upload:meta:";

/// Lightweight metadata kept next to the progress value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub filename: String,
    pub size: u64,
}

/// Advisory, TTL-bound record of how far each upload has come.
///
/// Store failures are logged and swallowed; the durable `log_files` row is
/// the authority on whether an upload finished.
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn progress_key(log_file_id: i64) -> String {
        format!("{}{}", PROGRESS_PREFIX, log_file_id)
    }

    fn meta_key(log_file_id: i64) -> String {
        format!("{}{}", META_PREFIX, log_file_id)
    }

    /// Stores `completed / total` as a percentage with two decimals.
    pub fn record_progress(&self, log_file_id: i64, completed: u64, total: u64) {
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let key = Self::progress_key(log_file_id);
        if let Err(e) = self.store.set(&key, format!("{:.2}", percent), self.ttl) {
            warn!("Failed to record progress for log file {}: {}", log_file_id, e);
        }
    }

    /// Last recorded percentage, or `0.0` when absent or unreadable.
    pub fn get_progress(&self, log_file_id: i64) -> f64 {
        match self.store.get(&Self::progress_key(log_file_id)) {
            Ok(Some(value)) => value.parse::<f64>().unwrap_or(0.0),
            Ok(None) => 0.0,
            Err(e) => {
                warn!("Failed to read progress for log file {}: {}", log_file_id, e);
                0.0
            }
        }
    }

    pub fn record_file_meta(&self, log_file_id: i64, filename: &str, size: u64) {
        let key = Self::meta_key(log_file_id);
        if let Err(e) = self
            .store
            .set(&key, format!("{}|{}", filename, size), self.ttl)
        {
            warn!("Failed to record metadata for log file {}: {}", log_file_id, e);
        }
    }

    pub fn get_file_meta(&self, log_file_id: i64) -> Option<FileMeta> {
        let value = match self.store.get(&Self::meta_key(log_file_id)) {
            Ok(value) => value?,
            Err(e) => {
                warn!("Failed to read metadata for log file {}: {}", log_file_id, e);
                return None;
            }
        };
        // Filenames may contain '|', the size never does.
        let (filename, size) = value.rsplit_once('|')?;
        Some(FileMeta {
            filename: filename.to_string(),
            size: size.parse().ok()?,
        })
    }

    pub fn clear(&self, log_file_id: i64) {
        for key in [Self::progress_key(log_file_id), Self::meta_key(log_file_id)] {
            if let Err(e) = self.store.remove(&key) {
                warn!("Failed to clear {}: {}", key, e);
            }
        }
    }
}
