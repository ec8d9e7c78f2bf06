//! Test harness for running ingestions against an isolated database.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use evlo::pipeline::{BatchPersister, OrchestratorSettings};
use evlo::source::embedded::decode_records;
use evlo::source::{PageRequest, StagedUpload};
use evlo::{
    Database, DecodeError, InMemoryStore, IngestError, Orchestrator, ProgressTracker, RawRecord,
    RecordSource, WorkerPool,
};

use super::builders::RECORD_SEPARATOR;

/// Isolated environment for one ingestion test.
///
/// Provides:
/// - A temporary staging directory (cleaned up on drop)
/// - An in-memory database with migrations applied
/// - A worker pool and a progress tracker backed by an in-memory store
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub db: Database,
    pub pool: WorkerPool,
    pub tracker: ProgressTracker,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir_all(temp_dir.path().join("staging"))
            .expect("Failed to create staging dir");
        let db = Database::open_in_memory().expect("Failed to open database");
        let pool = WorkerPool::new(2).expect("Failed to start worker pool");
        let store = Arc::new(InMemoryStore::new(1000));
        let tracker = ProgressTracker::new(store, Duration::from_secs(60));

        Self {
            temp_dir,
            db,
            pool,
            tracker,
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.path().join("staging")
    }

    /// Files left behind in the staging directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.staging_dir())
            .expect("Failed to read staging dir")
            .map(|entry| entry.expect("Failed to read entry").path())
            .collect()
    }

    pub fn settings(&self, batch_size: usize) -> OrchestratorSettings {
        OrchestratorSettings {
            persister: BatchPersister::new(batch_size),
            temp_dir: Some(self.staging_dir()),
            ..OrchestratorSettings::default()
        }
    }

    pub fn orchestrator_with(&self, source: Arc<dyn RecordSource>, batch_size: usize) -> Orchestrator {
        Orchestrator::new(
            self.db.clone(),
            self.pool.clone(),
            source,
            self.tracker.clone(),
            self.settings(batch_size),
        )
    }

    pub fn orchestrator(&self, source: Arc<dyn RecordSource>) -> Orchestrator {
        self.orchestrator_with(source, 1000)
    }

    /// Runs raw SQL, e.g. to install failure triggers.
    pub fn execute_sql(&self, sql: &str) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .expect("Failed to execute SQL");
    }
}

/// Reads synthetic log files: rendered event XML separated by NUL bytes.
///
/// Remembers every staged path it was handed so tests can check cleanup.
#[derive(Default)]
pub struct SyntheticLogSource {
    seen: Mutex<Vec<PathBuf>>,
}

impl SyntheticLogSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().expect("lock poisoned").clone()
    }

    fn read(path: &Path, page: PageRequest) -> Result<Vec<RawRecord>, DecodeError> {
        let bytes = std::fs::read(path).map_err(|e| DecodeError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rendered = bytes
            .split(|b| *b == RECORD_SEPARATOR)
            .filter(|chunk| !chunk.is_empty())
            .map(|chunk| String::from_utf8(chunk.to_vec()).map_err(|e| e.to_string()));
        decode_records(rendered, page)
    }
}

#[async_trait]
impl RecordSource for SyntheticLogSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn fetch(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<Vec<RawRecord>, IngestError> {
        assert!(upload.path.exists(), "staged file must exist while parsing");
        self.seen
            .lock()
            .expect("lock poisoned")
            .push(upload.path.clone());
        Ok(Self::read(&upload.path, page)?)
    }
}

/// A source whose container can never be read.
pub struct FailingSource;

#[async_trait]
impl RecordSource for FailingSource {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn fetch(
        &self,
        _upload: &StagedUpload,
        _page: PageRequest,
    ) -> Result<Vec<RawRecord>, IngestError> {
        Err(DecodeError::Read("invalid chunk header".to_string()).into())
    }
}
