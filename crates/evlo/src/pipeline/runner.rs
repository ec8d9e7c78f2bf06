use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::db::{event_repo, log_file_repo, Database, DatabaseError};
use crate::error::IngestError;
use crate::model::{LogFile, NewEvent, ParsingStatus};
use crate::normalizer;
use crate::progress::{KeyValueStore, ProgressTracker};
use crate::source::{self, PageRequest, RawRecord, RecordSource, StagedUpload};
use crate::validator::UploadValidator;
use crate::worker::WorkerPool;

use super::batch::{BatchPersister, SqliteEventSink};
use super::context::{IngestContext, IngestReport, ProgressReport, Submitted, Upload};
use super::progress::TrackerProgress;

const STATUS_WRITE_ATTEMPTS: u32 = 3;
const STATUS_WRITE_BACKOFF: Duration = Duration::from_millis(100);

/// Tunables of the orchestrator that do not come with their own component.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub validator: UploadValidator,
    pub persister: BatchPersister,
    pub page: PageRequest,
    /// Staging directory for uploads; the OS temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            validator: UploadValidator::new(config.upload.max_file_size),
            persister: BatchPersister::new(config.batch.size),
            page: PageRequest::from_config(&config.parser),
            temp_dir: config.upload.temp_dir.clone(),
        }
    }
}

/// Drives one upload from validation to a terminal `log_files` status.
///
/// Stages: validate, create the row, stage bytes to a temp file, fetch raw
/// records, normalize, persist in batches, finalize. Blocking work runs on
/// the worker pool. Cloning is cheap and shares every component.
#[derive(Clone)]
pub struct Orchestrator {
    db: Database,
    pool: WorkerPool,
    source: Arc<dyn RecordSource>,
    tracker: ProgressTracker,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Production constructor. The record source is chosen from `parser`.
    pub fn from_config(
        config: &Config,
        db: Database,
        pool: WorkerPool,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, IngestError> {
        let source = source::from_config(&config.parser, pool.clone())?;
        let tracker = ProgressTracker::new(store, config.progress.ttl());
        Ok(Self::new(
            db,
            pool,
            source,
            tracker,
            OrchestratorSettings::from_config(config),
        ))
    }

    pub fn new(
        db: Database,
        pool: WorkerPool,
        source: Arc<dyn RecordSource>,
        tracker: ProgressTracker,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            pool,
            source,
            tracker,
            settings,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Validates the upload and creates its `IN_PROGRESS` row.
    ///
    /// Size checks run on the bytes actually received; a different declared
    /// size is rejected.
    pub async fn accept(&self, upload: &Upload) -> Result<LogFile, IngestError> {
        let size = upload.bytes.len() as u64;
        let validator = &self.settings.validator;
        validator.validate(upload.filename.as_deref(), size)?;
        validator.check_declared_size(upload.size, size)?;

        let filename = upload.filename.clone().unwrap_or_default();
        let db = self.db.clone();
        let insert_name = filename.clone();
        let log_file = self
            .pool
            .run(move || log_file_repo::insert(&db, &insert_name, size, Utc::now()))
            .await??;

        self.tracker.record_file_meta(log_file.id, &filename, size);
        self.tracker.record_progress(log_file.id, 0, 1);

        info!(
            log_file_id = log_file.id,
            filename = %filename,
            size,
            "Accepted upload"
        );
        Ok(log_file)
    }

    /// Validates, then runs every stage to a terminal status.
    pub async fn ingest(&self, upload: Upload) -> Result<IngestReport, IngestError> {
        let log_file = self.accept(&upload).await?;
        self.run(&log_file, upload).await
    }

    /// Accepts the upload and runs the remaining stages as a detached task.
    ///
    /// The caller gets the row back immediately and polls [`Self::progress`].
    /// A failure inside the task is logged only; the row still ends up
    /// `COMPLETED` or `FAILED`.
    pub async fn submit(&self, upload: Upload) -> Result<Submitted, IngestError> {
        let log_file = self.accept(&upload).await?;

        let this = self.clone();
        let background = log_file.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = this.run(&background, upload).await {
                warn!(
                    log_file_id = background.id,
                    error = %e,
                    "Background ingestion failed"
                );
            }
        });

        Ok(Submitted { log_file, task })
    }

    /// Runs the stages after acceptance for an `IN_PROGRESS` row.
    ///
    /// The stored row is re-read first; a file that already finished is
    /// rejected with [`IngestError::AlreadyFinished`] and left untouched.
    pub async fn run(&self, log_file: &LogFile, upload: Upload) -> Result<IngestReport, IngestError> {
        self.ensure_in_progress(log_file.id).await?;

        let span = info_span!(
            "ingest",
            log_file_id = log_file.id,
            filename = %log_file.filename,
            source = self.source.name(),
        );

        async move {
            let bytes = upload.bytes.len() as u64;
            let mut ctx = IngestContext::default();
            let outcome = self.execute(log_file, upload, &mut ctx).await;
            self.finalize(log_file, bytes, ctx, outcome)
                .instrument(info_span!("finalize"))
                .await
        }
        .instrument(span)
        .await
    }

    async fn ensure_in_progress(&self, log_file_id: i64) -> Result<(), IngestError> {
        let db = self.db.clone();
        let stored = self
            .pool
            .run(move || log_file_repo::find_by_id(&db, log_file_id))
            .await??
            .ok_or(IngestError::NotFound(log_file_id))?;
        if stored.parsing_status.is_terminal() {
            return Err(IngestError::AlreadyFinished {
                id: log_file_id,
                status: stored.parsing_status,
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        log_file: &LogFile,
        upload: Upload,
        ctx: &mut IngestContext,
    ) -> Result<(), IngestError> {
        let staged_file = self.stage(log_file, upload).await?;
        let staged = StagedUpload {
            path: staged_file.path().to_path_buf(),
            filename: log_file.filename.clone(),
            size: log_file.file_size,
        };

        let result = self.process(log_file, &staged, ctx).await;

        self.discard(staged_file).await;
        result
    }

    async fn process(
        &self,
        log_file: &LogFile,
        staged: &StagedUpload,
        ctx: &mut IngestContext,
    ) -> Result<(), IngestError> {
        let records = self
            .source
            .fetch(staged, self.settings.page)
            .instrument(info_span!("parse"))
            .await?;
        ctx.records_parsed = records.len();

        let events = {
            let _step = info_span!("normalize").entered();
            normalize_all(&records, log_file.id, ctx)
        };
        drop(records);

        ctx.persistence_started = true;
        let total = events.len();
        let db = self.db.clone();
        let persister = self.settings.persister;
        let progress = TrackerProgress::new(self.tracker.clone(), log_file.id);
        ctx.events_persisted = self
            .pool
            .run(move || {
                let _step = info_span!("persist", total).entered();
                let mut sink = SqliteEventSink::new(db);
                persister.persist(events, total, &mut sink, &progress)
            })
            .await??;

        Ok(())
    }

    /// Copies the upload bytes into a temp file that is removed on drop.
    async fn stage(&self, log_file: &LogFile, upload: Upload) -> Result<NamedTempFile, IngestError> {
        let temp_dir = self.settings.temp_dir.clone();
        let log_file_id = log_file.id;
        self.pool
            .run(move || {
                let dir = temp_dir.unwrap_or_else(std::env::temp_dir);
                let mut file = tempfile::Builder::new()
                    .prefix(&format!("evlo-upload-{}-", log_file_id))
                    .suffix(".evtx")
                    .tempfile_in(&dir)
                    .map_err(|e| IngestError::Staging {
                        path: dir.clone(),
                        source: e,
                    })?;
                file.write_all(&upload.bytes)
                    .and_then(|_| file.flush())
                    .map_err(|e| IngestError::Staging {
                        path: file.path().to_path_buf(),
                        source: e,
                    })?;
                debug!("Staged upload at {}", file.path().display());
                Ok(file)
            })
            .await?
    }

    async fn discard(&self, staged_file: NamedTempFile) {
        let path = staged_file.path().to_path_buf();
        let removed = self.pool.run(move || staged_file.close()).await;
        match removed {
            Ok(Ok(())) => debug!("Removed staged upload {}", path.display()),
            Ok(Err(e)) => warn!("Failed to remove staged upload {}: {}", path.display(), e),
            // The file was dropped with the job, which removes it too.
            Err(e) => warn!("Cleanup job for {} failed: {}", path.display(), e),
        }
    }

    async fn finalize(
        &self,
        log_file: &LogFile,
        bytes: u64,
        ctx: IngestContext,
        outcome: Result<(), IngestError>,
    ) -> Result<IngestReport, IngestError> {
        let failure = match outcome {
            Ok(()) => match self.write_status(log_file.id, ParsingStatus::Completed).await {
                Ok(()) => {
                    self.tracker.record_progress(log_file.id, 1, 1);

                    info!(
                        records_parsed = ctx.records_parsed,
                        events_persisted = ctx.events_persisted,
                        records_dropped = ctx.records_dropped,
                        "Ingestion completed"
                    );

                    let mut completed = log_file.clone();
                    completed.parsing_status = ParsingStatus::Completed;
                    return Ok(IngestReport {
                        log_file: completed,
                        records_parsed: ctx.records_parsed,
                        events_persisted: ctx.events_persisted,
                        records_dropped: ctx.records_dropped,
                        bytes,
                    });
                }
                Err(e) => {
                    error!(
                        error = %e,
                        "Could not record COMPLETED status for log file {}",
                        log_file.id
                    );
                    e
                }
            },
            Err(e) => e,
        };

        // Finished elsewhere; the events belong to that run.
        if matches!(failure, IngestError::AlreadyFinished { .. }) {
            return Err(failure);
        }

        error!(error = %failure, class = ?failure.failure_class(), "Ingestion failed");

        if ctx.persistence_started {
            self.purge_events(log_file.id).await;
        }
        if let Err(status_err) = self.write_status(log_file.id, ParsingStatus::Failed).await {
            error!(
                error = %status_err,
                "Could not record FAILED status for log file {}",
                log_file.id
            );
        }
        Err(failure)
    }

    /// Writes a terminal status, retrying with linear backoff.
    async fn write_status(&self, log_file_id: i64, status: ParsingStatus) -> Result<(), IngestError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let db = self.db.clone();
            let result = match self
                .pool
                .run(move || log_file_repo::update_status(&db, log_file_id, status))
                .await
            {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) => return Err(IngestError::NotFound(log_file_id)),
                Ok(Err(DatabaseError::InvalidTransition { current, .. })) => {
                    return Err(IngestError::AlreadyFinished {
                        id: log_file_id,
                        status: current,
                    })
                }
                Ok(Err(e)) => IngestError::from(e),
                Err(e) => IngestError::from(e),
            };

            if attempt >= STATUS_WRITE_ATTEMPTS {
                return Err(result);
            }
            warn!(
                attempt,
                error = %result,
                "Status write for log file {} failed, retrying",
                log_file_id
            );
            tokio::time::sleep(STATUS_WRITE_BACKOFF * attempt).await;
        }
    }

    async fn purge_events(&self, log_file_id: i64) {
        let db = self.db.clone();
        match self
            .pool
            .run(move || event_repo::delete_by_log_file(&db, log_file_id))
            .await
        {
            Ok(Ok(removed)) => info!(removed, "Purged partial events of failed log file"),
            Ok(Err(e)) => warn!(error = %e, "Failed to purge partial events"),
            Err(e) => warn!(error = %e, "Purge job failed"),
        }
    }

    /// Status plus percentage. `COMPLETED` always reads as 100.
    pub async fn progress(&self, log_file_id: i64) -> Result<ProgressReport, IngestError> {
        let db = self.db.clone();
        let log_file = self
            .pool
            .run(move || log_file_repo::find_by_id(&db, log_file_id))
            .await??
            .ok_or(IngestError::NotFound(log_file_id))?;

        let percent = match log_file.parsing_status {
            ParsingStatus::Completed => 100.0,
            _ => self.tracker.get_progress(log_file_id),
        };

        Ok(ProgressReport {
            log_file_id,
            status: log_file.parsing_status,
            percent,
            meta: self.tracker.get_file_meta(log_file_id),
        })
    }

    /// Administrative delete: removes the row, its events and tracker entries.
    pub async fn delete(&self, log_file_id: i64) -> Result<(), IngestError> {
        let db = self.db.clone();
        let removed = self
            .pool
            .run(move || log_file_repo::delete(&db, log_file_id))
            .await??;
        if !removed {
            return Err(IngestError::NotFound(log_file_id));
        }
        self.tracker.clear(log_file_id);
        info!(log_file_id, "Deleted log file");
        Ok(())
    }
}

fn normalize_all(records: &[RawRecord], log_file_id: i64, ctx: &mut IngestContext) -> Vec<NewEvent> {
    let mut events = Vec::with_capacity(records.len());
    for record in records {
        match normalizer::normalize(record, log_file_id) {
            Some(event) => events.push(event),
            None => {
                ctx.records_dropped += 1;
                debug!("Dropping record without a numeric event id");
            }
        }
    }
    if ctx.records_dropped > 0 {
        warn!(dropped = ctx.records_dropped, "Dropped records without an event id");
    }
    events
}
