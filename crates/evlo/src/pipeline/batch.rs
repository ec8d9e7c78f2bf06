//! Memory-bounded, in-order event writes.

use log::debug;

use super::progress::ProgressReporter;
use crate::db::{event_repo, Database, DatabaseError};
use crate::error::PersistenceError;
use crate::model::NewEvent;

/// Destination of flushed batches. Each call must be atomic.
pub trait EventSink {
    fn write_batch(&mut self, batch: &[NewEvent]) -> Result<(), DatabaseError>;
}

/// Writes each batch in one SQLite transaction.
pub struct SqliteEventSink {
    db: Database,
}

impl SqliteEventSink {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl EventSink for SqliteEventSink {
    fn write_batch(&mut self, batch: &[NewEvent]) -> Result<(), DatabaseError> {
        event_repo::insert_batch(&self.db, batch).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchPersister {
    batch_size: usize,
}

impl Default for BatchPersister {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl BatchPersister {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Buffers events and flushes every `batch_size` of them, then once more
    /// for the remainder. Nothing is flushed for an empty input. Returns the
    /// number of events written. Batches flushed before a failure stay
    /// committed.
    pub fn persist<I, S>(
        &self,
        events: I,
        total: usize,
        sink: &mut S,
        progress: &dyn ProgressReporter,
    ) -> Result<usize, PersistenceError>
    where
        I: IntoIterator<Item = NewEvent>,
        S: EventSink + ?Sized,
    {
        let mut buffer: Vec<NewEvent> = Vec::with_capacity(self.batch_size.min(total.max(1)));
        let mut written = 0usize;
        let mut batch = 0usize;

        for event in events {
            buffer.push(event);
            if buffer.len() >= self.batch_size {
                batch += 1;
                written += flush(sink, &mut buffer, batch)?;
                progress.report(written, total);
            }
        }

        if !buffer.is_empty() {
            batch += 1;
            written += flush(sink, &mut buffer, batch)?;
            progress.report(written, total);
        }

        debug!("Persisted {} events in {} batches", written, batch);
        Ok(written)
    }
}

fn flush<S: EventSink + ?Sized>(
    sink: &mut S,
    buffer: &mut Vec<NewEvent>,
    batch: usize,
) -> Result<usize, PersistenceError> {
    let size = buffer.len();
    sink.write_batch(buffer)
        .map_err(|source| PersistenceError::Batch {
            batch,
            size,
            source,
        })?;
    buffer.clear();
    debug!("Flushed batch {} ({} events)", batch, size);
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventLevel, LogChannel};
    use crate::pipeline::progress::NoopProgress;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        flushes: Vec<usize>,
        fail_on: Option<usize>,
    }

    impl EventSink for RecordingSink {
        fn write_batch(&mut self, batch: &[NewEvent]) -> Result<(), DatabaseError> {
            if self.fail_on == Some(self.flushes.len() + 1) {
                return Err(DatabaseError::LockPoisoned);
            }
            self.flushes.push(batch.len());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        reports: Mutex<Vec<(usize, usize)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn report(&self, written: usize, total: usize) {
            self.reports.lock().unwrap().push((written, total));
        }
    }

    fn synthetic_events(n: usize) -> Vec<NewEvent> {
        (0..n)
            .map(|i| NewEvent {
                log_file_id: 1,
                event_id: i as i64,
                level: EventLevel::Information,
                time_created: Utc::now().naive_utc(),
                provider: None,
                computer: None,
                message: None,
                channel: LogChannel::Application,
            })
            .collect()
    }

    #[test]
    fn test_2500_events_flush_as_1000_1000_500() {
        let persister = BatchPersister::new(1000);
        let mut sink = RecordingSink::default();
        let progress = RecordingProgress::default();

        let written = persister
            .persist(synthetic_events(2500), 2500, &mut sink, &progress)
            .unwrap();

        assert_eq!(written, 2500);
        assert_eq!(sink.flushes, vec![1000, 1000, 500]);
        assert_eq!(
            *progress.reports.lock().unwrap(),
            vec![(1000, 2500), (2000, 2500), (2500, 2500)]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_flush() {
        let persister = BatchPersister::new(500);
        let mut sink = RecordingSink::default();
        persister
            .persist(synthetic_events(1000), 1000, &mut sink, &NoopProgress)
            .unwrap();
        assert_eq!(sink.flushes, vec![500, 500]);
    }

    #[test]
    fn test_empty_input_never_flushes() {
        let persister = BatchPersister::default();
        let mut sink = RecordingSink::default();
        let written = persister
            .persist(Vec::new(), 0, &mut sink, &NoopProgress)
            .unwrap();
        assert_eq!(written, 0);
        assert!(sink.flushes.is_empty());
    }

    #[test]
    fn test_failure_reports_batch_number() {
        let persister = BatchPersister::new(10);
        let mut sink = RecordingSink {
            fail_on: Some(2),
            ..Default::default()
        };
        let err = persister
            .persist(synthetic_events(25), 25, &mut sink, &NoopProgress)
            .unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::Batch {
                batch: 2,
                size: 10,
                ..
            }
        ));
        assert_eq!(sink.flushes, vec![10]);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        assert_eq!(BatchPersister::new(0).batch_size(), 1);
    }

    #[test]
    fn test_sqlite_sink_writes_rows() {
        use crate::db::log_file_repo;

        let db = Database::open_in_memory().unwrap();
        let file = log_file_repo::insert(&db, "a.evtx", 1, Utc::now()).unwrap();
        let events: Vec<NewEvent> = synthetic_events(30)
            .into_iter()
            .map(|mut e| {
                e.log_file_id = file.id;
                e
            })
            .collect();

        let mut sink = SqliteEventSink::new(db.clone());
        BatchPersister::new(7)
            .persist(events, 30, &mut sink, &NoopProgress)
            .unwrap();

        assert_eq!(event_repo::count_by_log_file(&db, file.id).unwrap(), 30);
    }
}
