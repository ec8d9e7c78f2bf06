pub mod batch;
pub mod context;
pub mod progress;
pub mod runner;

pub use batch::{BatchPersister, EventSink, SqliteEventSink};
pub use context::{IngestReport, ProgressReport, Submitted, Upload};
pub use progress::{NoopProgress, ProgressReporter, TrackerProgress};
pub use runner::{Orchestrator, OrchestratorSettings};
