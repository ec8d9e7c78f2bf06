pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod normalizer;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod validator;
pub mod worker;

pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{
    ConfigError, DecodeError, EvloError, FailureClass, IngestError, PersistenceError,
    RemoteParsingError, Result, ValidationError, WorkerError,
};
pub use model::{Event, EventLevel, LogChannel, LogFile, NewEvent, ParsingStatus};
pub use pipeline::{IngestReport, Orchestrator, ProgressReport, Upload};
pub use progress::{InMemoryStore, KeyValueStore, ProgressTracker};
pub use source::{RawRecord, RecordSource};
pub use validator::UploadValidator;
pub use worker::WorkerPool;
