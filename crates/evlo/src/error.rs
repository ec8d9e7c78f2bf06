use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::model::ParsingStatus;

#[derive(Error, Debug)]
pub enum EvloError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Rejections raised before any work is done for an upload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File name is missing")]
    MissingFilename,

    #[error("File name is too long. Max: {max} characters, Actual: {length} characters")]
    FilenameTooLong { length: usize, max: usize },

    #[error("Invalid file extension for '{filename}'. Only .evtx files are allowed")]
    InvalidExtension { filename: String },

    #[error("File is empty")]
    EmptyFile,

    #[error("File size exceeds maximum limit. Max: {max} bytes, Actual: {size} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("Declared size {declared} does not match the {actual} bytes received")]
    SizeMismatch { declared: u64, actual: u64 },
}

#[derive(Error, Debug)]
pub enum RemoteParsingError {
    #[error("Parser service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parser service unreachable: {0}")]
    Transport(String),

    #[error("Parser service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Invalid response from parser service: {0}")]
    InvalidResponse(String),

    #[error("Failed to read upload '{path}': {source}")]
    ReadUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Parser service failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RemoteParsingError>,
    },
}

impl RemoteParsingError {
    /// Network-level failures and server-side statuses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteParsingError::Status { status, .. } => *status >= 500,
            RemoteParsingError::Transport(_) | RemoteParsingError::Timeout(_) => true,
            _ => false,
        }
    }

    /// Upstream HTTP status, looking through retry exhaustion.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            RemoteParsingError::Status { status, .. } => Some(*status),
            RemoteParsingError::Exhausted { last, .. } => last.upstream_status(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open EVTX container '{path}': {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Failed to read EVTX container: {0}")]
    Read(String),

    #[error("Decode job failed: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write event batch {batch} ({size} events): {source}")]
    Batch {
        batch: usize,
        size: usize,
        #[source]
        source: crate::db::DatabaseError,
    },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Persistence job failed: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool is shut down")]
    ChannelClosed,

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),
}

/// How a failed ingestion should be presented to whoever asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    ClientFault,
    ServiceUnavailable,
    InternalFault,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote parsing failed: {0}")]
    RemoteParsing(#[from] RemoteParsingError),

    #[error("Decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Failed to stage upload '{path}': {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Log file {0} not found")]
    NotFound(i64),

    #[error("Log file {id} has already finished as {}", .status.as_str())]
    AlreadyFinished { id: i64, status: ParsingStatus },
}

impl From<crate::db::DatabaseError> for IngestError {
    fn from(err: crate::db::DatabaseError) -> Self {
        IngestError::Persistence(PersistenceError::Database(err))
    }
}

impl From<WorkerError> for IngestError {
    fn from(err: WorkerError) -> Self {
        IngestError::Persistence(PersistenceError::Worker(err))
    }
}

impl IngestError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            IngestError::Validation(_)
            | IngestError::NotFound(_)
            | IngestError::AlreadyFinished { .. } => FailureClass::ClientFault,
            IngestError::RemoteParsing(_) => FailureClass::ServiceUnavailable,
            IngestError::Decode(_) | IngestError::Persistence(_) | IngestError::Staging { .. } => {
                FailureClass::InternalFault
            }
        }
    }

    /// Message safe to show to an end user.
    pub fn user_message(&self) -> String {
        match self.failure_class() {
            FailureClass::ClientFault => self.to_string(),
            FailureClass::ServiceUnavailable => {
                "The event log parser service is unavailable. Please contact an administrator."
                    .to_string()
            }
            FailureClass::InternalFault => format!("Internal error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EvloError>;
