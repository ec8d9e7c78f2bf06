//! Record sources turn a staged upload into raw, loosely-typed records.
//!
//! Two variants exist: [`RemoteParserClient`] delegates to an HTTP parsing
//! service and [`EmbeddedParser`] decodes the EVTX container in-process.
//! The orchestrator only ever sees `dyn RecordSource`; which variant it gets
//! is decided once from [`ParserConfig`] by [`from_config`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ParserConfig;
use crate::error::{IngestError, RemoteParsingError};
use crate::worker::WorkerPool;

pub mod embedded;
pub mod remote;

pub use embedded::EmbeddedParser;
pub use remote::RemoteParserClient;

/// Canonical field names of a [`RawRecord`].
pub mod fields {
    pub const EVENT_ID: &str = "eventId";
    pub const LEVEL: &str = "level";
    pub const TIME_CREATED: &str = "timeCreated";
    pub const PROVIDER: &str = "provider";
    pub const COMPUTER: &str = "computer";
    pub const CHANNEL: &str = "channel";
    pub const MESSAGE: &str = "message";
}

/// One element of a decoded event XML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<RecordElement>,
}

impl RecordElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn child(&self, name: &str) -> Option<&RecordElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a `/`-separated path of child names.
    pub fn find(&self, path: &str) -> Option<&RecordElement> {
        path.split('/')
            .try_fold(self, |element, name| element.child(name))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content, `None` when empty.
    pub fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A record as produced by a source, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub fields: HashMap<String, String>,
    /// The decoded XML tree, kept only by the embedded parser.
    pub element: Option<RecordElement>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// An upload copied to local disk for the duration of parsing.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

/// Optional window over the records of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: Option<u64>,
    pub max_events: Option<u64>,
}

impl PageRequest {
    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            offset: config.offset,
            max_events: config.max_events,
        }
    }

    /// Applies the window to an iterator by skip/take.
    pub fn apply<I: Iterator>(&self, iter: I) -> impl Iterator<Item = I::Item> {
        let skip = self.offset.unwrap_or(0) as usize;
        let take = self.max_events.map(|m| m as usize).unwrap_or(usize::MAX);
        iter.skip(skip).take(take)
    }
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<Vec<RawRecord>, IngestError>;
}

/// Chooses the record source. A `remote` section selects the parser service.
pub fn from_config(
    config: &ParserConfig,
    pool: WorkerPool,
) -> Result<Arc<dyn RecordSource>, RemoteParsingError> {
    match &config.remote {
        Some(remote) => Ok(Arc::new(RemoteParserClient::new(remote.clone())?)),
        None => Ok(Arc::new(EmbeddedParser::new(pool))),
    }
}
