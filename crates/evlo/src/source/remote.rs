//! Client for the external EVTX parsing service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use super::{fields, PageRequest, RawRecord, RecordSource, StagedUpload};
use crate::config::{RemoteParserConfig, TransferMode};
use crate::error::{IngestError, RemoteParsingError};

/// Longest response body kept in an error.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseResponse {
    #[serde(default)]
    events: Option<Vec<WireEvent>>,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(default, deserialize_with = "loose_string")]
    event_id: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    level: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    time_created: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    provider: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    computer: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    channel: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    message: Option<String>,
}

/// Accepts strings, numbers and booleans; anything else reads as absent.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

impl From<WireEvent> for RawRecord {
    fn from(event: WireEvent) -> Self {
        let mut record = RawRecord::new();
        let pairs = [
            (fields::EVENT_ID, event.event_id),
            (fields::LEVEL, event.level),
            (fields::TIME_CREATED, event.time_created),
            (fields::PROVIDER, event.provider),
            (fields::COMPUTER, event.computer),
            (fields::CHANNEL, event.channel),
            (fields::MESSAGE, event.message),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                record.insert(name, value);
            }
        }
        record
    }
}

/// Records returned by one successful call.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub records: Vec<RawRecord>,
    /// Total events in the file as reported by the service, if any.
    pub total_count: Option<u64>,
}

pub struct RemoteParserClient {
    client: Client,
    config: RemoteParserConfig,
    endpoint: String,
}

fn create_http_client(config: &RemoteParserConfig) -> Result<Client, RemoteParsingError> {
    Client::builder()
        .connect_timeout(config.connect_timeout())
        .timeout(config.timeout())
        .build()
        .map_err(|e| RemoteParsingError::Client(e.to_string()))
}

impl RemoteParserClient {
    pub fn new(config: RemoteParserConfig) -> Result<Self, RemoteParsingError> {
        let endpoint = format!("{}/parse", config.url.trim_end_matches('/'));
        Ok(Self {
            client: create_http_client(&config)?,
            config,
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Calls the service, retrying transport failures, timeouts and 5xx
    /// with a fixed delay. Client errors and bad bodies fail immediately.
    pub async fn parse(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<ParseOutcome, RemoteParsingError> {
        let max_attempts = self.config.effective_attempts();
        let delay = self.config.retry_delay();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(upload, page).await {
                Ok(outcome) => {
                    if attempt > 1 {
                        info!(attempt, "Parser service succeeded after retry");
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Parser service call failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(RemoteParsingError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<ParseOutcome, RemoteParsingError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(max) = page.max_events {
            query.push(("maxEvents", max.to_string()));
        }
        if let Some(offset) = page.offset {
            query.push(("offset", offset.to_string()));
        }

        let request = match self.config.mode {
            TransferMode::Multipart => {
                let bytes = tokio::fs::read(&upload.path).await.map_err(|e| {
                    RemoteParsingError::ReadUpload {
                        path: upload.path.clone(),
                        source: e,
                    }
                })?;
                let part = Part::bytes(bytes)
                    .file_name(upload.filename.clone())
                    .mime_str("application/octet-stream")
                    .map_err(|e| RemoteParsingError::Client(e.to_string()))?;
                self.client
                    .post(&self.endpoint)
                    .query(&query)
                    .multipart(Form::new().part("file", part))
            }
            TransferMode::SharedVolume => {
                query.push(("filePath", upload.path.to_string_lossy().to_string()));
                self.client.post(&self.endpoint).query(&query)
            }
        };

        debug!(endpoint = %self.endpoint, mode = ?self.config.mode, "Calling parser service");

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            return Err(RemoteParsingError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let parsed: ParseResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteParsingError::InvalidResponse(e.to_string()))?;

        let records: Vec<RawRecord> = parsed
            .events
            .unwrap_or_default()
            .into_iter()
            .map(RawRecord::from)
            .collect();

        debug!(
            returned = records.len(),
            count = ?parsed.count,
            total_count = ?parsed.total_count,
            "Parser service responded"
        );

        Ok(ParseOutcome {
            records,
            total_count: parsed.total_count,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> RemoteParsingError {
        if e.is_timeout() {
            RemoteParsingError::Timeout(self.config.timeout())
        } else {
            RemoteParsingError::Transport(e.to_string())
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[async_trait]
impl RecordSource for RemoteParserClient {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn fetch(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<Vec<RawRecord>, IngestError> {
        Ok(self.parse(upload, page).await?.records)
    }
}
