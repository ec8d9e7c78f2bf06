//! Builders for synthetic event data.

#![allow(dead_code)]

use serde_json::{json, Value};

/// Separates records inside a synthetic log file.
pub const RECORD_SEPARATOR: u8 = 0;

/// Builder for one rendered `<Event>` document.
pub struct EventXmlBuilder {
    event_id: Option<i64>,
    level: String,
    time_created: String,
    provider: String,
    computer: String,
    channel: String,
    data: Vec<(String, String)>,
}

impl EventXmlBuilder {
    pub fn new() -> Self {
        Self {
            event_id: Some(7036),
            level: "0".to_string(),
            time_created: "2024-01-02T03:04:05.000000Z".to_string(),
            provider: "Service Control Manager".to_string(),
            computer: "WS-01".to_string(),
            channel: "System".to_string(),
            data: vec![("param1".to_string(), "Windows Update".to_string())],
        }
    }

    pub fn event_id(mut self, event_id: Option<i64>) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    pub fn data(mut self, name: &str, value: &str) -> Self {
        self.data.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(&self) -> String {
        let event_id = self
            .event_id
            .map(|id| format!("<EventID>{}</EventID>", id))
            .unwrap_or_default();
        let data: String = self
            .data
            .iter()
            .map(|(name, value)| format!(r#"<Data Name="{}">{}</Data>"#, name, value))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Event xmlns="http://schemas.microsoft.com/win/2004/08/events/event">
  <System>
    <Provider Name="{provider}"></Provider>
    {event_id}
    <Level>{level}</Level>
    <TimeCreated SystemTime="{time}"></TimeCreated>
    <Channel>{channel}</Channel>
    <Computer>{computer}</Computer>
  </System>
  <EventData>{data}</EventData>
</Event>"#,
            provider = self.provider,
            event_id = event_id,
            level = self.level,
            time = self.time_created,
            channel = self.channel,
            computer = self.computer,
            data = data,
        )
    }
}

/// Packs rendered records into the bytes of a synthetic log file.
pub fn synthetic_log(records: &[String]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            bytes.push(RECORD_SEPARATOR);
        }
        bytes.extend_from_slice(record.as_bytes());
    }
    bytes
}

/// `n` well-formed records with ids `1..=n`.
pub fn numbered_records(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| EventXmlBuilder::new().event_id(Some(i as i64)).build())
        .collect()
}

/// One event as returned by the parser service.
pub fn wire_event(event_id: Option<i64>, level: &str, channel: &str) -> Value {
    let mut event = json!({
        "level": level,
        "timeCreated": "2024-01-02 03:04:05",
        "provider": "Microsoft-Windows-Security-Auditing",
        "computer": "DC01",
        "channel": channel,
        "message": "An account was successfully logged on."
    });
    if let Some(id) = event_id {
        event["eventId"] = json!(id);
    }
    event
}

/// A parser-service response body.
pub fn parse_response(events: Vec<Value>) -> Value {
    let count = events.len();
    json!({
        "events": events,
        "count": count,
        "totalCount": count
    })
}
