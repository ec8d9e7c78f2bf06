//! In-process EVTX decoding.
//!
//! The `evtx` crate walks the container and renders every record as event
//! XML; `quick-xml` turns that XML into a [`RecordElement`] tree from which
//! the canonical fields are read. Malformed records are dropped one by one;
//! only an unreadable container fails the whole file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evtx::{EvtxParser, ParserSettings};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use super::{fields, PageRequest, RawRecord, RecordElement, RecordSource, StagedUpload};
use crate::error::{DecodeError, IngestError};
use crate::worker::WorkerPool;

pub struct EmbeddedParser {
    pool: WorkerPool,
}

impl EmbeddedParser {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Decodes the container on the worker pool.
    pub async fn decode(
        &self,
        path: PathBuf,
        page: PageRequest,
    ) -> Result<Vec<RawRecord>, DecodeError> {
        self.pool.run(move || decode_file(&path, page)).await?
    }
}

#[async_trait]
impl RecordSource for EmbeddedParser {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn fetch(
        &self,
        upload: &StagedUpload,
        page: PageRequest,
    ) -> Result<Vec<RawRecord>, IngestError> {
        Ok(self.decode(upload.path.clone(), page).await?)
    }
}

/// Opens an EVTX file and decodes all of its records. Blocking.
pub fn decode_file(path: &Path, page: PageRequest) -> Result<Vec<RawRecord>, DecodeError> {
    let mut parser = EvtxParser::from_path(path)
        .map_err(|e| DecodeError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .with_configuration(ParserSettings::default().num_threads(1));

    let rendered = parser
        .records()
        .map(|record| record.map(|r| r.data).map_err(|e| e.to_string()));

    decode_records(rendered, page)
}

/// Turns rendered record XML into raw records.
///
/// Each item is either the XML of one record or the reason it could not be
/// rendered. Failed items are skipped. The page window applies to the records
/// that decoded successfully. Fails only when nothing decoded and at least
/// one item failed, which means the container itself is unreadable.
pub fn decode_records<I>(rendered: I, page: PageRequest) -> Result<Vec<RawRecord>, DecodeError>
where
    I: IntoIterator<Item = Result<String, String>>,
{
    let mut skipped = 0usize;
    let mut first_error: Option<String> = None;

    let decoded = rendered.into_iter().filter_map(|item| {
        let xml = match item {
            Ok(xml) => xml,
            Err(reason) => {
                warn!(%reason, "Skipping unreadable EVTX record");
                skipped += 1;
                first_error.get_or_insert(reason);
                return None;
            }
        };
        match parse_event_xml(&xml) {
            Ok(element) => Some(record_from_element(element)),
            Err(reason) => {
                warn!(%reason, "Skipping EVTX record with malformed XML");
                skipped += 1;
                first_error.get_or_insert(reason);
                None
            }
        }
    });

    let records: Vec<RawRecord> = page.apply(decoded).collect();

    if records.is_empty() {
        if let Some(reason) = first_error {
            return Err(DecodeError::Read(reason));
        }
    }

    debug!(decoded = records.len(), skipped, "Decoded EVTX records");
    Ok(records)
}

/// Parses one event XML document into an element tree.
pub fn parse_event_xml(xml: &str) -> Result<RecordElement, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<RecordElement> = Vec::new();
    let mut root: Option<RecordElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(element_from_start(e)?),
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| "unbalanced closing tag".to_string())?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    // Entities arrive as separate `GeneralRef` events.
                    let text = e.decode().map_err(|e| e.to_string())?;
                    append_text(top, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    append_text(top, &String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(top) = stack.last_mut() {
                    let name = e.decode().map_err(|e| e.to_string())?;
                    if let Some(resolved) = resolve_reference(&name) {
                        append_text(top, &resolved);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML parsing error at position {}: {}",
                    reader.error_position(),
                    e
                ))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err("unexpected end of document".to_string());
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<RecordElement, String> {
    let mut element = RecordElement::new(String::from_utf8_lossy(start.local_name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [RecordElement], root: &mut Option<RecordElement>, element: RecordElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn append_text(element: &mut RecordElement, text: &str) {
    element.text.get_or_insert_with(String::new).push_str(text);
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse::<u32>().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    let resolved = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        _ => return None,
    };
    Some(resolved.to_string())
}

/// Reads the canonical fields out of an `<Event>` tree.
pub fn record_from_element(root: RecordElement) -> RawRecord {
    let mut record = RawRecord::new();

    if let Some(system) = root.child("System") {
        if let Some(id) = system.child("EventID").and_then(RecordElement::text) {
            record.insert(fields::EVENT_ID, id);
        }
        if let Some(level) = system.child("Level").and_then(RecordElement::text) {
            record.insert(fields::LEVEL, level);
        }
        if let Some(time) = system
            .child("TimeCreated")
            .and_then(|t| t.attribute("SystemTime"))
        {
            record.insert(fields::TIME_CREATED, time);
        }
        if let Some(provider) = system.child("Provider").and_then(|p| p.attribute("Name")) {
            record.insert(fields::PROVIDER, provider);
        }
        if let Some(computer) = system.child("Computer").and_then(RecordElement::text) {
            record.insert(fields::COMPUTER, computer);
        }
        if let Some(channel) = system.child("Channel").and_then(RecordElement::text) {
            record.insert(fields::CHANNEL, channel);
        }
    }

    if let Some(message) = build_message(&root) {
        record.insert(fields::MESSAGE, message);
    }

    record.element = Some(root);
    record
}

fn build_message(root: &RecordElement) -> Option<String> {
    if let Some(rendered) = root
        .find("RenderingInfo/Message")
        .and_then(RecordElement::text)
    {
        return Some(rendered.to_string());
    }

    let pairs: Vec<String> = if let Some(data) = root.child("EventData") {
        data.children
            .iter()
            .filter_map(|item| {
                let value = item.text()?;
                Some(match item.attribute("Name") {
                    Some(name) => format!("{}={}", name, value),
                    None => value.to_string(),
                })
            })
            .collect()
    } else if let Some(payload) = root.child("UserData").and_then(|u| u.children.first()) {
        payload
            .children
            .iter()
            .filter_map(|item| Some(format!("{}={}", item.name, item.text()?)))
            .collect()
    } else {
        Vec::new()
    };

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join(", "))
    }
}
