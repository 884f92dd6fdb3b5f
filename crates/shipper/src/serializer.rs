// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns a batch of events into the exact bytes sent to a destination.
//!
//! Every event is encoded as compact JSON with object keys in sorted order,
//! followed by the destination separator. Gzip, when enabled, is applied to
//! the whole joined payload. The output depends only on the events, so a
//! retry always resends identical bytes.

use crate::errors::SerializeError;
use crate::event::Event;
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression as GzLevel};
use serde::ser::{Serialize, SerializeMap, Serializer as _};
use serde_json::Value;
use std::io::Write;

/// Shape of one encoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFormat {
    /// The event fields as a JSON object.
    Raw,
    /// Splunk HEC envelope: `{"event": {...}, "index": "...", "time": 1.5}`.
    SplunkHec { index: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

#[derive(Debug, Clone)]
pub struct Serializer {
    format: EventFormat,
    separator: Vec<u8>,
    compression: Compression,
}

impl Serializer {
    pub fn new(format: EventFormat, separator: impl Into<Vec<u8>>, compression: Compression) -> Self {
        Self {
            format,
            separator: separator.into(),
            compression,
        }
    }

    pub fn format(&self) -> &EventFormat {
        &self.format
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Value for the `Content-Encoding` header, if any.
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self.compression {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
        }
    }

    pub fn content_type(&self) -> &'static str {
        "application/json"
    }

    pub fn serialize(&self, events: &[Event]) -> Result<Bytes, SerializeError> {
        let mut buffer = Vec::new();
        for event in events {
            self.encode_event(event, &mut buffer)
                .map_err(|source| SerializeError::Encode {
                    sequence: event.sequence(),
                    source,
                })?;
            buffer.extend_from_slice(&self.separator);
        }

        match self.compression {
            Compression::None => Ok(Bytes::from(buffer)),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder.write_all(&buffer)?;
                Ok(Bytes::from(encoder.finish()?))
            }
        }
    }

    fn encode_event(&self, event: &Event, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
        let mut serializer = serde_json::Serializer::new(out);
        match &self.format {
            EventFormat::Raw => Canonical::Object(event.fields()).serialize(&mut serializer),
            EventFormat::SplunkHec { index } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("event", &Canonical::Object(event.fields()))?;
                if let Some(index) = index {
                    map.serialize_entry("index", index)?;
                }
                if let Some(ts) = event.timestamp_ms() {
                    // Seconds with millisecond precision, as HEC expects.
                    #[allow(clippy::cast_precision_loss)]
                    let seconds = ts as f64 / 1000.0;
                    map.serialize_entry("time", &seconds)?;
                }
                map.end()
            }
        }
    }
}

/// Serializes JSON with object keys sorted, independent of how the map
/// stores them.
enum Canonical<'a> {
    Value(&'a Value),
    Object(&'a serde_json::Map<String, Value>),
}

impl Serialize for Canonical<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Canonical::Object(object) => {
                let mut entries: Vec<(&String, &Value)> = object.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, &Canonical::Value(value))?;
                }
                map.end()
            }
            Canonical::Value(Value::Object(object)) => Canonical::Object(object).serialize(serializer),
            Canonical::Value(Value::Array(items)) => {
                serializer.collect_seq(items.iter().map(Canonical::Value))
            }
            Canonical::Value(scalar) => scalar.serialize(serializer),
        }
    }
}
