// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The record flowing through the pipeline.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// One discrete record: string keys mapped to JSON values, tagged with the
/// sequence id assigned when it entered the system.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    sequence: u64,
    timestamp_ms: Option<i64>,
    fields: Map<String, Value>,
}

impl Event {
    pub fn new(sequence: u64, fields: Map<String, Value>) -> Self {
        Self {
            sequence,
            timestamp_ms: None,
            fields,
        }
    }

    /// Parses one JSON object. Anything but an object is rejected.
    pub fn from_json(sequence: u64, raw: &str) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = serde_json::from_str(raw)?;
        Ok(Self::new(sequence, fields))
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Event time in milliseconds since the Unix epoch, when the source knew it.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.timestamp_ms
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Replaces the fields, keeping sequence and timestamp.
    #[must_use]
    pub fn with_fields(self, fields: Map<String, Value>) -> Self {
        Self { fields, ..self }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Hands out monotonically increasing sequence ids to source adapters.
#[derive(Debug, Default)]
pub struct Sequencer {
    next: AtomicU64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn event(&self, fields: Map<String, Value>) -> Event {
        Event::new(self.next_id(), fields)
    }
}
