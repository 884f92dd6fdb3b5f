// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{compile_pattern, Applied, Operation};
use crate::errors::{ConfigError, TransformError};
use crate::event::Event;
use regex::Regex;
use serde_json::{Map, Value};

/// Lowercases every key, recursively. Colliding keys: last one in iteration
/// order wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseKeys;

impl LowercaseKeys {
    fn lowercase_value(value: Value) -> Value {
        match value {
            Value::Object(object) => Value::Object(Self::lowercase_object(object)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(Self::lowercase_value).collect())
            }
            other => other,
        }
    }

    fn lowercase_object(object: Map<String, Value>) -> Map<String, Value> {
        object
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), Self::lowercase_value(v)))
            .collect()
    }
}

impl Operation for LowercaseKeys {
    fn name(&self) -> &'static str {
        "lowercase_keys"
    }

    fn apply(&self, event: Event) -> Result<Applied, TransformError> {
        let fields = Self::lowercase_object(event.fields().clone());
        Ok(Applied::Event(event.with_fields(fields)))
    }
}

/// Removes a fixed list of top-level keys.
#[derive(Debug, Clone)]
pub struct DeleteFields {
    fields: Vec<String>,
}

impl DeleteFields {
    pub fn new(fields: Vec<String>) -> Result<Self, ConfigError> {
        if fields.is_empty() || fields.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid {
                field: "fields",
                reason: "at least one non-empty field name is required".to_string(),
            });
        }
        Ok(Self { fields })
    }
}

impl Operation for DeleteFields {
    fn name(&self) -> &'static str {
        "delete_fields"
    }

    fn apply(&self, event: Event) -> Result<Applied, TransformError> {
        let mut fields = event.fields().clone();
        for name in &self.fields {
            fields.remove(name);
        }
        Ok(Applied::Event(event.with_fields(fields)))
    }
}

/// Drops the whole event when `field` holds a string matching the pattern.
#[derive(Debug)]
pub struct DropOnMatch {
    field: String,
    pattern: Regex,
}

impl DropOnMatch {
    pub fn new(field: &str, pattern: &str) -> Result<Self, ConfigError> {
        if field.is_empty() {
            return Err(ConfigError::Missing("field"));
        }
        Ok(Self {
            field: field.to_string(),
            pattern: compile_pattern(pattern)?,
        })
    }
}

impl Operation for DropOnMatch {
    fn name(&self) -> &'static str {
        "drop_on_match"
    }

    fn apply(&self, event: Event) -> Result<Applied, TransformError> {
        match event.get(&self.field) {
            None | Some(Value::Null) => Ok(Applied::Event(event)),
            Some(Value::String(value)) if self.pattern.is_match(value) => Ok(Applied::Dropped),
            Some(Value::String(_)) => Ok(Applied::Event(event)),
            Some(_) => Err(TransformError::new(
                self.name(),
                format!("field `{}` is not a string", self.field),
            )),
        }
    }
}
