// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-event transformations.
//!
//! Operations are configured as a list, compiled once, and applied in order to
//! every event before it is batched:
//!
//! ```yaml
//! operations:
//!   - type: key_name_replacement
//!     regex: "^_(.*)$"
//!     replacement: "$1"
//!   - type: drop_on_match
//!     field: path
//!     regex: "^/health"
//! ```

mod fields;
mod key_name;
pub mod pipeline;

pub use fields::{DeleteFields, DropOnMatch, LowercaseKeys};
pub use key_name::KeyNameReplacement;
pub use pipeline::{OperationPipeline, PipelineOutcome, TransformFailurePolicy};

use crate::errors::{ConfigError, TransformError};
use crate::event::Event;
use regex::Regex;
use serde::Deserialize;
use std::fmt::Debug;

/// Result of applying one operation to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Event(Event),
    /// The event was filtered out on purpose. Not a failure.
    Dropped,
}

/// A single transformation step. Implementations hold only what they compiled
/// at construction and never keep state between events.
pub trait Operation: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn apply(&self, event: Event) -> Result<Applied, TransformError>;
}

/// Serialized form of an operation, as found in the configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationConfig {
    /// Renames (or drops) keys whose name matches `regex`.
    KeyNameReplacement {
        regex: String,
        #[serde(default)]
        replacement: Option<String>,
        #[serde(default)]
        drop: bool,
    },
    LowercaseKeys,
    DeleteFields { fields: Vec<String> },
    /// Filters out events whose `field` is a string matching `regex`.
    DropOnMatch { field: String, regex: String },
}

impl OperationConfig {
    pub fn build(&self) -> Result<Box<dyn Operation>, ConfigError> {
        match self {
            OperationConfig::KeyNameReplacement {
                regex,
                replacement,
                drop,
            } => Ok(Box::new(KeyNameReplacement::new(
                regex,
                replacement.as_deref(),
                *drop,
            )?)),
            OperationConfig::LowercaseKeys => Ok(Box::new(LowercaseKeys)),
            OperationConfig::DeleteFields { fields } => {
                Ok(Box::new(DeleteFields::new(fields.clone())?))
            }
            OperationConfig::DropOnMatch { field, regex } => {
                Ok(Box::new(DropOnMatch::new(field, regex)?))
            }
        }
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::Invalid {
            field: "regex",
            reason: "pattern must not be empty".to_string(),
        });
    }
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_operation_list() {
        let raw = json!([
            {"type": "key_name_replacement", "regex": "^_(.*)$", "replacement": "$1"},
            {"type": "key_name_replacement", "regex": "secret", "drop": true},
            {"type": "lowercase_keys"},
            {"type": "delete_fields", "fields": ["password"]},
            {"type": "drop_on_match", "field": "path", "regex": "^/health"}
        ]);

        let configs: Vec<OperationConfig> = serde_json::from_value(raw).expect("valid configs");

        assert_eq!(configs.len(), 5);
        assert_eq!(
            configs[1],
            OperationConfig::KeyNameReplacement {
                regex: "secret".to_string(),
                replacement: None,
                drop: true,
            }
        );
        let names: Vec<&str> = configs
            .iter()
            .map(|c| c.build().expect("valid operation").name())
            .collect();
        assert_eq!(
            names,
            vec![
                "key_name_replacement",
                "key_name_replacement",
                "lowercase_keys",
                "delete_fields",
                "drop_on_match"
            ]
        );
    }

    #[test]
    fn test_unknown_operation_type_is_rejected() {
        let raw = json!({"type": "explode"});
        assert!(serde_json::from_value::<OperationConfig>(raw).is_err());
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let config = OperationConfig::DropOnMatch {
            field: "path".to_string(),
            regex: "(unclosed".to_string(),
        };
        assert!(matches!(config.build(), Err(ConfigError::Pattern { .. })));
    }
}
