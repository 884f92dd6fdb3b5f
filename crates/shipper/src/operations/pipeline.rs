// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{Applied, Operation, OperationConfig};
use crate::errors::{ConfigError, TransformError};
use crate::event::Event;
use serde::Deserialize;
use std::str::FromStr;
use tracing::debug;

/// What a transform failure does to the rest of the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFailurePolicy {
    /// Lose only the failing event.
    #[default]
    FailEvent,
    /// Stop accepting input after the first failing event.
    FailRun,
}

impl FromStr for TransformFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail_event" => Ok(Self::FailEvent),
            "fail_run" => Ok(Self::FailRun),
            other => Err(ConfigError::Invalid {
                field: "transform_failure_policy",
                reason: format!("expected fail_event or fail_run, got '{other}'"),
            }),
        }
    }
}

/// Where one event ended up after the whole chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Transformed(Event),
    Dropped {
        sequence: u64,
    },
    Failed {
        sequence: u64,
        error: TransformError,
    },
}

/// Ordered chain of operations. Each operation sees only the output of the
/// ones before it.
#[derive(Debug, Default)]
pub struct OperationPipeline {
    operations: Vec<Box<dyn Operation>>,
}

impl OperationPipeline {
    pub fn new(operations: Vec<Box<dyn Operation>>) -> Self {
        Self { operations }
    }

    pub fn from_configs(configs: &[OperationConfig]) -> Result<Self, ConfigError> {
        let operations = configs
            .iter()
            .map(OperationConfig::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(operations))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn process(&self, event: Event) -> PipelineOutcome {
        let sequence = event.sequence();
        let mut current = event;
        for operation in &self.operations {
            match operation.apply(current) {
                Ok(Applied::Event(next)) => current = next,
                Ok(Applied::Dropped) => {
                    debug!(
                        sequence,
                        operation = operation.name(),
                        "PIPELINE | event filtered"
                    );
                    return PipelineOutcome::Dropped { sequence };
                }
                Err(error) => {
                    debug!(sequence, %error, "PIPELINE | event failed to transform");
                    return PipelineOutcome::Failed { sequence, error };
                }
            }
        }
        PipelineOutcome::Transformed(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{DropOnMatch, KeyNameReplacement, LowercaseKeys};
    use serde_json::{json, Value};

    fn event(raw: &str) -> Event {
        Event::from_json(11, raw).expect("valid event")
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = OperationPipeline::default();
        let input = event(r#"{"a": 1}"#);
        assert!(pipeline.is_empty());
        assert_eq!(
            pipeline.process(input.clone()),
            PipelineOutcome::Transformed(input)
        );
    }

    #[test]
    fn test_operations_run_in_order() {
        // Lowercasing first makes the uppercase pattern unable to match.
        let lower_then_rename = OperationPipeline::new(vec![
            Box::new(LowercaseKeys),
            Box::new(KeyNameReplacement::new("^KEY$", Some("renamed"), false).expect("valid")),
        ]);
        let rename_then_lower = OperationPipeline::new(vec![
            Box::new(KeyNameReplacement::new("^KEY$", Some("renamed"), false).expect("valid")),
            Box::new(LowercaseKeys),
        ]);

        let PipelineOutcome::Transformed(first) = lower_then_rename.process(event(r#"{"KEY": 1}"#))
        else {
            panic!("expected transformed event");
        };
        let PipelineOutcome::Transformed(second) = rename_then_lower.process(event(r#"{"KEY": 1}"#))
        else {
            panic!("expected transformed event");
        };

        assert_eq!(Value::Object(first.into_fields()), json!({"key": 1}));
        assert_eq!(Value::Object(second.into_fields()), json!({"renamed": 1}));
    }

    #[test]
    fn test_drop_short_circuits() {
        let pipeline = OperationPipeline::new(vec![
            Box::new(DropOnMatch::new("level", "debug").expect("valid")),
            // Would fail on every event if it ever ran.
            Box::new(DropOnMatch::new("count", "x").expect("valid")),
        ]);
        assert_eq!(
            pipeline.process(event(r#"{"level": "debug", "count": 3}"#)),
            PipelineOutcome::Dropped { sequence: 11 }
        );
    }

    #[test]
    fn test_failure_is_scoped_to_event() {
        let pipeline = OperationPipeline::new(vec![Box::new(
            DropOnMatch::new("count", "x").expect("valid"),
        )]);

        let failed = pipeline.process(event(r#"{"count": 3}"#));
        let passed = pipeline.process(event(r#"{"count": "3"}"#));

        assert!(matches!(failed, PipelineOutcome::Failed { sequence: 11, .. }));
        assert!(matches!(passed, PipelineOutcome::Transformed(_)));
    }

    #[test]
    fn test_from_configs_propagates_errors() {
        let configs = vec![OperationConfig::KeyNameReplacement {
            regex: String::new(),
            replacement: Some("x".to_string()),
            drop: false,
        }];
        assert!(OperationPipeline::from_configs(&configs).is_err());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!(
            "fail_run".parse::<TransformFailurePolicy>().expect("valid"),
            TransformFailurePolicy::FailRun
        );
        assert_eq!(
            " FAIL_EVENT ".parse::<TransformFailurePolicy>().expect("valid"),
            TransformFailurePolicy::FailEvent
        );
        assert!("sometimes".parse::<TransformFailurePolicy>().is_err());
        assert_eq!(
            TransformFailurePolicy::default(),
            TransformFailurePolicy::FailEvent
        );
    }
}
