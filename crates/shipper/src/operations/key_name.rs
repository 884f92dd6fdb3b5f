// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{compile_pattern, Applied, Operation};
use crate::errors::{ConfigError, TransformError};
use crate::event::Event;
use regex::Regex;
use serde_json::{Map, Value};

/// Renames keys whose name matches a pattern, or removes them when `drop` is
/// set. Walks nested objects, including objects inside arrays.
///
/// The replacement uses `regex` expansion syntax: `$1`, `${1}`, `${name}`.
/// Note that `$1abc` refers to a group named `1abc`; write `${1}abc` instead.
///
/// When a renamed key collides with a key already present at the same level,
/// the renamed value wins. When several renamed keys collide with each other,
/// the one whose original name sorts last wins.
#[derive(Debug)]
pub struct KeyNameReplacement {
    pattern: Regex,
    replacement: String,
    drop: bool,
}

impl KeyNameReplacement {
    pub fn new(pattern: &str, replacement: Option<&str>, drop: bool) -> Result<Self, ConfigError> {
        let pattern = compile_pattern(pattern)?;
        let replacement = replacement.unwrap_or_default();
        if !drop && replacement.is_empty() {
            return Err(ConfigError::Invalid {
                field: "replacement",
                reason: "replacement must not be empty unless drop is set".to_string(),
            });
        }
        Ok(Self {
            pattern,
            replacement: replacement.to_string(),
            drop,
        })
    }

    fn rewrite_object(&self, object: Map<String, Value>) -> Map<String, Value> {
        let mut kept = Map::new();
        let mut renamed = Vec::new();

        for (key, value) in object {
            let value = self.rewrite_value(value);
            if !self.pattern.is_match(&key) {
                kept.insert(key, value);
            } else if !self.drop {
                let new_key = self
                    .pattern
                    .replace_all(&key, self.replacement.as_str())
                    .into_owned();
                renamed.push((key, new_key, value));
            }
        }

        // Deterministic regardless of the map's iteration order.
        renamed.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, new_key, value) in renamed {
            kept.insert(new_key, value);
        }
        kept
    }

    fn rewrite_value(&self, value: Value) -> Value {
        match value {
            Value::Object(object) => Value::Object(self.rewrite_object(object)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.rewrite_value(v)).collect())
            }
            other => other,
        }
    }
}

impl Operation for KeyNameReplacement {
    fn name(&self) -> &'static str {
        "key_name_replacement"
    }

    fn apply(&self, event: Event) -> Result<Applied, TransformError> {
        let fields = self.rewrite_object(event.fields().clone());
        Ok(Applied::Event(event.with_fields(fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn event(value: Value) -> Event {
        match value {
            Value::Object(fields) => Event::new(1, fields),
            _ => panic!("test events must be objects"),
        }
    }

    fn applied(op: &KeyNameReplacement, input: Value) -> Value {
        match op.apply(event(input)).expect("apply") {
            Applied::Event(e) => Value::Object(e.into_fields()),
            Applied::Dropped => panic!("unexpected drop"),
        }
    }

    #[test]
    fn test_strips_leading_underscore() {
        let op = KeyNameReplacement::new("^_(.*)$", Some("$1"), false).expect("valid");
        assert_eq!(
            applied(&op, json!({"_foo": 1, "bar": 2})),
            json!({"foo": 1, "bar": 2})
        );
    }

    #[test]
    fn test_drop_removes_matching_keys() {
        let op = KeyNameReplacement::new("^secret", None, true).expect("valid");
        assert_eq!(
            applied(&op, json!({"secret_key": "x", "secretary": "y", "name": "z"})),
            json!({"name": "z"})
        );
    }

    #[test]
    fn test_rewrites_nested_objects_and_arrays() {
        let op = KeyNameReplacement::new(r"\.", Some("_"), false).expect("valid");
        assert_eq!(
            applied(
                &op,
                json!({"a.b": {"c.d": 1}, "list": [{"e.f": true}, 3, "g.h"]})
            ),
            json!({"a_b": {"c_d": 1}, "list": [{"e_f": true}, 3, "g.h"]})
        );
    }

    #[test]
    fn test_collision_renamed_key_wins() {
        let op = KeyNameReplacement::new("^_(.*)$", Some("$1"), false).expect("valid");
        assert_eq!(
            applied(&op, json!({"_foo": "renamed", "foo": "original"})),
            json!({"foo": "renamed"})
        );
    }

    #[test]
    fn test_named_group_replacement() {
        let op = KeyNameReplacement::new(r"^(?P<word>\w+)-(?P<n>\d+)$", Some("${n}_${word}"), false)
            .expect("valid");
        assert_eq!(applied(&op, json!({"key-1": 0})), json!({"1_key": 0}));
    }

    #[test]
    fn test_keeps_sequence_and_timestamp() {
        let op = KeyNameReplacement::new("a", Some("b"), false).expect("valid");
        let input = Event::from_json(42, r#"{"a": 1}"#)
            .expect("valid")
            .with_timestamp(10);
        let Applied::Event(output) = op.apply(input).expect("apply") else {
            panic!("unexpected drop");
        };
        assert_eq!(output.sequence(), 42);
        assert_eq!(output.timestamp_ms(), Some(10));
    }

    #[test]
    fn test_construction_validation() {
        assert!(matches!(
            KeyNameReplacement::new("", Some("x"), false),
            Err(ConfigError::Invalid { field: "regex", .. })
        ));
        assert!(matches!(
            KeyNameReplacement::new("a", Some(""), false),
            Err(ConfigError::Invalid {
                field: "replacement",
                ..
            })
        ));
        assert!(matches!(
            KeyNameReplacement::new("a", None, false),
            Err(ConfigError::Invalid {
                field: "replacement",
                ..
            })
        ));
        assert!(KeyNameReplacement::new("a", None, true).is_ok());
    }

    proptest! {
        #[test]
        fn prop_identity_when_nothing_matches(
            entries in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..16)
        ) {
            // Generated keys are lowercase only, so the pattern can never match.
            let op = KeyNameReplacement::new("[A-Z0-9_]", Some("x"), false).expect("valid");
            let fields: Map<String, Value> =
                entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
            let input = Event::new(5, fields);
            let output = op.apply(input.clone()).expect("apply");
            prop_assert_eq!(output, Applied::Event(input));
        }
    }
}
