// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::dispatcher::DEFAULT_CHANNEL_CAPACITY;
use crate::errors::ConfigError;
use crate::operations::TransformFailurePolicy;
use std::env;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MAX_CHANNEL_CAPACITY: u64 = 1_000_000;

/// Process-level settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipperSettings {
    /// One of trace, debug, info, warn, error
    pub log_level: String,
    pub transform_failure_policy: TransformFailurePolicy,
    /// Events buffered per destination before intake waits.
    pub channel_capacity: usize,
}

impl Default for ShipperSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            transform_failure_policy: TransformFailurePolicy::FailEvent,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ShipperSettings {
    /// Reads `SHIPPER_LOG_LEVEL`, `SHIPPER_TRANSFORM_FAILURE_POLICY` and
    /// `SHIPPER_CHANNEL_CAPACITY`. Unset variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let log_level = env::var("SHIPPER_LOG_LEVEL")
            .map(|val| val.trim().to_lowercase())
            .unwrap_or(defaults.log_level);
        let transform_failure_policy = match env::var("SHIPPER_TRANSFORM_FAILURE_POLICY") {
            Ok(val) => val.parse()?,
            Err(_) => defaults.transform_failure_policy,
        };
        let channel_capacity = match env::var("SHIPPER_CHANNEL_CAPACITY") {
            Ok(val) => {
                let capacity = val.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    field: "channel_capacity",
                    reason: e.to_string(),
                })?;
                if capacity == 0 || capacity > MAX_CHANNEL_CAPACITY {
                    return Err(ConfigError::OutOfRange {
                        field: "channel_capacity",
                        min: 1,
                        max: MAX_CHANNEL_CAPACITY,
                        value: capacity,
                    });
                }
                usize::try_from(capacity).map_err(|e| ConfigError::Invalid {
                    field: "channel_capacity",
                    reason: e.to_string(),
                })?
            }
            Err(_) => defaults.channel_capacity,
        };

        let settings = Self {
            log_level,
            transform_failure_policy,
            channel_capacity,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                field: "log_level",
                reason: format!(
                    "'{}' is not one of: trace, debug, info, warn, error",
                    self.log_level
                ),
            });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                field: "channel_capacity",
                min: 1,
                max: MAX_CHANNEL_CAPACITY,
                value: 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 3] = [
        "SHIPPER_LOG_LEVEL",
        "SHIPPER_TRANSFORM_FAILURE_POLICY",
        "SHIPPER_CHANNEL_CAPACITY",
    ];

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(ShipperSettings::default().validate().is_ok());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let settings = ShipperSettings {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(settings.validate().is_ok(), "'{level}' should be valid");
        }
        let settings = ShipperSettings {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear();
        assert_eq!(
            ShipperSettings::from_env().expect("valid"),
            ShipperSettings::default()
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear();
        env::set_var("SHIPPER_LOG_LEVEL", "DEBUG");
        env::set_var("SHIPPER_TRANSFORM_FAILURE_POLICY", "fail_run");
        env::set_var("SHIPPER_CHANNEL_CAPACITY", "64");

        let settings = ShipperSettings::from_env().expect("valid");
        clear();

        assert_eq!(settings.log_level, "debug");
        assert_eq!(
            settings.transform_failure_policy,
            TransformFailurePolicy::FailRun
        );
        assert_eq!(settings.channel_capacity, 64);
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_values() {
        let cases = [
            ("SHIPPER_LOG_LEVEL", "loud"),
            ("SHIPPER_TRANSFORM_FAILURE_POLICY", "retry"),
            ("SHIPPER_CHANNEL_CAPACITY", "0"),
            ("SHIPPER_CHANNEL_CAPACITY", "lots"),
        ];
        for (var, value) in cases {
            clear();
            env::set_var(var, value);
            assert!(
                ShipperSettings::from_env().is_err(),
                "{var}={value} should be rejected"
            );
        }
        clear();
    }
}
