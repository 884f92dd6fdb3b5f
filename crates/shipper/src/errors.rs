// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy shared by the pipeline, the serializer and the transports.

use crate::dispatcher::RunSummary;
use std::fmt;

/// Invalid configuration, raised while building operations or destinations.
/// Never produced once events are flowing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("`{field}` must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u64,
        max: u64,
        value: u64,
    },

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to decrypt credential: {0}")]
    Decryption(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// An operation could not be applied to one event. Only that event is lost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {reason}")]
pub struct TransformError {
    pub operation: &'static str,
    pub reason: String,
}

impl TransformError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// The batch could not be turned into a payload.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("failed to encode event {sequence}: {source}")]
    Encode {
        sequence: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),
}

/// Why a batch (or one attempt at it) did not make it to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The destination answered with a non-success status.
    Status(u16),
    /// Connect, reset or other transport-level error.
    Network(String),
    /// The socket timeout elapsed.
    Timeout,
    /// The payload could not be serialized or compressed.
    Payload(String),
    /// The run was cancelled before the batch could be delivered.
    Cancelled,
    /// Every retry was spent on retryable failures.
    RetriesExhausted {
        attempts: u32,
        last: Box<FailureReason>,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(code) => write!(f, "destination responded with status {code}"),
            FailureReason::Network(msg) => write!(f, "network error: {msg}"),
            FailureReason::Timeout => write!(f, "request timed out"),
            FailureReason::Payload(msg) => write!(f, "payload error: {msg}"),
            FailureReason::Cancelled => write!(f, "delivery cancelled"),
            FailureReason::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts, last error: {last}")
            }
        }
    }
}

/// Classification of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Network, timeout, 5xx or 429. May succeed if tried again.
    #[error("retryable delivery error: {0}")]
    Retryable(FailureReason),
    /// Cannot succeed without reconfiguration.
    #[error("terminal delivery error: {0}")]
    Terminal(FailureReason),
}

impl DeliveryError {
    pub fn reason(&self) -> &FailureReason {
        match self {
            DeliveryError::Retryable(reason) | DeliveryError::Terminal(reason) => reason,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Retryable(_))
    }
}

/// A whole run stopped early.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// An event failed to transform under the fail-the-run policy. The summary
    /// covers everything accepted before the failure.
    #[error("run aborted by event {sequence}: {error}")]
    TransformAborted {
        sequence: u64,
        error: TransformError,
        summary: RunSummary,
    },

    #[error("worker for {destination} stopped unexpectedly: {message}")]
    Worker {
        destination: String,
        message: String,
    },
}
