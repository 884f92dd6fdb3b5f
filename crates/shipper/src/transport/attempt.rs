// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-attempt delivery records for downstream metrics.
//!
//! Records carry the destination identity, the attempt number and how the
//! attempt was classified. They never carry event content.

use super::DeliveryOutcome;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    Success,
    Retryable,
    Terminal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryAttempt {
    pub destination: String,
    /// 1-based.
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    /// HTTP status, when the destination answered at all.
    pub status: Option<u16>,
    pub elapsed: Duration,
}

impl DeliveryAttempt {
    pub fn class(&self) -> AttemptClass {
        match self.outcome {
            DeliveryOutcome::Delivered(_) => AttemptClass::Success,
            DeliveryOutcome::RetryableFailure { .. } => AttemptClass::Retryable,
            DeliveryOutcome::TerminalFailure(_) => AttemptClass::Terminal,
        }
    }
}

pub trait AttemptRecorder: Send + Sync + Debug {
    fn record(&self, attempt: &DeliveryAttempt);
}

/// Emits every attempt as a structured log record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl AttemptRecorder for TracingRecorder {
    fn record(&self, attempt: &DeliveryAttempt) {
        let elapsed_ms = u64::try_from(attempt.elapsed.as_millis()).unwrap_or(u64::MAX);
        match attempt.class() {
            AttemptClass::Success => debug!(
                destination = %attempt.destination,
                attempt = attempt.attempt,
                status = attempt.status,
                elapsed_ms,
                "TRANSPORT | delivered batch"
            ),
            class => warn!(
                destination = %attempt.destination,
                attempt = attempt.attempt,
                status = attempt.status,
                elapsed_ms,
                class = ?class,
                outcome = ?attempt.outcome,
                "TRANSPORT | delivery attempt failed"
            ),
        }
    }
}

/// Forwards every attempt to a channel, for a metrics consumer elsewhere in
/// the process. Records are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<DeliveryAttempt>,
}

impl ChannelRecorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryAttempt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AttemptRecorder for ChannelRecorder {
    fn record(&self, attempt: &DeliveryAttempt) {
        TracingRecorder.record(attempt);
        if self.tx.send(attempt.clone()).is_err() {
            debug!("TRANSPORT | attempt receiver dropped");
        }
    }
}
