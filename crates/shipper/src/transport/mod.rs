// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of one batch to one destination.
//!
//! [`Transport::send`] drives a [`DeliveryState`] machine: each attempt is
//! classified as success, retryable or terminal, and retryable failures wait
//! per the [`RetryPolicy`] before the next attempt. The payload is serialized
//! once and the same bytes go out on every attempt.

pub mod attempt;
pub mod retry;

pub use attempt::{AttemptClass, AttemptRecorder, ChannelRecorder, DeliveryAttempt, TracingRecorder};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use crate::batch::Batch;
use crate::config::TransportConfig;
use crate::destinations::RequestRouting;
use crate::errors::{DeliveryError, FailureReason};
use crate::serializer::Serializer;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Every event in the batch was accepted.
    Delivered(usize),
    /// The attempt failed and another one will follow.
    RetryableFailure { reason: FailureReason, attempt: u32 },
    /// The batch is lost.
    TerminalFailure(FailureReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    Idle,
    Sending {
        attempt: u32,
    },
    AwaitingRetry {
        attempt: u32,
        delay: Duration,
        reason: FailureReason,
    },
    Success,
    Failed(FailureReason),
}

impl DeliveryState {
    /// Next state once `attempt` has produced `result`.
    pub fn after_attempt(
        policy: &RetryPolicy,
        attempt: u32,
        result: Result<(), DeliveryError>,
    ) -> DeliveryState {
        match result {
            Ok(()) => DeliveryState::Success,
            Err(DeliveryError::Terminal(reason)) => DeliveryState::Failed(reason),
            Err(DeliveryError::Retryable(reason)) => match policy.delay_after(attempt) {
                Some(delay) => DeliveryState::AwaitingRetry {
                    attempt,
                    delay,
                    reason,
                },
                None => DeliveryState::Failed(FailureReason::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(reason),
                }),
            },
        }
    }

    /// What the attempt that led here amounts to, for `batch_len` events.
    /// `None` while no attempt has completed.
    pub fn outcome(&self, batch_len: usize) -> Option<DeliveryOutcome> {
        match self {
            DeliveryState::Idle | DeliveryState::Sending { .. } => None,
            DeliveryState::AwaitingRetry {
                attempt, reason, ..
            } => Some(DeliveryOutcome::RetryableFailure {
                reason: reason.clone(),
                attempt: *attempt,
            }),
            DeliveryState::Success => Some(DeliveryOutcome::Delivered(batch_len)),
            DeliveryState::Failed(reason) => Some(DeliveryOutcome::TerminalFailure(reason.clone())),
        }
    }
}

/// 2xx succeeds; 429 and 5xx may succeed later; anything else never will.
pub fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = FailureReason::Status(status.as_u16());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(DeliveryError::Retryable(reason));
    }
    Err(DeliveryError::Terminal(reason))
}

pub fn classify_error(error: &reqwest::Error) -> DeliveryError {
    if error.is_timeout() {
        return DeliveryError::Retryable(FailureReason::Timeout);
    }
    if error.is_builder() {
        return DeliveryError::Terminal(FailureReason::Network(error.to_string()));
    }
    DeliveryError::Retryable(FailureReason::Network(error.to_string()))
}

#[derive(Clone)]
pub struct Transport {
    config: Arc<TransportConfig>,
    client: reqwest::Client,
    serializer: Serializer,
    url: String,
    headers: HeaderMap,
    destination: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    recorder: Arc<dyn AttemptRecorder>,
    cancel: CancellationToken,
}

impl Transport {
    pub fn new(
        config: Arc<TransportConfig>,
        client: reqwest::Client,
        routing: &dyn RequestRouting,
        serializer: Serializer,
    ) -> Self {
        let mut headers = routing.headers().clone();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(serializer.content_type()),
        );
        if let Some(encoding) = serializer.content_encoding() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        }

        Self {
            url: format!("{}{}", config.base_url(), routing.path()),
            destination: config.destination_id(),
            policy: RetryPolicy::new(config.retry_count(), config.retry_delay()),
            headers,
            config,
            client,
            serializer,
            sleeper: Arc::new(TokioSleeper),
            recorder: Arc::new(TracingRecorder),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn AttemptRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Delivers `batch`, retrying as configured. The returned outcome is
    /// never [`DeliveryOutcome::RetryableFailure`].
    pub async fn send(&self, batch: Batch) -> DeliveryOutcome {
        let batch_len = batch.len();
        if batch.is_empty() {
            return DeliveryOutcome::Delivered(0);
        }

        let payload = match self.serializer.serialize(batch.events()) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    destination = %self.destination,
                    events = batch_len,
                    "TRANSPORT | Dropping batch, failed to serialize: {e}"
                );
                return DeliveryOutcome::TerminalFailure(FailureReason::Payload(e.to_string()));
            }
        };

        let mut state = DeliveryState::Idle;
        loop {
            state = match state {
                DeliveryState::Idle => DeliveryState::Sending { attempt: 1 },
                DeliveryState::Sending { attempt } => {
                    if self.cancel.is_cancelled() {
                        DeliveryState::Failed(FailureReason::Cancelled)
                    } else {
                        let started = Instant::now();
                        let (result, status) = self.execute(payload.clone()).await;
                        let next = DeliveryState::after_attempt(&self.policy, attempt, result);
                        if let Some(outcome) = next.outcome(batch_len) {
                            self.recorder.record(&DeliveryAttempt {
                                destination: self.destination.clone(),
                                attempt,
                                outcome,
                                status,
                                elapsed: started.elapsed(),
                            });
                        }
                        next
                    }
                }
                DeliveryState::AwaitingRetry { attempt, delay, .. } => {
                    debug!(
                        destination = %self.destination,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "TRANSPORT | Retrying batch"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => DeliveryState::Failed(FailureReason::Cancelled),
                        () = self.sleeper.sleep(delay) => DeliveryState::Sending { attempt: attempt + 1 },
                    }
                }
                DeliveryState::Success => return DeliveryOutcome::Delivered(batch_len),
                DeliveryState::Failed(reason) => {
                    let (first, last) = batch.sequence_range().unwrap_or_default();
                    error!(
                        destination = %self.destination,
                        events = batch_len,
                        first_sequence = first,
                        last_sequence = last,
                        "TRANSPORT | Dropping batch: {reason}"
                    );
                    return DeliveryOutcome::TerminalFailure(reason);
                }
            };
        }
    }

    /// One HTTP attempt. Returns the classification and the status, when
    /// there was one.
    async fn execute(&self, payload: Bytes) -> (Result<(), DeliveryError>, Option<u16>) {
        let request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(payload);

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return (Err(DeliveryError::Terminal(FailureReason::Cancelled)), None);
            }
            response = request.send() => response,
        };

        match response {
            Ok(response) => {
                let status = response.status();
                (classify_status(status), Some(status.as_u16()))
            }
            Err(e) => (Err(classify_error(&e)), None),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("destination", &self.destination)
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(retry_count: u32) -> RetryPolicy {
        RetryPolicy::new(retry_count, Duration::from_millis(1000))
    }

    #[test]
    fn test_classify_status() {
        for code in [200, 201, 204] {
            assert!(classify_status(StatusCode::from_u16(code).expect("code")).is_ok());
        }
        for code in [429, 500, 502, 503, 504] {
            let err = classify_status(StatusCode::from_u16(code).expect("code")).expect_err("fail");
            assert!(err.is_retryable(), "{code} should be retryable");
        }
        for code in [100, 301, 400, 401, 403, 404, 413] {
            let err = classify_status(StatusCode::from_u16(code).expect("code")).expect_err("fail");
            assert!(!err.is_retryable(), "{code} should be terminal");
            assert_eq!(err.reason(), &FailureReason::Status(code));
        }
    }

    #[test]
    fn test_success_ends_the_machine() {
        let state = DeliveryState::after_attempt(&policy(3), 1, Ok(()));
        assert_eq!(state, DeliveryState::Success);
        assert_eq!(state.outcome(5), Some(DeliveryOutcome::Delivered(5)));
    }

    #[test]
    fn test_terminal_skips_retries() {
        let state = DeliveryState::after_attempt(
            &policy(3),
            1,
            Err(DeliveryError::Terminal(FailureReason::Status(400))),
        );
        assert_eq!(state, DeliveryState::Failed(FailureReason::Status(400)));
    }

    #[test]
    fn test_retryable_waits_then_exhausts() {
        let policy = policy(3);
        let mut delays = Vec::new();
        let mut attempt = 1;
        loop {
            let state = DeliveryState::after_attempt(
                &policy,
                attempt,
                Err(DeliveryError::Retryable(FailureReason::Status(503))),
            );
            match state {
                DeliveryState::AwaitingRetry { delay, .. } => {
                    delays.push(delay.as_millis());
                    attempt += 1;
                }
                DeliveryState::Failed(reason) => {
                    assert_eq!(
                        reason,
                        FailureReason::RetriesExhausted {
                            attempts: 4,
                            last: Box::new(FailureReason::Status(503)),
                        }
                    );
                    break;
                }
                other => panic!("unexpected state {other:?}"),
            }
        }
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn test_retryable_without_budget_fails_after_one_attempt() {
        let state = DeliveryState::after_attempt(
            &policy(0),
            1,
            Err(DeliveryError::Retryable(FailureReason::Timeout)),
        );
        assert!(matches!(
            state,
            DeliveryState::Failed(FailureReason::RetriesExhausted { attempts: 1, .. })
        ));
    }

    #[test]
    fn test_outcome_of_waiting_state() {
        let state = DeliveryState::AwaitingRetry {
            attempt: 2,
            delay: Duration::from_millis(2000),
            reason: FailureReason::Status(429),
        };
        assert_eq!(
            state.outcome(10),
            Some(DeliveryOutcome::RetryableFailure {
                reason: FailureReason::Status(429),
                attempt: 2
            })
        );
        assert_eq!(DeliveryState::Idle.outcome(10), None);
    }
}
