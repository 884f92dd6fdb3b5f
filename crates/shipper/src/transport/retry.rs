// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Exponential backoff: the wait after attempt `n` is `retry_delay * 2^(n-1)`,
/// or a flat `retry_delay` when only one retry is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, retry_delay: Duration) -> Self {
        Self {
            retry_count,
            retry_delay,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// How long to wait after a retryable failure of `attempt` (1-based), or
    /// `None` once the retry budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.retry_count {
            return None;
        }
        if self.retry_count <= 1 {
            return Some(self.retry_delay);
        }
        let factor = 2_u32.saturating_pow(attempt - 1);
        Some(self.retry_delay.saturating_mul(factor))
    }

    /// Every wait in order, assuming each attempt fails retryably.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.retry_count)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

/// Waits between attempts. Swapped out in tests to observe delays without
/// sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
