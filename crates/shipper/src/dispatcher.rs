// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs events through the pipeline and fans them out to every destination.
//!
//! Each destination gets its own worker task owning a [`BatchAccumulator`]
//! and a [`Transport`]. Workers are fed over bounded channels, so a
//! destination that is slow or retrying pushes back on intake. Batches for
//! one destination are sent strictly in order.

use crate::batch::BatchAccumulator;
use crate::errors::{DispatchError, FailureReason, TransformError};
use crate::event::Event;
use crate::operations::{OperationPipeline, PipelineOutcome, TransformFailurePolicy};
use crate::settings::ShipperSettings;
use crate::transport::{DeliveryOutcome, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Delivery totals for one destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationSummary {
    pub destination: String,
    pub delivered_events: u64,
    pub failed_events: u64,
    pub delivered_batches: u64,
    pub failed_batches: u64,
    pub last_failure: Option<FailureReason>,
}

impl DestinationSummary {
    fn new(destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, events: usize, outcome: DeliveryOutcome) {
        let events = events as u64;
        match outcome {
            DeliveryOutcome::Delivered(_) => {
                self.delivered_events += events;
                self.delivered_batches += 1;
            }
            DeliveryOutcome::TerminalFailure(reason)
            | DeliveryOutcome::RetryableFailure { reason, .. } => {
                self.failed_events += events;
                self.failed_batches += 1;
                self.last_failure = Some(reason);
            }
        }
    }
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub received: u64,
    pub filtered: u64,
    pub transform_failed: u64,
    pub destinations: Vec<DestinationSummary>,
}

impl RunSummary {
    pub fn destination(&self, destination: &str) -> Option<&DestinationSummary> {
        self.destinations
            .iter()
            .find(|summary| summary.destination == destination)
    }

    pub fn delivered_events(&self) -> u64 {
        self.destinations.iter().map(|d| d.delivered_events).sum()
    }

    pub fn failed_events(&self) -> u64 {
        self.destinations.iter().map(|d| d.failed_events).sum()
    }

    /// Nothing failed to transform or deliver.
    pub fn is_clean(&self) -> bool {
        self.transform_failed == 0 && self.failed_events() == 0
    }
}

pub struct Dispatcher {
    pipeline: Arc<OperationPipeline>,
    transports: Vec<Transport>,
    policy: TransformFailurePolicy,
    channel_capacity: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Every transport is rebound to the dispatcher's cancellation token.
    pub fn new(pipeline: OperationPipeline, transports: Vec<Transport>) -> Self {
        let cancel = CancellationToken::new();
        Self {
            pipeline: Arc::new(pipeline),
            transports: transports
                .into_iter()
                .map(|transport| transport.with_cancellation(cancel.child_token()))
                .collect(),
            policy: TransformFailurePolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            cancel,
        }
    }

    pub fn from_settings(
        settings: &ShipperSettings,
        pipeline: OperationPipeline,
        transports: Vec<Transport>,
    ) -> Self {
        Self::new(pipeline, transports)
            .with_policy(settings.transform_failure_policy)
            .with_channel_capacity(settings.channel_capacity)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TransformFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Binds the run to `cancel`, which may be shared with the caller's own
    /// shutdown. Transports are rebound to child tokens of it.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.transports = self
            .transports
            .into_iter()
            .map(|transport| transport.with_cancellation(cancel.child_token()))
            .collect();
        self.cancel = cancel;
        self
    }

    /// Cancelling this token stops intake, aborts retry waits and in-flight
    /// requests, and fails every pending batch without contacting any
    /// destination.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consumes `events` until the sender side closes or the run is
    /// cancelled, then flushes every destination.
    pub async fn run(&self, mut events: mpsc::Receiver<Event>) -> Result<RunSummary, DispatchError> {
        let mut run = self.start();
        loop {
            let event = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    warn!("DISPATCH | Run cancelled, stopping intake");
                    break;
                }
                event = events.recv() => event,
            };
            let Some(event) = event else { break };
            if !run.accept(event).await {
                break;
            }
        }
        run.finish().await
    }

    /// [`Dispatcher::run`] over an in-memory source.
    pub async fn run_iter<I>(&self, events: I) -> Result<RunSummary, DispatchError>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut run = self.start();
        for event in events {
            if self.cancel.is_cancelled() {
                warn!("DISPATCH | Run cancelled, stopping intake");
                break;
            }
            if !run.accept(event).await {
                break;
            }
        }
        run.finish().await
    }

    fn start(&self) -> ActiveRun {
        let mut workers = Vec::with_capacity(self.transports.len());
        for transport in &self.transports {
            let (tx, rx) = mpsc::channel(self.channel_capacity);
            let destination = transport.destination().to_string();
            let handle = tokio::spawn(destination_worker(transport.clone(), rx));
            workers.push(Worker {
                destination,
                tx,
                handle,
            });
        }
        debug!(
            destinations = workers.len(),
            operations = self.pipeline.len(),
            "DISPATCH | Run started"
        );
        ActiveRun {
            pipeline: Arc::clone(&self.pipeline),
            policy: self.policy,
            workers,
            summary: RunSummary::default(),
            aborted: None,
        }
    }
}

struct Worker {
    destination: String,
    tx: mpsc::Sender<Event>,
    handle: JoinHandle<DestinationSummary>,
}

struct ActiveRun {
    pipeline: Arc<OperationPipeline>,
    policy: TransformFailurePolicy,
    workers: Vec<Worker>,
    summary: RunSummary,
    aborted: Option<(u64, TransformError)>,
}

impl ActiveRun {
    /// Returns `false` once intake must stop.
    async fn accept(&mut self, event: Event) -> bool {
        self.summary.received += 1;
        match self.pipeline.process(event) {
            PipelineOutcome::Transformed(event) => {
                self.fan_out(event).await;
                true
            }
            PipelineOutcome::Dropped { .. } => {
                self.summary.filtered += 1;
                true
            }
            PipelineOutcome::Failed { sequence, error } => {
                self.summary.transform_failed += 1;
                match self.policy {
                    TransformFailurePolicy::FailEvent => {
                        warn!(sequence, %error, "DISPATCH | Dropping event that failed to transform");
                        true
                    }
                    TransformFailurePolicy::FailRun => {
                        error!(sequence, %error, "DISPATCH | Aborting run, event failed to transform");
                        self.aborted = Some((sequence, error));
                        false
                    }
                }
            }
        }
    }

    async fn fan_out(&mut self, event: Event) {
        let Some((last, rest)) = self.workers.split_last() else {
            return;
        };
        for worker in rest {
            if worker.tx.send(event.clone()).await.is_err() {
                error!(destination = %worker.destination, "DISPATCH | Worker is gone, event lost");
            }
        }
        if last.tx.send(event).await.is_err() {
            error!(destination = %last.destination, "DISPATCH | Worker is gone, event lost");
        }
    }

    async fn finish(self) -> Result<RunSummary, DispatchError> {
        let ActiveRun {
            workers,
            mut summary,
            aborted,
            ..
        } = self;

        let mut worker_error = None;
        for Worker {
            destination,
            tx,
            handle,
        } in workers
        {
            // Closing the channel lets the worker flush and exit.
            drop(tx);
            match handle.await {
                Ok(destination_summary) => summary.destinations.push(destination_summary),
                Err(e) => {
                    error!(%destination, "DISPATCH | Worker failed: {e}");
                    if worker_error.is_none() {
                        worker_error = Some(DispatchError::Worker {
                            destination,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            received = summary.received,
            filtered = summary.filtered,
            transform_failed = summary.transform_failed,
            delivered = summary.delivered_events(),
            failed = summary.failed_events(),
            "DISPATCH | Run finished"
        );

        if let Some(error) = worker_error {
            return Err(error);
        }
        if let Some((sequence, error)) = aborted {
            return Err(DispatchError::TransformAborted {
                sequence,
                error,
                summary,
            });
        }
        Ok(summary)
    }
}

async fn destination_worker(transport: Transport, mut rx: mpsc::Receiver<Event>) -> DestinationSummary {
    let mut accumulator = BatchAccumulator::new(transport.batch_size());
    let mut summary = DestinationSummary::new(transport.destination());

    while let Some(event) = rx.recv().await {
        if let Some(batch) = accumulator.push(event) {
            let events = batch.len();
            summary.record(events, transport.send(batch).await);
        }
    }
    if let Some(batch) = accumulator.flush() {
        let events = batch.len();
        debug!(
            destination = %transport.destination(),
            events,
            "DISPATCH | Flushing final batch"
        );
        summary.record(events, transport.send(batch).await);
    }
    summary
}
