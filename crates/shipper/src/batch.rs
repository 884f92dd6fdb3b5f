// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::event::Event;

/// Ordered events bound for one destination. Never holds more than the
/// capacity it was created with.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    events: Vec<Event>,
    capacity: usize,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Batch holding `events` exactly. Capacity is the number of events.
    pub fn from_events(events: Vec<Event>) -> Self {
        let capacity = events.len().max(1);
        Self { events, capacity }
    }

    /// Adds `event`, handing it back when the batch is already full.
    pub fn try_push(&mut self, event: Event) -> Result<(), Event> {
        if self.is_full() {
            return Err(event);
        }
        self.events.push(event);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Sequence range covered, for logs.
    pub fn sequence_range(&self) -> Option<(u64, u64)> {
        let first = self.events.first()?.sequence();
        let last = self.events.last()?.sequence();
        Some((first, last))
    }
}

/// Collects events into batches of at most `batch_size`. Owned by a single
/// destination worker.
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    current: Batch,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            current: Batch::with_capacity(batch_size),
        }
    }

    /// Adds `event`; returns the batch once it has reached `batch_size`.
    /// A full batch is always taken here, so `current` never overflows.
    pub fn push(&mut self, event: Event) -> Option<Batch> {
        self.current.events.push(event);
        if self.current.is_full() {
            return Some(self.take());
        }
        None
    }

    /// Whatever is pending, if anything.
    pub fn flush(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        Some(self.take())
    }

    pub fn pending(&self) -> usize {
        self.current.len()
    }

    fn take(&mut self) -> Batch {
        std::mem::replace(&mut self.current, Batch::with_capacity(self.batch_size))
    }
}
