// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event provider for tests and embedded use.

use crate::provider::{EventProvider, EventWatcher, RecorderError};
use crate::reader::EventFilter;
use async_trait::async_trait;
use chrono::Local;
use gc_core::EventRecord;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Event provider backed by a Vec, satisfying the same contract as the
/// file-backed one: monotonic seq, log-order list, blocking watch.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    events: Arc<Mutex<Vec<EventRecord>>>,
    notify: Arc<Notify>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventProvider for MemoryProvider {
    async fn record(&self, mut event: EventRecord) -> EventRecord {
        {
            let mut events = self.events.lock();
            event.seq = events.len() as u64 + 1;
            if event.ts_unset() {
                event.ts = Local::now().fixed_offset();
            }
            events.push(event.clone());
        }
        self.notify.notify_waiters();
        event
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, RecorderError> {
        let events = self.events.lock();
        Ok(events.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn latest_seq(&self) -> Result<u64, RecorderError> {
        Ok(self.events.lock().len() as u64)
    }

    async fn watch(&self, cancel: CancellationToken, after_seq: u64) -> Box<dyn EventWatcher> {
        Box::new(MemoryWatcher {
            events: Arc::clone(&self.events),
            notify: Arc::clone(&self.notify),
            cancel,
            last_seq: after_seq,
        })
    }
}

struct MemoryWatcher {
    events: Arc<Mutex<Vec<EventRecord>>>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    last_seq: u64,
}

#[async_trait]
impl EventWatcher for MemoryWatcher {
    async fn next(&mut self) -> Result<EventRecord, RecorderError> {
        loop {
            // Register interest before checking so an append between the
            // check and the await cannot be missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);

            {
                let events = self.events.lock();
                if let Some(event) = events.iter().find(|e| e.seq > self.last_seq) {
                    self.last_seq = event.seq;
                    return Ok(event.clone());
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.cancel.cancelled() => return Err(RecorderError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
