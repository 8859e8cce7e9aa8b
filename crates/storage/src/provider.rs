// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified interface over event log backends.

use crate::reader::EventFilter;
use async_trait::async_trait;
use gc_core::EventRecord;
use std::io;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from event log operations
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("watch cancelled")]
    Cancelled,
}

/// An event log that can be appended to, queried, and tailed.
#[async_trait]
pub trait EventProvider: Send + Sync {
    /// Append an event, assigning `seq` and stamping `ts` when unset.
    ///
    /// Never fails: observability must not fail a business operation.
    /// Write errors are logged and the event (with its assigned seq) is
    /// returned regardless.
    async fn record(&self, event: EventRecord) -> EventRecord;

    /// All events matching the filter, in log order.
    async fn list(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, RecorderError>;

    /// Highest assigned seq, or 0 when the log is empty.
    async fn latest_seq(&self) -> Result<u64, RecorderError>;

    /// Tail the log starting after `after_seq`.
    ///
    /// The watcher blocks in `next` until a later event is appended or
    /// `cancel` fires.
    async fn watch(&self, cancel: CancellationToken, after_seq: u64) -> Box<dyn EventWatcher>;
}

/// A blocking cursor over events appended after a starting seq.
#[async_trait]
pub trait EventWatcher: Send {
    /// The next event with `seq` greater than the last one yielded.
    ///
    /// Returns [`RecorderError::Cancelled`] once the watch token fires.
    async fn next(&mut self) -> Result<EventRecord, RecorderError>;
}
