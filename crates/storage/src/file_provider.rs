// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed event provider: a [`FileRecorder`] plus tolerant readers and
//! a polling tail watcher.

use crate::provider::{EventProvider, EventWatcher, RecorderError};
use crate::reader::{self, EventFilter};
use crate::recorder::FileRecorder;
use async_trait::async_trait;
use gc_core::EventRecord;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Poll cadence for the tail watcher.
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Event provider over one on-disk JSONL log.
pub struct FileProvider {
    recorder: FileRecorder,
}

impl FileProvider {
    /// Open or create the log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let recorder = FileRecorder::open(&path.into())?;
        Ok(Self { recorder })
    }
}

#[async_trait]
impl EventProvider for FileProvider {
    async fn record(&self, event: EventRecord) -> EventRecord {
        self.recorder.record(event)
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, RecorderError> {
        reader::read_filtered(self.recorder.path(), filter)
    }

    async fn latest_seq(&self) -> Result<u64, RecorderError> {
        Ok(self.recorder.latest_seq())
    }

    async fn watch(&self, cancel: CancellationToken, after_seq: u64) -> Box<dyn EventWatcher> {
        Box::new(FileWatcher {
            path: self.recorder.path().to_owned(),
            offset: 0,
            last_seq: after_seq,
            pending: VecDeque::new(),
            cancel,
        })
    }
}

/// Offset-polling tail watcher over the log file.
struct FileWatcher {
    path: PathBuf,
    offset: u64,
    last_seq: u64,
    pending: VecDeque<EventRecord>,
    cancel: CancellationToken,
}

#[async_trait]
impl EventWatcher for FileWatcher {
    async fn next(&mut self) -> Result<EventRecord, RecorderError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                self.last_seq = event.seq;
                return Ok(event);
            }

            let (events, new_offset) = reader::read_from(&self.path, self.offset)?;
            self.offset = new_offset;
            self.pending
                .extend(events.into_iter().filter(|e| e.seq > self.last_seq));

            if !self.pending.is_empty() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(WATCH_POLL_INTERVAL) => {}
                _ = self.cancel.cancelled() => return Err(RecorderError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
#[path = "file_provider_tests.rs"]
mod tests;
