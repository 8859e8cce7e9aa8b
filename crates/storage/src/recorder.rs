// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL event recorder.

use crate::provider::RecorderError;
use crate::reader;
use chrono::Local;
use gc_core::EventRecord;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::error;

struct Inner {
    file: File,
    next_seq: u64,
}

/// Single-writer event recorder over one log file.
///
/// The counter and the file handle advance together under one mutex, so
/// successful `record` calls observe a strictly increasing `seq` and the
/// file is written in `seq` order. The file is opened in append mode;
/// recorders in other processes coexist at line atomicity but race on seq
/// assignment — seq uniqueness holds only within one recorder instance.
pub struct FileRecorder {
    inner: Mutex<Inner>,
    path: PathBuf,
}

impl FileRecorder {
    /// Open or create the log, scanning once for the highest existing seq.
    pub fn open(path: &Path) -> Result<Self, RecorderError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let next_seq = reader::read_latest_seq(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Mutex::new(Inner { file, next_seq }),
            path: path.to_owned(),
        })
    }

    /// Append one event, assigning the next seq and stamping `ts` when the
    /// caller left it unset.
    ///
    /// Failures are swallowed: marshal or write errors are logged and the
    /// event is returned with its assigned seq regardless. Observability
    /// must never fail a business operation.
    pub fn record(&self, mut event: EventRecord) -> EventRecord {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        event.seq = inner.next_seq;
        if event.ts_unset() {
            event.ts = Local::now().fixed_offset();
        }

        match serde_json::to_vec(&event) {
            Ok(mut line) => {
                line.push(b'\n');
                if let Err(e) = inner.file.write_all(&line) {
                    error!(path = %self.path.display(), seq = event.seq, error = %e, "event write failed");
                }
            }
            Err(e) => {
                error!(path = %self.path.display(), seq = event.seq, error = %e, "event marshal failed");
            }
        }

        event
    }

    /// Highest seq this recorder has assigned (or found at open).
    pub fn latest_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "recorder_tests.rs"]
mod tests;
