// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tolerant readers for the JSONL event log.
//!
//! A log written by concurrent appenders can contain interleaved partial
//! writes; every reader here skips lines that fail to parse rather than
//! propagating an error.

use crate::provider::RecorderError;
use chrono::{DateTime, FixedOffset};
use gc_core::EventRecord;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Selection predicate for log reads. Unset fields match everything:
/// empty `kind`/`actor`, `since = None`, `after_seq = 0`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kind: String,
    pub actor: String,
    pub since: Option<DateTime<FixedOffset>>,
    pub after_seq: u64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn since(mut self, since: DateTime<FixedOffset>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn after_seq(mut self, seq: u64) -> Self {
        self.after_seq = seq;
        self
    }

    /// True when the event passes every active field.
    pub fn matches(&self, event: &EventRecord) -> bool {
        if !self.kind.is_empty() && event.kind != self.kind {
            return false;
        }
        if !self.actor.is_empty() && event.actor != self.actor {
            return false;
        }
        if let Some(since) = self.since {
            if event.ts < since {
                return false;
            }
        }
        event.seq > self.after_seq
    }
}

/// Read the entire log in order. Missing file reads as empty.
pub fn read_all(path: &Path) -> Result<Vec<EventRecord>, RecorderError> {
    read_filtered(path, &EventFilter::default())
}

/// Read events matching `filter`, preserving log order.
pub fn read_filtered(path: &Path, filter: &EventFilter) -> Result<Vec<EventRecord>, RecorderError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut events = Vec::new();
    let mut line = String::new();
    let mut reader = BufReader::new(file);

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e.into()),
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        // Skip malformed lines: a concurrent appender may have torn a write
        let event: EventRecord = match serde_json::from_str(trimmed) {
            Ok(event) => event,
            Err(_) => continue,
        };

        if filter.matches(&event) {
            events.push(event);
        }
    }

    Ok(events)
}

/// Highest seq in the log, or 0 for a missing or empty file.
pub fn read_latest_seq(path: &Path) -> Result<u64, RecorderError> {
    let events = read_all(path)?;
    Ok(events.iter().map(|e| e.seq).max().unwrap_or(0))
}

/// Positional tail read: events at byte `offset` onward, plus the offset of
/// the first byte not consumed.
///
/// A trailing line without a newline is treated as an in-flight partial
/// write: it is not consumed and the returned offset stops before it, so
/// the next call re-reads it once complete.
pub fn read_from(path: &Path, offset: u64) -> Result<(Vec<EventRecord>, u64), RecorderError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), offset)),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(offset))?;

    let mut events = Vec::new();
    let mut new_offset = offset;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
            Err(e) => return Err(e.into()),
        };

        if !line.ends_with('\n') {
            // Partial trailing line: leave it for the next read
            break;
        }

        new_offset += bytes_read as u64;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Ok(event) = serde_json::from_str::<EventRecord>(trimmed) {
            events.push(event);
        }
    }

    Ok((events, new_offset))
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
