// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only event record.
//!
//! Events are immutable once recorded. The recorder assigns `seq` and stamps
//! `ts` at write time; everything else is caller-supplied. On the wire an
//! event is a single JSON object per line, LF-terminated, with empty
//! `subject`/`message` and null `payload` omitted.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Epoch sentinel used for "timestamp not yet assigned".
pub fn epoch() -> DateTime<FixedOffset> {
    Utc.timestamp_opt(0, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

/// A single record in the event log.
///
/// `seq` is strictly monotonic in file order within one recorder instance.
/// Records are never mutated or deleted by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic sequence number, assigned by the recorder. 0 = unassigned.
    #[serde(default)]
    pub seq: u64,

    /// Wall-clock timestamp (RFC3339 with offset). Epoch = unassigned; the
    /// recorder stamps the current time before writing.
    #[serde(default = "epoch")]
    pub ts: DateTime<FixedOffset>,

    /// Event type, e.g. `"bead.closed"` or `"agent:started"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Who produced the event.
    pub actor: String,

    /// What the event is about.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,

    /// Free-text detail.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Opaque structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl EventRecord {
    /// New record with unassigned `seq` and `ts`.
    pub fn new(kind: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            seq: 0,
            ts: epoch(),
            kind: kind.into(),
            actor: actor.into(),
            subject: String::new(),
            message: String::new(),
            payload: None,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// True when the recorder has not yet stamped a timestamp.
    pub fn ts_unset(&self) -> bool {
        self.ts.timestamp() == 0 && self.ts.timestamp_subsec_nanos() == 0
    }

    /// Compact one-line summary for logs.
    pub fn log_summary(&self) -> String {
        if self.subject.is_empty() {
            format!("{} seq={} actor={}", self.kind, self.seq, self.actor)
        } else {
            format!(
                "{} seq={} actor={} subject={}",
                self.kind, self.seq, self.actor, self.subject
            )
        }
    }
}

#[cfg(test)]
#[path = "event_record_tests.rs"]
mod tests;
