// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event cursor glue for exactly-once event gates.
//!
//! When an event gate fires, the dispatcher labels the resulting work item
//! `seq:<N>` with the seq that caused the firing. The next evaluation's
//! cursor is the maximum such label over the automation's work items, so
//! each event seq dispatches at most once.

/// Label recording the event seq that caused a dispatch.
pub fn seq_label(seq: u64) -> String {
    format!("seq:{}", seq)
}

/// Highest `seq:<N>` label in the set, or 0 when none parse.
///
/// Unparseable or foreign labels are ignored.
pub fn max_seq_label<S: AsRef<str>>(labels: &[S]) -> u64 {
    labels
        .iter()
        .filter_map(|label| label.as_ref().strip_prefix("seq:"))
        .filter_map(|rest| rest.parse().ok())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
