// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session provider contract and backends

pub mod kube;
pub mod local;
pub mod script;
pub mod tmux;
pub mod traced;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gc_core::SessionConfig;
use std::path::Path;
use thiserror::Error;

/// Reserved meta key holding the comma-joined process names given at start.
pub(crate) const META_PROCESS_NAMES: &str = "_gc_process_names";

/// Reserved meta key holding the working directory given at start.
pub(crate) const META_WORK_DIR: &str = "_gc_work_dir";

/// Errors from session operations.
///
/// `AlreadyExists` is signaled distinctly so start can run zombie
/// detection; `NotFound` is success for every mutator; `Transport` is a
/// backend failure and always surfaces.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already exists: {0}")]
    AlreadyExists(String),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("start failed: {0}")]
    StartFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Uniform lifecycle and control surface over one named session.
///
/// At most one live session per name per provider instance. Operations on
/// distinct names are independent; concurrent start+stop on one name is
/// the caller's race to avoid.
///
/// Best-effort operations (`interrupt`, `nudge`, `send_keys`, `peek`,
/// `clear_scrollback`, `copy_to`) absorb missing-session failures and log
/// instead; `start`, `stop`, `attach`, and `set_meta` surface transport
/// errors.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create and verify the session.
    ///
    /// Fails with [`SessionError::AlreadyExists`] when a healthy session of
    /// the same name exists; zombie sessions (shell alive, agent dead) are
    /// killed and recreated when `process_names` allow the distinction.
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError>;

    /// Destroy the session and its process tree. Idempotent: an absent
    /// session is success.
    async fn stop(&self, name: &str) -> Result<(), SessionError>;

    /// Soft interrupt (Ctrl-C equivalent); best-effort.
    async fn interrupt(&self, name: &str) -> Result<(), SessionError>;

    /// True iff the session exists and, when process names were given at
    /// start, at least one candidate agent process is alive.
    async fn is_running(&self, name: &str) -> bool;

    /// Liveness of the given candidate processes inside the session.
    /// An empty candidate list is vacuously alive.
    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool;

    /// Hand the caller's stdio to the session; blocks until detach.
    async fn attach(&self, name: &str) -> Result<(), SessionError>;

    /// Deliver `message` as keyboard input followed by a line terminator;
    /// best-effort.
    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError>;

    /// Deliver bare key tokens (e.g. "Enter", "Down"); best-effort.
    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError>;

    /// Store a per-session key/value pair.
    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError>;

    /// Read a per-session value; unset keys read as empty with no error.
    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError>;

    /// Remove a per-session key; unset keys are success.
    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError>;

    /// Last `lines` of terminal output; all scrollback when `lines <= 0`.
    /// Unsupported or failed captures read as empty.
    async fn peek(&self, name: &str, lines: i32) -> String;

    /// Names of live sessions with the given prefix.
    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError>;

    /// Wall-clock time of last observed activity; `None` when unknown.
    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>>;

    /// Drop captured scrollback; best-effort.
    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError>;

    /// Stage one host file into the session filesystem; best-effort.
    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError>;
}

/// Join process names for storage in session meta.
pub(crate) fn join_process_names(names: &[String]) -> String {
    names.join(",")
}

/// Split process names stored in session meta.
pub(crate) fn split_process_names(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
