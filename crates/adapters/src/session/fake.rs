// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session provider for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SessionError, SessionProvider};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gc_core::SessionConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Start { name: String },
    Stop { name: String },
    Interrupt { name: String },
    Attach { name: String },
    Nudge { name: String, message: String },
    SendKeys { name: String, keys: Vec<String> },
    Peek { name: String, lines: i32 },
    SetMeta { name: String, key: String, value: String },
    GetMeta { name: String, key: String },
    RemoveMeta { name: String, key: String },
    ClearScrollback { name: String },
    CopyTo { name: String, src: PathBuf, rel_dst: String },
}

/// Fake session state
#[derive(Debug, Clone, Default)]
pub struct FakeSession {
    pub config: Option<SessionConfig>,
    pub alive: bool,
    pub process_running: bool,
    pub output: Vec<String>,
    pub meta: HashMap<String, String>,
    pub last_activity: Option<DateTime<FixedOffset>>,
}

#[derive(Default)]
struct FakeState {
    sessions: HashMap<String, FakeSession>,
    calls: Vec<ProviderCall>,
}

/// Fake session provider for testing
#[derive(Clone, Default)]
pub struct FakeSessionProvider {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.inner.lock().calls.clone()
    }

    /// Get a session by name
    pub fn get_session(&self, name: &str) -> Option<FakeSession> {
        self.inner.lock().sessions.get(name).cloned()
    }

    /// Add a pre-existing session (for liveness and zombie scenarios)
    pub fn add_session(&self, name: &str, alive: bool) {
        self.inner.lock().sessions.insert(
            name.to_string(),
            FakeSession {
                alive,
                process_running: alive,
                ..Default::default()
            },
        );
    }

    /// Set the pane output returned by peek
    pub fn set_output(&self, name: &str, output: Vec<String>) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.output = output;
        }
    }

    /// Set whether an agent process is running inside the session
    pub fn set_process_running(&self, name: &str, running: bool) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.process_running = running;
        }
    }

    pub fn set_last_activity(&self, name: &str, at: DateTime<FixedOffset>) {
        if let Some(session) = self.inner.lock().sessions.get_mut(name) {
            session.last_activity = Some(at);
        }
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Start {
            name: name.to_string(),
        });

        if inner.sessions.get(name).map(|s| s.alive).unwrap_or(false) {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        inner.sessions.insert(
            name.to_string(),
            FakeSession {
                config: Some(cfg.clone()),
                alive: true,
                process_running: true,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Stop {
            name: name.to_string(),
        });
        if let Some(session) = inner.sessions.get_mut(name) {
            session.alive = false;
            session.process_running = false;
        }
        Ok(())
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        self.inner.lock().calls.push(ProviderCall::Interrupt {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        let inner = self.inner.lock();
        inner
            .sessions
            .get(name)
            .map(|s| s.alive && s.process_running)
            .unwrap_or(false)
    }

    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool {
        if process_names.is_empty() {
            return true;
        }
        let inner = self.inner.lock();
        inner
            .sessions
            .get(name)
            .map(|s| s.process_running)
            .unwrap_or(false)
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Attach {
            name: name.to_string(),
        });
        if !inner.sessions.contains_key(name) {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        self.inner.lock().calls.push(ProviderCall::Nudge {
            name: name.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        self.inner.lock().calls.push(ProviderCall::SendKeys {
            name: name.to_string(),
            keys: keys.to_vec(),
        });
        Ok(())
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::SetMeta {
            name: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        match inner.sessions.get_mut(name) {
            Some(session) => {
                session.meta.insert(key.to_string(), value.to_string());
                Ok(())
            }
            None => Err(SessionError::NotFound(name.to_string())),
        }
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::GetMeta {
            name: name.to_string(),
            key: key.to_string(),
        });
        Ok(inner
            .sessions
            .get(name)
            .and_then(|s| s.meta.get(key))
            .cloned()
            .unwrap_or_default())
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::RemoveMeta {
            name: name.to_string(),
            key: key.to_string(),
        });
        if let Some(session) = inner.sessions.get_mut(name) {
            session.meta.remove(key);
        }
        Ok(())
    }

    async fn peek(&self, name: &str, lines: i32) -> String {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::Peek {
            name: name.to_string(),
            lines,
        });
        match inner.sessions.get(name) {
            Some(session) => {
                let take = if lines <= 0 {
                    session.output.len()
                } else {
                    lines as usize
                };
                let start = session.output.len().saturating_sub(take);
                session.output[start..].join("\n")
            }
            None => String::new(),
        }
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let inner = self.inner.lock();
        let mut names: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(name, session)| session.alive && name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        self.inner
            .lock()
            .sessions
            .get(name)
            .and_then(|s| s.last_activity)
    }

    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        inner.calls.push(ProviderCall::ClearScrollback {
            name: name.to_string(),
        });
        if let Some(session) = inner.sessions.get_mut(name) {
            session.output.clear();
        }
        Ok(())
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        self.inner.lock().calls.push(ProviderCall::CopyTo {
            name: name.to_string(),
            src: src.to_path_buf(),
            rel_dst: rel_dst.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
