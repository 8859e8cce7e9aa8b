// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced provider wrapper for consistent observability

use super::{SessionError, SessionProvider};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gc_core::SessionConfig;
use std::path::Path;
use tracing::Instrument;

/// Wrapper that adds tracing to any SessionProvider
#[derive(Clone)]
pub struct TracedProvider<P> {
    inner: P,
}

impl<P> TracedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: SessionProvider> SessionProvider for TracedProvider<P> {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        async {
            tracing::info!(command = %cfg.command, env_count = cfg.env.len(), "starting");
            let start = std::time::Instant::now();
            let result = self.inner.start(name, cfg).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => tracing::info!(elapsed_ms, "session started"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "start failed"),
            }
            result
        }
        .instrument(tracing::info_span!("session.start", name))
        .await
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        let result = self.inner.stop(name).await;
        tracing::info_span!("session.stop", name).in_scope(|| match &result {
            Ok(()) => tracing::info!("stopped"),
            Err(e) => tracing::warn!(error = %e, "stop failed"),
        });
        result
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        let result = self.inner.interrupt(name).await;
        if let Err(ref e) = result {
            tracing::error!(name, error = %e, "interrupt failed");
        }
        result
    }

    async fn is_running(&self, name: &str) -> bool {
        let running = self.inner.is_running(name).await;
        tracing::trace!(name, running, "checked");
        running
    }

    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool {
        self.inner.process_alive(name, process_names).await
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        let result = self.inner.attach(name).await;
        if let Err(ref e) = result {
            tracing::error!(name, error = %e, "attach failed");
        }
        result
    }

    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        tracing::info_span!("session.nudge", name)
            .in_scope(|| tracing::debug!(message_len = message.len(), "nudging"));
        let result = self.inner.nudge(name, message).await;
        if let Err(ref e) = result {
            tracing::error!(error = %e, "nudge failed");
        }
        result
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        let result = self.inner.send_keys(name, keys).await;
        if let Err(ref e) = result {
            tracing::error!(name, error = %e, "send_keys failed");
        }
        result
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        let result = self.inner.set_meta(name, key, value).await;
        if let Err(ref e) = result {
            tracing::error!(name, key, error = %e, "set_meta failed");
        }
        result
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        self.inner.get_meta(name, key).await
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        self.inner.remove_meta(name, key).await
    }

    async fn peek(&self, name: &str, lines: i32) -> String {
        let captured = self.inner.peek(name, lines).await;
        tracing::info_span!("session.peek", name, lines)
            .in_scope(|| tracing::debug!(captured_len = captured.len(), "captured"));
        captured
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let result = self.inner.list_running(prefix).await;
        tracing::trace!(prefix, count = ?result.as_ref().map(Vec::len).ok(), "listed");
        result
    }

    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        self.inner.get_last_activity(name).await
    }

    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError> {
        self.inner.clear_scrollback(name).await
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        let result = self.inner.copy_to(name, src, rel_dst).await;
        if let Err(ref e) = result {
            tracing::error!(name, rel_dst, error = %e, "copy_to failed");
        }
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
