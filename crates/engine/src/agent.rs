// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent façade: one agent's identity bound to a provider-backed session.

use gc_adapters::{SessionError, SessionProvider};
use gc_core::{session_name, shell_quote, SessionConfig};
use std::sync::Arc;

/// A named agent in a city, bound to the provider that materializes its
/// session.
///
/// The façade holds values only and never mutates shared state; every
/// operation delegates to the provider under the derived session name.
#[derive(Clone)]
pub struct Agent {
    name: String,
    city: String,
    config: SessionConfig,
    prompt: String,
    session_template: String,
    provider: Arc<dyn SessionProvider>,
}

impl Agent {
    /// Bind `name` in `city` to a provider, with the agent's base config.
    pub fn new(
        city: impl Into<String>,
        name: impl Into<String>,
        config: SessionConfig,
        provider: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            city: city.into(),
            config,
            prompt: String::new(),
            session_template: String::new(),
            provider,
        }
    }

    /// Prompt appended to the command line, single-quoted.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Session-name template; empty uses `gc-{city}-{agent}`.
    pub fn with_session_template(mut self, template: impl Into<String>) -> Self {
        self.session_template = template.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    /// Backend session name for this agent.
    pub fn session_name(&self) -> String {
        session_name(&self.city, &self.name, &self.session_template)
    }

    /// The config this agent's session would start with.
    ///
    /// Pure: derived from the agent's values alone. The prompt rides on
    /// the command line, POSIX-quoted so arbitrary text survives the
    /// shell.
    pub fn session_config(&self) -> SessionConfig {
        let mut cfg = self.config.clone();
        if !self.prompt.is_empty() {
            cfg.command = format!("{} {}", cfg.command, shell_quote(&self.prompt));
        }
        cfg
    }

    /// Identity fingerprint of the session this agent would start.
    pub fn fingerprint(&self) -> String {
        self.session_config().fingerprint()
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.provider
            .start(&self.session_name(), &self.session_config())
            .await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.provider.stop(&self.session_name()).await
    }

    pub async fn attach(&self) -> Result<(), SessionError> {
        self.provider.attach(&self.session_name()).await
    }

    pub async fn nudge(&self, message: &str) -> Result<(), SessionError> {
        self.provider.nudge(&self.session_name(), message).await
    }

    pub async fn interrupt(&self) -> Result<(), SessionError> {
        self.provider.interrupt(&self.session_name()).await
    }

    pub async fn peek(&self, lines: i32) -> String {
        self.provider.peek(&self.session_name(), lines).await
    }

    /// True iff the session exists and, when the agent declares process
    /// names, one of them is alive.
    pub async fn is_running(&self) -> bool {
        let session = self.session_name();
        if !self.provider.is_running(&session).await {
            return false;
        }
        if self.config.process_names.is_empty() {
            return true;
        }
        self.provider
            .process_alive(&session, &self.config.process_names)
            .await
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
