// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Common startup orchestration used by provider `start` implementations.
//!
//! The sequence turns a declarative [`SessionConfig`] into a live,
//! verified-ready session: pre-start hooks, fresh-session guarantee with
//! zombie recovery, crash forensics, command wait, startup dialog
//! dismissal, readiness polling, liveness verification, setup hooks, and
//! the post-ready nudge. Every step except session creation and the final
//! liveness check is best-effort.

use crate::session::{SessionError, SessionProvider};
use crate::subprocess::{run_hook_command, HOOK_TIMEOUT};
use async_trait::async_trait;
use gc_core::SessionConfig;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

/// How long to wait for the agent command to appear in the session.
pub const COMMAND_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll cadence while waiting for the agent command.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for the readiness prompt.
pub const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll cadence while waiting for the readiness prompt.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Pane lines scanned for dialogs and the readiness prompt.
const SCAN_LINES: i32 = 30;

/// Render grace before each dialog scan.
const DIALOG_RENDER_WAIT: Duration = Duration::from_secs(1);

/// Settle time after confirming the workspace-trust dialog.
const TRUST_CONFIRM_WAIT: Duration = Duration::from_millis(500);

/// Settle time after selecting the bypass-permissions option.
const BYPASS_SELECT_WAIT: Duration = Duration::from_millis(200);

/// Readiness hints extracted from a [`SessionConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadySpec {
    /// Suffix the last non-empty pane line carries once interactive.
    pub prompt_prefix: String,
    /// Fixed wait; a floor when the prompt prefix is also set.
    pub delay: Duration,
}

impl ReadySpec {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            prompt_prefix: cfg.ready_prompt_prefix.clone(),
            delay: Duration::from_millis(cfg.ready_delay_ms),
        }
    }

    /// True when either readiness hint is present.
    pub fn is_set(&self) -> bool {
        !self.prompt_prefix.is_empty() || !self.delay.is_zero()
    }
}

/// The narrow capability set the orchestrator drives.
///
/// Each backend implements these over its own primitives; tests drive the
/// orchestrator with an in-memory fake and assert on the call sequence.
#[async_trait]
pub trait StartupOps: Send + Sync {
    /// Create the backend session; [`SessionError::AlreadyExists`] must be
    /// distinguishable for zombie detection.
    async fn create_session(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError>;

    /// True when one of the candidate agent processes is alive inside the
    /// session.
    async fn is_agent_alive(&self, name: &str, process_names: &[String]) -> bool;

    /// Destroy the session so it can be recreated.
    async fn kill_session(&self, name: &str) -> Result<(), SessionError>;

    /// Poll until one of the candidate processes appears; false on timeout.
    async fn wait_for_command(
        &self,
        name: &str,
        process_names: &[String],
        timeout: Duration,
    ) -> bool;

    /// Run the startup dialog protocol; idempotent and best-effort.
    async fn accept_startup_dialogs(&self, name: &str);

    /// Poll until the session looks interactive; timeout is not an error.
    async fn wait_for_ready(&self, name: &str, ready: &ReadySpec, timeout: Duration);

    /// True when the backend still reports the session.
    async fn has_session(&self, name: &str) -> bool;

    /// Deliver key tokens into the session.
    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError>;

    /// Keep the session object around after the command exits, so crash
    /// output stays inspectable.
    async fn set_remain_on_exit(&self, name: &str) -> Result<(), SessionError>;

    /// Run one setup command on the host with the given environment.
    async fn run_setup_command(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionError>;
}

/// Run the full startup sequence for `name`.
pub async fn run_startup(
    ops: &dyn StartupOps,
    name: &str,
    cfg: &SessionConfig,
) -> Result<(), SessionError> {
    for command in &cfg.pre_start {
        if let Err(e) = run_hook_command(
            command,
            Some(cfg.work_dir.as_str()),
            &cfg.env,
            HOOK_TIMEOUT,
        )
        .await
        {
            warn!(session = name, error = %e, "pre-start hook failed");
        }
    }

    ensure_fresh_session(ops, name, cfg).await?;

    if let Err(e) = ops.set_remain_on_exit(name).await {
        warn!(session = name, error = %e, "enabling remain-on-exit failed");
    }

    // Shortcut only when there is also nothing to probe: process names
    // drive the command wait and dialog scan below, and a session started
    // for liveness probing must still pass the final has_session check
    if cfg.fire_and_forget() && cfg.process_names.is_empty() {
        return Ok(());
    }

    if !cfg.process_names.is_empty()
        && !ops
            .wait_for_command(name, &cfg.process_names, COMMAND_WAIT_TIMEOUT)
            .await
    {
        warn!(session = name, "agent command did not appear before timeout");
    }

    if !cfg.process_names.is_empty() || cfg.emits_permission_warning {
        ops.accept_startup_dialogs(name).await;
    }

    let ready = ReadySpec::from_config(cfg);
    if ready.is_set() {
        ops.wait_for_ready(name, &ready, READY_TIMEOUT).await;
    }

    if !ops.has_session(name).await {
        return Err(SessionError::StartFailed(format!(
            "session {} died during startup",
            name
        )));
    }

    let mut env = cfg.env.clone();
    env.insert("GC_SESSION".to_string(), name.to_string());
    for command in &cfg.session_setup {
        if let Err(e) = ops.run_setup_command(name, command, &env).await {
            warn!(session = name, command, error = %e, "session setup command failed");
        }
    }
    if !cfg.session_setup_script.is_empty() {
        if let Err(e) = ops
            .run_setup_command(name, &cfg.session_setup_script, &env)
            .await
        {
            warn!(session = name, script = %cfg.session_setup_script, error = %e, "session setup script failed");
        }
    }

    if !cfg.nudge.is_empty() {
        if let Err(e) = ops
            .send_keys(name, &[cfg.nudge.clone(), "Enter".to_string()])
            .await
        {
            warn!(session = name, error = %e, "post-ready nudge failed");
        }
    }

    Ok(())
}

/// Guarantee a freshly created session, recovering from zombies.
///
/// A zombie is a session whose shell survived but whose agent exited.
/// Without process names the two cases are indistinguishable and the
/// existing session is left alone.
pub async fn ensure_fresh_session(
    ops: &dyn StartupOps,
    name: &str,
    cfg: &SessionConfig,
) -> Result<(), SessionError> {
    match ops.create_session(name, cfg).await {
        Ok(()) => Ok(()),
        Err(SessionError::AlreadyExists(_)) => {
            if cfg.process_names.is_empty() {
                return Err(SessionError::AlreadyExists(name.to_string()));
            }
            if ops.is_agent_alive(name, &cfg.process_names).await {
                return Err(SessionError::AlreadyExists(name.to_string()));
            }

            warn!(session = name, "zombie session detected, recreating");
            ops.kill_session(name).await?;
            match ops.create_session(name, cfg).await {
                Ok(()) => Ok(()),
                // Lost a race with a concurrent creator; their session wins
                Err(SessionError::AlreadyExists(_)) => Ok(()),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// Poll the provider until one of the candidate processes is alive.
pub async fn wait_for_command_via(
    provider: &dyn SessionProvider,
    name: &str,
    process_names: &[String],
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    loop {
        if provider.process_alive(name, process_names).await {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(COMMAND_POLL_INTERVAL).await;
    }
}

/// Dismiss the two startup dialogs an agent may show, in order.
///
/// Workspace-trust: default option is "yes", Enter confirms. The
/// bypass-permissions warning is not default-selected: Down then Enter.
/// Both scans are no-ops when the trigger text is absent.
pub async fn accept_startup_dialogs_via(provider: &dyn SessionProvider, name: &str) {
    tokio::time::sleep(DIALOG_RENDER_WAIT).await;
    let tail = provider.peek(name, SCAN_LINES).await;
    if tail.contains("trust this folder") || tail.contains("Quick safety check") {
        debug!(session = name, "confirming workspace-trust dialog");
        let _ = provider.send_keys(name, &["Enter".to_string()]).await;
        tokio::time::sleep(TRUST_CONFIRM_WAIT).await;
    }

    tokio::time::sleep(DIALOG_RENDER_WAIT).await;
    let tail = provider.peek(name, SCAN_LINES).await;
    if tail.contains("Bypass Permissions mode") {
        debug!(session = name, "accepting bypass-permissions warning");
        let _ = provider.send_keys(name, &["Down".to_string()]).await;
        tokio::time::sleep(BYPASS_SELECT_WAIT).await;
        let _ = provider.send_keys(name, &["Enter".to_string()]).await;
    }
}

/// Poll the pane until the last non-empty line ends with the ready prompt.
///
/// With only a delay configured, sleeps the delay. With both, the prompt
/// decides but the delay is a floor. Timing out is not an error: the
/// caller verifies liveness next.
pub async fn wait_for_ready_via(
    provider: &dyn SessionProvider,
    name: &str,
    ready: &ReadySpec,
    timeout: Duration,
) {
    if ready.prompt_prefix.is_empty() {
        if !ready.delay.is_zero() {
            tokio::time::sleep(ready.delay).await;
        }
        return;
    }

    let start = Instant::now();
    loop {
        if start.elapsed() >= ready.delay {
            let tail = provider.peek(name, SCAN_LINES).await;
            // Pane captures strip trailing spaces, so compare trimmed ends
            let wanted = ready.prompt_prefix.trim_end();
            let last_line = tail
                .lines()
                .rev()
                .map(str::trim_end)
                .find(|line| !line.is_empty());
            if let Some(line) = last_line {
                if line.ends_with(wanted) {
                    return;
                }
            }
        }
        if start.elapsed() >= timeout {
            debug!(session = name, "readiness prompt did not appear before timeout");
            return;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
