// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session provider
//!
//! One named session maps to one tmux session on the local server. Meta
//! lives in the session environment table, activity comes from the
//! session activity counter, and peek captures the pane.

use super::{
    join_process_names, split_process_names, SessionError, SessionProvider, META_PROCESS_NAMES,
    META_WORK_DIR,
};
use crate::startup::{
    accept_startup_dialogs_via, run_startup, wait_for_command_via, wait_for_ready_via, ReadySpec,
    StartupOps,
};
use crate::subprocess::{run_hook_command, run_with_timeout, HOOK_TIMEOUT, TMUX_TIMEOUT};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use gc_core::SessionConfig;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Tmux-backed session provider.
#[derive(Clone, Default)]
pub struct TmuxProvider {
    /// Per-session locks so concurrent nudges cannot interleave keystrokes
    /// mid-prompt.
    nudge_locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl TmuxProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match target for tmux `-t` (bare names are prefix matches).
    fn target(name: &str) -> String {
        format!("={}", name)
    }

    async fn tmux(&self, args: &[&str]) -> Result<Output, SessionError> {
        let mut cmd = Command::new("tmux");
        cmd.args(args);
        run_with_timeout(cmd, TMUX_TIMEOUT, "tmux")
            .await
            .map_err(SessionError::Transport)
    }

    fn nudge_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.nudge_locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// First pane PID of the session, if it exists.
    async fn pane_pid(&self, name: &str) -> Option<i32> {
        let output = self
            .tmux(&["list-panes", "-t", &Self::target(name), "-F", "#{pane_pid}"])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()?
            .trim()
            .parse()
            .ok()
    }

    /// Check one candidate against the pane process and its children.
    async fn candidate_alive(&self, pane_pid: i32, pattern: &str) -> bool {
        let pid_arg = pane_pid.to_string();
        let ps = Command::new("ps")
            .args(["-p", &pid_arg, "-o", "command="])
            .output()
            .await;
        if let Ok(output) = ps {
            if output.status.success()
                && String::from_utf8_lossy(&output.stdout).contains(pattern)
            {
                return true;
            }
        }

        let pgrep = Command::new("pgrep")
            .args(["-P", &pid_arg, "-f", pattern])
            .output()
            .await;
        matches!(pgrep, Ok(output) if output.status.success())
    }

    async fn session_work_dir(&self, name: &str) -> String {
        let stored = self.get_meta(name, META_WORK_DIR).await.unwrap_or_default();
        if !stored.is_empty() {
            return stored;
        }
        // Fall back to the pane's current path
        match self
            .tmux(&[
                "display-message",
                "-p",
                "-t",
                &Self::target(name),
                "#{pane_current_path}",
            ])
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            _ => String::new(),
        }
    }
}

#[async_trait]
impl SessionProvider for TmuxProvider {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        run_startup(self, name, cfg).await
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        let pane_pid = self.pane_pid(name).await;

        let output = self
            .tmux(&["kill-session", "-t", &Self::target(name)])
            .await?;
        if !output.status.success() {
            // Session already gone, which is fine
            debug!(session = name, "kill-session on absent session");
        }

        // The pane process group can outlive the session object
        if let Some(pid) = pane_pid {
            let _ = kill(Pid::from_raw(-pid), Signal::SIGKILL);
        }

        self.nudge_locks.lock().remove(name);
        Ok(())
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["send-keys", "-t", &Self::target(name), "C-c"])
            .await?;
        if !output.status.success() {
            debug!(session = name, "interrupt on absent session");
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        if !StartupOps::has_session(self, name).await {
            return false;
        }
        let stored = self
            .get_meta(name, META_PROCESS_NAMES)
            .await
            .unwrap_or_default();
        if stored.is_empty() {
            return true;
        }
        self.process_alive(name, &split_process_names(&stored)).await
    }

    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool {
        if process_names.is_empty() {
            return true;
        }
        let Some(pane_pid) = self.pane_pid(name).await else {
            return false;
        };
        for pattern in process_names {
            if self.candidate_alive(pane_pid, pattern).await {
                return true;
            }
        }
        false
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        let status = Command::new("tmux")
            .args(["attach-session", "-t", &Self::target(name)])
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .status()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        if !status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        // Serialize per session: keystrokes interleaved mid-prompt corrupt
        // the agent's input line
        let lock = self.nudge_lock(name);
        let _guard = lock.lock().await;

        // -l = literal mode, -- = end of options (message may start with -)
        let output = self
            .tmux(&["send-keys", "-t", &Self::target(name), "-l", "--", message])
            .await?;
        if !output.status.success() {
            warn!(session = name, "nudge target missing");
            return Ok(());
        }

        let output = self
            .tmux(&["send-keys", "-t", &Self::target(name), "Enter"])
            .await?;
        if !output.status.success() {
            warn!(session = name, "nudge Enter target missing");
        }
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        let target = Self::target(name);
        let mut args = vec!["send-keys", "-t", &target];
        args.extend(keys.iter().map(String::as_str));
        let output = self.tmux(&args).await?;
        if !output.status.success() {
            warn!(session = name, "send-keys target missing");
        }
        Ok(())
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["set-environment", "-t", &Self::target(name), key, value])
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        let output = self
            .tmux(&["show-environment", "-t", &Self::target(name), key])
            .await?;
        if !output.status.success() {
            // Unset key (or missing session) reads as empty
            return Ok(String::new());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .trim_end()
            .split_once('=')
            .map(|(_, value)| value.to_string())
            .unwrap_or_default())
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["set-environment", "-t", &Self::target(name), "-r", key])
            .await?;
        if !output.status.success() {
            debug!(session = name, key, "remove-meta target missing");
        }
        Ok(())
    }

    async fn peek(&self, name: &str, lines: i32) -> String {
        let start = if lines <= 0 {
            "-".to_string()
        } else {
            format!("-{}", lines)
        };
        match self
            .tmux(&["capture-pane", "-p", "-t", &Self::target(name), "-S", &start])
            .await
        {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).to_string()
            }
            _ => String::new(),
        }
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let output = self
            .tmux(&["list-sessions", "-F", "#{session_name}"])
            .await?;
        if !output.status.success() {
            // No server running means no sessions
            return Ok(Vec::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        let output = self
            .tmux(&[
                "display-message",
                "-p",
                "-t",
                &Self::target(name),
                "#{session_activity}",
            ])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let epoch: i64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
        Utc.timestamp_opt(epoch, 0).single().map(|t| t.fixed_offset())
    }

    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["clear-history", "-t", &Self::target(name)])
            .await?;
        if !output.status.success() {
            debug!(session = name, "clear-history target missing");
        }
        Ok(())
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        let work_dir = self.session_work_dir(name).await;
        if work_dir.is_empty() {
            warn!(session = name, "copy-to skipped: unknown work dir");
            return Ok(());
        }
        let dst = Path::new(&work_dir).join(rel_dst);
        if let Some(parent) = dst.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(session = name, error = %e, "copy-to mkdir failed");
                return Ok(());
            }
        }
        if let Err(e) = tokio::fs::copy(src, &dst).await {
            warn!(session = name, src = %src.display(), dst = %dst.display(), error = %e, "copy-to failed");
        }
        Ok(())
    }
}

#[async_trait]
impl StartupOps for TmuxProvider {
    async fn create_session(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        if StartupOps::has_session(self, name).await {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        let target_name = name.to_string();
        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            target_name,
        ];
        if !cfg.work_dir.is_empty() {
            args.push("-c".into());
            args.push(cfg.work_dir.clone());
        }
        for (key, value) in &cfg.env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }
        args.push(cfg.command.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.tmux(&arg_refs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("duplicate session") {
                return Err(SessionError::AlreadyExists(name.to_string()));
            }
            return Err(SessionError::StartFailed(stderr.trim().to_string()));
        }

        // Log stderr even on success - may contain useful warnings
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(session = name, stderr = %stderr, "tmux new-session stderr (non-fatal)");
        }

        // Remember liveness candidates and the work dir for later calls,
        // possibly from another process
        if !cfg.process_names.is_empty() {
            self.set_meta(name, META_PROCESS_NAMES, &join_process_names(&cfg.process_names))
                .await?;
        }
        if !cfg.work_dir.is_empty() {
            self.set_meta(name, META_WORK_DIR, &cfg.work_dir).await?;
        }

        Ok(())
    }

    async fn is_agent_alive(&self, name: &str, process_names: &[String]) -> bool {
        self.process_alive(name, process_names).await
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&["kill-session", "-t", &Self::target(name)])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Transport(format!(
                "kill-session {}: {}",
                name,
                stderr.trim()
            )));
        }
        Ok(())
    }

    async fn wait_for_command(
        &self,
        name: &str,
        process_names: &[String],
        timeout: Duration,
    ) -> bool {
        wait_for_command_via(self, name, process_names, timeout).await
    }

    async fn accept_startup_dialogs(&self, name: &str) {
        accept_startup_dialogs_via(self, name).await;
    }

    async fn wait_for_ready(&self, name: &str, ready: &ReadySpec, timeout: Duration) {
        wait_for_ready_via(self, name, ready, timeout).await;
    }

    async fn has_session(&self, name: &str) -> bool {
        match self.tmux(&["has-session", "-t", &Self::target(name)]).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        SessionProvider::send_keys(self, name, keys).await
    }

    async fn set_remain_on_exit(&self, name: &str) -> Result<(), SessionError> {
        let output = self
            .tmux(&[
                "set-option",
                "-t",
                &Self::target(name),
                "remain-on-exit",
                "on",
            ])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SessionError::Transport(stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn run_setup_command(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        let work_dir = self.session_work_dir(name).await;
        let dir = if work_dir.is_empty() {
            None
        } else {
            Some(work_dir.as_str())
        };
        run_hook_command(command, dir, env, HOOK_TIMEOUT)
            .await
            .map_err(SessionError::Transport)
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
