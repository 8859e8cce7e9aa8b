// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local detached-process session provider
//!
//! One named session maps to one detached child process. Tracking is
//! two-layered: an in-memory table serves operations within this process,
//! and PID files under the state directory let a later invocation stop
//! what an earlier one started. Liveness is a signal-0 probe.
//!
//! No terminal is attached, so `attach` fails, `peek` reads empty, and
//! `nudge`/`send_keys` are no-ops. `process_alive` reports the shell
//! child only — the backend cannot match arbitrary names in the child's
//! process tree.

use super::{
    join_process_names, SessionError, SessionProvider, META_PROCESS_NAMES, META_WORK_DIR,
};
use crate::startup::{run_startup, ReadySpec, StartupOps};
use crate::subprocess::{run_hook_command, HOOK_TIMEOUT};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gc_core::SessionConfig;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Poll cadence while waiting for a terminating process to exit.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Session provider backed by detached local child processes.
pub struct LocalProvider {
    state_dir: PathBuf,
    table: Arc<Mutex<HashMap<String, Child>>>,
}

impl LocalProvider {
    /// Provider rooted at `state_dir` for PID files and meta sidecars.
    /// The directory path is a construction parameter so tests isolate.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            table: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Provider rooted at the user's state directory.
    pub fn with_default_dir() -> Self {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("gas-city/sessions"))
    }

    fn pid_path(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.pid", name))
    }

    fn meta_dir(&self, name: &str) -> PathBuf {
        self.state_dir.join(format!("{}.meta", name))
    }

    fn signal_alive(pid: i32) -> bool {
        kill(Pid::from_raw(pid), None).is_ok()
    }

    /// Current PID for the session, preferring the in-memory table.
    ///
    /// Table children are reaped via `try_wait`, so an exited child reads
    /// as dead even though its zombie entry would still answer signal 0.
    fn live_pid(&self, name: &str) -> Option<i32> {
        {
            let mut table = self.table.lock();
            if let Some(child) = table.get_mut(name) {
                match child.try_wait() {
                    Ok(None) => return child.id().map(|pid| pid as i32),
                    // Exited (or unobservable): drop the table entry
                    _ => {
                        table.remove(name);
                    }
                }
            }
        }

        let pid: i32 = std::fs::read_to_string(self.pid_path(name))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        Self::signal_alive(pid).then_some(pid)
    }

    fn remove_state(&self, name: &str) {
        let _ = std::fs::remove_file(self.pid_path(name));
        let _ = std::fs::remove_dir_all(self.meta_dir(name));
        self.table.lock().remove(name);
    }

    async fn stored_work_dir(&self, name: &str) -> Option<String> {
        let dir = self.get_meta(name, META_WORK_DIR).await.ok()?;
        (!dir.is_empty()).then_some(dir)
    }
}

#[async_trait]
impl SessionProvider for LocalProvider {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        run_startup(self, name, cfg).await
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        let Some(pid) = self.live_pid(name) else {
            self.remove_state(name);
            return Ok(());
        };

        // Signal the whole process group: the shell child may have spawned
        // the actual agent
        let group = Pid::from_raw(-pid);
        if let Err(e) = kill(group, Signal::SIGTERM) {
            debug!(session = name, pid, error = %e, "SIGTERM failed");
        }

        let deadline = tokio::time::Instant::now() + STOP_GRACE;
        while Self::signal_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                warn!(session = name, pid, "process survived SIGTERM, killing");
                let _ = kill(group, Signal::SIGKILL);
                break;
            }
            // Reap an in-table child so the zombie does not count as alive
            {
                let mut table = self.table.lock();
                if let Some(child) = table.get_mut(name) {
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        break;
                    }
                }
            }
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }

        self.remove_state(name);
        Ok(())
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        if let Some(pid) = self.live_pid(name) {
            let _ = kill(Pid::from_raw(-pid), Signal::SIGINT);
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        self.live_pid(name).is_some()
    }

    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool {
        if process_names.is_empty() {
            return true;
        }
        // Shell child liveness only: the tree is not inspectable by name
        self.live_pid(name).is_some()
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        Err(SessionError::Transport(format!(
            "attach is not supported for local process session {}",
            name
        )))
    }

    async fn nudge(&self, name: &str, _message: &str) -> Result<(), SessionError> {
        debug!(session = name, "nudge unsupported for local processes");
        Ok(())
    }

    async fn send_keys(&self, name: &str, _keys: &[String]) -> Result<(), SessionError> {
        debug!(session = name, "send-keys unsupported for local processes");
        Ok(())
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        let dir = self.meta_dir(name);
        std::fs::create_dir_all(&dir).map_err(|e| SessionError::Transport(e.to_string()))?;
        std::fs::write(dir.join(key), value).map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        match std::fs::read_to_string(self.meta_dir(name).join(key)) {
            Ok(value) => Ok(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(SessionError::Transport(e.to_string())),
        }
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        match std::fs::remove_file(self.meta_dir(name).join(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Transport(e.to_string())),
        }
    }

    async fn peek(&self, _name: &str, _lines: i32) -> String {
        String::new()
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let mut names: Vec<String> = Vec::new();

        let entries = match std::fs::read_dir(&self.state_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(SessionError::Transport(e.to_string())),
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|f| f.strip_suffix(".pid")) else {
                continue;
            };
            if name.starts_with(prefix) && self.live_pid(name).is_some() {
                names.push(name.to_string());
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn get_last_activity(&self, _name: &str) -> Option<DateTime<FixedOffset>> {
        None
    }

    async fn clear_scrollback(&self, _name: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        let Some(work_dir) = self.stored_work_dir(name).await else {
            warn!(session = name, "copy-to skipped: unknown work dir");
            return Ok(());
        };
        let dst = Path::new(&work_dir).join(rel_dst);
        if let Some(parent) = dst.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(session = name, error = %e, "copy-to mkdir failed");
                return Ok(());
            }
        }
        if let Err(e) = tokio::fs::copy(src, &dst).await {
            warn!(session = name, error = %e, "copy-to failed");
        }
        Ok(())
    }
}

#[async_trait]
impl StartupOps for LocalProvider {
    async fn create_session(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        if self.live_pid(name).is_some() {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        std::fs::create_dir_all(&self.state_dir)
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&cfg.command)
            .process_group(0)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        if !cfg.work_dir.is_empty() {
            cmd.current_dir(&cfg.work_dir);
        }
        for (key, value) in &cfg.env {
            cmd.env(key, value);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;
        let Some(pid) = child.id() else {
            return Err(SessionError::StartFailed(format!(
                "spawned session {} exited immediately",
                name
            )));
        };

        std::fs::write(self.pid_path(name), pid.to_string())
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;
        self.table.lock().insert(name.to_string(), child);

        if !cfg.process_names.is_empty() {
            self.set_meta(name, META_PROCESS_NAMES, &join_process_names(&cfg.process_names))
                .await?;
        }
        if !cfg.work_dir.is_empty() {
            self.set_meta(name, META_WORK_DIR, &cfg.work_dir).await?;
        }

        debug!(session = name, pid, "local session spawned");
        Ok(())
    }

    async fn is_agent_alive(&self, name: &str, process_names: &[String]) -> bool {
        self.process_alive(name, process_names).await
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        self.stop(name).await
    }

    async fn wait_for_command(
        &self,
        _name: &str,
        _process_names: &[String],
        _timeout: Duration,
    ) -> bool {
        // No process tree to observe; trust the spawn
        true
    }

    async fn accept_startup_dialogs(&self, _name: &str) {
        // No terminal to scan
    }

    async fn wait_for_ready(&self, _name: &str, ready: &ReadySpec, _timeout: Duration) {
        // No pane to poll: honor the fixed delay only
        if !ready.delay.is_zero() {
            tokio::time::sleep(ready.delay).await;
        }
    }

    async fn has_session(&self, name: &str) -> bool {
        self.live_pid(name).is_some()
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        SessionProvider::send_keys(self, name, keys).await
    }

    async fn set_remain_on_exit(&self, _name: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn run_setup_command(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        let work_dir = self.stored_work_dir(name).await;
        run_hook_command(command, work_dir.as_deref(), env, HOOK_TIMEOUT)
            .await
            .map_err(SessionError::Transport)
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
