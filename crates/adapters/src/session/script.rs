// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script-delegated session provider
//!
//! Every operation shells out to a user-supplied script with the verb as
//! argv[1]. Exit 0 is success, exit 1 is failure (stderr carries the
//! message), and exit 2 means "unknown verb" — treated as success so old
//! scripts keep working as the verb set grows. Start receives the session
//! config as JSON on stdin; trailing whitespace in stdout is trimmed.

use super::{SessionError, SessionProvider};
use crate::subprocess::{SCRIPT_OP_TIMEOUT, SCRIPT_START_TIMEOUT};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use gc_core::SessionConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

/// Session provider implemented by an external script.
pub struct ScriptProvider {
    script: PathBuf,
    start_timeout: Duration,
    op_timeout: Duration,
}

/// Start config on the wire: the subset of [`SessionConfig`] the script
/// protocol defines, snake_case, unset fields omitted.
#[derive(Serialize)]
struct WireStartConfig<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    work_dir: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    env: &'a HashMap<String, String>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    process_names: &'a [String],
    #[serde(skip_serializing_if = "str::is_empty")]
    nudge: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    ready_prompt_prefix: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    ready_delay_ms: u64,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pre_start: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    session_setup: &'a [String],
    #[serde(skip_serializing_if = "str::is_empty")]
    session_setup_script: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    overlay_dir: &'a str,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl<'a> WireStartConfig<'a> {
    fn from_config(cfg: &'a SessionConfig) -> Self {
        Self {
            work_dir: &cfg.work_dir,
            command: &cfg.command,
            env: &cfg.env,
            process_names: &cfg.process_names,
            nudge: &cfg.nudge,
            ready_prompt_prefix: &cfg.ready_prompt_prefix,
            ready_delay_ms: cfg.ready_delay_ms,
            pre_start: &cfg.pre_start,
            session_setup: &cfg.session_setup,
            session_setup_script: &cfg.session_setup_script,
            overlay_dir: &cfg.overlay_dir,
        }
    }
}

impl ScriptProvider {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            start_timeout: SCRIPT_START_TIMEOUT,
            op_timeout: SCRIPT_OP_TIMEOUT,
        }
    }

    /// Override the per-call timeouts.
    pub fn with_timeouts(mut self, start_timeout: Duration, op_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self.op_timeout = op_timeout;
        self
    }

    /// Run one verb; returns trimmed stdout.
    async fn invoke(
        &self,
        verb: &str,
        args: &[&str],
        stdin: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<String, SessionError> {
        let mut cmd = Command::new(&self.script);
        cmd.arg(verb)
            .args(args)
            .stdin(if stdin.is_some() {
                std::process::Stdio::piped()
            } else {
                std::process::Stdio::null()
            })
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SessionError::Transport(format!("spawn {}: {}", verb, e)))?;

        if let Some(bytes) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                // A script that exits without reading stdin closes the pipe;
                // that is its prerogative, not a transport failure
                if let Err(e) = handle.write_all(&bytes).await {
                    tracing::debug!(verb, error = %e, "script ignored stdin");
                }
            }
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SessionError::Transport(format!(
                    "{} timed out after {}s",
                    verb,
                    timeout.as_secs()
                ))
            })?
            .map_err(|e| SessionError::Transport(format!("{}: {}", verb, e)))?;

        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout)
                .trim_end()
                .to_string()),
            // Unknown verb: forward-compatible success
            Some(2) => Ok(String::new()),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(SessionError::Transport(format!(
                    "{} exited {}: {}",
                    verb,
                    code.unwrap_or(-1),
                    stderr.trim()
                )))
            }
        }
    }

    /// Best-effort variant: failures are logged, not surfaced.
    async fn invoke_soft(&self, verb: &str, args: &[&str], stdin: Option<Vec<u8>>) -> String {
        match self.invoke(verb, args, stdin, self.op_timeout).await {
            Ok(stdout) => stdout,
            Err(e) => {
                warn!(script = %self.script.display(), verb, error = %e, "script operation failed");
                String::new()
            }
        }
    }

    /// Verify an image is usable; extra verb outside the provider contract.
    pub async fn check_image(&self, image: &str) -> Result<(), SessionError> {
        self.invoke("check-image", &[image], None, self.op_timeout)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl SessionProvider for ScriptProvider {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        let wire = WireStartConfig::from_config(cfg);
        let body = serde_json::to_vec(&wire)
            .map_err(|e| SessionError::StartFailed(format!("config marshal: {}", e)))?;
        self.invoke("start", &[name], Some(body), self.start_timeout)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                SessionError::Transport(msg) => SessionError::StartFailed(msg),
                other => other,
            })
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        self.invoke("stop", &[name], None, self.op_timeout)
            .await
            .map(|_| ())
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        self.invoke_soft("interrupt", &[name], None).await;
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        self.invoke_soft("is-running", &[name], None).await == "true"
    }

    async fn process_alive(&self, name: &str, process_names: &[String]) -> bool {
        if process_names.is_empty() {
            return true;
        }
        let stdin = process_names.join("\n").into_bytes();
        self.invoke_soft("process-alive", &[name], Some(stdin)).await == "true"
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        // Interactive: inherit stdio and wait without a timeout
        let status = Command::new(&self.script)
            .args(["attach", name])
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit())
            .status()
            .await
            .map_err(|e| SessionError::Transport(format!("attach: {}", e)))?;

        match status.code() {
            Some(0) | Some(2) => Ok(()),
            code => Err(SessionError::Transport(format!(
                "attach exited {}",
                code.unwrap_or(-1)
            ))),
        }
    }

    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        self.invoke_soft("nudge", &[name], Some(message.as_bytes().to_vec()))
            .await;
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        let mut args = vec![name];
        args.extend(keys.iter().map(String::as_str));
        self.invoke_soft("send-keys", &args, None).await;
        Ok(())
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        self.invoke(
            "set-meta",
            &[name, key],
            Some(value.as_bytes().to_vec()),
            self.op_timeout,
        )
        .await
        .map(|_| ())
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        Ok(self.invoke_soft("get-meta", &[name, key], None).await)
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        self.invoke_soft("remove-meta", &[name, key], None).await;
        Ok(())
    }

    async fn peek(&self, name: &str, lines: i32) -> String {
        let lines_arg = lines.to_string();
        self.invoke_soft("peek", &[name, &lines_arg], None).await
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let stdout = self
            .invoke("list-running", &[prefix], None, self.op_timeout)
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        let stdout = self.invoke_soft("get-last-activity", &[name], None).await;
        if stdout.is_empty() {
            return None;
        }
        DateTime::parse_from_rfc3339(stdout.trim()).ok()
    }

    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError> {
        self.invoke_soft("clear-scrollback", &[name], None).await;
        Ok(())
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        let src_arg = src.to_string_lossy();
        self.invoke_soft("copy-to", &[name, &src_arg, rel_dst], None)
            .await;
        Ok(())
    }
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod tests;
