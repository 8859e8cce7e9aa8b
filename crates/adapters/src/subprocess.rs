// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers

use std::collections::HashMap;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for tmux commands.
pub const TMUX_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for kubectl commands.
pub const KUBECTL_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for pre-start and session-setup hook commands.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for script-provider operations.
pub const SCRIPT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for script-provider start (session creation is slow).
pub const SCRIPT_START_TIMEOUT: Duration = Duration::from_secs(120);

/// Run a command to completion, bounding it by `timeout`.
///
/// Errors come back as strings tagged with `description` so tmux,
/// kubectl, and hook failures all read uniformly in logs. On expiry the
/// pending `output()` future is dropped, which kills the child.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    let Ok(result) = tokio::time::timeout(timeout, cmd.output()).await else {
        return Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        ));
    };
    result.map_err(|e| format!("{} failed: {}", description, e))
}

/// Run one hook command through `sh -c` with extra environment.
///
/// Returns the combined exit outcome as an error string so callers can
/// decide whether the failure is fatal; hook failures usually warn only.
pub async fn run_hook_command(
    command: &str,
    work_dir: Option<&str>,
    env: &HashMap<String, String>,
    timeout: Duration,
) -> Result<(), String> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = work_dir {
        if !dir.is_empty() {
            cmd.current_dir(dir);
        }
    }
    for (key, value) in env {
        cmd.env(key, value);
    }

    let output = run_with_timeout(cmd, timeout, &format!("hook `{}`", command)).await?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "hook `{}` exited {}: {}",
            command,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        ))
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
