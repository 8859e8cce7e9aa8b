// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes pod session provider
//!
//! One named session maps to one pod running a tmux session inside a
//! container named "agent". Pod names are sanitized to DNS label rules;
//! the original session name travels in an annotation so listings can
//! report it back. Every in-cluster operation goes through the [`PodExec`]
//! abstraction, so the kubectl-backed implementation and the test double
//! share one code path.
//!
//! When the config stages files (overlay dir, copy entries, or a work dir
//! other than the city root), the pod carries an init container that
//! blocks on a sentinel file; start streams the staged files into it as
//! an in-band tar over exec, then touches the sentinel to release the
//! main container.

use super::{
    join_process_names, split_process_names, SessionError, SessionProvider, META_PROCESS_NAMES,
};
use crate::startup::{
    accept_startup_dialogs_via, run_startup, wait_for_command_via, wait_for_ready_via, ReadySpec,
    StartupOps,
};
use crate::subprocess::{run_hook_command, run_with_timeout, HOOK_TIMEOUT, KUBECTL_TIMEOUT};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use gc_core::{shell_quote, SessionConfig};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Main container name inside every session pod.
pub const AGENT_CONTAINER: &str = "agent";

/// Init container used for file staging.
const STAGE_CONTAINER: &str = "stage";

/// In-pod workspace mount.
const WORKSPACE_MOUNT: &str = "/workspace";

/// Sentinel the init container blocks on until staging completes.
const STAGE_SENTINEL: &str = "/workspace/.gc-staged";

/// Longest wait for the pod (or its init container) to reach Running.
const POD_RUNNING_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest wait for the in-pod tmux session to appear.
const SESSION_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll cadence for pod and session readiness.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Label present on every session pod.
const APP_LABEL: &str = "app=gas-city";

/// Annotation carrying the original (unsanitized) session name.
const NAME_ANNOTATION: &str = "gas-city/session-name";

/// Output of one in-container exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

/// One pod as reported by a listing.
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub annotations: HashMap<String, String>,
}

/// Cluster access used by [`KubeProvider`].
///
/// The real implementation shells out to kubectl; tests swap in a fake.
#[async_trait]
pub trait PodExec: Send + Sync {
    /// Create or update a pod from its manifest.
    async fn apply(&self, manifest: &serde_json::Value) -> Result<(), SessionError>;

    /// Delete a pod; absent pods are success.
    async fn delete_pod(&self, pod: &str) -> Result<(), SessionError>;

    /// Pod phase ("Pending", "Running", ...), or `None` when absent.
    async fn pod_phase(&self, pod: &str) -> Result<Option<String>, SessionError>;

    /// Whether the named (init) container is currently running.
    async fn container_running(
        &self,
        pod: &str,
        container: &str,
        init: bool,
    ) -> Result<bool, SessionError>;

    /// Run a command inside a container, optionally feeding stdin.
    async fn exec(
        &self,
        pod: &str,
        container: &str,
        argv: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, SessionError>;

    /// Run an interactive command with the caller's stdio attached.
    async fn attach(&self, pod: &str, container: &str, argv: &[String])
        -> Result<(), SessionError>;

    /// Pods matching a label selector.
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodInfo>, SessionError>;
}

/// Sanitize a session name to a DNS-label-safe pod name: lowercase
/// alphanumeric plus `-`, at most 63 chars, no leading/trailing `-`.
pub fn sanitize_pod_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut last_was_dash = false;
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let mut out = out.trim_matches('-').to_string();
    if out.len() > 63 {
        out.truncate(63);
        out = out.trim_end_matches('-').to_string();
    }
    out
}

/// Kubectl-backed [`PodExec`].
pub struct Kubectl {
    namespace: String,
}

impl Kubectl {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    async fn kubectl(
        &self,
        args: &[&str],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, SessionError> {
        let mut cmd = Command::new("kubectl");
        cmd.arg("-n").arg(&self.namespace).args(args);

        if let Some(bytes) = stdin {
            cmd.stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped());
            let mut child = cmd
                .spawn()
                .map_err(|e| SessionError::Transport(format!("kubectl spawn: {}", e)))?;
            if let Some(mut handle) = child.stdin.take() {
                handle
                    .write_all(&bytes)
                    .await
                    .map_err(|e| SessionError::Transport(format!("kubectl stdin: {}", e)))?;
            }
            let output = tokio::time::timeout(KUBECTL_TIMEOUT, child.wait_with_output())
                .await
                .map_err(|_| SessionError::Transport("kubectl timed out".to_string()))?
                .map_err(|e| SessionError::Transport(format!("kubectl: {}", e)))?;
            return Ok(ExecOutput {
                code: output.status.code().unwrap_or(-1),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        let output = run_with_timeout(cmd, KUBECTL_TIMEOUT, "kubectl")
            .await
            .map_err(SessionError::Transport)?;
        Ok(ExecOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl PodExec for Kubectl {
    async fn apply(&self, manifest: &serde_json::Value) -> Result<(), SessionError> {
        let body = serde_json::to_vec(manifest)
            .map_err(|e| SessionError::Transport(format!("manifest marshal: {}", e)))?;
        let output = self.kubectl(&["apply", "-f", "-"], Some(body)).await?;
        if !output.success() {
            return Err(SessionError::Transport(format!(
                "apply failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn delete_pod(&self, pod: &str) -> Result<(), SessionError> {
        let output = self
            .kubectl(
                &["delete", "pod", pod, "--ignore-not-found", "--wait=false"],
                None,
            )
            .await?;
        if !output.success() {
            return Err(SessionError::Transport(format!(
                "delete failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn pod_phase(&self, pod: &str) -> Result<Option<String>, SessionError> {
        let output = self
            .kubectl(
                &["get", "pod", pod, "-o", "jsonpath={.status.phase}"],
                None,
            )
            .await?;
        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("NotFound") {
                return Ok(None);
            }
            return Err(SessionError::Transport(format!(
                "get pod failed: {}",
                stderr.trim()
            )));
        }
        let phase = output.stdout_string().trim().to_string();
        Ok((!phase.is_empty()).then_some(phase))
    }

    async fn container_running(
        &self,
        pod: &str,
        container: &str,
        init: bool,
    ) -> Result<bool, SessionError> {
        let output = self.kubectl(&["get", "pod", pod, "-o", "json"], None).await?;
        if !output.success() {
            return Ok(false);
        }
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| SessionError::Transport(format!("pod json: {}", e)))?;
        let field = if init {
            "initContainerStatuses"
        } else {
            "containerStatuses"
        };
        let running = parsed["status"][field]
            .as_array()
            .into_iter()
            .flatten()
            .any(|status| {
                status["name"].as_str() == Some(container)
                    && status["state"].get("running").is_some()
            });
        Ok(running)
    }

    async fn exec(
        &self,
        pod: &str,
        container: &str,
        argv: &[String],
        stdin: Option<Vec<u8>>,
    ) -> Result<ExecOutput, SessionError> {
        let mut args: Vec<&str> = vec!["exec"];
        if stdin.is_some() {
            args.push("-i");
        }
        args.extend(["-c", container, pod, "--"]);
        args.extend(argv.iter().map(String::as_str));
        self.kubectl(&args, stdin).await
    }

    async fn attach(
        &self,
        pod: &str,
        container: &str,
        argv: &[String],
    ) -> Result<(), SessionError> {
        let mut cmd = Command::new("kubectl");
        cmd.args(["-n", &self.namespace, "exec", "-it", "-c", container, pod, "--"])
            .args(argv)
            .stdin(std::process::Stdio::inherit())
            .stdout(std::process::Stdio::inherit())
            .stderr(std::process::Stdio::inherit());
        let status = cmd
            .status()
            .await
            .map_err(|e| SessionError::Transport(format!("kubectl exec -it: {}", e)))?;
        if !status.success() {
            return Err(SessionError::NotFound(pod.to_string()));
        }
        Ok(())
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodInfo>, SessionError> {
        let output = self
            .kubectl(&["get", "pods", "-l", label_selector, "-o", "json"], None)
            .await?;
        if !output.success() {
            return Err(SessionError::Transport(format!(
                "list pods failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| SessionError::Transport(format!("pods json: {}", e)))?;
        let pods = parsed["items"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let name = item["metadata"]["name"].as_str()?.to_string();
                let annotations = item["metadata"]["annotations"]
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                Some(PodInfo { name, annotations })
            })
            .collect();
        Ok(pods)
    }
}

/// Construction parameters for [`KubeProvider`].
#[derive(Debug, Clone, Default)]
pub struct KubeConfig {
    /// Kubernetes namespace the pods live in.
    pub namespace: String,
    /// Image every agent pod runs.
    pub image: String,
    /// Host city root; a work dir outside it forces staging, and its
    /// `.gc/` directory is mirrored into staged workspaces.
    pub city_root: String,
}

/// Pod-backed session provider.
pub struct KubeProvider {
    exec: Arc<dyn PodExec>,
    config: KubeConfig,
}

impl KubeProvider {
    pub fn new(exec: Arc<dyn PodExec>, config: KubeConfig) -> Self {
        Self { exec, config }
    }

    /// Kubectl-backed provider for the configured namespace.
    pub fn with_kubectl(config: KubeConfig) -> Self {
        let exec = Arc::new(Kubectl::new(config.namespace.clone()));
        Self::new(exec, config)
    }

    fn pod_name(name: &str) -> String {
        sanitize_pod_name(name)
    }

    fn needs_staging(&self, cfg: &SessionConfig) -> bool {
        cfg.needs_staging()
            || (!cfg.work_dir.is_empty() && cfg.work_dir != self.config.city_root)
    }

    fn build_manifest(&self, name: &str, cfg: &SessionConfig, staged: bool) -> serde_json::Value {
        let pod = Self::pod_name(name);
        let session = pod.clone();

        let env: Vec<serde_json::Value> = cfg
            .env
            .iter()
            .map(|(k, v)| json!({"name": k, "value": v}))
            .collect();

        // tmux detaches, so keep the container alive for the session's
        // lifetime and exit with it
        let agent_script = format!(
            "tmux new-session -d -s {} {} && while tmux has-session -t ={} 2>/dev/null; do sleep 5; done",
            shell_quote(&session),
            shell_quote(&cfg.command),
            session,
        );

        let mut spec = json!({
            "restartPolicy": "Never",
            "containers": [{
                "name": AGENT_CONTAINER,
                "image": self.config.image,
                "workingDir": WORKSPACE_MOUNT,
                "command": ["sh", "-lc", agent_script],
                "env": env,
                "volumeMounts": [{"name": "workspace", "mountPath": WORKSPACE_MOUNT}],
            }],
            "volumes": [{"name": "workspace", "emptyDir": {}}],
        });

        if staged {
            let stage_script = format!(
                "while [ ! -f {} ]; do sleep 0.2; done",
                STAGE_SENTINEL
            );
            spec["initContainers"] = json!([{
                "name": STAGE_CONTAINER,
                "image": self.config.image,
                "command": ["sh", "-c", stage_script],
                "volumeMounts": [{"name": "workspace", "mountPath": WORKSPACE_MOUNT}],
            }]);
        }

        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": pod,
                "namespace": self.config.namespace,
                "labels": {
                    "app": "gas-city",
                    "gas-city/session": pod,
                },
                "annotations": {
                    NAME_ANNOTATION: name,
                },
            },
            "spec": spec,
        })
    }

    async fn wait_for_phase(&self, pod: &str, phase: &str, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            match self.exec.pod_phase(pod).await {
                Ok(Some(current)) if current == phase => return true,
                Ok(Some(current)) if current == "Failed" || current == "Succeeded" => {
                    return false;
                }
                _ => {}
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_init_running(&self, pod: &str, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if matches!(
                self.exec
                    .container_running(pod, STAGE_CONTAINER, true)
                    .await,
                Ok(true)
            ) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_inner_session(&self, pod: &str, session: &str, timeout: Duration) -> bool {
        let argv = vec![
            "tmux".to_string(),
            "has-session".to_string(),
            "-t".to_string(),
            format!("={}", session),
        ];
        let start = Instant::now();
        loop {
            if matches!(
                self.exec.exec(pod, AGENT_CONTAINER, &argv, None).await,
                Ok(output) if output.success()
            ) {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stream a local directory into the staged workspace as a tar pipe.
    async fn stream_dir(&self, pod: &str, src: &str, dest: &str) -> Result<(), SessionError> {
        let mut tar = Command::new("tar");
        tar.args(["-cf", "-", "-C", src, "."]);
        let output = run_with_timeout(tar, KUBECTL_TIMEOUT, "tar")
            .await
            .map_err(SessionError::Transport)?;
        if !output.status.success() {
            return Err(SessionError::Transport(format!(
                "tar {} failed: {}",
                src,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let argv = vec![
            "tar".to_string(),
            "-xf".to_string(),
            "-".to_string(),
            "-C".to_string(),
            dest.to_string(),
        ];
        let result = self
            .exec
            .exec(pod, STAGE_CONTAINER, &argv, Some(output.stdout))
            .await?;
        if !result.success() {
            return Err(SessionError::Transport(format!(
                "in-pod untar failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Write one file into the staged workspace through stdin.
    async fn stream_file(
        &self,
        pod: &str,
        container: &str,
        bytes: Vec<u8>,
        rel_dst: &str,
    ) -> Result<(), SessionError> {
        let dst = format!("{}/{}", WORKSPACE_MOUNT, rel_dst);
        let parent = Path::new(&dst)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| WORKSPACE_MOUNT.to_string());
        let script = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(&parent),
            shell_quote(&dst)
        );
        let argv = vec!["sh".to_string(), "-c".to_string(), script];
        let result = self.exec.exec(pod, container, &argv, Some(bytes)).await?;
        if !result.success() {
            return Err(SessionError::Transport(format!(
                "staging {} failed: {}",
                rel_dst,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn stage_workspace(&self, pod: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        if !self.wait_for_init_running(pod, POD_RUNNING_TIMEOUT).await {
            return Err(SessionError::StartFailed(format!(
                "staging container for {} never started",
                pod
            )));
        }

        if !cfg.overlay_dir.is_empty() {
            self.stream_dir(pod, &cfg.overlay_dir, WORKSPACE_MOUNT).await?;
        }

        for copy in &cfg.copy_files {
            let bytes = tokio::fs::read(&copy.src)
                .await
                .map_err(|e| SessionError::Transport(format!("read {}: {}", copy.src, e)))?;
            self.stream_file(pod, STAGE_CONTAINER, bytes, &copy.rel_dst)
                .await?;
        }

        // Mirror the city's .gc/ so in-pod tools see the same control data
        if !self.config.city_root.is_empty() {
            let gc_dir = Path::new(&self.config.city_root).join(".gc");
            if gc_dir.is_dir() {
                let dest = format!("{}/.gc", WORKSPACE_MOUNT);
                let mkdir = vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    format!("mkdir -p {}", shell_quote(&dest)),
                ];
                let _ = self.exec.exec(pod, STAGE_CONTAINER, &mkdir, None).await;
                self.stream_dir(pod, &gc_dir.to_string_lossy(), &dest).await?;
            }
        }

        // Release the init container
        let touch = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("touch {}", STAGE_SENTINEL),
        ];
        let result = self.exec.exec(pod, STAGE_CONTAINER, &touch, None).await?;
        if !result.success() {
            return Err(SessionError::StartFailed(format!(
                "releasing staging sentinel for {} failed",
                pod
            )));
        }
        Ok(())
    }

    /// Run tmux inside the agent container, returning its output.
    async fn inner_tmux(&self, name: &str, args: &[&str]) -> Result<ExecOutput, SessionError> {
        let pod = Self::pod_name(name);
        let mut argv = vec!["tmux".to_string()];
        argv.extend(args.iter().map(|s| s.to_string()));
        self.exec.exec(&pod, AGENT_CONTAINER, &argv, None).await
    }

    fn inner_target(name: &str) -> String {
        format!("={}", Self::pod_name(name))
    }
}

#[async_trait]
impl SessionProvider for KubeProvider {
    async fn start(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        run_startup(self, name, cfg).await
    }

    async fn stop(&self, name: &str) -> Result<(), SessionError> {
        self.exec.delete_pod(&Self::pod_name(name)).await
    }

    async fn interrupt(&self, name: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(name, &["send-keys", "-t", &target, "C-c"])
            .await;
        if !matches!(output, Ok(o) if o.success()) {
            debug!(session = name, "interrupt target missing");
        }
        Ok(())
    }

    async fn is_running(&self, name: &str) -> bool {
        let pod = Self::pod_name(name);
        match self.exec.pod_phase(&pod).await {
            Ok(Some(phase)) if phase == "Running" => {}
            _ => return false,
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
        let pod = Self::pod_name(name);
        for pattern in process_names {
            let argv = vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("pgrep -f {} >/dev/null", shell_quote(pattern)),
            ];
            if matches!(
                self.exec.exec(&pod, AGENT_CONTAINER, &argv, None).await,
                Ok(output) if output.success()
            ) {
                return true;
            }
        }
        false
    }

    async fn attach(&self, name: &str) -> Result<(), SessionError> {
        let pod = Self::pod_name(name);
        let argv = vec![
            "tmux".to_string(),
            "attach-session".to_string(),
            "-t".to_string(),
            Self::inner_target(name),
        ];
        self.exec.attach(&pod, AGENT_CONTAINER, &argv).await
    }

    async fn nudge(&self, name: &str, message: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let sent = self
            .inner_tmux(name, &["send-keys", "-t", &target, "-l", "--", message])
            .await;
        if !matches!(sent, Ok(o) if o.success()) {
            warn!(session = name, "nudge target missing");
            return Ok(());
        }
        let _ = self
            .inner_tmux(name, &["send-keys", "-t", &target, "Enter"])
            .await;
        Ok(())
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let mut args = vec!["send-keys", "-t", &target];
        args.extend(keys.iter().map(String::as_str));
        let output = self.inner_tmux(name, &args).await;
        if !matches!(output, Ok(o) if o.success()) {
            warn!(session = name, "send-keys target missing");
        }
        Ok(())
    }

    async fn set_meta(&self, name: &str, key: &str, value: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(name, &["set-environment", "-t", &target, key, value])
            .await?;
        if !output.success() {
            return Err(SessionError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn get_meta(&self, name: &str, key: &str) -> Result<String, SessionError> {
        let target = Self::inner_target(name);
        let output = match self
            .inner_tmux(name, &["show-environment", "-t", &target, key])
            .await
        {
            Ok(output) => output,
            Err(_) => return Ok(String::new()),
        };
        if !output.success() {
            return Ok(String::new());
        }
        let stdout = output.stdout_string();
        Ok(stdout
            .trim_end()
            .split_once('=')
            .map(|(_, value)| value.to_string())
            .unwrap_or_default())
    }

    async fn remove_meta(&self, name: &str, key: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(name, &["set-environment", "-t", &target, "-r", key])
            .await;
        if !matches!(output, Ok(o) if o.success()) {
            debug!(session = name, key, "remove-meta target missing");
        }
        Ok(())
    }

    async fn peek(&self, name: &str, lines: i32) -> String {
        let target = Self::inner_target(name);
        let start = if lines <= 0 {
            "-".to_string()
        } else {
            format!("-{}", lines)
        };
        match self
            .inner_tmux(name, &["capture-pane", "-p", "-t", &target, "-S", &start])
            .await
        {
            Ok(output) if output.success() => output.stdout_string(),
            _ => String::new(),
        }
    }

    async fn list_running(&self, prefix: &str) -> Result<Vec<String>, SessionError> {
        let pods = self.exec.list_pods(APP_LABEL).await?;
        Ok(pods
            .into_iter()
            .filter_map(|pod| {
                // The annotation restores the original name; the pod name
                // is the sanitized fallback
                let name = pod
                    .annotations
                    .get(NAME_ANNOTATION)
                    .cloned()
                    .unwrap_or(pod.name);
                name.starts_with(prefix).then_some(name)
            })
            .collect())
    }

    async fn get_last_activity(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(
                name,
                &["display-message", "-p", "-t", &target, "#{session_activity}"],
            )
            .await
            .ok()?;
        if !output.success() {
            return None;
        }
        let epoch: i64 = output.stdout_string().trim().parse().ok()?;
        Utc.timestamp_opt(epoch, 0).single().map(|t| t.fixed_offset())
    }

    async fn clear_scrollback(&self, name: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(name, &["clear-history", "-t", &target])
            .await;
        if !matches!(output, Ok(o) if o.success()) {
            debug!(session = name, "clear-history target missing");
        }
        Ok(())
    }

    async fn copy_to(&self, name: &str, src: &Path, rel_dst: &str) -> Result<(), SessionError> {
        let pod = Self::pod_name(name);
        let bytes = match tokio::fs::read(src).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(session = name, src = %src.display(), error = %e, "copy-to read failed");
                return Ok(());
            }
        };
        if let Err(e) = self.stream_file(&pod, AGENT_CONTAINER, bytes, rel_dst).await {
            warn!(session = name, error = %e, "copy-to failed");
        }
        Ok(())
    }
}

#[async_trait]
impl StartupOps for KubeProvider {
    async fn create_session(&self, name: &str, cfg: &SessionConfig) -> Result<(), SessionError> {
        let pod = Self::pod_name(name);
        if self.exec.pod_phase(&pod).await?.is_some() {
            return Err(SessionError::AlreadyExists(name.to_string()));
        }

        let staged = self.needs_staging(cfg);
        let manifest = self.build_manifest(name, cfg, staged);
        self.exec.apply(&manifest).await?;

        if staged {
            self.stage_workspace(&pod, cfg).await?;
        }

        if !self.wait_for_phase(&pod, "Running", POD_RUNNING_TIMEOUT).await {
            return Err(SessionError::StartFailed(format!(
                "pod {} never reached Running",
                pod
            )));
        }

        if !self
            .wait_for_inner_session(&pod, &pod, SESSION_WAIT_TIMEOUT)
            .await
        {
            return Err(SessionError::StartFailed(format!(
                "tmux session inside {} never appeared",
                pod
            )));
        }

        if !cfg.process_names.is_empty() {
            self.set_meta(name, META_PROCESS_NAMES, &join_process_names(&cfg.process_names))
                .await?;
        }

        Ok(())
    }

    async fn is_agent_alive(&self, name: &str, process_names: &[String]) -> bool {
        self.process_alive(name, process_names).await
    }

    async fn kill_session(&self, name: &str) -> Result<(), SessionError> {
        let pod = Self::pod_name(name);
        self.exec.delete_pod(&pod).await?;

        // The name must be free before a recreate can succeed
        let start = Instant::now();
        while self.exec.pod_phase(&pod).await?.is_some() {
            if start.elapsed() >= POD_RUNNING_TIMEOUT {
                return Err(SessionError::Transport(format!(
                    "pod {} still terminating",
                    pod
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
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
        let pod = Self::pod_name(name);
        matches!(self.exec.pod_phase(&pod).await, Ok(Some(phase)) if phase == "Running")
    }

    async fn send_keys(&self, name: &str, keys: &[String]) -> Result<(), SessionError> {
        SessionProvider::send_keys(self, name, keys).await
    }

    async fn set_remain_on_exit(&self, name: &str) -> Result<(), SessionError> {
        let target = Self::inner_target(name);
        let output = self
            .inner_tmux(name, &["set-option", "-t", &target, "remain-on-exit", "on"])
            .await?;
        if !output.success() {
            return Err(SessionError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    async fn run_setup_command(
        &self,
        name: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionError> {
        run_hook_command(command, None, env, HOOK_TIMEOUT)
            .await
            .map_err(SessionError::Transport)
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake_exec::FakePodExec;

#[cfg(any(test, feature = "test-support"))]
mod fake_exec {
    #![cfg_attr(coverage_nightly, coverage(off))]

    use super::*;
    use parking_lot::Mutex;

    /// Recorded [`PodExec`] call.
    #[derive(Debug, Clone)]
    pub enum PodCall {
        Apply { pod: String },
        Delete { pod: String },
        Phase { pod: String },
        ContainerRunning { pod: String, container: String },
        Exec { pod: String, container: String, argv: Vec<String>, stdin_len: usize },
        Attach { pod: String, container: String },
        ListPods { selector: String },
    }

    #[derive(Default)]
    struct FakeState {
        phases: HashMap<String, String>,
        manifests: HashMap<String, serde_json::Value>,
        exec_results: HashMap<String, Vec<ExecOutput>>,
        calls: Vec<PodCall>,
    }

    /// In-memory [`PodExec`] recording calls and serving scripted results.
    ///
    /// Applied pods become `Running` immediately unless a phase was
    /// scripted beforehand. Exec calls pop scripted results per pod and
    /// default to success with empty output.
    #[derive(Clone, Default)]
    pub struct FakePodExec {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakePodExec {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_phase(&self, pod: &str, phase: &str) {
            self.state
                .lock()
                .phases
                .insert(pod.to_string(), phase.to_string());
        }

        pub fn remove_pod(&self, pod: &str) {
            let mut state = self.state.lock();
            state.phases.remove(pod);
            state.manifests.remove(pod);
        }

        /// Queue one exec result for a pod (FIFO).
        pub fn push_exec_result(&self, pod: &str, output: ExecOutput) {
            self.state
                .lock()
                .exec_results
                .entry(pod.to_string())
                .or_default()
                .push(output);
        }

        pub fn manifest(&self, pod: &str) -> Option<serde_json::Value> {
            self.state.lock().manifests.get(pod).cloned()
        }

        pub fn calls(&self) -> Vec<PodCall> {
            self.state.lock().calls.clone()
        }
    }

    #[async_trait]
    impl PodExec for FakePodExec {
        async fn apply(&self, manifest: &serde_json::Value) -> Result<(), SessionError> {
            let pod = manifest["metadata"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let mut state = self.state.lock();
            state.calls.push(PodCall::Apply { pod: pod.clone() });
            state.manifests.insert(pod.clone(), manifest.clone());
            state.phases.entry(pod).or_insert_with(|| "Running".to_string());
            Ok(())
        }

        async fn delete_pod(&self, pod: &str) -> Result<(), SessionError> {
            let mut state = self.state.lock();
            state.calls.push(PodCall::Delete {
                pod: pod.to_string(),
            });
            state.phases.remove(pod);
            state.manifests.remove(pod);
            Ok(())
        }

        async fn pod_phase(&self, pod: &str) -> Result<Option<String>, SessionError> {
            let mut state = self.state.lock();
            state.calls.push(PodCall::Phase {
                pod: pod.to_string(),
            });
            Ok(state.phases.get(pod).cloned())
        }

        async fn container_running(
            &self,
            pod: &str,
            container: &str,
            _init: bool,
        ) -> Result<bool, SessionError> {
            let mut state = self.state.lock();
            state.calls.push(PodCall::ContainerRunning {
                pod: pod.to_string(),
                container: container.to_string(),
            });
            Ok(state.phases.contains_key(pod))
        }

        async fn exec(
            &self,
            pod: &str,
            container: &str,
            argv: &[String],
            stdin: Option<Vec<u8>>,
        ) -> Result<ExecOutput, SessionError> {
            let mut state = self.state.lock();
            state.calls.push(PodCall::Exec {
                pod: pod.to_string(),
                container: container.to_string(),
                argv: argv.to_vec(),
                stdin_len: stdin.map(|b| b.len()).unwrap_or(0),
            });
            if !state.phases.contains_key(pod) {
                return Ok(ExecOutput {
                    code: 1,
                    stderr: b"pod not found".to_vec(),
                    ..Default::default()
                });
            }
            let queued = state
                .exec_results
                .get_mut(pod)
                .and_then(|results| (!results.is_empty()).then(|| results.remove(0)));
            Ok(queued.unwrap_or_default())
        }

        async fn attach(
            &self,
            pod: &str,
            container: &str,
            _argv: &[String],
        ) -> Result<(), SessionError> {
            self.state.lock().calls.push(PodCall::Attach {
                pod: pod.to_string(),
                container: container.to_string(),
            });
            Ok(())
        }

        async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodInfo>, SessionError> {
            let mut state = self.state.lock();
            state.calls.push(PodCall::ListPods {
                selector: label_selector.to_string(),
            });
            let pods = state
                .manifests
                .iter()
                .filter(|(pod, _)| state.phases.contains_key(*pod))
                .map(|(pod, manifest)| {
                    let annotations = manifest["metadata"]["annotations"]
                        .as_object()
                        .map(|map| {
                            map.iter()
                                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                                .collect()
                        })
                        .unwrap_or_default();
                    PodInfo {
                        name: pod.clone(),
                        annotations,
                    }
                })
                .collect();
            Ok(pods)
        }
    }
}

#[cfg(test)]
#[path = "kube_tests.rs"]
mod tests;
