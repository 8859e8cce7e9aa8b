// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Random prefix for this test run to avoid conflicts with parallel test runs.
static TEST_PREFIX: LazyLock<String> = LazyLock::new(|| {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    format!("gct{:04x}", nanos & 0xFFFF)
});

/// Counter for generating unique session names across parallel tests.
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique session name for testing.
fn unique_name(suffix: &str) -> String {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", *TEST_PREFIX, suffix, id)
}

/// Check if tmux is available on this system
fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! skip_without_tmux {
    () => {
        if !tmux_available() {
            eprintln!("skipping: tmux not available");
            return;
        }
    };
}

fn sleeper_config() -> SessionConfig {
    SessionConfig {
        command: "sleep 60".to_string(),
        work_dir: "/tmp".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
#[serial(tmux)]
async fn start_creates_running_session_and_stop_destroys_it() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("start");

    provider.start(&name, &sleeper_config()).await.unwrap();
    assert!(provider.is_running(&name).await);

    provider.stop(&name).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!provider.is_running(&name).await);
}

#[tokio::test]
#[serial(tmux)]
async fn second_start_reports_already_exists() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("dup");

    provider.start(&name, &sleeper_config()).await.unwrap();
    let result = provider.start(&name, &sleeper_config()).await;
    assert!(matches!(result, Err(SessionError::AlreadyExists(_))));

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn stop_on_absent_session_is_success() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    provider.stop("gc-absent-session-xyz").await.unwrap();
    provider.stop("gc-absent-session-xyz").await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn zombie_session_is_recreated_on_start() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("zombie");

    // A session whose "agent" (a process name that never runs) is dead
    provider.start(&name, &sleeper_config()).await.unwrap();

    let cfg = SessionConfig {
        process_names: vec!["gc-no-such-agent-xyz".to_string()],
        ..sleeper_config()
    };
    // Zombie detection kills the old session and creates a fresh one
    crate::startup::ensure_fresh_session(&provider, &name, &cfg)
        .await
        .unwrap();
    assert!(StartupOps::has_session(&provider, &name).await);

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn meta_round_trip() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("meta");
    provider.start(&name, &sleeper_config()).await.unwrap();

    provider.set_meta(&name, "GC_BEAD", "b-42").await.unwrap();
    assert_eq!(provider.get_meta(&name, "GC_BEAD").await.unwrap(), "b-42");

    assert_eq!(provider.get_meta(&name, "GC_UNSET").await.unwrap(), "");

    provider.remove_meta(&name, "GC_BEAD").await.unwrap();
    assert_eq!(provider.get_meta(&name, "GC_BEAD").await.unwrap(), "");

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn list_running_filters_by_prefix_and_drops_stopped() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("list");

    provider.start(&name, &sleeper_config()).await.unwrap();
    let listed = provider.list_running(&TEST_PREFIX).await.unwrap();
    assert!(listed.contains(&name), "expected {} in {:?}", name, listed);

    provider.stop(&name).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let listed = provider.list_running(&TEST_PREFIX).await.unwrap();
    assert!(!listed.contains(&name));
}

#[tokio::test]
#[serial(tmux)]
async fn peek_captures_pane_output() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("peek");

    let cfg = SessionConfig {
        command: "echo gc-peek-marker && sleep 60".to_string(),
        work_dir: "/tmp".to_string(),
        ..Default::default()
    };
    provider.start(&name, &cfg).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let output = provider.peek(&name, 10).await;
    assert!(output.contains("gc-peek-marker"), "got: {}", output);

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn nudge_types_message_and_newline() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("nudge");

    let cfg = SessionConfig {
        command: "cat".to_string(),
        work_dir: "/tmp".to_string(),
        ..Default::default()
    };
    provider.start(&name, &cfg).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    provider.nudge(&name, "hello from gas city").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let output = provider.peek(&name, 10).await;
    assert!(output.contains("hello from gas city"), "got: {}", output);

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn nudge_on_absent_session_is_best_effort() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    provider.nudge("gc-absent-session-xyz", "hi").await.unwrap();
    SessionProvider::send_keys(&provider, "gc-absent-session-xyz", &["Enter".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn process_alive_sees_pane_process() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("proc");

    provider.start(&name, &sleeper_config()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    assert!(provider.process_alive(&name, &["sleep".to_string()]).await);
    assert!(
        !provider
            .process_alive(&name, &["gc-no-such-proc".to_string()])
            .await
    );
    // Empty candidate list is vacuously alive
    assert!(provider.process_alive(&name, &[]).await);

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn last_activity_is_reported() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("activity");

    provider.start(&name, &sleeper_config()).await.unwrap();
    let activity = provider.get_last_activity(&name).await;
    assert!(activity.is_some());
    assert!(provider.get_last_activity("gc-absent-xyz").await.is_none());

    provider.stop(&name).await.unwrap();
}

#[tokio::test]
#[serial(tmux)]
async fn is_running_honors_stored_process_names() {
    skip_without_tmux!();
    let provider = TmuxProvider::new();
    let name = unique_name("stored");

    let cfg = SessionConfig {
        command: "sleep 60".to_string(),
        work_dir: "/tmp".to_string(),
        process_names: vec!["sleep".to_string()],
        ready_delay_ms: 100,
        ..Default::default()
    };
    provider.start(&name, &cfg).await.unwrap();
    assert!(provider.is_running(&name).await);

    provider.stop(&name).await.unwrap();
}
