// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sleeper_config() -> SessionConfig {
    SessionConfig {
        command: "sleep 60".to_string(),
        ..Default::default()
    }
}

fn provider() -> (tempfile::TempDir, LocalProvider) {
    let dir = tempfile::tempdir().unwrap();
    let provider = LocalProvider::new(dir.path());
    (dir, provider)
}

#[tokio::test]
async fn start_spawns_detached_process_with_pid_file() {
    let (dir, provider) = provider();
    provider.start("gc-a", &sleeper_config()).await.unwrap();

    assert!(provider.is_running("gc-a").await);
    assert!(dir.path().join("gc-a.pid").exists());

    provider.stop("gc-a").await.unwrap();
    assert!(!provider.is_running("gc-a").await);
    assert!(!dir.path().join("gc-a.pid").exists());
}

#[tokio::test]
async fn stop_never_started_session_is_success() {
    let (_dir, provider) = provider();
    provider.stop("gc-ghost").await.unwrap();
    provider.stop("gc-ghost").await.unwrap();
}

#[tokio::test]
async fn second_start_reports_already_exists() {
    let (_dir, provider) = provider();
    provider.start("gc-a", &sleeper_config()).await.unwrap();

    let result = provider.start("gc-a", &sleeper_config()).await;
    assert!(matches!(result, Err(SessionError::AlreadyExists(_))));

    provider.stop("gc-a").await.unwrap();
}

#[tokio::test]
async fn exited_process_reads_as_not_running() {
    let (_dir, provider) = provider();
    let cfg = SessionConfig {
        command: "true".to_string(),
        ..Default::default()
    };
    provider.start("gc-quick", &cfg).await.unwrap();

    // Give the one-shot command time to exit
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(!provider.is_running("gc-quick").await);

    provider.stop("gc-quick").await.unwrap();
}

#[tokio::test]
async fn pid_files_let_a_second_provider_instance_stop_the_session() {
    let (dir, first) = provider();
    first.start("gc-cross", &sleeper_config()).await.unwrap();

    // A fresh instance on the same state dir sees only the pid file
    let second = LocalProvider::new(dir.path());
    assert!(second.is_running("gc-cross").await);

    second.stop("gc-cross").await.unwrap();
    assert!(!first.is_running("gc-cross").await);
}

#[tokio::test]
async fn meta_round_trip_in_sidecar_files() {
    let (dir, provider) = provider();
    provider.start("gc-a", &sleeper_config()).await.unwrap();

    provider.set_meta("gc-a", "bead", "b-7").await.unwrap();
    assert_eq!(provider.get_meta("gc-a", "bead").await.unwrap(), "b-7");
    assert!(dir.path().join("gc-a.meta/bead").exists());

    assert_eq!(provider.get_meta("gc-a", "unset").await.unwrap(), "");

    provider.remove_meta("gc-a", "bead").await.unwrap();
    assert_eq!(provider.get_meta("gc-a", "bead").await.unwrap(), "");
    provider.remove_meta("gc-a", "bead").await.unwrap();

    provider.stop("gc-a").await.unwrap();
}

#[tokio::test]
async fn list_running_scans_pid_files_with_prefix() {
    let (_dir, provider) = provider();
    provider.start("gc-city-a", &sleeper_config()).await.unwrap();
    provider.start("gc-city-b", &sleeper_config()).await.unwrap();
    provider.start("other-c", &sleeper_config()).await.unwrap();

    let names = provider.list_running("gc-city-").await.unwrap();
    assert_eq!(names, vec!["gc-city-a", "gc-city-b"]);

    provider.stop("gc-city-a").await.unwrap();
    let names = provider.list_running("gc-city-").await.unwrap();
    assert_eq!(names, vec!["gc-city-b"]);

    provider.stop("gc-city-b").await.unwrap();
    provider.stop("other-c").await.unwrap();
}

#[tokio::test]
async fn attach_is_unsupported() {
    let (_dir, provider) = provider();
    let result = provider.attach("gc-a").await;
    assert!(matches!(result, Err(SessionError::Transport(msg)) if msg.contains("attach")));
}

#[tokio::test]
async fn peek_nudge_and_send_keys_are_inert() {
    let (_dir, provider) = provider();
    provider.start("gc-a", &sleeper_config()).await.unwrap();

    assert_eq!(provider.peek("gc-a", 10).await, "");
    provider.nudge("gc-a", "hello").await.unwrap();
    SessionProvider::send_keys(&provider, "gc-a", &["Enter".to_string()])
        .await
        .unwrap();
    provider.clear_scrollback("gc-a").await.unwrap();

    provider.stop("gc-a").await.unwrap();
}

#[tokio::test]
async fn process_alive_reports_shell_child_only() {
    let (_dir, provider) = provider();
    provider.start("gc-a", &sleeper_config()).await.unwrap();

    // Candidate names cannot be matched in the tree: liveness of the
    // tracked child stands in for all of them
    assert!(provider.process_alive("gc-a", &["anything".to_string()]).await);
    assert!(provider.process_alive("gc-a", &[]).await);

    provider.stop("gc-a").await.unwrap();
    assert!(!provider.process_alive("gc-a", &["anything".to_string()]).await);
}

#[tokio::test]
async fn stop_kills_process_group() {
    let (_dir, provider) = provider();
    let cfg = SessionConfig {
        // A child of the shell survives only if group signaling fails
        command: "sleep 120 & sleep 120".to_string(),
        ..Default::default()
    };
    provider.start("gc-group", &cfg).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    provider.stop("gc-group").await.unwrap();
    assert!(!provider.is_running("gc-group").await);
}

#[tokio::test]
async fn work_dir_and_env_reach_the_child() {
    let (state, provider) = provider();
    let work = tempfile::tempdir().unwrap();

    let mut cfg = SessionConfig {
        command: "echo \"$GC_MARK\" > out.txt; sleep 60".to_string(),
        work_dir: work.path().to_string_lossy().to_string(),
        ..Default::default()
    };
    cfg.env.insert("GC_MARK".to_string(), "lit".to_string());

    provider.start("gc-env", &cfg).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let out = std::fs::read_to_string(work.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "lit");

    provider.stop("gc-env").await.unwrap();
    drop(state);
}
