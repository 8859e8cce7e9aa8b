// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

/// Write an executable provider script that logs each invocation into its
/// own directory and answers a few verbs.
fn write_script(dir: &Path) -> PathBuf {
    let path = dir.join("provider.sh");
    let body = format!(
        r#"#!/bin/sh
log="{dir}/calls.log"
echo "$@" >> "$log"
case "$1" in
  start)
    cat > "{dir}/start-input.json"
    ;;
  stop)
    ;;
  is-running)
    printf 'true\n'
    ;;
  process-alive)
    cat > "{dir}/process-names.txt"
    printf 'false'
    ;;
  get-meta)
    printf 'stored-value   '
    ;;
  peek)
    printf 'line one\nline two\n\n'
    ;;
  list-running)
    printf 'gc-a\ngc-b\n'
    ;;
  get-last-activity)
    printf '2026-02-27T12:00:00+00:00\n'
    ;;
  nudge)
    cat > "{dir}/nudge.txt"
    ;;
  fail-verb)
    echo "deliberate failure" >&2
    exit 1
    ;;
  *)
    exit 2
    ;;
esac
"#,
        dir = dir.display()
    );
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn setup() -> (tempfile::TempDir, ScriptProvider) {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path());
    (dir, ScriptProvider::new(script))
}

#[tokio::test]
async fn start_passes_config_as_json_on_stdin() {
    let (dir, provider) = setup();
    let mut cfg = SessionConfig {
        command: "claude code".to_string(),
        work_dir: "/city/rig".to_string(),
        ready_prompt_prefix: "> ".to_string(),
        ready_delay_ms: 500,
        process_names: vec!["claude".to_string()],
        ..Default::default()
    };
    cfg.env.insert("CITY".to_string(), "bright-lights".to_string());

    provider.start("gc-a", &cfg).await.unwrap();

    let raw = std::fs::read_to_string(dir.path().join("start-input.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["command"], "claude code");
    assert_eq!(parsed["work_dir"], "/city/rig");
    assert_eq!(parsed["ready_prompt_prefix"], "> ");
    assert_eq!(parsed["ready_delay_ms"], 500);
    assert_eq!(parsed["process_names"][0], "claude");
    assert_eq!(parsed["env"]["CITY"], "bright-lights");
    // Unset fields are omitted entirely
    assert!(parsed.get("nudge").is_none());
    assert!(parsed.get("overlay_dir").is_none());

    let log = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
    assert!(log.contains("start gc-a"));
}

#[tokio::test]
async fn is_running_parses_true_output() {
    let (_dir, provider) = setup();
    assert!(provider.is_running("gc-a").await);
}

#[tokio::test]
async fn process_alive_sends_names_on_stdin() {
    let (dir, provider) = setup();
    let names = vec!["claude".to_string(), "node".to_string()];
    assert!(!provider.process_alive("gc-a", &names).await);

    let sent = std::fs::read_to_string(dir.path().join("process-names.txt")).unwrap();
    assert_eq!(sent, "claude\nnode");
}

#[tokio::test]
async fn process_alive_empty_names_skips_the_script() {
    let (dir, provider) = setup();
    assert!(provider.process_alive("gc-a", &[]).await);
    assert!(!dir.path().join("process-names.txt").exists());
}

#[tokio::test]
async fn unknown_verb_exit_2_is_success() {
    let (_dir, provider) = setup();
    // The script has no clear-scrollback branch: exit 2
    provider.clear_scrollback("gc-a").await.unwrap();
    provider.stop("gc-a").await.unwrap();
    // set-meta also falls through to exit 2, surfacing success
    provider.set_meta("gc-a", "k", "v").await.unwrap();
}

#[tokio::test]
async fn stdout_is_trimmed_of_trailing_whitespace() {
    let (_dir, provider) = setup();
    assert_eq!(provider.get_meta("gc-a", "k").await.unwrap(), "stored-value");
    assert_eq!(provider.peek("gc-a", 10).await, "line one\nline two");
}

#[tokio::test]
async fn list_running_splits_lines() {
    let (_dir, provider) = setup();
    let names = provider.list_running("gc-").await.unwrap();
    assert_eq!(names, vec!["gc-a", "gc-b"]);
}

#[tokio::test]
async fn last_activity_parses_rfc3339() {
    let (_dir, provider) = setup();
    let at = provider.get_last_activity("gc-a").await.unwrap();
    assert_eq!(at.to_rfc3339(), "2026-02-27T12:00:00+00:00");
}

#[tokio::test]
async fn nudge_ships_message_bytes() {
    let (dir, provider) = setup();
    provider.nudge("gc-a", "keep going").await.unwrap();
    let sent = std::fs::read_to_string(dir.path().join("nudge.txt")).unwrap();
    assert_eq!(sent, "keep going");
}

#[tokio::test]
async fn exit_1_surfaces_stderr_for_strict_ops() {
    let (_dir, provider) = setup();
    let result = provider
        .invoke("fail-verb", &["gc-a"], None, Duration::from_secs(5))
        .await;
    assert!(matches!(
        result,
        Err(SessionError::Transport(msg)) if msg.contains("deliberate failure")
    ));
}

#[tokio::test]
async fn slow_script_hits_operation_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slow.sh");
    std::fs::write(&path, "#!/bin/sh\nsleep 10\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();

    let provider = ScriptProvider::new(&path)
        .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));
    let result = provider.stop("gc-a").await;
    assert!(matches!(
        result,
        Err(SessionError::Transport(msg)) if msg.contains("timed out")
    ));
}
