// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::DateTime;
use gc_core::EventRecord;
use gc_formula::{Automation, GateKind};
use gc_storage::MemoryProvider;
use std::path::PathBuf;
use std::sync::Mutex;

fn automation(gate: GateKind) -> Automation {
    Automation {
        name: "digest".to_string(),
        rig: String::new(),
        formula: Some("daily-digest".to_string()),
        exec: None,
        gate,
        interval: String::new(),
        schedule: String::new(),
        check: String::new(),
        on: String::new(),
        pool: None,
        timeout: None,
        enabled: true,
        source: PathBuf::new(),
    }
}

fn at(rfc3339: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).unwrap()
}

/// Store with fixed answers that records which scoped names were queried.
#[derive(Default)]
struct FakeStore {
    last_run: Option<DateTime<FixedOffset>>,
    cursor: u64,
    queried: Mutex<Vec<String>>,
}

impl GateStore for FakeStore {
    fn last_run(&self, scoped_name: &str) -> Option<DateTime<FixedOffset>> {
        self.queried.lock().unwrap().push(scoped_name.to_string());
        self.last_run
    }

    fn cursor(&self, scoped_name: &str) -> u64 {
        self.queried.lock().unwrap().push(scoped_name.to_string());
        self.cursor
    }
}

fn events() -> MemoryProvider {
    MemoryProvider::new()
}

// -- cooldown --

#[tokio::test]
async fn cooldown_never_run_is_due() {
    let mut auto = automation(GateKind::Cooldown);
    auto.interval = "24h".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);
    assert_eq!(result.reason, "never run");
    assert!(result.last_run.is_none());
}

#[tokio::test]
async fn cooldown_under_interval_is_not_due() {
    let mut auto = automation(GateKind::Cooldown);
    auto.interval = "24h".to_string();
    let store = FakeStore {
        last_run: Some(at("2026-02-27T00:00:00+00:00")),
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
    assert_eq!(result.reason, "cooldown: 12h remaining");
    assert_eq!(result.last_run, Some(at("2026-02-27T00:00:00+00:00")));
}

#[tokio::test]
async fn cooldown_elapsed_is_due() {
    let mut auto = automation(GateKind::Cooldown);
    auto.interval = "6h".to_string();
    let store = FakeStore {
        last_run: Some(at("2026-02-27T00:00:00+00:00")),
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T06:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);
}

#[tokio::test]
async fn cooldown_without_interval_is_config_error() {
    let auto = automation(GateKind::Cooldown);
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events()).await;
    assert!(matches!(result, Err(GateError::Config { .. })));
}

// -- cron --

#[tokio::test]
async fn cron_matches_at_scheduled_minute() {
    let mut auto = automation(GateKind::Cron);
    auto.schedule = "0 3 * * *".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T03:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);
}

#[tokio::test]
async fn cron_debounces_within_the_matched_minute() {
    let mut auto = automation(GateKind::Cron);
    auto.schedule = "0 3 * * *".to_string();
    let store = FakeStore {
        last_run: Some(at("2026-02-27T03:00:10+00:00")),
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T03:00:30+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
    assert_eq!(result.reason, "cron: already ran this minute");
}

#[tokio::test]
async fn cron_fires_again_the_next_day() {
    let mut auto = automation(GateKind::Cron);
    auto.schedule = "0 3 * * *".to_string();
    let store = FakeStore {
        last_run: Some(at("2026-02-26T03:00:10+00:00")),
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T03:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);
}

#[tokio::test]
async fn cron_outside_schedule_is_not_due() {
    let mut auto = automation(GateKind::Cron);
    auto.schedule = "0 3 * * *".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T04:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
}

#[tokio::test]
async fn cron_comma_lists_and_weekday_match() {
    let mut auto = automation(GateKind::Cron);
    // 2026-02-27 is a Friday (weekday 5)
    auto.schedule = "15,45 * * * 5".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T09:45:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);

    let result = evaluate(&auto, at("2026-02-27T09:30:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);

    // Saturday: weekday field filters it out
    let result = evaluate(&auto, at("2026-02-28T09:45:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
}

#[yare::parameterized(
    four_fields  = { "0 3 * *" },
    six_fields   = { "0 3 * * * *" },
    range        = { "1-5 * * * *" },
    step         = { "*/15 * * * *" },
    name         = { "0 3 * * mon" },
    out_of_range = { "60 * * * *" },
    bad_weekday  = { "* * * * 7" },
)]
fn cron_rejects_unsupported_grammar(schedule: &str) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut auto = automation(GateKind::Cron);
    auto.schedule = schedule.to_string();
    let store = FakeStore::default();

    let result = rt.block_on(evaluate(
        &auto,
        at("2026-02-27T03:00:00+00:00"),
        &store,
        &events(),
    ));
    assert!(matches!(result, Err(GateError::Config { .. })), "{}", schedule);
}

// -- condition --

#[tokio::test]
async fn condition_exit_zero_is_due() {
    let mut auto = automation(GateKind::Condition);
    auto.check = "true".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(result.due);
}

#[tokio::test]
async fn condition_nonzero_exit_is_not_due() {
    let mut auto = automation(GateKind::Condition);
    auto.check = "exit 7".to_string();
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
    assert!(result.reason.contains('7'), "reason: {}", result.reason);
}

// -- event --

#[tokio::test]
async fn event_gate_counts_events_past_cursor() {
    let provider = events();
    provider.record(EventRecord::new("bead.closed", "mayor")).await;
    provider.record(EventRecord::new("bead.created", "mayor")).await;
    provider.record(EventRecord::new("bead.closed", "mayor")).await;

    let mut auto = automation(GateKind::Event);
    auto.name = "convoy-check".to_string();
    auto.on = "bead.closed".to_string();
    let store = FakeStore {
        cursor: 2,
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &provider)
        .await
        .unwrap();
    assert!(result.due);
    assert_eq!(result.reason, "event: 1 bead.closed event(s)");
}

#[tokio::test]
async fn event_gate_with_caught_up_cursor_is_not_due() {
    let provider = events();
    provider.record(EventRecord::new("bead.closed", "mayor")).await;

    let mut auto = automation(GateKind::Event);
    auto.on = "bead.closed".to_string();
    let store = FakeStore {
        cursor: 1,
        ..Default::default()
    };

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &provider)
        .await
        .unwrap();
    assert!(!result.due);
}

// -- manual & scoping --

#[tokio::test]
async fn manual_gate_is_never_due() {
    let auto = automation(GateKind::Manual);
    let store = FakeStore::default();

    let result = evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();
    assert!(!result.due);
    assert!(result.reason.contains("manual"));
}

#[tokio::test]
async fn persistence_queries_use_the_scoped_name() {
    let mut auto = automation(GateKind::Event);
    auto.rig = "alpha".to_string();
    auto.on = "bead.closed".to_string();
    let store = FakeStore::default();

    evaluate(&auto, at("2026-02-27T12:00:00+00:00"), &store, &events())
        .await
        .unwrap();

    let queried = store.queried.lock().unwrap();
    assert!(queried.iter().all(|name| name == "digest:rig:alpha"));
    // Both last_run and cursor were consulted
    assert_eq!(queried.len(), 2);
}
