// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::provider::{EventProvider, RecorderError};
use crate::reader::EventFilter;
use std::time::Duration;

#[tokio::test]
async fn record_assigns_monotonic_seq() {
    let provider = MemoryProvider::new();
    for i in 1..=3u64 {
        let event = provider.record(EventRecord::new("tick", "clock")).await;
        assert_eq!(event.seq, i);
        assert!(!event.ts_unset());
    }
    assert_eq!(provider.latest_seq().await.unwrap(), 3);
}

#[tokio::test]
async fn list_applies_filter_in_order() {
    let provider = MemoryProvider::new();
    provider.record(EventRecord::new("bead.closed", "mayor")).await;
    provider.record(EventRecord::new("bead.created", "mayor")).await;
    provider.record(EventRecord::new("bead.closed", "witness")).await;

    let closed = provider
        .list(&EventFilter::new().kind("bead.closed"))
        .await
        .unwrap();
    assert_eq!(closed.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 3]);
}

#[tokio::test]
async fn watcher_yields_existing_then_new_events() {
    let provider = MemoryProvider::new();
    provider.record(EventRecord::new("a", "x")).await;
    provider.record(EventRecord::new("b", "x")).await;

    let cancel = CancellationToken::new();
    let mut watcher = provider.watch(cancel.clone(), 1).await;

    // seq 1 is behind the cursor; seq 2 is already there
    let event = watcher.next().await.unwrap();
    assert_eq!(event.seq, 2);

    // next blocks until a new event arrives
    let pending = tokio::spawn(async move { watcher.next().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    provider.record(EventRecord::new("c", "x")).await;
    let event = pending.await.unwrap().unwrap();
    assert_eq!(event.seq, 3);
}

#[tokio::test]
async fn watcher_returns_cancelled_on_token_fire() {
    let provider = MemoryProvider::new();
    let cancel = CancellationToken::new();
    let mut watcher = provider.watch(cancel.clone(), 0).await;

    let pending = tokio::spawn(async move { watcher.next().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(RecorderError::Cancelled)));
}

#[tokio::test]
async fn watcher_does_not_miss_event_appended_during_check() {
    let provider = MemoryProvider::new();
    let cancel = CancellationToken::new();
    let mut watcher = provider.watch(cancel.clone(), 0).await;

    // Append from a parallel task while the watcher is entering its wait
    let writer = {
        let provider = provider.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            provider.record(EventRecord::new("late", "x")).await;
        })
    };

    let event = watcher.next().await.unwrap();
    assert_eq!(event.kind, "late");
    writer.await.unwrap();
}
