//! Refresh exclusivity and cooldown spacing under concurrent callers.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;

use common::{FakeReauth, Harness, MemoryStore, RecordingNotifier, refresh_config};
use postwatch::apply::{ApplyOutcome, ApplyService};
use postwatch::monitor::{MonitorConfig, PostingMonitor};
use postwatch::session::{RefreshOutcome, SessionCoordinator, SessionCredential};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_checks_start_one_attempt() {
    let harness = Harness::new("stale", "renewed");
    let detector = harness.detector.clone();
    let reauth = FakeReauth::with_delay(harness.portal.clone(), detector.clone(), Duration::from_millis(50));
    reauth.push(Err("otp device missing"));
    let coordinator = Arc::new(SessionCoordinator::new(
        SessionCredential::aspxauth("stale"),
        reauth.clone(),
        refresh_config(),
    ));
    coordinator.mark_invalid(Utc::now());

    let tasks = (0..8).map(|_| {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let gate = coordinator.enter().await;
            coordinator.refresh_if_due(&gate, Utc::now()).await
        })
    });
    let outcomes: Vec<RefreshOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::Failed { .. }))
        .count();
    let cooling = outcomes
        .iter()
        .filter(|o| matches!(o, RefreshOutcome::CoolingDown { .. }))
        .count();
    assert_eq!(failed, 1);
    assert_eq!(cooling, 7);
    assert_eq!(reauth.calls(), 1);
    assert!(!detector.overlapped());
    assert!(coordinator.is_invalid());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refresh_attempts_are_spaced_by_the_cooldown() {
    let harness = Harness::new("stale", "renewed");
    for _ in 0..10 {
        harness.reauth.push(Err("sso unavailable"));
    }

    let t0 = Utc::now();
    harness.coordinator.mark_invalid(t0);

    // Simulated clock: checks every 30 s for 10 minutes.
    let mut attempts_at = Vec::new();
    for step in 0..=20 {
        let now = t0 + chrono::TimeDelta::seconds(30 * step);
        let gate = harness.coordinator.enter().await;
        if let RefreshOutcome::Failed { .. } = harness.coordinator.refresh_if_due(&gate, now).await {
            attempts_at.push(now);
        }
    }

    assert_eq!(attempts_at.len(), 5);
    for pair in attempts_at.windows(2) {
        assert!(pair[1] - pair[0] > chrono::TimeDelta::seconds(120));
    }
    assert_eq!(harness.reauth.calls(), attempts_at.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fetches_and_applications_never_overlap_a_refresh() {
    let harness = Harness::new("stale", "unknown");
    harness.portal.set_listing(&["A", "B"]);
    let detector = harness.detector.clone();

    let notifier = RecordingNotifier::new();
    let monitor = Arc::new(PostingMonitor::new(
        harness.coordinator.clone(),
        harness.portal.clone(),
        MemoryStore::with(&[]),
        notifier.clone(),
        MonitorConfig::default(),
    ));
    let apply = Arc::new(ApplyService::new(
        harness.coordinator.clone(),
        harness.portal.clone(),
    ));

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(async move {
        for _ in 0..3 {
            monitor.run_cycle().await;
        }
    }));
    for guid in ["A", "B", "C"] {
        let apply = apply.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = apply.apply(guid).await;
            assert!(
                matches!(outcome, ApplyOutcome::Submitted | ApplyOutcome::SessionExpired),
                "unexpected outcome {outcome:?}"
            );
        }));
    }
    for task in join_all(tasks).await {
        task.unwrap();
    }

    assert!(!detector.overlapped(), "a portal call overlapped a refresh");
    assert_eq!(harness.reauth.calls(), 1);
    assert!(!harness.coordinator.is_invalid());
    assert_eq!(notifier.posted_guids().len(), 2);
}
