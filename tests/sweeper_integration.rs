//! The idle sweeper running against a live registry.
mod common;

use common::{capture_logs, manual_registry, per_minute};
use keygate::{AdmissionEvent, BucketRegistry, MemorySink, SweepConfig, Sweeper};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn reclaimed_identity_comes_back_with_full_burst() {
    let (registry, clock) = manual_registry();
    let limits = per_minute(1.0, 3.0);
    for _ in 0..3 {
        assert!(registry.allow("/user/1", &limits));
    }
    assert!(!registry.allow("/user/1", &limits));

    let handle = Sweeper::new(registry.clone(), SweepConfig::default()).spawn();

    // three minutes of silence, then the next pass at the one minute mark
    clock.advance(Duration::from_secs(181));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!registry.contains("/user/1"));

    for _ in 0..3 {
        assert!(registry.allow("/user/1", &limits));
    }
    assert!(!registry.allow("/user/1", &limits));

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn active_identities_survive_passes() {
    let (registry, clock) = manual_registry();
    let limits = per_minute(60.0, 5.0);
    let sink = MemorySink::new();
    let config = SweepConfig::new(Duration::from_secs(10), Duration::from_secs(30)).unwrap();
    let handle = Sweeper::new(registry.clone(), config).with_sink(sink.clone()).spawn();

    registry.allow("/user/busy", &limits);
    registry.allow("/user/idle", &limits);
    for _ in 0..6 {
        clock.advance(Duration::from_secs(10));
        registry.allow("/user/busy", &limits);
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    assert!(registry.contains("/user/busy"));
    assert!(!registry.contains("/user/idle"));
    let evicted: usize = sink
        .events()
        .iter()
        .map(|e| match e {
            AdmissionEvent::Swept { evicted, .. } => *evicted,
            _ => 0,
        })
        .sum();
    assert_eq!(evicted, 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_leaves_registry_untouched() {
    let (registry, clock) = manual_registry();
    let limits = per_minute(5.0, 5.0);
    registry.allow("/user/1", &limits);

    let handle = Sweeper::new(registry.clone(), SweepConfig::every(Duration::from_secs(1)).unwrap())
        .spawn();
    handle.shutdown().await.unwrap();

    clock.advance(Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(registry.contains("/user/1"));
}

#[test]
fn sweep_pass_is_logged() {
    let (logs, _guard) = capture_logs();
    let (registry, clock) = manual_registry();
    registry.allow("/user/1", &per_minute(5.0, 5.0));
    clock.advance(Duration::from_secs(200));

    let sweeper = Sweeper::new(registry, SweepConfig::default());
    assert_eq!(sweeper.sweep_once(), 1);

    let out = logs.contents();
    assert!(out.contains("keygate::sweeper"), "{out}");
    assert!(out.contains("evicted=1"), "{out}");
    assert!(out.contains("remaining=0"), "{out}");
}
