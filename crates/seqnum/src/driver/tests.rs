use core::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::{
    CountAllocator, DayKey, FixedClock, LockScope, MAX_DAILY_SEQUENCE, MaxAllocator, MemoryStore,
    OrderNumber, StoreConfig,
};

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap())
}

fn driver<A: NumberAllocator + 'static>(
    store: MemoryStore,
    allocator: A,
    config: DriverConfig,
) -> Driver<MemoryStore, A, FixedClock> {
    Driver::new(OrderCreator::with_clock(store, allocator, clock()), config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn full_day_yields_every_number_and_one_overflow() {
    let config = DriverConfig::new(10_000, 20).unwrap();
    let report = driver(MemoryStore::default(), MaxAllocator, config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.attempts, 10_000);
    assert_eq!(report.created, 10_000);
    assert_eq!(report.distinct_numbers, u64::from(MAX_DAILY_SEQUENCE));
    assert_eq!(report.succeeded, 9_999);
    assert_eq!(report.failed, 1);
    assert_eq!(report.overflowed, 1);
    assert_eq!(report.panicked, 0);
    assert!(!report.counts_match());

    let range = DayKey::of(clock().now()).range();
    let consistency = &report.consistency;
    assert_eq!(consistency.unnumbered, 1);
    assert_eq!(consistency.days.len(), 1);
    assert_eq!(consistency.days[0].first, range.base());
    assert_eq!(consistency.days[0].last, range.last());
    assert!(consistency.days[0].contiguous);
    assert!(report.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn two_days_under_contention_stay_disjoint_and_dense() {
    let config = DriverConfig::new(500, 50)
        .unwrap()
        .with_day_offsets(DayOffsets::uniform(-1, 0).unwrap());
    let report = driver(MemoryStore::default(), MaxAllocator, config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 500);
    assert_eq!(report.created, 500);
    assert_eq!(report.distinct_numbers, 500);
    assert!(report.counts_match());
    assert!(report.is_consistent());

    let today = DayKey::of(clock().now());
    let yesterday = DayKey::of(clock().now() - TimeDelta::days(1));
    let days = &report.consistency.days;
    // Both days are hit with overwhelming probability over 500 draws.
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].day, yesterday);
    assert_eq!(days[1].day, today);
    assert_eq!(days[0].numbered + days[1].numbered, 500);
    assert!(days.iter().all(|day| day.contiguous));
    assert!(days[0].last < days[1].first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn in_flight_never_exceeds_parallelism() {
    let store = MemoryStore::new(StoreConfig::default().with_latency(Some(Duration::from_millis(1))));
    let report = driver(store, MaxAllocator, DriverConfig::new(200, 8).unwrap())
        .run()
        .await
        .unwrap();

    assert!(report.peak_in_flight >= 1);
    assert!(report.peak_in_flight <= 8);
    assert_eq!(report.succeeded, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn count_policy_is_dense_on_a_single_day() {
    let report = driver(
        MemoryStore::default(),
        CountAllocator,
        DriverConfig::new(300, 20).unwrap(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.policy, CountAllocator.name());
    assert!(!report.dense);
    assert_eq!(report.distinct_numbers, 300);
    assert!(report.consistency.is_consistent(true));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn day_scoped_locks_keep_numbers_unique() {
    let store = MemoryStore::new(StoreConfig::default().with_lock_scope(LockScope::Day));
    let config = DriverConfig::new(400, 32)
        .unwrap()
        .with_day_offsets(DayOffsets::uniform(-3, 0).unwrap());
    let report = driver(store, MaxAllocator, config).run().await.unwrap();

    assert_eq!(report.distinct_numbers, 400);
    assert!(report.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn lock_failures_are_counted_and_drain_completes() {
    let store = MemoryStore::new(
        StoreConfig::default().with_lock_timeout(Some(Duration::from_millis(10))),
    );
    let held = store
        .hold_lock(DayKey::of(clock().now()).range())
        .await
        .unwrap();

    let driver = driver(store.clone(), MaxAllocator, DriverConfig::new(12, 4).unwrap());
    let report = tokio::time::timeout(Duration::from_secs(10), driver.run())
        .await
        .expect("drain must not hang")
        .unwrap();
    drop(held);

    assert_eq!(report.attempts, 12);
    assert_eq!(report.failed, 12);
    assert_eq!(report.overflowed, 0);
    assert_eq!(report.created, 12);
    assert_eq!(report.distinct_numbers, 0);
    assert_eq!(report.consistency.unnumbered, 12);

    let rows = store.snapshot().await.unwrap();
    assert!(rows.iter().all(|row| row.number == OrderNumber::UNASSIGNED));
}

#[tokio::test]
async fn cancelled_before_start_admits_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = driver(
        MemoryStore::default(),
        MaxAllocator,
        DriverConfig::new(50, 4).unwrap(),
    )
    .with_cancellation(cancel)
    .run()
    .await
    .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.created, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_stops_admission_and_drains_admitted_work() {
    let store = MemoryStore::new(StoreConfig::default().with_latency(Some(Duration::from_millis(2))));
    let cancel = CancellationToken::new();
    let driver = driver(store, MaxAllocator, DriverConfig::new(10_000, 4).unwrap())
        .with_cancellation(cancel.clone());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let report = driver.run().await.unwrap();
    trigger.await.unwrap();

    assert!(report.cancelled);
    assert!(report.attempts < 10_000);
    assert_eq!(report.succeeded + report.failed, report.attempts);
    assert_eq!(report.created, report.attempts);
    assert!(report.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closed_gate_fails_the_run_after_draining_admitted_work() {
    let store = MemoryStore::new(StoreConfig::default().with_latency(Some(Duration::from_millis(5))));
    let driver = Arc::new(driver(
        store.clone(),
        MaxAllocator,
        DriverConfig::new(10_000, 4).unwrap(),
    ));

    let closer = tokio::spawn({
        let driver = Arc::clone(&driver);
        async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            driver.gate().close();
        }
    });
    let result = driver.run().await;
    closer.await.unwrap();

    assert!(matches!(result, Err(Error::Admission { .. })));

    // Every admitted creation ran to completion before the error surfaced.
    let rows = store.snapshot().await.unwrap();
    assert!(!rows.is_empty());
    assert!(rows.len() < 10_000);
    assert!(rows.iter().all(|row| row.number != OrderNumber::UNASSIGNED));
    assert_eq!(store.distinct_numbers().await.unwrap(), rows.len() as u64);
}

#[test]
fn config_rejects_empty_runs() {
    assert!(matches!(
        DriverConfig::new(0, 4),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        DriverConfig::new(4, 0),
        Err(Error::InvalidConfig { .. })
    ));
    assert!(matches!(
        DayOffsets::uniform(1, -1),
        Err(Error::InvalidConfig { .. })
    ));
    assert_eq!(DayOffsets::uniform(-2, -2).unwrap(), DayOffsets::Fixed(-2));
}

#[test]
fn uniform_offsets_stay_in_bounds() {
    let offsets = DayOffsets::uniform(-3, 1).unwrap();
    for _ in 0..1_000 {
        assert!((-3..=1).contains(&offsets.sample()));
    }
    assert_eq!(DayOffsets::default().sample(), 0);
}

#[cfg(feature = "serde")]
#[tokio::test]
async fn report_serializes_to_json() {
    let report = driver(
        MemoryStore::default(),
        MaxAllocator,
        DriverConfig::new(3, 1).unwrap(),
    )
    .run()
    .await
    .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["created"], 3);
    assert_eq!(json["consistency"]["days"][0]["day"], "240307");
    assert_eq!(json["consistency"]["days"][0]["last"], 2_403_070_003_u64);
}
