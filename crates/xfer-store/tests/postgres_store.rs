//! PostgreSQL record store against a live database.
//!
//! Every test returns early when `DATABASE_URL` is unset. Run with:
//!   DATABASE_URL=postgres://... cargo test -p xfer-store --test postgres_store
//!
//! Tests share one database and run concurrently, so each works on its own
//! freshly generated keys and never asserts on table-wide state.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use xfer_core::key::generate;
use xfer_core::{
    IncrementOutcome, InsertOutcome, RecordStore, RedemptionRejection, TransferKey, TransferRecord,
};
use xfer_store::PgRecordStore;

async fn store() -> Option<PgRecordStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    Some(PgRecordStore::connect(&url).await.unwrap())
}

fn fresh_key() -> TransferKey {
    generate(16).unwrap()
}

fn live_record(key: &TransferKey) -> TransferRecord {
    TransferRecord::new(key.clone(), "report.pdf", "203.0.113.9", Utc::now() + Duration::hours(1))
}

#[tokio::test]
async fn duplicate_insert_is_refused() {
    let Some(store) = store().await else { return };
    let key = fresh_key();

    assert_eq!(
        store.insert_if_absent(&live_record(&key)).await.unwrap(),
        InsertOutcome::Inserted
    );
    let mut rival = live_record(&key);
    rival.filename = "other.bin".into();
    assert_eq!(
        store.insert_if_absent(&rival).await.unwrap(),
        InsertOutcome::AlreadyExists
    );

    store.delete_by_key(&key).await.unwrap();
}

#[tokio::test]
async fn increments_stop_at_limit() {
    let Some(store) = store().await else { return };
    let key = fresh_key();
    store.insert_if_absent(&live_record(&key)).await.unwrap();

    for expected in 1..=3 {
        assert_eq!(
            store.increment_if_below_limit(&key, 3, Utc::now()).await.unwrap(),
            IncrementOutcome::Incremented { count: expected }
        );
    }
    assert_eq!(
        store.increment_if_below_limit(&key, 3, Utc::now()).await.unwrap(),
        IncrementOutcome::Rejected(RedemptionRejection::Exhausted)
    );

    store.delete_by_key(&key).await.unwrap();
}

#[tokio::test]
async fn expired_record_is_not_charged() {
    let Some(store) = store().await else { return };
    let key = fresh_key();
    let record = TransferRecord::new(key.clone(), "old.txt", "::1", Utc::now() - Duration::hours(1));
    store.insert_if_absent(&record).await.unwrap();

    assert_eq!(
        store.increment_if_below_limit(&key, 3, Utc::now()).await.unwrap(),
        IncrementOutcome::Rejected(RedemptionRejection::Expired)
    );

    store.delete_by_key(&key).await.unwrap();
}

#[tokio::test]
async fn unknown_key_is_absent() {
    let Some(store) = store().await else { return };
    assert_eq!(
        store
            .increment_if_below_limit(&fresh_key(), 3, Utc::now())
            .await
            .unwrap(),
        IncrementOutcome::Rejected(RedemptionRejection::Absent)
    );
}

#[tokio::test]
async fn delete_is_idempotent() {
    let Some(store) = store().await else { return };
    let key = fresh_key();
    store.insert_if_absent(&live_record(&key)).await.unwrap();

    store.delete_by_key(&key).await.unwrap();
    store.delete_by_key(&key).await.unwrap();
    assert_eq!(
        store.increment_if_below_limit(&key, 3, Utc::now()).await.unwrap(),
        IncrementOutcome::Rejected(RedemptionRejection::Absent)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_slot_goes_to_exactly_one_racer() {
    let Some(store) = store().await else { return };
    let store = Arc::new(store);
    let key = fresh_key();
    let mut record = live_record(&key);
    record.redemption_count = 2;
    store.insert_if_absent(&record).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let store = Arc::clone(&store);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            store.increment_if_below_limit(&key, 3, Utc::now()).await.unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            IncrementOutcome::Incremented { count } => {
                assert_eq!(count, 3);
                winners += 1;
            }
            IncrementOutcome::Rejected(cause) => {
                assert_eq!(cause, RedemptionRejection::Exhausted)
            }
        }
    }
    assert_eq!(winners, 1);

    store.delete_by_key(&key).await.unwrap();
}

#[tokio::test]
async fn purge_removes_only_records_past_the_cutoff() {
    let Some(store) = store().await else { return };
    // A cutoff far in the past keeps concurrently running tests' rows out
    // of reach.
    let cutoff = Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap();
    let stale = fresh_key();
    let fresh = fresh_key();
    store
        .insert_if_absent(&TransferRecord::new(
            stale.clone(),
            "stale.txt",
            "::1",
            cutoff - Duration::hours(1),
        ))
        .await
        .unwrap();
    store
        .insert_if_absent(&TransferRecord::new(
            fresh.clone(),
            "fresh.txt",
            "::1",
            cutoff + Duration::hours(1),
        ))
        .await
        .unwrap();

    let purged = store.purge_expired(cutoff, 10_000).await.unwrap();
    assert!(purged.contains(&stale));
    assert!(!purged.contains(&fresh));
    assert!(store.purge_expired(cutoff, 10_000).await.unwrap().iter().all(|k| k != &stale));

    store.delete_by_key(&fresh).await.unwrap();
}

#[tokio::test]
async fn health_check_answers() {
    let Some(store) = store().await else { return };
    store.health_check().await.unwrap();
}
