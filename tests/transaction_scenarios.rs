//! End-to-end transaction scenarios against a live PostgreSQL
//!
//! Covers commit/rollback visibility, nested savepoint isolation,
//! aborted-session unwinding, post-commit ordering, and concurrent conflict
//! detection under default and serializable isolation.

use carehaus::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::Barrier;

static SCHEMA_INIT: OnceLock<tokio::sync::Mutex<()>> = OnceLock::new();

async fn setup_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to database");

    // Serialize schema setup across concurrently running tests
    let _guard = SCHEMA_INIT
        .get_or_init(|| tokio::sync::Mutex::new(()))
        .lock()
        .await;
    migration::ensure_schema(&pool)
        .await
        .expect("Failed to ensure schema");

    pool
}

fn unique_marker(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

fn patient_body(marker: &str) -> serde_json::Value {
    json!({
        "resourceType": "Patient",
        "identifier": [{"system": "http://example.com/mrn", "value": marker}],
        "name": [{"family": "Tester"}]
    })
}

#[tokio::test]
async fn test_commit_makes_resource_visible() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let marker = unique_marker("s1");

    let created = store
        .create("Patient", patient_body(&marker))
        .await
        .expect("create should commit");
    assert!(!created.id.is_nil());
    assert_eq!(created.version_id, 1);

    // Visible to a read from outside the original transaction
    let read = store.read("Patient", created.id).await.expect("readable");
    assert_eq!(read.id, created.id);
    assert_eq!(read.content["identifier"][0]["value"], json!(marker));

    // Search finds exactly one entry, by id and by identifier
    let by_id = store
        .search_by_id("Patient", created.id)
        .await
        .expect("searchable by id");
    assert_eq!(by_id.len(), 1);

    let found = store
        .search_by_identifier("Patient", &marker)
        .await
        .expect("searchable");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, created.id);
}

#[tokio::test]
async fn test_validation_error_rolls_back_everything() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let marker = unique_marker("s2");
    let saved_id = Arc::new(Mutex::new(None::<Uuid>));

    let result = {
        let store = store.clone();
        let marker = marker.clone();
        let saved_id = Arc::clone(&saved_id);
        with_transaction(&pool, TxOptions::new(), move |ch| async move {
            let p1 = store.create_in(&ch, "Patient", patient_body(&marker)).await?;
            *saved_id.lock().unwrap() = Some(p1.id);

            // Unknown top-level property fails validation
            store
                .create_in(&ch, "Patient", json!({"resourceType": "Patient", "foo": "bar"}))
                .await?;
            Ok(())
        })
        .await
    };

    match result {
        Err(CarehausError::Validation { text, expression }) => {
            assert_eq!(text, "Invalid additional property \"foo\"");
            assert_eq!(expression, vec!["Patient.foo".to_string()]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let p1_id = saved_id.lock().unwrap().expect("first create ran");
    let read = store.read("Patient", p1_id).await;
    assert!(matches!(read, Err(CarehausError::NotFound { .. })));

    let found = store
        .search_by_identifier("Patient", &marker)
        .await
        .expect("search works on a fresh connection");
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_nested_commit_persists_both() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let outer_marker = unique_marker("s3-outer");
    let inner_marker = unique_marker("s3-inner");

    let (p1_id, p2_id) = {
        let store = store.clone();
        let pool2 = pool.clone();
        let outer_marker = outer_marker.clone();
        let inner_marker = inner_marker.clone();
        with_transaction(&pool, TxOptions::new(), move |ch| async move {
            let p1 = store
                .create_in(&ch, "Patient", patient_body(&outer_marker))
                .await?;

            let store2 = store.clone();
            let p2 = with_transaction(&pool2, TxOptions::new(), move |ch| async move {
                store2
                    .create_in(&ch, "Patient", patient_body(&inner_marker))
                    .await
            })
            .await?;

            Ok((p1.id, p2.id))
        })
        .await
        .expect("both frames commit")
    };

    assert!(store.read("Patient", p1_id).await.is_ok());
    assert!(store.read("Patient", p2_id).await.is_ok());
}

#[tokio::test]
async fn test_nested_rollback_keeps_outer_effects() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let outer_marker = unique_marker("s4-outer");
    let inner_marker = unique_marker("s4-inner");
    let inner_id = Arc::new(Mutex::new(None::<Uuid>));

    let p1_id = {
        let store = store.clone();
        let pool2 = pool.clone();
        let outer_marker = outer_marker.clone();
        let inner_marker = inner_marker.clone();
        let inner_id = Arc::clone(&inner_id);
        with_transaction(&pool, TxOptions::new(), move |ch| async move {
            let p1 = store
                .create_in(&ch, "Patient", patient_body(&outer_marker))
                .await?;

            let store2 = store.clone();
            let inner_id2 = Arc::clone(&inner_id);
            let nested: Result<(), _> =
                with_transaction(&pool2, TxOptions::new(), move |ch| async move {
                    let p2 = store2
                        .create_in(&ch, "Patient", patient_body(&inner_marker))
                        .await?;
                    *inner_id2.lock().unwrap() = Some(p2.id);

                    // Trigger a validation failure inside the savepoint
                    store2
                        .create_in(&ch, "Patient", json!({"resourceType": "Patient", "foo": 1}))
                        .await?;
                    Ok(())
                })
                .await;
            assert!(matches!(nested, Err(CarehausError::Validation { .. })));

            // Outer work before and after the failed frame survives
            let still_there = store.read_in(&ch, "Patient", p1.id).await?;
            assert_eq!(still_there.id, p1.id);

            Ok(p1.id)
        })
        .await
        .expect("outer commits despite nested rollback")
    };

    assert!(store.read("Patient", p1_id).await.is_ok());

    let p2_id = inner_id.lock().unwrap().expect("inner create ran");
    let gone = store.read("Patient", p2_id).await;
    assert!(matches!(gone, Err(CarehausError::NotFound { .. })));
}

#[tokio::test]
async fn test_aborted_session_unwinds_to_outermost_rollback() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let outer_marker = unique_marker("s5-outer");
    let inner_marker = unique_marker("s5-inner");
    let ids = Arc::new(Mutex::new(Vec::<Uuid>::new()));

    let result = {
        let store = store.clone();
        let pool2 = pool.clone();
        let outer_marker = outer_marker.clone();
        let inner_marker = inner_marker.clone();
        let ids = Arc::clone(&ids);
        with_transaction(&pool, TxOptions::new(), move |ch| async move {
            let p1 = store
                .create_in(&ch, "Patient", patient_body(&outer_marker))
                .await?;
            ids.lock().unwrap().push(p1.id);

            let store2 = store.clone();
            let ids2 = Arc::clone(&ids);
            let nested: Result<(), _> =
                with_transaction(&pool2, TxOptions::new(), move |ch| async move {
                    let p2 = store2
                        .create_in(&ch, "Patient", patient_body(&inner_marker))
                        .await?;
                    ids2.lock().unwrap().push(p2.id);

                    // The engine aborts the block on this statement error;
                    // the callback swallows it and tries to carry on
                    let _ = ch.query("SELECT * FROM table_does_not_exist", &[]).await;
                    Ok(())
                })
                .await;
            assert!(matches!(
                nested,
                Err(CarehausError::TransactionAborted { .. })
            ));

            // Reads within the same transaction now fail with the aborted error
            let read = store.read_in(&ch, "Patient", p1.id).await;
            assert!(matches!(read, Err(CarehausError::TransactionAborted { .. })));

            Ok(())
        })
        .await
    };

    assert!(matches!(
        result,
        Err(CarehausError::TransactionAborted { .. })
    ));

    // Nothing from either frame persisted
    let ids = ids.lock().unwrap().clone();
    assert_eq!(ids.len(), 2);
    for id in ids {
        let read = store.read("Patient", id).await;
        assert!(matches!(read, Err(CarehausError::NotFound { .. })));
    }
}

#[tokio::test]
async fn test_post_commit_ordering_across_frames() {
    let pool = setup_pool().await;
    let order = Arc::new(Mutex::new(Vec::<u32>::new()));

    let result = {
        let pool2 = pool.clone();
        let o1 = Arc::clone(&order);
        let o2 = Arc::clone(&order);
        with_transaction(&pool, TxOptions::new(), move |_ch| async move {
            post_commit(move || async move {
                o1.lock().unwrap().push(1);
                Ok(())
            })?;

            with_transaction(&pool2, TxOptions::new(), move |_ch| async move {
                post_commit(move || async move {
                    o2.lock().unwrap().push(2);
                    Ok(())
                })?;
                Ok(())
            })
            .await?;

            Ok(())
        })
        .await
    };

    assert!(result.is_ok());
    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_post_commit_skipped_when_outer_fails() {
    let pool = setup_pool().await;
    let ran = Arc::new(Mutex::new(false));

    let result: Result<(), _> = {
        let flag = Arc::clone(&ran);
        with_transaction(&pool, TxOptions::new(), move |_ch| async move {
            post_commit(move || async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })?;
            Err(CarehausError::internal("outer fails"))
        })
        .await
    };

    assert!(result.is_err());
    assert!(!*ran.lock().unwrap());
}

#[tokio::test]
async fn test_concurrent_updates_one_winner() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let marker = unique_marker("s7");

    let created = store
        .create("Patient", patient_body(&marker))
        .await
        .expect("create");
    let barrier = Arc::new(Barrier::new(2));

    let mut tasks = Vec::new();
    for n in 0..2u32 {
        let pool = pool.clone();
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let marker = marker.clone();
        let id = created.id;
        tasks.push(tokio::spawn(async move {
            with_transaction(&pool, TxOptions::new(), move |ch| async move {
                let current = store.read_in(&ch, "Patient", id).await?;
                // Both writers hold version 1 before either updates
                barrier.wait().await;

                let mut body = patient_body(&marker);
                body["name"] = json!([{"family": format!("Writer{}", n)}]);
                store
                    .update_in(&ch, "Patient", id, body, Some(current.version_id))
                    .await?;
                Ok(())
            })
            .await
        }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.expect("task panicked"));
    }

    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let rejected = outcomes
        .iter()
        .filter(|r| matches!(r, Err(CarehausError::UniqueConflict { .. })))
        .count();
    assert_eq!(winners, 1, "exactly one writer commits: {:?}", outcomes);
    assert_eq!(rejected, 1, "the loser sees a version conflict: {:?}", outcomes);

    let after = store.read("Patient", created.id).await.expect("row remains");
    assert_eq!(after.version_id, 2);
}

#[tokio::test]
async fn test_conditional_create_race_under_serializable() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let identifier = unique_marker("s8-ssi");
    let barrier = Arc::new(Barrier::new(2));

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let identifier = identifier.clone();
        tasks.push(tokio::spawn(async move {
            with_transaction(&pool, TxOptions::serializable(), move |ch| async move {
                let existing = store
                    .search_by_identifier_in(&ch, "Patient", &identifier)
                    .await?;
                // Both observe the absence before either inserts
                barrier.wait().await;

                if existing.is_empty() {
                    store
                        .create_in(&ch, "Patient", patient_body(&identifier))
                        .await?;
                }
                Ok(())
            })
            .await
        }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.expect("task panicked"));
    }

    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(CarehausError::SerializationConflict { .. })))
        .count();
    assert!(
        conflicts >= 1,
        "at least one writer must be rejected: {:?}",
        outcomes
    );

    let found = store
        .search_by_identifier("Patient", &identifier)
        .await
        .expect("search");
    assert!(found.len() <= 1, "no duplicate slipped through");
}

#[tokio::test]
async fn test_conditional_create_race_permits_duplicates_by_default() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let identifier = unique_marker("s8-default");
    let barrier = Arc::new(Barrier::new(2));

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let store = store.clone();
        let barrier = Arc::clone(&barrier);
        let identifier = identifier.clone();
        tasks.push(tokio::spawn(async move {
            with_transaction(&pool, TxOptions::new(), move |ch| async move {
                let existing = store
                    .search_by_identifier_in(&ch, "Patient", &identifier)
                    .await?;
                barrier.wait().await;

                if existing.is_empty() {
                    store
                        .create_in(&ch, "Patient", patient_body(&identifier))
                        .await?;
                }
                Ok(())
            })
            .await
        }));
    }

    for task in tasks {
        task.await
            .expect("task panicked")
            .expect("default isolation lets both commit");
    }

    // Duplicates are permitted at this layer without serializable
    let found = store
        .search_by_identifier("Patient", &identifier)
        .await
        .expect("search");
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_conditional_create_returns_existing_on_second_call() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let identifier = unique_marker("cond");

    let (first, created) = store
        .conditional_create(
            "Patient",
            &identifier,
            patient_body(&identifier),
            TxOptions::new(),
        )
        .await
        .expect("first conditional create");
    assert!(created);

    let (second, created_again) = store
        .conditional_create(
            "Patient",
            &identifier,
            patient_body(&identifier),
            TxOptions::serializable(),
        )
        .await
        .expect("second conditional create");
    assert!(!created_again);
    assert_eq!(second.id, first.id);
}

#[tokio::test]
async fn test_update_without_expected_version_still_bumps() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let marker = unique_marker("lww");

    let created = store
        .create("Patient", patient_body(&marker))
        .await
        .expect("create");

    let updated = store
        .update("Patient", created.id, patient_body(&marker), None)
        .await
        .expect("unconditional update");
    assert_eq!(updated.version_id, 2);
}

#[tokio::test]
async fn test_delete_then_read_is_not_found() {
    let pool = setup_pool().await;
    let store = ResourceStore::new(pool.clone());
    let marker = unique_marker("del");

    let created = store
        .create("Patient", patient_body(&marker))
        .await
        .expect("create");

    store
        .delete("Patient", created.id)
        .await
        .expect("delete existing");

    let read = store.read("Patient", created.id).await;
    assert!(matches!(read, Err(CarehausError::NotFound { .. })));

    let again = store.delete("Patient", created.id).await;
    assert!(matches!(again, Err(CarehausError::NotFound { .. })));
}
