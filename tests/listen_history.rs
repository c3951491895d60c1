//! Reconciliation of listen history against existing users and tracks.

mod helpers;

use helpers::{count, history_record, track_record, user_record};
use music_sync::data::listen_history::{histories_for_user, tracks_for_history};
use music_sync::data::{BatchError, Track, User, process_batch, process_listen_history};
use serde_json::json;
use sqlx::SqlitePool;

async fn seed(pool: &SqlitePool) {
    process_batch::<User>(
        pool,
        vec![
            user_record(json!({ "id": 1, "first_name": "Ada", "email": "ada@example.com" })),
            user_record(json!({ "id": 2, "first_name": "Linus", "email": "linus@example.com" })),
        ],
    )
    .await
    .expect("failed to seed users");

    process_batch::<Track>(
        pool,
        vec![
            track_record(json!({ "id": 100, "name": "Song A" })),
            track_record(json!({ "id": 101, "name": "Song B" })),
        ],
    )
    .await
    .expect("failed to seed tracks");
}

#[sqlx::test]
async fn test_missing_track_is_dropped_from_set(pool: SqlitePool) {
    seed(&pool).await;

    let report = process_listen_history(
        &pool,
        vec![history_record(json!({ "user_id": 1, "items": [100, 999] }))],
    )
    .await
    .expect("reconcile failed");

    assert_eq!(report.created, 1);
    assert_eq!(report.missing_tracks, vec![999]);
    assert!(report.missing_users.is_empty());

    let histories = histories_for_user(&pool, 1).await.unwrap();
    assert_eq!(histories.len(), 1);
    let tracks = tracks_for_history(&pool, histories[0].id).await.unwrap();
    assert_eq!(tracks, vec![100]);
}

#[sqlx::test]
async fn test_missing_user_skips_item_only(pool: SqlitePool) {
    seed(&pool).await;

    let report = process_listen_history(
        &pool,
        vec![
            history_record(json!({ "user_id": 42, "items": [100] })),
            history_record(json!({ "user_id": 2, "items": [100, 101] })),
        ],
    )
    .await
    .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.missing_users, vec![42]);
    assert_eq!(count(&pool, "listen_history").await, 1);
    assert_eq!(count(&pool, "listen_history_tracks").await, 2);
    assert!(histories_for_user(&pool, 42).await.unwrap().is_empty());
}

#[sqlx::test]
async fn test_history_without_resolvable_tracks_is_still_created(pool: SqlitePool) {
    seed(&pool).await;

    let report = process_listen_history(
        &pool,
        vec![
            history_record(json!({ "user_id": 1, "items": [] })),
            history_record(json!({ "user_id": 1, "items": [998, 999] })),
        ],
    )
    .await
    .unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(report.missing_tracks, vec![998, 999]);
    assert_eq!(count(&pool, "listen_history").await, 2);
    assert_eq!(count(&pool, "listen_history_tracks").await, 0);
}

#[sqlx::test]
async fn test_duplicate_track_ids_collapse(pool: SqlitePool) {
    seed(&pool).await;

    process_listen_history(
        &pool,
        vec![history_record(json!({ "user_id": 1, "items": [101, 100, 101] }))],
    )
    .await
    .unwrap();

    let histories = histories_for_user(&pool, 1).await.unwrap();
    let tracks = tracks_for_history(&pool, histories[0].id).await.unwrap();
    assert_eq!(tracks, vec![100, 101]);
}

#[sqlx::test]
async fn test_timestamps_are_normalized(pool: SqlitePool) {
    seed(&pool).await;

    process_listen_history(
        &pool,
        vec![history_record(json!({
            "user_id": 2,
            "items": [100],
            "created_at": "2024-08-08T10:15:17.621586Z",
            "updated_at": "2024-08-09T00:00:00",
        }))],
    )
    .await
    .unwrap();

    let history = &histories_for_user(&pool, 2).await.unwrap()[0];
    assert_eq!(
        history.created_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        "2024-08-08 10:15:17.621586"
    );
    assert_eq!(
        history.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        "2024-08-09 00:00:00"
    );
}

#[sqlx::test]
async fn test_bad_timestamp_rolls_back_every_history(pool: SqlitePool) {
    seed(&pool).await;

    let result = process_listen_history(
        &pool,
        vec![
            history_record(json!({ "user_id": 1, "items": [100] })),
            history_record(json!({ "user_id": 2, "items": [101], "created_at": "garbage" })),
        ],
    )
    .await;

    assert!(matches!(result, Err(BatchError::Parse(_))), "got {result:?}");
    assert_eq!(count(&pool, "listen_history").await, 0);
    assert_eq!(count(&pool, "listen_history_tracks").await, 0);
}

#[sqlx::test]
async fn test_reruns_accumulate_history_rows(pool: SqlitePool) {
    seed(&pool).await;
    let batch = || vec![history_record(json!({ "user_id": 1, "items": [100] }))];

    process_listen_history(&pool, batch()).await.unwrap();
    process_listen_history(&pool, batch()).await.unwrap();

    // History items are not deduplicated across passes.
    assert_eq!(histories_for_user(&pool, 1).await.unwrap().len(), 2);
}

#[sqlx::test]
async fn test_unavailable_store_reports_storage_error(pool: SqlitePool) {
    seed(&pool).await;
    pool.close().await;

    let err = process_listen_history(
        &pool,
        vec![history_record(json!({ "user_id": 1, "items": [100] }))],
    )
    .await
    .expect_err("closed pool must not commit");

    assert!(matches!(err, BatchError::Storage(sqlx::Error::PoolClosed)));
}
