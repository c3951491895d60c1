//! All-or-nothing batch behavior for simple entities.

mod helpers;

use helpers::{count, track_record, user_record};
use music_sync::data::{BatchError, Track, User, find_by_id, process_batch};
use serde_json::json;
use sqlx::SqlitePool;

#[sqlx::test]
async fn test_batch_inserts_every_item(pool: SqlitePool) {
    let items = vec![
        track_record(json!({
            "id": 12643,
            "name": "elevate",
            "artist": "Human Movement",
            "songwriters": "Jeffrey Hicks",
            "duration": "5:35",
            "genres": "energy",
            "album": "kinetic",
            "created_at": "2023-03-16T01:11:27.466669",
            "updated_at": "2024-08-08T10:15:17.621586Z",
        })),
        track_record(json!({ "id": 2, "name": "Song B" })),
        track_record(json!({ "id": 3, "name": "Song C" })),
    ];

    let report = process_batch::<Track>(&pool, items).await.expect("batch failed");
    assert_eq!(report.inserted, 3);
    assert_eq!(report.updated, 0);
    assert_eq!(count(&pool, "tracks").await, 3);

    let track: Track = find_by_id(&pool, 12643).await.unwrap().unwrap();
    assert_eq!(track.artist.as_deref(), Some("Human Movement"));
    assert_eq!(
        track.updated_at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        "2024-08-08T10:15:17.621586"
    );
}

#[sqlx::test]
async fn test_rerun_updates_instead_of_duplicating(pool: SqlitePool) {
    let batch = || {
        vec![
            user_record(json!({ "id": 1, "first_name": "Ada", "email": "ada@example.com" })),
            user_record(json!({ "id": 2, "first_name": "Linus", "email": "linus@example.com" })),
        ]
    };

    process_batch::<User>(&pool, batch()).await.unwrap();
    let report = process_batch::<User>(&pool, batch()).await.unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.updated, 2);
    assert_eq!(count(&pool, "users").await, 2);
}

#[sqlx::test]
async fn test_constraint_violation_rolls_back_whole_batch(pool: SqlitePool) {
    let items = vec![
        user_record(json!({ "id": 1, "email": "one@example.com" })),
        user_record(json!({ "id": 2, "email": "two@example.com" })),
        user_record(json!({ "id": 3, "email": "one@example.com" })),
        user_record(json!({ "id": 4, "email": "four@example.com" })),
    ];

    let result = process_batch::<User>(&pool, items).await;

    assert!(matches!(result, Err(BatchError::Storage(_))), "got {result:?}");
    assert_eq!(count(&pool, "users").await, 0, "no partial commit allowed");
}

#[sqlx::test]
async fn test_failed_batch_leaves_earlier_commits_alone(pool: SqlitePool) {
    process_batch::<User>(
        &pool,
        vec![user_record(json!({ "id": 1, "first_name": "Ada", "email": "ada@example.com" }))],
    )
    .await
    .unwrap();

    let result = process_batch::<User>(
        &pool,
        vec![
            user_record(json!({ "id": 1, "first_name": "Changed" })),
            user_record(json!({ "id": 2, "email": "ada@example.com" })),
        ],
    )
    .await;
    assert!(result.is_err());

    let user: User = find_by_id(&pool, 1).await.unwrap().unwrap();
    assert_eq!(user.first_name.as_deref(), Some("Ada"), "update must be rolled back");
    assert_eq!(count(&pool, "users").await, 1);
}

#[sqlx::test]
async fn test_bad_timestamp_rolls_back_whole_batch(pool: SqlitePool) {
    let items = vec![
        track_record(json!({ "id": 1, "name": "ok" })),
        track_record(json!({ "id": 2, "name": "bad", "created_at": "16/03/2023" })),
    ];

    let result = process_batch::<Track>(&pool, items).await;

    match result {
        Err(BatchError::Parse(e)) => assert_eq!(e.input, "16/03/2023"),
        other => panic!("expected parse error, got {other:?}"),
    }
    assert_eq!(count(&pool, "tracks").await, 0);
}

#[sqlx::test]
async fn test_missing_timestamps_default_to_ingestion_time(pool: SqlitePool) {
    let before = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(1);

    process_batch::<Track>(&pool, vec![track_record(json!({ "id": 9 }))])
        .await
        .unwrap();

    let track: Track = find_by_id(&pool, 9).await.unwrap().unwrap();
    assert!(track.created_at >= before);
    assert!(track.updated_at >= before);
}

#[sqlx::test]
async fn test_unavailable_store_reports_storage_error(pool: SqlitePool) {
    pool.close().await;

    let err = process_batch::<User>(&pool, vec![user_record(json!({ "id": 1 }))])
        .await
        .expect_err("closed pool must not commit");

    assert!(matches!(err, BatchError::Storage(sqlx::Error::PoolClosed)));
}
