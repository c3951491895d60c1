//! Shared fixtures for integration tests.
#![allow(dead_code)]

use axum::Router;
use music_sync::data::Record;
use music_sync::data::ListenHistoryRecord;
use music_sync::data::models::{TrackPatch, UserPatch};
use serde_json::Value;
use sqlx::SqlitePool;

/// Decode a user record exactly as it would arrive from the API.
pub fn user_record(value: Value) -> Record<UserPatch> {
    serde_json::from_value(value).expect("valid user record")
}

pub fn track_record(value: Value) -> Record<TrackPatch> {
    serde_json::from_value(value).expect("valid track record")
}

pub fn history_record(value: Value) -> ListenHistoryRecord {
    serde_json::from_value(value).expect("valid listen history record")
}

/// Row count of a table.
pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count query failed")
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });
    format!("http://{addr}")
}
