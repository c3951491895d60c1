//! Reconciliation of listen-history events into `listen_history` and its
//! `listen_history_tracks` join table.
//!
//! Every valid upstream item becomes a new history row. An item whose user is
//! unknown is skipped entirely; unknown track ids are dropped from the item's
//! track set while the row itself is still written.

use crate::data::batch::{BatchError, in_transaction};
use crate::data::timestamps::RawTimestamps;
use chrono::NaiveDateTime;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ListenHistoryRecord {
    pub user_id: i64,
    /// Track ids listened to.
    pub items: Vec<i64>,
    #[serde(flatten)]
    pub timestamps: RawTimestamps,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ListenHistory {
    pub id: i64,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// History rows written.
    pub created: usize,
    /// User ids of items skipped because the user does not exist.
    pub missing_users: Vec<i64>,
    /// Track ids dropped from otherwise valid items.
    pub missing_tracks: Vec<i64>,
}

/// Per-item result: either a row was written, or the item was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemOutcome {
    Created { dropped_tracks: Vec<i64> },
    MissingUser(i64),
}

/// A reference from a history item to an externally keyed row.
#[derive(Debug, Clone, Copy)]
enum Reference {
    User,
    Track,
}

impl Reference {
    fn lookup_query(self) -> &'static str {
        match self {
            Reference::User => "SELECT id FROM users WHERE id = ?",
            Reference::Track => "SELECT id FROM tracks WHERE id = ?",
        }
    }
}

/// Write one history row per valid item inside a single transaction.
///
/// Missing references never abort the batch; storage and timestamp errors roll
/// back every row written so far.
pub async fn process_listen_history(
    pool: &SqlitePool,
    items: Vec<ListenHistoryRecord>,
) -> Result<ReconcileReport, BatchError> {
    let total = items.len();
    in_transaction(pool, "ListenHistory", total, |conn| {
        Box::pin(reconcile_items(conn, items))
    })
    .await
}

async fn reconcile_items(
    conn: &mut SqliteConnection,
    items: Vec<ListenHistoryRecord>,
) -> Result<ReconcileReport, BatchError> {
    let mut report = ReconcileReport::default();

    for item in items {
        match reconcile_item(&mut *conn, item).await? {
            ItemOutcome::Created { dropped_tracks } => {
                report.created += 1;
                report.missing_tracks.extend(dropped_tracks);
            }
            ItemOutcome::MissingUser(user_id) => report.missing_users.push(user_id),
        }
    }

    Ok(report)
}

async fn reconcile_item(
    conn: &mut SqliteConnection,
    item: ListenHistoryRecord,
) -> Result<ItemOutcome, BatchError> {
    if !resolves(&mut *conn, Reference::User, item.user_id).await? {
        warn!(
            user_id = item.user_id,
            "User with id {} not found. Skipping this listen history.", item.user_id
        );
        return Ok(ItemOutcome::MissingUser(item.user_id));
    }

    let (created_at, updated_at) = item.timestamps.normalize()?.or_now();

    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    let mut dropped_tracks = Vec::new();
    for track_id in item.items.into_iter().filter(|id| seen.insert(*id)) {
        if resolves(&mut *conn, Reference::Track, track_id).await? {
            resolved.push(track_id);
        } else {
            warn!(track_id, "Track with id {track_id} not found.");
            dropped_tracks.push(track_id);
        }
    }

    let history_id = sqlx::query(
        "INSERT INTO listen_history (user_id, created_at, updated_at) VALUES (?, ?, ?)",
    )
    .bind(item.user_id)
    .bind(created_at)
    .bind(updated_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    debug!(
        history_id,
        user_id = item.user_id,
        tracks = resolved.len(),
        "Listen history created"
    );

    for track_id in resolved {
        sqlx::query(
            "INSERT INTO listen_history_tracks (listen_history_id, track_id) VALUES (?, ?)",
        )
        .bind(history_id)
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    }

    Ok(ItemOutcome::Created { dropped_tracks })
}

async fn resolves(
    conn: &mut SqliteConnection,
    reference: Reference,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(reference.lookup_query())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// History rows recorded for a user, oldest first.
pub async fn histories_for_user(
    pool: &SqlitePool,
    user_id: i64,
) -> Result<Vec<ListenHistory>, sqlx::Error> {
    sqlx::query_as::<_, ListenHistory>(
        r#"
        SELECT id, user_id, created_at, updated_at
        FROM listen_history
        WHERE user_id = ?
        ORDER BY id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Track ids attached to a history row, in ascending order.
pub async fn tracks_for_history(
    pool: &SqlitePool,
    history_id: i64,
) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT track_id FROM listen_history_tracks WHERE listen_history_id = ? ORDER BY track_id",
    )
    .bind(history_id)
    .fetch_all(pool)
    .await
}
