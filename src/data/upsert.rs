//! Update-or-insert keyed by the upstream primary id.
//!
//! Each upserted table implements [`Entity`], which spells out how a partial
//! upstream record (its `Patch`) is merged into an existing row field by field.
//! Nothing here commits; the caller owns the transaction.

use crate::data::timestamps::Timestamps;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::{SqliteConnection, SqlitePool};

/// A table whose rows are keyed by an externally assigned id and upserted
/// from partial records.
#[async_trait]
pub trait Entity: Sized + Send + Sync + 'static {
    /// Partial record as delivered upstream. Absent fields stay untouched on update.
    type Patch: DeserializeOwned + Send;

    /// Human-readable entity name used in logs.
    const NAME: &'static str;
    /// API endpoint the records are fetched from.
    const ENDPOINT: &'static str;

    fn patch_id(patch: &Self::Patch) -> i64;

    /// Build a brand-new row from exactly the supplied fields.
    fn create(patch: Self::Patch, stamps: Timestamps) -> Self;

    /// Overwrite every field present in `patch` (and every supplied timestamp).
    fn merge(&mut self, patch: Self::Patch, stamps: Timestamps);

    async fn find(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>, sqlx::Error>;

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;

    async fn update(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Merge `patch` into the row with the same id, or stage a new row.
///
/// Constraint violations (e.g. a duplicate email) surface as `sqlx::Error`.
pub async fn upsert<E: Entity>(
    conn: &mut SqliteConnection,
    patch: E::Patch,
    stamps: Timestamps,
) -> Result<UpsertOutcome, sqlx::Error> {
    let id = E::patch_id(&patch);

    match E::find(&mut *conn, id).await? {
        Some(mut existing) => {
            existing.merge(patch, stamps);
            existing.update(&mut *conn).await?;
            Ok(UpsertOutcome::Updated)
        }
        None => {
            let row = E::create(patch, stamps);
            row.insert(&mut *conn).await?;
            Ok(UpsertOutcome::Inserted)
        }
    }
}

/// Look up a single row outside of any batch.
pub async fn find_by_id<E: Entity>(pool: &SqlitePool, id: i64) -> Result<Option<E>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    E::find(&mut *conn, id).await
}

/// Assign `value` to `slot` only when the field was present upstream.
pub(crate) fn assign<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
