//! All-or-nothing batch upserts.

use crate::data::timestamps::{DateParseError, RawTimestamps};
use crate::data::upsert::{Entity, UpsertOutcome, upsert};
use crate::utils::{fmt_duration, log_if_slow};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::fmt::Debug;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const SLOW_BATCH_THRESHOLD: Duration = Duration::from_secs(5);

/// An upstream record: the entity's partial fields plus its raw timestamps.
#[derive(Debug, Clone, Deserialize)]
pub struct Record<P> {
    #[serde(flatten)]
    pub patch: P,
    #[serde(flatten)]
    pub timestamps: RawTimestamps,
}

/// Why a batch was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("storage error")]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Parse(#[from] DateParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Future returned by the work passed to [`in_transaction`].
pub(crate) type BatchFuture<'c, R> =
    Pin<Box<dyn Future<Output = Result<R, BatchError>> + Send + 'c>>;

/// Run `work` inside one transaction: commit when it succeeds, roll back
/// everything it wrote when it fails.
///
/// Logs the outcome under `entity`, and warns when the batch is slow.
pub(crate) async fn in_transaction<R, F>(
    pool: &SqlitePool,
    entity: &str,
    total: usize,
    work: F,
) -> Result<R, BatchError>
where
    R: Debug,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BatchFuture<'c, R>,
{
    let start = Instant::now();

    let mut tx = pool.begin().await.inspect_err(|e| {
        error!(entity, error = ?e, "Failed to open transaction");
    })?;

    let result = work(&mut *tx).await;

    let result = match result {
        Ok(report) => tx.commit().await.map(|()| report).map_err(BatchError::from),
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(entity, error = ?rollback_err, "Rollback failed");
            }
            Err(e)
        }
    };

    match &result {
        Ok(report) => info!(
            entity,
            count = total,
            report = ?report,
            duration = fmt_duration(start.elapsed()),
            "{total} {entity} records processed successfully"
        ),
        Err(e) => error!(
            entity,
            count = total,
            error = ?e,
            "Batch rolled back while processing {entity}"
        ),
    }
    log_if_slow(start, SLOW_BATCH_THRESHOLD, entity);

    result
}

/// Upsert every record inside a single transaction.
///
/// Either every record is persisted or none is: a storage error or an
/// unparseable timestamp on any item rolls back the whole batch.
pub async fn process_batch<E: Entity>(
    pool: &SqlitePool,
    items: Vec<Record<E::Patch>>,
) -> Result<BatchReport, BatchError> {
    let total = items.len();
    in_transaction(pool, E::NAME, total, |conn| {
        Box::pin(apply_items::<E>(conn, items))
    })
    .await
}

async fn apply_items<E: Entity>(
    conn: &mut SqliteConnection,
    items: Vec<Record<E::Patch>>,
) -> Result<BatchReport, BatchError> {
    let mut report = BatchReport::default();

    for item in items {
        let stamps = item.timestamps.normalize()?;
        match upsert::<E>(&mut *conn, item.patch, stamps).await? {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }
    }

    Ok(report)
}
