//! The fetch, reconcile and persist cycle.
//!
//! A cycle syncs users, then tracks, then listen history. The order is fixed
//! because history items reference both. Every step fails soft: an empty or
//! failed fetch skips the step, a rolled-back batch is logged, and the cycle
//! moves on.

pub mod scheduler;

use crate::api::{ApiClient, LISTEN_HISTORY_ENDPOINT, json};
use crate::data::{
    BatchError, BatchReport, Entity, ListenHistoryRecord, ReconcileReport, Record, Track, User,
    process_batch, process_listen_history,
};
use crate::utils::fmt_duration;
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::{info, warn};

/// What happened to one entity type during a cycle.
#[derive(Debug)]
pub enum StepOutcome<R> {
    /// Nothing usable was fetched, so nothing was written.
    Skipped,
    Committed(R),
    RolledBack(BatchError),
}

impl<R> StepOutcome<R> {
    pub fn committed(&self) -> Option<&R> {
        match self {
            StepOutcome::Committed(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct StepReport<R> {
    pub fetched: usize,
    /// Records dropped because they could not be decoded.
    pub malformed: usize,
    pub outcome: StepOutcome<R>,
}

#[derive(Debug)]
pub struct CycleReport {
    pub users: StepReport<BatchReport>,
    pub tracks: StepReport<BatchReport>,
    pub listen_history: StepReport<ReconcileReport>,
}

/// Decode raw records, dropping (and logging) the ones that do not fit `T`.
pub fn decode_records<T: DeserializeOwned>(
    entity: &str,
    values: Vec<serde_json::Value>,
) -> (Vec<T>, usize) {
    let mut decoded = Vec::with_capacity(values.len());
    let mut malformed = 0;

    for (index, value) in values.into_iter().enumerate() {
        match json::from_value_with_path::<T>(value) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                malformed += 1;
                warn!(entity, index, error = %e, "Skipping malformed record");
            }
        }
    }

    (decoded, malformed)
}

/// Fetch and upsert one simple entity type.
pub async fn sync_entity<E: Entity>(pool: &SqlitePool, api: &ApiClient) -> StepReport<BatchReport> {
    let values = api.fetch(E::ENDPOINT).await;
    let fetched = values.len();
    let (records, malformed) = decode_records::<Record<E::Patch>>(E::NAME, values);

    let outcome = if records.is_empty() {
        info!(entity = E::NAME, endpoint = E::ENDPOINT, "No records to process");
        StepOutcome::Skipped
    } else {
        match process_batch::<E>(pool, records).await {
            Ok(report) => StepOutcome::Committed(report),
            Err(e) => StepOutcome::RolledBack(e),
        }
    };

    StepReport {
        fetched,
        malformed,
        outcome,
    }
}

/// Fetch and reconcile listen history. Must run after users and tracks.
pub async fn sync_listen_history(
    pool: &SqlitePool,
    api: &ApiClient,
) -> StepReport<ReconcileReport> {
    let values = api.fetch(LISTEN_HISTORY_ENDPOINT).await;
    let fetched = values.len();
    let (records, malformed) = decode_records::<ListenHistoryRecord>("ListenHistory", values);

    let outcome = if records.is_empty() {
        info!(
            entity = "ListenHistory",
            endpoint = LISTEN_HISTORY_ENDPOINT,
            "No records to process"
        );
        StepOutcome::Skipped
    } else {
        match process_listen_history(pool, records).await {
            Ok(report) => StepOutcome::Committed(report),
            Err(e) => StepOutcome::RolledBack(e),
        }
    };

    StepReport {
        fetched,
        malformed,
        outcome,
    }
}

/// Run one full reconciliation cycle.
pub async fn run_cycle(pool: &SqlitePool, api: &ApiClient) -> CycleReport {
    let start = Instant::now();
    info!("Beginning of daily task to collect data from API");

    let users = sync_entity::<User>(pool, api).await;
    let tracks = sync_entity::<Track>(pool, api).await;
    let listen_history = sync_listen_history(pool, api).await;

    info!(duration = fmt_duration(start.elapsed()), "End of task");

    CycleReport {
        users,
        tracks,
        listen_history,
    }
}
