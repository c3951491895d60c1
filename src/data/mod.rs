//! Database models, schema access and reconciliation logic.

pub mod batch;
pub mod health;
pub mod listen_history;
pub mod models;
pub mod timestamps;
pub mod upsert;

pub use batch::{BatchError, BatchReport, Record, process_batch};
pub use listen_history::{ListenHistoryRecord, ReconcileReport, process_listen_history};
pub use models::{Track, User};
pub use upsert::{Entity, UpsertOutcome, find_by_id, upsert};

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
