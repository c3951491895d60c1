//! Daily reconciliation of users, tracks and listen history from a remote
//! music API into a SQLite store.

pub mod api;
pub mod app;
pub mod config;
pub mod data;
pub mod logging;
pub mod sync;
pub mod utils;
