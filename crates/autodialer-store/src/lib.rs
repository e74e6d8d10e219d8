//! # autodialer-store
//!
//! Best-effort SQLite mirror of the autodialer hub's in-memory state.
//!
//! The server never reads its working state back from here; the tables exist
//! so operators can inspect devices, lists and call history with ordinary
//! SQL tooling. The crate exposes a synchronous `Database` handle that wraps
//! a `rusqlite::Connection` and provides typed upsert/delete helpers for
//! every mirrored model.

pub mod call_lists;
pub mod database;
pub mod devices;
pub mod history;
pub mod migrations;
pub mod models;
pub mod sessions;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
