// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Paydesk worker.
//!
//! WAL-mode SQLite with embedded migrations and a single-writer connection
//! via `tokio-rusqlite`, typed queries per table, a broadcast change feed, and
//! a filesystem object store for receipt artifacts.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod objects;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
pub use objects::FsObjectStore;
