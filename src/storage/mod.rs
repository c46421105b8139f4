//! SQLite storage layer for the audit workbook.
//!
//! This module provides the local persistence used by the CLI:
//! - Key/value store for sync state and job handles
//! - Managed sheets (header row + data rows)
//! - Deferred callback registry for job polling
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStorage;
