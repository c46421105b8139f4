//! Host service interfaces.
//!
//! The audit core never talks to a concrete database, spreadsheet or trigger
//! registry. It goes through these traits, which [`crate::storage::SqliteStorage`]
//! implements for the CLI and which tests replace with small fakes.
//!
//! All methods take `&self`: host services are process-wide shared state,
//! so implementations use interior mutability where they need it.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single sheet cell. Cells hold plain JSON scalars (string, number, bool, null).
pub type Cell = serde_json::Value;

/// A row of cells, ordered by the sheet's header schema.
pub type Row = Vec<Cell>;

/// User-scoped key/value store. Values are JSON-serialized strings.
pub trait KeyValueStore {
    /// Read a value, `None` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// List every key currently stored.
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Tabular store holding managed sheets.
///
/// Row numbers are 1-based and row 1 is the header row. Column numbers are
/// 1-based as well.
pub trait SheetStore {
    /// Whether a sheet with this name exists.
    fn sheet_exists(&self, name: &str) -> Result<bool>;

    /// Create the sheet with `headers` as row 1 if it does not exist.
    ///
    /// Returns `true` when the sheet was created by this call.
    fn get_or_create_sheet(&self, name: &str, headers: &[String]) -> Result<bool>;

    /// Write a block of values with its top-left corner at (`row`, `col`).
    fn write_range(&self, name: &str, row: usize, col: usize, values: &[Row]) -> Result<()>;

    /// Read the full sheet, header row included.
    fn read_range(&self, name: &str) -> Result<Vec<Row>>;

    /// Last populated row number, `0` for an empty sheet.
    fn get_last_row(&self, name: &str) -> Result<usize>;

    /// Remove every row below the header.
    fn clear_data_rows(&self, name: &str) -> Result<()>;

    /// Names of all sheets, sorted.
    fn list_sheets(&self) -> Result<Vec<String>>;
}

/// A persisted deferred callback ("time-based trigger").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledCallback {
    pub id: String,
    pub function_name: String,
    pub due_at: DateTime<Utc>,
}

/// Registry of deferred re-invocations.
pub trait Scheduler {
    /// Register `function_name` to run after `delay`. Returns the callback id.
    fn schedule_callback(&self, function_name: &str, delay: Duration) -> Result<String>;

    /// Every pending callback, soonest first.
    fn list_scheduled_callbacks(&self) -> Result<Vec<ScheduledCallback>>;

    /// Cancel a callback. Cancelling an unknown id is not an error.
    fn cancel_scheduled_callback(&self, id: &str) -> Result<()>;

    /// Remove and return every callback due at or before `now`.
    fn take_due_callbacks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledCallback>>;
}
