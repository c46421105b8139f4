//! SQLite storage implementation.
//!
//! `SqliteStorage` is the local workbook: one database file that implements
//! every host service the audit core needs ([`KeyValueStore`], [`SheetStore`]
//! and [`Scheduler`]).

use crate::error::{Error, Result};
use crate::host::{KeyValueStore, Row, ScheduledCallback, Scheduler, SheetStore};
use crate::storage::schema::apply_schema;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn require_sheet(&self, name: &str) -> Result<()> {
        if self.sheet_exists(name)? {
            Ok(())
        } else {
            Err(Error::SheetNotFound {
                name: name.to_string(),
            })
        }
    }

    fn read_row(&self, name: &str, row_num: usize) -> Result<Option<Row>> {
        let cells: Option<String> = self
            .conn
            .query_row(
                "SELECT cells FROM sheet_rows WHERE sheet_name = ?1 AND row_num = ?2",
                rusqlite::params![name, to_sql_int(row_num)],
                |row| row.get(0),
            )
            .optional()?;
        cells.map(|c| serde_json::from_str(&c).map_err(Error::from)).transpose()
    }
}

fn to_sql_int(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// ==================
// Key/Value Store
// ==================

impl KeyValueStore for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            rusqlite::params![key, value, now],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

// ==================
// Managed Sheets
// ==================

impl SheetStore for SqliteStorage {
    fn sheet_exists(&self, name: &str) -> Result<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM sheets WHERE name = ?1", [name], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(exists.is_some())
    }

    fn get_or_create_sheet(&self, name: &str, headers: &[String]) -> Result<bool> {
        if self.sheet_exists(name)? {
            return Ok(false);
        }

        let now = Utc::now().timestamp_millis();
        let header_cells = serde_json::to_string(headers)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO sheets (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            rusqlite::params![name, now],
        )?;
        tx.execute(
            "INSERT INTO sheet_rows (sheet_name, row_num, cells) VALUES (?1, 1, ?2)",
            rusqlite::params![name, header_cells],
        )?;
        tx.commit()?;

        tracing::debug!(sheet = name, columns = headers.len(), "Created sheet");
        Ok(true)
    }

    fn write_range(&self, name: &str, row: usize, col: usize, values: &[Row]) -> Result<()> {
        if row == 0 || col == 0 {
            return Err(Error::InvalidArgument(format!(
                "Sheet coordinates are 1-based, got row {row} col {col}"
            )));
        }
        self.require_sheet(name)?;

        let now = Utc::now().timestamp_millis();
        let tx = self.conn.unchecked_transaction()?;
        for (offset, incoming) in values.iter().enumerate() {
            let row_num = row + offset;
            let mut cells = self.read_row(name, row_num)?.unwrap_or_default();

            let start = col - 1;
            let end = start + incoming.len();
            if cells.len() < end {
                cells.resize(end, serde_json::Value::Null);
            }
            cells[start..end].clone_from_slice(incoming);

            tx.execute(
                "INSERT INTO sheet_rows (sheet_name, row_num, cells)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(sheet_name, row_num) DO UPDATE SET cells = excluded.cells",
                rusqlite::params![name, to_sql_int(row_num), serde_json::to_string(&cells)?],
            )?;
        }
        tx.execute(
            "UPDATE sheets SET updated_at = ?2 WHERE name = ?1",
            rusqlite::params![name, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn read_range(&self, name: &str) -> Result<Vec<Row>> {
        self.require_sheet(name)?;

        let mut stmt = self.conn.prepare(
            "SELECT row_num, cells FROM sheet_rows WHERE sheet_name = ?1 ORDER BY row_num",
        )?;
        let stored = stmt
            .query_map([name], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Gaps between stored rows read back as empty rows
        let mut rows: Vec<Row> = Vec::with_capacity(stored.len());
        for (row_num, cells) in stored {
            let index = usize::try_from(row_num.max(1) - 1).unwrap_or(0);
            while rows.len() < index {
                rows.push(Vec::new());
            }
            rows.push(serde_json::from_str(&cells)?);
        }
        Ok(rows)
    }

    fn get_last_row(&self, name: &str) -> Result<usize> {
        let last: Option<i64> = self.conn.query_row(
            "SELECT MAX(row_num) FROM sheet_rows WHERE sheet_name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(last.and_then(|n| usize::try_from(n).ok()).unwrap_or(0))
    }

    fn clear_data_rows(&self, name: &str) -> Result<()> {
        self.require_sheet(name)?;
        self.conn.execute(
            "DELETE FROM sheet_rows WHERE sheet_name = ?1 AND row_num > 1",
            [name],
        )?;
        Ok(())
    }

    fn list_sheets(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM sheets ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

// ==================
// Deferred Callbacks
// ==================

impl Scheduler for SqliteStorage {
    fn schedule_callback(&self, function_name: &str, delay: Duration) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let due_at = now.saturating_add(delay_ms);

        self.conn.execute(
            "INSERT INTO scheduled_callbacks (id, function_name, due_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, function_name, due_at, now],
        )?;
        Ok(id)
    }

    fn list_scheduled_callbacks(&self) -> Result<Vec<ScheduledCallback>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, function_name, due_at FROM scheduled_callbacks ORDER BY due_at, created_at",
        )?;
        let callbacks = stmt
            .query_map([], |row| {
                Ok(ScheduledCallback {
                    id: row.get(0)?,
                    function_name: row.get(1)?,
                    due_at: millis_to_utc(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(callbacks)
    }

    fn cancel_scheduled_callback(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM scheduled_callbacks WHERE id = ?1", [id])?;
        Ok(())
    }

    fn take_due_callbacks(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledCallback>> {
        let now_ms = now.timestamp_millis();
        let tx = self.conn.unchecked_transaction()?;
        let due = {
            let mut stmt = tx.prepare(
                "SELECT id, function_name, due_at FROM scheduled_callbacks
                 WHERE due_at <= ?1 ORDER BY due_at, created_at",
            )?;
            stmt.query_map([now_ms], |row| {
                Ok(ScheduledCallback {
                    id: row.get(0)?,
                    function_name: row.get(1)?,
                    due_at: millis_to_utc(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
        };
        tx.execute("DELETE FROM scheduled_callbacks WHERE due_at <= ?1", [now_ms])?;
        tx.commit()?;
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_kv_crud() {
        let storage = SqliteStorage::open_memory().unwrap();

        assert_eq!(storage.get("missing").unwrap(), None);

        storage.set("A_KEY", "1").unwrap();
        storage.set("A_KEY", "2").unwrap();
        storage.set("B_KEY", "3").unwrap();
        assert_eq!(storage.get("A_KEY").unwrap().as_deref(), Some("2"));
        assert_eq!(storage.list_keys().unwrap(), vec!["A_KEY", "B_KEY"]);

        storage.delete("A_KEY").unwrap();
        storage.delete("A_KEY").unwrap();
        assert_eq!(storage.get("A_KEY").unwrap(), None);
    }

    #[test]
    fn test_sheet_creation_writes_header_row() {
        let storage = SqliteStorage::open_memory().unwrap();

        assert!(storage.get_or_create_sheet("Alerts", &headers(&["a", "b"])).unwrap());
        assert!(!storage.get_or_create_sheet("Alerts", &headers(&["x"])).unwrap());

        let rows = storage.read_range("Alerts").unwrap();
        assert_eq!(rows, vec![vec![json!("a"), json!("b")]]);
        assert_eq!(storage.get_last_row("Alerts").unwrap(), 1);
    }

    #[test]
    fn test_write_range_overlays_columns() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.get_or_create_sheet("S", &headers(&["k", "v", "w"])).unwrap();

        storage
            .write_range("S", 2, 1, &[vec![json!("a"), json!(1), json!(true)]])
            .unwrap();
        storage.write_range("S", 2, 2, &[vec![json!(5)]]).unwrap();

        let rows = storage.read_range("S").unwrap();
        assert_eq!(rows[1], vec![json!("a"), json!(5), json!(true)]);
    }

    #[test]
    fn test_read_range_fills_gaps() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.get_or_create_sheet("S", &headers(&["k"])).unwrap();
        storage.write_range("S", 4, 1, &[vec![json!("late")]]).unwrap();

        let rows = storage.read_range("S").unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[1].is_empty());
        assert!(rows[2].is_empty());
        assert_eq!(storage.get_last_row("S").unwrap(), 4);
    }

    #[test]
    fn test_write_to_missing_sheet_fails() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = storage.write_range("Nope", 2, 1, &[vec![json!(1)]]).unwrap_err();
        assert!(matches!(err, Error::SheetNotFound { .. }));
    }

    #[test]
    fn test_clear_data_rows_keeps_header() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.get_or_create_sheet("S", &headers(&["k"])).unwrap();
        storage
            .write_range("S", 2, 1, &[vec![json!(1)], vec![json!(2)]])
            .unwrap();

        storage.clear_data_rows("S").unwrap();
        assert_eq!(storage.get_last_row("S").unwrap(), 1);
    }

    #[test]
    fn test_scheduler_take_due() {
        let storage = SqliteStorage::open_memory().unwrap();
        let soon = storage
            .schedule_callback("heartbeat.check_status", Duration::ZERO)
            .unwrap();
        storage
            .schedule_callback("heartbeat.check_status", Duration::from_secs(3600))
            .unwrap();
        assert_eq!(storage.list_scheduled_callbacks().unwrap().len(), 2);

        let due = storage.take_due_callbacks(Utc::now()).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, soon);
        assert_eq!(storage.list_scheduled_callbacks().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_unknown_callback_is_ok() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.cancel_scheduled_callback("nope").unwrap();
    }
}
