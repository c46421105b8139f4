//! Database schema definitions.
//!
//! The workbook database backs three host services: the key/value store,
//! the managed sheets and the deferred-callback registry.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the workbook database.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Key/Value Store
-- ====================

-- Sync state, sync history and job handles (JSON-serialized strings)
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

-- ====================
-- Managed Sheets
-- ====================

CREATE TABLE IF NOT EXISTS sheets (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- One row per sheet row; row_num 1 is the header row.
-- cells is a JSON array of cell values.
CREATE TABLE IF NOT EXISTS sheet_rows (
    sheet_name TEXT NOT NULL,
    row_num INTEGER NOT NULL,
    cells TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (sheet_name, row_num),
    FOREIGN KEY (sheet_name) REFERENCES sheets(name) ON DELETE CASCADE
);

-- ====================
-- Deferred Callbacks (time-based triggers)
-- ====================

CREATE TABLE IF NOT EXISTS scheduled_callbacks (
    id TEXT PRIMARY KEY,
    function_name TEXT NOT NULL,
    due_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scheduled_callbacks_due ON scheduled_callbacks(due_at);
CREATE INDEX IF NOT EXISTS idx_scheduled_callbacks_function ON scheduled_callbacks(function_name);
"#;

/// Apply the schema to a connection.
///
/// Safe to call on every open; all statements are `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA_SQL)?;

    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string(), now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
