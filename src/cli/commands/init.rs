//! Create the audit workbook.
//!
//! The workbook is a single SQLite file holding the key/value store (sync
//! state, job handles), the managed sheets and the deferred-check registry.
//! It lives at `~/.stackaudit/data/stackaudit.db` unless `--db`,
//! `SA_TEST_DB` or `STACKAUDIT_DB` say otherwise.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    recreated: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the workbook exists and `force` is not
/// set, or an error if the file cannot be created.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path()))
        .ok_or_else(|| Error::Config("Could not determine the workbook location".to_string()))?;

    let existed = db_path.exists();
    if existed && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if existed {
        fs::remove_file(&db_path)?;
    }

    // Opening applies the schema
    SqliteStorage::open(&db_path)?;

    if json {
        let output = InitOutput {
            database: db_path,
            recreated: existed,
        };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized audit workbook");
        println!("  Database: {}", db_path.display());
        println!();
        println!("Next: export records and run 'sa audit run <service> --resources ... --source <dir>'.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::KeyValueStore;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_workbook() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("nested").join("audit.db");

        execute(Some(&db), false, true).unwrap();
        assert!(db.exists());

        let storage = SqliteStorage::open(&db).unwrap();
        assert!(storage.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_init_twice_requires_force() {
        let temp_dir = TempDir::new().unwrap();
        let db = temp_dir.path().join("audit.db");

        execute(Some(&db), false, true).unwrap();
        let storage = SqliteStorage::open(&db).unwrap();
        storage.set("SYNC_STATE_GA4_PROPERTIES", "{}").unwrap();
        drop(storage);

        assert!(matches!(
            execute(Some(&db), false, true),
            Err(Error::AlreadyInitialized { .. })
        ));

        execute(Some(&db), true, true).unwrap();
        let storage = SqliteStorage::open(&db).unwrap();
        assert!(storage.list_keys().unwrap().is_empty());
    }
}
