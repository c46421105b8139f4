//! Configuration management.
//!
//! This module resolves the Stack Audit home directory and workbook path,
//! and loads the audit settings file.
//!
//! # Layout
//!
//! - **Workbook**: `~/.stackaudit/data/stackaudit.db` (SQLite)
//! - **Settings**: `~/.stackaudit/config.json`
//! - **Test workbook**: `~/.stackaudit/test/stackaudit.db` when `SA_TEST_DB` is set

mod settings;

pub use settings::{
    AuditConfig, AuditRule, BigQuerySettings, Thresholds, config_path, load_config,
    load_config_from, resolve_access_token, resolve_bigquery_project, resolve_config,
    resolve_ga4_dataset, resolve_incremental_enabled, save_config, save_config_to,
};

use std::path::{Path, PathBuf};

/// File name of the workbook database.
pub const DB_FILE_NAME: &str = "stackaudit.db";

/// Get the global Stack Audit directory location (`~/.stackaudit/`).
#[must_use]
pub fn global_stackaudit_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".stackaudit"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `SA_TEST_DB=1` (or any non-empty value).
/// This redirects all workbook operations to an isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("SA_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

/// Interpret an environment flag value.
///
/// Empty, `0` and `false` (any case) are falsy; everything else is truthy.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && value.to_lowercase() != "false"
}

/// Get the test database path.
///
/// Returns `~/.stackaudit/test/stackaudit.db` for isolated testing.
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_stackaudit_dir().map(|dir| dir.join("test").join(DB_FILE_NAME))
}

/// Resolve the workbook database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `SA_TEST_DB` environment variable → uses test database
/// 3. `STACKAUDIT_DB` environment variable
/// 4. Global location: `~/.stackaudit/data/stackaudit.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Test mode - use isolated test database
    if is_test_mode() {
        return test_db_path();
    }

    // Priority 3: STACKAUDIT_DB environment variable
    if let Ok(db_path) = std::env::var("STACKAUDIT_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    // Priority 4: Global workbook location
    global_stackaudit_dir().map(|dir| dir.join("data").join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/audit.db");
        let result = resolve_db_path(Some(&explicit));
        assert_eq!(result, Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_default_file_name() {
        let path = resolve_db_path(None).unwrap();
        assert!(path.ends_with(DB_FILE_NAME));
    }

    #[test]
    fn test_test_db_path_is_separate() {
        let global = global_stackaudit_dir().unwrap();
        let test = test_db_path().unwrap();

        assert!(test.to_string_lossy().contains("test"));
        assert_ne!(global.join("data").join(DB_FILE_NAME), test);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("FALSE"));
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("yes"));
    }
}
