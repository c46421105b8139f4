//! Resource fetching.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::host::{Cell, Row};

/// One record fetched from a platform API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    /// Primary key. Becomes the first cell of the sheet row.
    #[serde(default)]
    pub key: Option<String>,
    /// Remaining cells, in header order.
    #[serde(default)]
    pub cells: Row,
    /// Platform-reported modification time, used by incremental filtering.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FetchedRecord {
    /// Sheet row for this record: the key (if any) followed by the cells.
    #[must_use]
    pub fn into_row(self) -> Row {
        match self.key {
            Some(key) => std::iter::once(Cell::String(key)).chain(self.cells).collect(),
            None => self.cells,
        }
    }
}

/// Source of records for a (service, resource type).
pub trait ResourceFetcher {
    /// Fetch every current record of a resource type.
    fn fetch_resource(&self, service: &str, resource_type: &str) -> Result<Vec<FetchedRecord>>;
}

/// Reads records exported by platform clients as JSON lines.
///
/// Records for `GA4` / `Properties` live in `<root>/GA4/Properties.jsonl`.
/// A lowercase file name is accepted as well.
#[derive(Debug, Clone)]
pub struct JsonlFetcher {
    root: PathBuf,
}

impl JsonlFetcher {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, service: &str, resource_type: &str) -> Option<PathBuf> {
        let exact = self.root.join(service).join(format!("{resource_type}.jsonl"));
        let lower = self
            .root
            .join(service.to_lowercase())
            .join(format!("{}.jsonl", resource_type.to_lowercase()));
        [exact, lower].into_iter().find(|p| p.is_file())
    }
}

impl ResourceFetcher for JsonlFetcher {
    fn fetch_resource(&self, service: &str, resource_type: &str) -> Result<Vec<FetchedRecord>> {
        let path = self.resolve(service, resource_type).ok_or_else(|| {
            Error::Sync(format!(
                "No export for {service}/{resource_type} under {}",
                self.root.display()
            ))
        })?;
        let content = fs::read_to_string(&path)?;

        let mut records = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: FetchedRecord = serde_json::from_str(line).map_err(|e| {
                Error::Sync(format!("{}:{}: invalid record: {e}", path.display(), index + 1))
            })?;
            records.push(record);
        }

        debug!(
            category = "audit",
            service,
            resource_type,
            path = %path.display(),
            records = records.len(),
            "Read exported records"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_into_row_prepends_key() {
        let record = FetchedRecord {
            key: Some("123".into()),
            cells: vec![json!("Main site")],
            last_modified: None,
        };
        assert_eq!(record.into_row(), vec![json!("123"), json!("Main site")]);
    }

    #[test]
    fn test_reads_jsonl_export() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("ga4");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("properties.jsonl"),
            concat!(
                r#"{"key": "1", "cells": ["Main"], "last_modified": "2026-01-02T00:00:00Z"}"#,
                "\n\n",
                r#"{"key": "2", "cells": ["Blog"]}"#,
                "\n"
            ),
        )
        .unwrap();

        let fetcher = JsonlFetcher::new(temp_dir.path());
        let records = fetcher.fetch_resource("GA4", "Properties").unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].last_modified.is_some());
        assert!(records[1].last_modified.is_none());
    }

    #[test]
    fn test_missing_and_malformed_exports() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = JsonlFetcher::new(temp_dir.path());
        assert!(matches!(fetcher.fetch_resource("GTM", "Tags"), Err(Error::Sync(_))));

        let dir = temp_dir.path().join("GTM");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Tags.jsonl"), "{not json}\n").unwrap();
        let err = fetcher.fetch_resource("GTM", "Tags").unwrap_err();
        assert!(err.to_string().contains("Tags.jsonl:1"));
    }
}
