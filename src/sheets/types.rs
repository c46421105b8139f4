//! Reconciliation types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum rows per append batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default pause between append batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(100);

/// How a batch of fetched records is applied to a sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStrategy {
    /// Append every record. No deduplication.
    AppendOnly,
    /// Overwrite rows whose key already exists, append the rest.
    #[default]
    MergeByKey,
    /// Like `MergeByKey`, but only rewrite rows whose content changed.
    SelectiveRefresh,
    /// Replace every data row (point-in-time snapshots).
    FullOverwrite,
}

impl std::fmt::Display for ReconciliationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppendOnly => write!(f, "append"),
            Self::MergeByKey => write!(f, "merge"),
            Self::SelectiveRefresh => write!(f, "selective"),
            Self::FullOverwrite => write!(f, "overwrite"),
        }
    }
}

impl std::str::FromStr for ReconciliationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" | "append_only" => Ok(Self::AppendOnly),
            "merge" | "merge_by_key" => Ok(Self::MergeByKey),
            "selective" | "selective_refresh" => Ok(Self::SelectiveRefresh),
            "overwrite" | "full_overwrite" => Ok(Self::FullOverwrite),
            _ => Err(format!("Unknown reconciliation strategy: {s}")),
        }
    }
}

/// Per-call options shared by all strategies.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Header row used when the sheet has to be created (or is overwritten).
    /// Falls back to the default-headers table.
    pub headers: Option<Vec<String>>,
    /// Zero-based index of the primary key cell (merge and selective only).
    pub key_column: usize,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            headers: None,
            key_column: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
        }
    }
}

impl ReconcileOptions {
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_key_column(mut self, key_column: usize) -> Self {
        self.key_column = key_column;
        self
    }

    #[must_use]
    pub fn with_batching(mut self, batch_size: usize, batch_pause: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_pause = batch_pause;
        self
    }
}

/// Outcome status of one reconciliation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    Success,
    Skipped,
    Error,
}

/// Result of applying a batch of records to a sheet.
///
/// Counters that do not apply to the strategy stay at zero.
/// `total_rows_in_sheet` counts data rows only (the header row is excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub status: UpdateStatus,
    pub sheet_name: String,
    pub strategy: ReconciliationStrategy,
    pub records_processed: usize,
    pub records_updated: usize,
    pub records_changed: usize,
    pub records_unchanged: usize,
    pub records_appended: usize,
    pub records_written: usize,
    pub total_rows_in_sheet: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateResult {
    pub(crate) fn new(
        status: UpdateStatus,
        sheet_name: &str,
        strategy: ReconciliationStrategy,
    ) -> Self {
        Self {
            status,
            sheet_name: sheet_name.to_string(),
            strategy,
            records_processed: 0,
            records_updated: 0,
            records_changed: 0,
            records_unchanged: 0,
            records_appended: 0,
            records_written: 0,
            total_rows_in_sheet: 0,
            error: None,
        }
    }

    pub(crate) fn failed(
        sheet_name: &str,
        strategy: ReconciliationStrategy,
        message: String,
    ) -> Self {
        let mut result = Self::new(UpdateStatus::Error, sheet_name, strategy);
        result.error = Some(message);
        result
    }

    /// True unless the call ended in `Error`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status != UpdateStatus::Error
    }

    /// Rows written to the sheet by this call.
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.records_updated + self.records_changed + self.records_appended + self.records_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_aliases() {
        assert_eq!(
            "merge".parse::<ReconciliationStrategy>().unwrap(),
            ReconciliationStrategy::MergeByKey
        );
        assert_eq!(
            "Selective_Refresh".parse::<ReconciliationStrategy>().unwrap(),
            ReconciliationStrategy::SelectiveRefresh
        );
        assert!("upsert".parse::<ReconciliationStrategy>().is_err());
    }

    #[test]
    fn test_batching_never_zero() {
        let options = ReconcileOptions::default().with_batching(0, Duration::ZERO);
        assert_eq!(options.batch_size, 1);
    }
}
