//! Applying fetched records to managed sheets.
//!
//! A single [`Reconciler`] runs every [`ReconciliationStrategy`], so lazy sheet
//! creation and append batching live in one place. Every call is safe on a
//! missing or empty destination, and storage failures come back as an
//! `UpdateResult` with `Error` status instead of an `Err`.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::host::{Cell, Row, SheetStore};
use crate::sheets::headers::default_headers;
use crate::sheets::types::{ReconcileOptions, ReconciliationStrategy, UpdateResult, UpdateStatus};
use crate::sync::row_hash;

/// String form of a key cell, `None` when the cell is null or blank.
fn key_of(cell: Option<&Cell>) -> Option<String> {
    match cell? {
        Cell::Null => None,
        Cell::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        other => Some(other.to_string()),
    }
}

/// Applies record batches to sheets in a [`SheetStore`].
pub struct Reconciler<'a, S: SheetStore + ?Sized> {
    sheets: &'a S,
}

impl<'a, S: SheetStore + ?Sized> Reconciler<'a, S> {
    #[must_use]
    pub fn new(sheets: &'a S) -> Self {
        Self { sheets }
    }

    /// Apply `records` to `sheet_name` with the given strategy.
    pub fn apply(
        &self,
        strategy: ReconciliationStrategy,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> UpdateResult {
        let outcome = match strategy {
            ReconciliationStrategy::AppendOnly => self.append_only(sheet_name, records, options),
            ReconciliationStrategy::MergeByKey => {
                self.merge(sheet_name, records, options, false)
            }
            ReconciliationStrategy::SelectiveRefresh => {
                self.merge(sheet_name, records, options, true)
            }
            ReconciliationStrategy::FullOverwrite => {
                self.full_overwrite(sheet_name, records, options)
            }
        };

        match outcome {
            Ok(result) => {
                info!(
                    category = "sheets",
                    sheet = sheet_name,
                    strategy = %strategy,
                    processed = result.records_processed,
                    written = result.rows_written(),
                    total = result.total_rows_in_sheet,
                    "Reconciled sheet"
                );
                result
            }
            Err(e) => {
                error!(
                    category = "sheets",
                    sheet = sheet_name,
                    strategy = %strategy,
                    error = %e,
                    "Sheet reconciliation failed"
                );
                UpdateResult::failed(sheet_name, strategy, e.to_string())
            }
        }
    }

    /// Append every record after the current last row.
    pub fn append_new_records(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> UpdateResult {
        self.apply(ReconciliationStrategy::AppendOnly, sheet_name, records, options)
    }

    /// Overwrite rows by primary key, append unknown keys.
    pub fn merge_update_records(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> UpdateResult {
        self.apply(ReconciliationStrategy::MergeByKey, sheet_name, records, options)
    }

    /// Rewrite only rows whose content changed, append unknown keys.
    pub fn selective_refresh_records(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> UpdateResult {
        self.apply(ReconciliationStrategy::SelectiveRefresh, sheet_name, records, options)
    }

    /// Replace every data row with `records`.
    pub fn overwrite_records(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> UpdateResult {
        self.apply(ReconciliationStrategy::FullOverwrite, sheet_name, records, options)
    }

    fn resolve_headers(sheet_name: &str, options: &ReconcileOptions) -> Vec<String> {
        options
            .headers
            .clone()
            .or_else(|| default_headers(sheet_name))
            .unwrap_or_default()
    }

    fn ensure_sheet(&self, sheet_name: &str, options: &ReconcileOptions) -> Result<()> {
        let headers = Self::resolve_headers(sheet_name, options);
        if self.sheets.get_or_create_sheet(sheet_name, &headers)? {
            info!(category = "sheets", sheet = sheet_name, "Created sheet with header row");
        }
        Ok(())
    }

    fn data_rows(&self, sheet_name: &str) -> Result<usize> {
        Ok(self.sheets.get_last_row(sheet_name)?.saturating_sub(1))
    }

    /// Write `rows` starting at `start_row`, in batches.
    fn write_batches(&self, sheet_name: &str, start_row: usize, rows: &[Row], options: &ReconcileOptions) -> Result<()> {
        let batch_size = options.batch_size.max(1);
        for (index, batch) in rows.chunks(batch_size).enumerate() {
            if index > 0 && !options.batch_pause.is_zero() {
                std::thread::sleep(options.batch_pause);
            }
            let row = start_row + index * batch_size;
            debug!(category = "sheets", sheet = sheet_name, row, rows = batch.len(), "Writing batch");
            self.sheets.write_range(sheet_name, row, 1, batch)?;
        }
        Ok(())
    }

    fn next_free_row(&self, sheet_name: &str) -> Result<usize> {
        Ok(self.sheets.get_last_row(sheet_name)?.max(1) + 1)
    }

    fn append_only(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> Result<UpdateResult> {
        let strategy = ReconciliationStrategy::AppendOnly;
        if records.is_empty() {
            debug!(category = "sheets", sheet = sheet_name, "No records to append");
            return Ok(UpdateResult::new(UpdateStatus::Skipped, sheet_name, strategy));
        }

        self.ensure_sheet(sheet_name, options)?;
        let start = self.next_free_row(sheet_name)?;
        self.write_batches(sheet_name, start, records, options)?;

        let mut result = UpdateResult::new(UpdateStatus::Success, sheet_name, strategy);
        result.records_processed = records.len();
        result.records_appended = records.len();
        result.total_rows_in_sheet = self.data_rows(sheet_name)?;
        Ok(result)
    }

    fn merge(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
        compare_content: bool,
    ) -> Result<UpdateResult> {
        let strategy = if compare_content {
            ReconciliationStrategy::SelectiveRefresh
        } else {
            ReconciliationStrategy::MergeByKey
        };
        self.ensure_sheet(sheet_name, options)?;

        let existing = self.sheets.read_range(sheet_name)?;
        let mut row_by_key: HashMap<String, usize> = HashMap::new();
        for (index, row) in existing.iter().enumerate().skip(1) {
            if let Some(key) = key_of(row.get(options.key_column)) {
                // First occurrence wins if the sheet already holds duplicates
                row_by_key.entry(key).or_insert(index + 1);
            }
        }

        let mut result = UpdateResult::new(UpdateStatus::Success, sheet_name, strategy);
        result.records_processed = records.len();

        let mut to_append: Vec<Row> = Vec::new();
        let mut queued_by_key: HashMap<String, usize> = HashMap::new();

        for record in records {
            let Some(key) = key_of(record.get(options.key_column)) else {
                warn!(
                    category = "sheets",
                    sheet = sheet_name,
                    key_column = options.key_column,
                    "Record has no primary key; appending as new"
                );
                to_append.push(record.clone());
                continue;
            };

            if let Some(&row_num) = row_by_key.get(&key) {
                let current = &existing[row_num - 1];
                let width = current.len().max(record.len());

                if compare_content && row_hash(current, width) == row_hash(record, width) {
                    result.records_unchanged += 1;
                    continue;
                }

                let mut replacement = record.clone();
                replacement.resize(width, Cell::Null);
                self.sheets.write_range(sheet_name, row_num, 1, &[replacement])?;
                if compare_content {
                    result.records_changed += 1;
                } else {
                    result.records_updated += 1;
                }
            } else if let Some(&queued) = queued_by_key.get(&key) {
                // Same new key twice in one batch: last one wins
                to_append[queued] = record.clone();
                if compare_content {
                    result.records_changed += 1;
                } else {
                    result.records_updated += 1;
                }
            } else {
                queued_by_key.insert(key, to_append.len());
                to_append.push(record.clone());
            }
        }

        if !to_append.is_empty() {
            let start = self.next_free_row(sheet_name)?;
            self.write_batches(sheet_name, start, &to_append, options)?;
        }
        result.records_appended = to_append.len();
        result.total_rows_in_sheet = self.data_rows(sheet_name)?;
        Ok(result)
    }

    fn full_overwrite(
        &self,
        sheet_name: &str,
        records: &[Row],
        options: &ReconcileOptions,
    ) -> Result<UpdateResult> {
        let strategy = ReconciliationStrategy::FullOverwrite;
        let created = self.sheets.get_or_create_sheet(
            sheet_name,
            &Self::resolve_headers(sheet_name, options),
        )?;

        if !created {
            if let Some(headers) = &options.headers {
                let header_row: Row = headers.iter().map(|h| Cell::String(h.clone())).collect();
                self.sheets.write_range(sheet_name, 1, 1, &[header_row])?;
            }
            self.sheets.clear_data_rows(sheet_name)?;
        }

        self.write_batches(sheet_name, 2, records, options)?;

        let mut result = UpdateResult::new(UpdateStatus::Success, sheet_name, strategy);
        result.records_processed = records.len();
        result.records_written = records.len();
        result.total_rows_in_sheet = self.data_rows(sheet_name)?;
        Ok(result)
    }
}
