//! Result finalization.
//!
//! Turns a finished job's raw result set into an alerting sheet: each row is
//! mapped onto the family's header schema, classified into a severity bucket,
//! and the whole batch replaces the sheet's previous snapshot.
//!
//! The result set is fully mapped before anything is written, so a malformed
//! result leaves the previous snapshot untouched.

mod rules;

pub use rules::{
    Severity, classify_fill_rate, classify_heartbeat, deviation_pct, fill_rate_pct,
    min_fill_rate_for, number, round_to,
};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::{AuditConfig, AuditRule, Thresholds};
use crate::error::{Error, Result};
use crate::host::{Cell, Row, SheetStore};
use crate::jobs::{JobFamily, QueryResults};
use crate::sheets::{ReconcileOptions, Reconciler, ReconciliationStrategy};

/// Receives the results of terminal jobs.
pub trait ResultFinalizer {
    /// Write `results` for `family` and summarize them.
    ///
    /// An error is a terminal job failure; the caller does not retry.
    fn finalize(&self, family: JobFamily, results: &QueryResults) -> Result<FinalizeSummary>;
}

/// Counts per severity for one finalized job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeSummary {
    pub family: JobFamily,
    pub sheet_name: String,
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub ok: usize,
    pub message: String,
}

impl FinalizeSummary {
    fn from_severities(family: JobFamily, severities: &[Severity]) -> Self {
        let count = |s: Severity| severities.iter().filter(|&&x| x == s).count();
        let (critical, warning, ok) = (
            count(Severity::Critical),
            count(Severity::Warning),
            count(Severity::Ok),
        );
        let message = if severities.is_empty() {
            format!("{family}: no rows returned")
        } else {
            format!(
                "{family}: {critical} critical, {warning} warning, {ok} ok ({} rows)",
                severities.len()
            )
        };

        Self {
            family,
            sheet_name: family.sheet_name().to_string(),
            total: severities.len(),
            critical,
            warning,
            ok,
            message,
        }
    }
}

/// Column accessor over a result set.
struct Columns<'r> {
    results: &'r QueryResults,
    indexes: Vec<usize>,
}

impl<'r> Columns<'r> {
    fn require(results: &'r QueryResults, names: &[&str]) -> Result<Self> {
        let indexes = names
            .iter()
            .map(|name| {
                results.column_index(name).ok_or_else(|| {
                    Error::Engine(format!("Result set is missing column '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { results, indexes })
    }

    fn cell<'a>(&self, row: &'a Row, column: usize) -> Option<&'a Cell> {
        row.get(self.indexes[column])
    }

    fn text(&self, row: &Row, column: usize) -> String {
        match self.cell(row, column) {
            Some(Cell::String(s)) => s.clone(),
            Some(Cell::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    fn number(&self, row: &Row, column: usize) -> f64 {
        number(self.cell(row, column)).unwrap_or(0.0)
    }

    fn rows(&self) -> impl Iterator<Item = &'r Row> {
        self.results.rows.iter()
    }
}

/// Writes classified job results to per-family alerting sheets.
pub struct AlertFinalizer<'a, S: SheetStore + ?Sized> {
    sheets: &'a S,
    thresholds: Thresholds,
    rules: Vec<AuditRule>,
    options: ReconcileOptions,
}

impl<'a, S: SheetStore + ?Sized> AlertFinalizer<'a, S> {
    #[must_use]
    pub fn new(sheets: &'a S, thresholds: Thresholds, rules: Vec<AuditRule>) -> Self {
        Self {
            sheets,
            thresholds,
            rules,
            options: ReconcileOptions::default(),
        }
    }

    /// Build from the loaded configuration.
    #[must_use]
    pub fn from_config(sheets: &'a S, config: &AuditConfig) -> Self {
        Self::new(sheets, config.thresholds.clone(), config.audit_rules.clone())
            .with_batching(config.batch_size, config.batch_pause())
    }

    #[must_use]
    pub fn with_batching(mut self, batch_size: usize, batch_pause: std::time::Duration) -> Self {
        self.options = self.options.with_batching(batch_size, batch_pause);
        self
    }

    /// Map and classify a result set without writing it.
    ///
    /// Rows come back ordered most severe first, stable within a bucket.
    pub fn classify(&self, family: JobFamily, results: &QueryResults) -> Result<Vec<(Severity, Row)>> {
        let checked_at = json!(Utc::now().to_rfc3339());
        let mut classified = match family {
            JobFamily::Heartbeat => self.heartbeat(results, &checked_at)?,
            JobFamily::DimensionalHealth => self.dimensional_health(results, &checked_at)?,
            JobFamily::DataInventory => Self::data_inventory(results, &checked_at)?,
            JobFamily::SmartDiscovery => self.smart_discovery(results, &checked_at)?,
        };
        classified.sort_by_key(|(severity, _)| *severity);
        Ok(classified)
    }

    fn heartbeat(&self, results: &QueryResults, checked_at: &Cell) -> Result<Vec<(Severity, Row)>> {
        let cols = Columns::require(results, &["event_name", "yesterday_count", "avg_7d_count"])?;
        Ok(cols
            .rows()
            .map(|row| {
                let yesterday = cols.number(row, 1);
                let average = cols.number(row, 2);
                let severity = classify_heartbeat(yesterday, average, &self.thresholds);
                let deviation = deviation_pct(yesterday, average).map(|d| round_to(d, 1));
                (
                    severity,
                    vec![
                        json!(cols.text(row, 0)),
                        json!(yesterday),
                        json!(round_to(average, 1)),
                        deviation.map_or(Cell::Null, |d| json!(d)),
                        json!(severity.as_str()),
                        checked_at.clone(),
                    ],
                )
            })
            .collect())
    }

    fn dimensional_health(
        &self,
        results: &QueryResults,
        checked_at: &Cell,
    ) -> Result<Vec<(Severity, Row)>> {
        let cols = Columns::require(
            results,
            &["event_name", "parameter_name", "total_events", "filled_events"],
        )?;
        Ok(cols
            .rows()
            .map(|row| {
                let event = cols.text(row, 0);
                let parameter = cols.text(row, 1);
                let total = cols.number(row, 2);
                let filled = cols.number(row, 3);
                let rate = fill_rate_pct(total, filled);
                let min_rate = min_fill_rate_for(&event, &parameter, &self.rules, &self.thresholds);
                let severity = classify_fill_rate(rate, min_rate, &self.thresholds);
                (
                    severity,
                    vec![
                        json!(event),
                        json!(parameter),
                        json!(total),
                        json!(filled),
                        json!(round_to(rate, 1)),
                        json!(min_rate),
                        json!(severity.as_str()),
                        checked_at.clone(),
                    ],
                )
            })
            .collect())
    }

    fn data_inventory(results: &QueryResults, checked_at: &Cell) -> Result<Vec<(Severity, Row)>> {
        let cols = Columns::require(
            results,
            &["dataset", "table", "row_count", "size_bytes", "last_modified"],
        )?;
        Ok(cols
            .rows()
            .map(|row| {
                let row_count = cols.number(row, 2);
                let size_mb = round_to(cols.number(row, 3) / 1_048_576.0, 2);
                let severity = if row_count <= 0.0 {
                    Severity::Warning
                } else {
                    Severity::Ok
                };
                (
                    severity,
                    vec![
                        json!(cols.text(row, 0)),
                        json!(cols.text(row, 1)),
                        json!(row_count),
                        json!(size_mb),
                        cols.cell(row, 4).cloned().unwrap_or(Cell::Null),
                        json!(severity.as_str()),
                        checked_at.clone(),
                    ],
                )
            })
            .collect())
    }

    fn smart_discovery(
        &self,
        results: &QueryResults,
        checked_at: &Cell,
    ) -> Result<Vec<(Severity, Row)>> {
        let cols = Columns::require(results, &["event_name", "parameter_name", "occurrences"])?;
        Ok(cols
            .rows()
            .map(|row| {
                let event = cols.text(row, 0);
                let parameter = cols.text(row, 1);
                let covered = self.rules.iter().any(|r| r.covers(&event, &parameter));
                // Uncovered parameters are rule suggestions
                let severity = if covered { Severity::Ok } else { Severity::Warning };
                (
                    severity,
                    vec![
                        json!(event),
                        json!(parameter),
                        json!(cols.number(row, 2)),
                        json!(if covered { "Yes" } else { "No" }),
                        json!(severity.as_str()),
                        checked_at.clone(),
                    ],
                )
            })
            .collect())
    }
}

impl<S: SheetStore + ?Sized> ResultFinalizer for AlertFinalizer<'_, S> {
    fn finalize(&self, family: JobFamily, results: &QueryResults) -> Result<FinalizeSummary> {
        let classified = self.classify(family, results)?;
        let severities: Vec<Severity> = classified.iter().map(|(s, _)| *s).collect();
        let rows: Vec<Row> = classified.into_iter().map(|(_, row)| row).collect();

        let options = self.options.clone().with_headers(family.headers());
        let update = Reconciler::new(self.sheets).apply(
            ReconciliationStrategy::FullOverwrite,
            family.sheet_name(),
            &rows,
            &options,
        );
        if let Some(err) = update.error {
            return Err(Error::Other(format!(
                "Failed to write {}: {err}",
                family.sheet_name()
            )));
        }

        let summary = FinalizeSummary::from_severities(family, &severities);
        info!(
            category = "finalize",
            family = %family,
            critical = summary.critical,
            warning = summary.warning,
            ok = summary.ok,
            "{}",
            summary.message
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn results(columns: &[&str], rows: Vec<Row>) -> QueryResults {
        QueryResults {
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_heartbeat_writes_sorted_snapshot() {
        let storage = SqliteStorage::open_memory().unwrap();
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), Vec::new());

        let raw = results(
            &["event_name", "yesterday_count", "avg_7d_count"],
            vec![
                vec![json!("page_view"), json!("1000"), json!("1010")],
                vec![json!("purchase"), json!("0"), json!("40")],
                vec![json!("scroll"), json!("70"), json!("100")],
            ],
        );
        let summary = finalizer.finalize(JobFamily::Heartbeat, &raw).unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!((summary.critical, summary.warning, summary.ok), (1, 1, 1));
        assert!(summary.message.contains("1 critical"));

        let rows = storage.read_range("Heartbeat Alerts").unwrap();
        assert_eq!(rows[0][0], json!("Event Name"));
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][0], json!("purchase"));
        assert_eq!(rows[1][4], json!("CRITICAL"));
        assert_eq!(rows[2][0], json!("scroll"));
        assert_eq!(rows[3][0], json!("page_view"));
    }

    #[test]
    fn test_second_finalize_replaces_snapshot() {
        let storage = SqliteStorage::open_memory().unwrap();
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), Vec::new());
        let columns = ["dataset", "table", "row_count", "size_bytes", "last_modified"];

        let first = results(
            &columns,
            vec![
                vec![json!("ga4"), json!("events_1"), json!("10"), json!("2097152"), Cell::Null],
                vec![json!("ga4"), json!("events_2"), json!("0"), json!("0"), Cell::Null],
            ],
        );
        let summary = finalizer.finalize(JobFamily::DataInventory, &first).unwrap();
        assert_eq!(summary.warning, 1);

        let second = results(&columns, vec![vec![
            json!("ga4"),
            json!("events_3"),
            json!("5"),
            json!("0"),
            Cell::Null,
        ]]);
        finalizer.finalize(JobFamily::DataInventory, &second).unwrap();

        let rows = storage.read_range("Data Inventory").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], json!("events_3"));
    }

    #[test]
    fn test_dimensional_health_uses_rules() {
        let storage = SqliteStorage::open_memory().unwrap();
        let rules = vec![AuditRule::new("purchase", "transaction_id", 99.0)];
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), rules);

        let raw = results(
            &["event_name", "parameter_name", "total_events", "filled_events"],
            vec![
                vec![json!("purchase"), json!("transaction_id"), json!(100), json!(95)],
                vec![json!("purchase"), json!("coupon"), json!(100), json!(95)],
                vec![json!("page_view"), json!("page_title"), json!(100), json!(50)],
            ],
        );
        let summary = finalizer.finalize(JobFamily::DimensionalHealth, &raw).unwrap();

        // 95% against a 99% rule warns, 95% against the 90% default passes
        assert_eq!((summary.critical, summary.warning, summary.ok), (1, 1, 1));
    }

    #[test]
    fn test_smart_discovery_flags_uncovered_parameters() {
        let storage = SqliteStorage::open_memory().unwrap();
        let rules = vec![AuditRule::new("purchase", "transaction_id", 99.0)];
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), rules);

        let raw = results(
            &["event_name", "parameter_name", "occurrences"],
            vec![
                vec![json!("purchase"), json!("transaction_id"), json!("40")],
                vec![json!("purchase"), json!("payment_type"), json!("38")],
            ],
        );
        let classified = finalizer.classify(JobFamily::SmartDiscovery, &raw).unwrap();
        assert_eq!(classified[0].0, Severity::Warning);
        assert_eq!(classified[0].1[3], json!("No"));
        assert_eq!(classified[1].0, Severity::Ok);
    }

    #[test]
    fn test_missing_column_leaves_sheet_untouched() {
        let storage = SqliteStorage::open_memory().unwrap();
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), Vec::new());
        let good = results(
            &["event_name", "yesterday_count", "avg_7d_count"],
            vec![vec![json!("page_view"), json!(10), json!(10)]],
        );
        finalizer.finalize(JobFamily::Heartbeat, &good).unwrap();

        let bad = results(&["event_name"], vec![vec![json!("page_view")]]);
        let err = finalizer.finalize(JobFamily::Heartbeat, &bad).unwrap_err();
        assert!(err.to_string().contains("yesterday_count"));

        let rows = storage.read_range("Heartbeat Alerts").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_empty_results_clear_snapshot() {
        let storage = SqliteStorage::open_memory().unwrap();
        let finalizer = AlertFinalizer::new(&storage, Thresholds::default(), Vec::new());
        let summary = finalizer
            .finalize(
                JobFamily::SmartDiscovery,
                &results(&["event_name", "parameter_name", "occurrences"], Vec::new()),
            )
            .unwrap();

        assert_eq!(summary.total, 0);
        assert!(summary.message.contains("no rows"));
        assert_eq!(storage.read_range("Smart Discovery").unwrap().len(), 1);
    }
}
