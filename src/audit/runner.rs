//! Multi-resource audit runs.
//!
//! Each resource type is fetched, filtered and reconciled on its own. A
//! failure is logged, recorded as an `ERROR` sync state and does not stop
//! the remaining resources. Sync state is only written after the sheet
//! write has finished.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::AuditConfig;
use crate::error::Result;
use crate::host::{KeyValueStore, Row, SheetStore};
use crate::sheets::{ReconcileOptions, Reconciler, ReconciliationStrategy, UpdateResult};
use crate::sync::{
    AuditMode, AuditPlan, SyncStateStore, SyncStatus, filter_incremental, plan_audit,
};

use super::fetch::{FetchedRecord, ResourceFetcher};

/// Sheet that receives a resource type's records, e.g. `GA4 Properties`.
#[must_use]
pub fn sheet_name_for(service: &str, resource_type: &str) -> String {
    format!("{} {}", service.trim(), resource_type.trim())
}

/// Outcome of one resource type within a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub resource_type: String,
    pub sheet_name: String,
    pub mode: AuditMode,
    pub status: SyncStatus,
    pub records_fetched: usize,
    pub records_synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRunReport {
    pub service: String,
    /// `SUCCESS` when every resource succeeded, `PARTIAL` when some did,
    /// `ERROR` when none did.
    pub status: SyncStatus,
    pub resources: Vec<ResourceReport>,
}

impl AuditRunReport {
    fn aggregate(service: &str, resources: Vec<ResourceReport>) -> Self {
        let ok = resources
            .iter()
            .filter(|r| r.status == SyncStatus::Success)
            .count();
        let status = if ok == resources.len() {
            SyncStatus::Success
        } else if ok > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Error
        };
        Self {
            service: service.to_string(),
            status,
            resources,
        }
    }
}

/// Runs audits for one service across several resource types.
pub struct AuditRunner<'a, K, S, F>
where
    K: KeyValueStore + ?Sized,
    S: SheetStore + ?Sized,
    F: ResourceFetcher + ?Sized,
{
    sync: SyncStateStore<'a, K>,
    reconciler: Reconciler<'a, S>,
    fetcher: &'a F,
    strategy: ReconciliationStrategy,
    options: ReconcileOptions,
    incremental_enabled: bool,
    safety_margin: Duration,
    force_full: bool,
}

impl<'a, K, S, F> AuditRunner<'a, K, S, F>
where
    K: KeyValueStore + ?Sized,
    S: SheetStore + ?Sized,
    F: ResourceFetcher + ?Sized,
{
    #[must_use]
    pub fn new(kv: &'a K, sheets: &'a S, fetcher: &'a F, config: &AuditConfig) -> Self {
        Self {
            sync: SyncStateStore::new(kv),
            reconciler: Reconciler::new(sheets),
            fetcher,
            strategy: ReconciliationStrategy::default(),
            options: ReconcileOptions::default()
                .with_batching(config.batch_size, config.batch_pause()),
            incremental_enabled: config.incremental_enabled,
            safety_margin: config.safety_margin(),
            force_full: false,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: ReconciliationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_key_column(mut self, key_column: usize) -> Self {
        self.options = self.options.with_key_column(key_column);
        self
    }

    #[must_use]
    pub fn with_force_full(mut self, force_full: bool) -> Self {
        self.force_full = force_full;
        self
    }

    /// Audit every resource type of `service`.
    pub fn run(&self, service: &str, resource_types: &[String]) -> AuditRunReport {
        let reports: Vec<ResourceReport> = resource_types
            .iter()
            .map(|resource_type| self.run_resource(service, resource_type))
            .collect();
        let report = AuditRunReport::aggregate(service, reports);

        info!(
            category = "audit",
            service,
            status = %report.status,
            resources = report.resources.len(),
            "Audit run finished"
        );
        report
    }

    fn run_resource(&self, service: &str, resource_type: &str) -> ResourceReport {
        let AuditPlan {
            mut mode,
            mut watermark,
        } = plan_audit(
            &self.sync,
            service,
            resource_type,
            self.force_full,
            self.incremental_enabled,
        );

        // Overwrite clears every data row, so it needs the complete record set
        if mode == AuditMode::Incremental
            && self.strategy == ReconciliationStrategy::FullOverwrite
        {
            warn!(
                category = "audit",
                service,
                resource_type,
                "Overwrite strategy needs every record; running FULL"
            );
            mode = AuditMode::Full;
            watermark = None;
        }

        let mut report = ResourceReport {
            resource_type: resource_type.to_string(),
            sheet_name: sheet_name_for(service, resource_type),
            mode,
            status: SyncStatus::Error,
            records_fetched: 0,
            records_synced: 0,
            update: None,
            error: None,
        };

        match self.sync_resource(service, resource_type, watermark, &mut report) {
            Ok(()) => {
                report.status = SyncStatus::Success;
                self.sync.record_sync_state(
                    service,
                    resource_type,
                    report.records_synced,
                    SyncStatus::Success,
                    mode.into(),
                );
            }
            Err(e) => {
                error!(
                    category = "audit",
                    service,
                    resource_type,
                    error = %e,
                    "Resource audit failed"
                );
                report.error = Some(e.to_string());
                self.sync
                    .record_sync_state(service, resource_type, 0, SyncStatus::Error, mode.into());
            }
        }
        report
    }

    fn sync_resource(
        &self,
        service: &str,
        resource_type: &str,
        watermark: Option<DateTime<Utc>>,
        report: &mut ResourceReport,
    ) -> Result<()> {
        let records = self.fetcher.fetch_resource(service, resource_type)?;
        report.records_fetched = records.len();

        let candidates = filter_incremental(records, watermark, self.safety_margin, |r: &FetchedRecord| {
            r.last_modified
        });
        report.records_synced = candidates.len();

        let rows: Vec<Row> = candidates.into_iter().map(FetchedRecord::into_row).collect();
        let update = self
            .reconciler
            .apply(self.strategy, &report.sheet_name, &rows, &self.options);
        let failure = update.error.clone();
        report.update = Some(update);

        match failure {
            Some(message) => Err(crate::error::Error::Sync(message)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::SqliteStorage;
    use crate::sync::SyncMode;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Fetcher backed by an in-memory map; missing entries fail.
    #[derive(Default)]
    struct MapFetcher {
        records: RefCell<HashMap<String, Vec<FetchedRecord>>>,
    }

    impl MapFetcher {
        fn put(&self, resource_type: &str, records: Vec<FetchedRecord>) {
            self.records
                .borrow_mut()
                .insert(resource_type.to_string(), records);
        }
    }

    impl ResourceFetcher for MapFetcher {
        fn fetch_resource(&self, _service: &str, resource_type: &str) -> Result<Vec<FetchedRecord>> {
            self.records
                .borrow()
                .get(resource_type)
                .cloned()
                .ok_or_else(|| Error::Auth(format!("token expired for {resource_type}")))
        }
    }

    fn record(key: &str, name: &str, modified: Option<DateTime<Utc>>) -> FetchedRecord {
        FetchedRecord {
            key: Some(key.to_string()),
            cells: vec![json!(name)],
            last_modified: modified,
        }
    }

    fn config() -> AuditConfig {
        AuditConfig {
            batch_pause_ms: 0,
            ..AuditConfig::default()
        }
    }

    fn resources(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_partial_failure_is_isolated() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        fetcher.put("Properties", vec![record("1", "Main", None), record("2", "Blog", None)]);
        let config = config();
        let runner = AuditRunner::new(&storage, &storage, &fetcher, &config);

        let report = runner.run("GA4", &resources(&["Properties", "Data Streams"]));

        assert_eq!(report.status, SyncStatus::Partial);
        assert_eq!(report.resources[0].status, SyncStatus::Success);
        assert_eq!(report.resources[0].mode, AuditMode::Full);
        assert_eq!(report.resources[1].status, SyncStatus::Error);
        assert!(report.resources[1].error.as_ref().unwrap().contains("token expired"));

        let rows = storage.read_range("GA4 Properties").unwrap();
        assert_eq!(rows[0][0], json!("Property ID"));
        assert_eq!(rows.len(), 3);

        let store = SyncStateStore::new(&storage);
        let ok = store.get_sync_state("GA4", "Properties").unwrap();
        assert_eq!(ok.last_sync_count, 2);
        assert_eq!(ok.sync_mode, SyncMode::Full);
        let failed = store.get_sync_state("GA4", "Data Streams").unwrap();
        assert_eq!(failed.last_sync_status, SyncStatus::Error);
    }

    #[test]
    fn test_all_failed_is_error() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        let config = config();
        let report = AuditRunner::new(&storage, &storage, &fetcher, &config)
            .run("GTM", &resources(&["Tags", "Triggers"]));
        assert_eq!(report.status, SyncStatus::Error);
    }

    #[test]
    fn test_second_run_is_incremental() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        let old = Utc::now() - Duration::days(3);
        fetcher.put("Properties", vec![record("1", "Main", Some(old)), record("2", "Blog", Some(old))]);
        let config = config();
        let runner = AuditRunner::new(&storage, &storage, &fetcher, &config);
        runner.run("GA4", &resources(&["Properties"]));

        // Only the record modified after the watermark is reconciled
        fetcher.put(
            "Properties",
            vec![
                record("1", "Main", Some(old)),
                record("2", "Blog v2", Some(Utc::now() + Duration::seconds(1))),
            ],
        );
        let report = runner.run("GA4", &resources(&["Properties"]));
        let resource = &report.resources[0];

        assert_eq!(resource.mode, AuditMode::Incremental);
        assert_eq!(resource.records_fetched, 2);
        assert_eq!(resource.records_synced, 1);
        assert_eq!(resource.update.as_ref().unwrap().records_updated, 1);

        let rows = storage.read_range("GA4 Properties").unwrap();
        assert_eq!(rows[2][1], json!("Blog v2"));
    }

    #[test]
    fn test_overwrite_always_runs_full() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        let old = Utc::now() - Duration::days(3);
        fetcher.put(
            "Properties",
            vec![
                record("1", "Main", Some(old)),
                record("2", "Blog", Some(old)),
                record("3", "Shop", Some(old)),
            ],
        );
        let config = config();
        let runner = AuditRunner::new(&storage, &storage, &fetcher, &config)
            .with_strategy(ReconciliationStrategy::FullOverwrite);
        runner.run("GA4", &resources(&["Properties"]));

        fetcher.put(
            "Properties",
            vec![
                record("1", "Main", Some(old)),
                record("2", "Blog v2", Some(Utc::now() + Duration::seconds(1))),
                record("3", "Shop", Some(old)),
            ],
        );
        let report = runner.run("GA4", &resources(&["Properties"]));
        let resource = &report.resources[0];

        assert_eq!(resource.mode, AuditMode::Full);
        assert_eq!(resource.records_synced, 3);

        // Unchanged rows survive the overwrite
        let rows = storage.read_range("GA4 Properties").unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1][1], json!("Main"));
        assert_eq!(rows[2][1], json!("Blog v2"));
        assert_eq!(rows[3][1], json!("Shop"));

        let state = SyncStateStore::new(&storage)
            .get_sync_state("GA4", "Properties")
            .unwrap();
        assert_eq!(state.sync_mode, SyncMode::Full);
    }

    #[test]
    fn test_failed_sync_does_not_advance_watermark() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        let config = config();
        let runner = AuditRunner::new(&storage, &storage, &fetcher, &config);

        // First attempt fails outright
        runner.run("GA4", &resources(&["Properties"]));

        let old = Utc::now() - Duration::days(3);
        fetcher.put("Properties", vec![record("1", "Main", Some(old))]);
        let report = runner.run("GA4", &resources(&["Properties"]));

        assert_eq!(report.resources[0].mode, AuditMode::Full);
        assert_eq!(report.resources[0].records_synced, 1);
    }

    #[test]
    fn test_force_full_and_kill_switch() {
        let storage = SqliteStorage::open_memory().unwrap();
        let fetcher = MapFetcher::default();
        fetcher.put("Tags", vec![record("t1", "GA4 Config", None)]);
        let config = config();
        AuditRunner::new(&storage, &storage, &fetcher, &config).run("GTM", &resources(&["Tags"]));

        let forced = AuditRunner::new(&storage, &storage, &fetcher, &config)
            .with_force_full(true)
            .run("GTM", &resources(&["Tags"]));
        assert_eq!(forced.resources[0].mode, AuditMode::Full);

        let disabled = AuditConfig {
            incremental_enabled: false,
            ..config
        };
        let killed = AuditRunner::new(&storage, &storage, &fetcher, &disabled)
            .run("GTM", &resources(&["Tags"]));
        assert_eq!(killed.resources[0].mode, AuditMode::Full);
    }
}
