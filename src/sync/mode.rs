//! Audit-mode selection and incremental filtering.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::host::KeyValueStore;
use crate::sync::state::SyncStateStore;
use crate::sync::types::SyncMode;

/// Fetch mode for one resource type in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditMode {
    /// Ignore the watermark and fetch everything.
    Full,
    /// Keep only records modified after the watermark.
    Incremental,
}

impl std::fmt::Display for AuditMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

impl From<AuditMode> for SyncMode {
    fn from(mode: AuditMode) -> Self {
        match mode {
            AuditMode::Full => Self::Full,
            AuditMode::Incremental => Self::Incremental,
        }
    }
}

/// Decide the audit mode for a resource.
///
/// FULL when forced or when the resource has never synced, INCREMENTAL otherwise.
#[must_use]
pub fn get_audit_mode<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: &str,
    resource_type: &str,
    force_full_audit: bool,
) -> AuditMode {
    if force_full_audit || store.is_first_sync(service, resource_type) {
        AuditMode::Full
    } else {
        AuditMode::Incremental
    }
}

/// Apply the user-level kill switch to a selected mode.
#[must_use]
pub const fn effective_mode(selected: AuditMode, incremental_enabled: bool) -> AuditMode {
    match (selected, incremental_enabled) {
        (AuditMode::Incremental, true) => AuditMode::Incremental,
        _ => AuditMode::Full,
    }
}

/// Mode and watermark a run will actually use for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPlan {
    pub mode: AuditMode,
    /// Last successful sync; `None` for FULL runs.
    pub watermark: Option<DateTime<Utc>>,
}

/// Resolve the mode a run will use, kill switch and watermark included.
///
/// An INCREMENTAL selection without any successful sync on record (for
/// example after an `ERROR` run) falls back to FULL.
#[must_use]
pub fn plan_audit<K: KeyValueStore + ?Sized>(
    store: &SyncStateStore<'_, K>,
    service: &str,
    resource_type: &str,
    force_full_audit: bool,
    incremental_enabled: bool,
) -> AuditPlan {
    let selected = get_audit_mode(store, service, resource_type, force_full_audit);
    if effective_mode(selected, incremental_enabled) == AuditMode::Full {
        return AuditPlan {
            mode: AuditMode::Full,
            watermark: None,
        };
    }

    match store.get_last_successful_sync_timestamp(service, resource_type) {
        Some(watermark) => AuditPlan {
            mode: AuditMode::Incremental,
            watermark: Some(watermark),
        },
        None => {
            warn!(
                category = "audit",
                service,
                resource_type,
                "No successful sync on record; running FULL"
            );
            AuditPlan {
                mode: AuditMode::Full,
                watermark: None,
            }
        }
    }
}

/// Keep candidates modified strictly after `watermark - safety_margin`.
///
/// Records without a last-modified timestamp are always kept. With no
/// watermark every record is kept.
pub fn filter_incremental<T, F>(
    records: Vec<T>,
    watermark: Option<DateTime<Utc>>,
    safety_margin: Duration,
    last_modified: F,
) -> Vec<T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let Some(watermark) = watermark else {
        return records;
    };
    let cutoff = watermark - safety_margin;

    records
        .into_iter()
        .filter(|record| last_modified(record).is_none_or(|modified| modified > cutoff))
        .collect()
}
