//! Persisted sync watermarks.
//!
//! `SyncStateStore` keeps one [`SyncState`] per (service, resource type) under
//! `SYNC_STATE_<SERVICE>_<RESOURCE_TYPE>` and a bounded history under
//! `SYNC_HISTORY_<SERVICE>_<RESOURCE_TYPE>`.
//!
//! Storage failures never escape this module. Every operation degrades to a
//! logged warning plus a safe default, which at worst sends the next audit
//! back to FULL mode.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::host::KeyValueStore;
use crate::sync::types::{SyncMode, SyncState, SyncStatus};

/// Key prefix for current sync state.
pub const STATE_KEY_PREFIX: &str = "SYNC_STATE_";

/// Key prefix for sync history logs.
pub const HISTORY_KEY_PREFIX: &str = "SYNC_HISTORY_";

/// Number of snapshots retained per history log.
pub const HISTORY_LIMIT: usize = 10;

/// All sync states grouped by service, then resource type.
pub type SyncStateMap = BTreeMap<String, BTreeMap<String, SyncState>>;

/// Normalize an identifier: trimmed and upper-cased, `None` when empty.
fn normalize(id: &str) -> Option<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

/// Storage key for the current state of a resource.
#[must_use]
pub fn state_key(service: &str, resource_type: &str) -> String {
    format!("{STATE_KEY_PREFIX}{service}_{resource_type}")
}

/// Storage key for the history log of a resource.
#[must_use]
pub fn history_key(service: &str, resource_type: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}{service}_{resource_type}")
}

/// Sync state repository over any key/value store.
pub struct SyncStateStore<'a, K: KeyValueStore + ?Sized> {
    kv: &'a K,
}

impl<'a, K: KeyValueStore + ?Sized> SyncStateStore<'a, K> {
    #[must_use]
    pub fn new(kv: &'a K) -> Self {
        Self { kv }
    }

    /// Record the outcome of a completed sync attempt.
    ///
    /// Returns the stored state, or `None` when the identifiers are empty or
    /// the primary write failed. Callers treat `None` as "not recorded" and
    /// assume the worst on the next read. History failures only log a warning.
    pub fn record_sync_state(
        &self,
        service: &str,
        resource_type: &str,
        record_count: usize,
        status: SyncStatus,
        sync_mode: SyncMode,
    ) -> Option<SyncState> {
        let (Some(service), Some(resource_type)) = (normalize(service), normalize(resource_type))
        else {
            error!(
                category = "sync_state",
                "Cannot record sync state: service and resource type are required"
            );
            return None;
        };

        let state = SyncState {
            service,
            resource_type,
            last_sync_timestamp: Some(Utc::now()),
            last_sync_count: record_count,
            last_sync_status: status,
            sync_mode,
        };

        let key = state_key(&state.service, &state.resource_type);
        if let Err(e) = self.write_json(&key, &state) {
            error!(
                category = "sync_state",
                service = %state.service,
                resource_type = %state.resource_type,
                error = %e,
                "Failed to persist sync state"
            );
            return None;
        }

        if let Err(e) = self.append_history(&state) {
            warn!(
                category = "sync_state",
                service = %state.service,
                resource_type = %state.resource_type,
                error = %e,
                "Failed to append sync history"
            );
        }

        info!(
            category = "sync_state",
            service = %state.service,
            resource_type = %state.resource_type,
            count = record_count,
            status = %status,
            mode = %sync_mode,
            "Recorded sync state"
        );
        Some(state)
    }

    /// Current state, `None` if never recorded, unreadable or corrupt.
    #[must_use]
    pub fn get_sync_state(&self, service: &str, resource_type: &str) -> Option<SyncState> {
        let (service, resource_type) = (normalize(service)?, normalize(resource_type)?);
        self.read_state(&state_key(&service, &resource_type))
    }

    /// True when nothing usable has been recorded for this resource.
    #[must_use]
    pub fn is_first_sync(&self, service: &str, resource_type: &str) -> bool {
        self.get_sync_state(service, resource_type)
            .is_none_or(|s| s.last_sync_timestamp.is_none())
    }

    /// Watermark of the last completed sync.
    #[must_use]
    pub fn get_last_sync_timestamp(
        &self,
        service: &str,
        resource_type: &str,
    ) -> Option<DateTime<Utc>> {
        self.get_sync_state(service, resource_type)
            .and_then(|s| s.last_sync_timestamp)
    }

    /// Watermark of the most recent successful sync.
    ///
    /// Falls back to the current state when the history holds no success, so
    /// an `ERROR` or `PARTIAL` record never moves it forward.
    #[must_use]
    pub fn get_last_successful_sync_timestamp(
        &self,
        service: &str,
        resource_type: &str,
    ) -> Option<DateTime<Utc>> {
        self.get_sync_history(service, resource_type)
            .into_iter()
            .rev()
            .find(|s| s.last_sync_status == SyncStatus::Success)
            .or_else(|| {
                self.get_sync_state(service, resource_type)
                    .filter(|s| s.last_sync_status == SyncStatus::Success)
            })
            .and_then(|s| s.last_sync_timestamp)
    }

    /// Bounded history log, oldest first. Empty on any failure.
    #[must_use]
    pub fn get_sync_history(&self, service: &str, resource_type: &str) -> Vec<SyncState> {
        let (Some(service), Some(resource_type)) = (normalize(service), normalize(resource_type))
        else {
            return Vec::new();
        };
        self.read_history(&history_key(&service, &resource_type))
    }

    /// Clear state for one resource type, or for every resource of `service`.
    ///
    /// Clearing absent state succeeds. Returns `false` only when the
    /// store failed or `service` is empty.
    pub fn clear_sync_state(&self, service: &str, resource_type: Option<&str>) -> bool {
        let Some(service) = normalize(service) else {
            warn!(category = "sync_state", "Cannot clear sync state without a service");
            return false;
        };

        let result = match resource_type.and_then(normalize) {
            Some(resource_type) => self
                .kv
                .delete(&state_key(&service, &resource_type))
                .and_then(|()| self.kv.delete(&history_key(&service, &resource_type))),
            None => self.clear_service(&service),
        };

        match result {
            Ok(()) => {
                info!(
                    category = "sync_state",
                    service = %service,
                    resource_type = resource_type.unwrap_or("*"),
                    "Cleared sync state"
                );
                true
            }
            Err(e) => {
                warn!(category = "sync_state", service = %service, error = %e, "Failed to clear sync state");
                false
            }
        }
    }

    /// Enumerate all persisted states, optionally for one service.
    ///
    /// Keys that do not follow the naming pattern, and values that do not
    /// parse or do not match their key, are skipped.
    #[must_use]
    pub fn get_all_sync_states(&self, service: Option<&str>) -> SyncStateMap {
        let filter = service.and_then(normalize);
        let mut states = SyncStateMap::new();

        let keys = match self.kv.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(category = "sync_state", error = %e, "Failed to list sync state keys");
                return states;
            }
        };

        for key in keys {
            let Some(rest) = key.strip_prefix(STATE_KEY_PREFIX) else {
                continue;
            };
            let Some((svc, rt)) = rest.split_once('_') else {
                debug!(category = "sync_state", key = %key, "Skipping malformed sync state key");
                continue;
            };
            if svc.is_empty() || rt.is_empty() {
                continue;
            }
            if let Some(wanted) = &filter {
                if !rest.starts_with(&format!("{wanted}_")) {
                    continue;
                }
            }

            let Some(state) = self.read_state(&key) else {
                continue;
            };
            // Service ids may contain '_', so the stored value decides the split
            if state_key(&state.service, &state.resource_type) != key {
                debug!(category = "sync_state", key = %key, "Skipping sync state with mismatched key");
                continue;
            }
            if filter.as_ref().is_some_and(|wanted| *wanted != state.service) {
                continue;
            }

            states
                .entry(state.service.clone())
                .or_default()
                .insert(state.resource_type.clone(), state);
        }

        states
    }

    /// Delete every resource whose stored service is exactly `service`.
    ///
    /// A key prefix alone cannot tell `GA4` from `GA4_LEGACY`, so the
    /// stored values decide. Unreadable entries are left in place.
    fn clear_service(&self, service: &str) -> Result<()> {
        let prefix = format!("{service}_");
        let mut resources = BTreeSet::new();
        for key in self.kv.list_keys()? {
            let stored = if key
                .strip_prefix(STATE_KEY_PREFIX)
                .is_some_and(|rest| rest.starts_with(&prefix))
            {
                self.read_state(&key)
                    .filter(|state| state_key(&state.service, &state.resource_type) == key)
            } else if key
                .strip_prefix(HISTORY_KEY_PREFIX)
                .is_some_and(|rest| rest.starts_with(&prefix))
            {
                self.read_history(&key)
                    .pop()
                    .filter(|state| history_key(&state.service, &state.resource_type) == key)
            } else {
                None
            };
            if let Some(state) = stored.filter(|state| state.service == service) {
                resources.insert(state.resource_type);
            }
        }

        for resource_type in &resources {
            self.kv.delete(&state_key(service, resource_type))?;
            self.kv.delete(&history_key(service, resource_type))?;
        }
        Ok(())
    }

    fn read_state(&self, key: &str) -> Option<SyncState> {
        let raw = match self.kv.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(category = "sync_state", key, error = %e, "Failed to read sync state");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(category = "sync_state", key, error = %e, "Corrupt sync state treated as never synced");
                None
            }
        }
    }

    fn read_history(&self, key: &str) -> Vec<SyncState> {
        match self.kv.get(key) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(category = "sync_state", key, error = %e, "Corrupt sync history discarded");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(category = "sync_state", key, error = %e, "Failed to read sync history");
                Vec::new()
            }
        }
    }

    fn append_history(&self, state: &SyncState) -> Result<()> {
        let key = history_key(&state.service, &state.resource_type);
        let mut history = self.read_history(&key);
        history.push(state.clone());
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
        self.write_json(&key, &history)
    }

    fn write_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.kv.set(key, &json)
    }
}
