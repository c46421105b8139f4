//! Sync state types.
//!
//! A `SyncState` is the persisted watermark for one (service, resource type)
//! pair. It is written only after an attempt completes, never while one is
//! in progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Success,
    Partial,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUCCESS" => Ok(Self::Success),
            "PARTIAL" => Ok(Self::Partial),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Unknown sync status: {s}")),
        }
    }
}

/// How the last sync fetched its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    Full,
    Delta,
    Incremental,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Delta => write!(f, "DELTA"),
            Self::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

/// Persisted sync watermark for one (service, resource type) pair.
///
/// Serialized with camelCase keys, e.g.
/// `{"service":"GA4","resourceType":"PROPERTIES","lastSyncTimestamp":"...","lastSyncCount":42,...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Upper-cased service identifier.
    pub service: String,
    /// Upper-cased resource type identifier.
    pub resource_type: String,
    /// When the last attempt completed; absent means never synced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Records processed by that attempt.
    pub last_sync_count: usize,
    pub last_sync_status: SyncStatus,
    pub sync_mode: SyncMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("success".parse::<SyncStatus>().unwrap(), SyncStatus::Success);
        assert_eq!("Partial".parse::<SyncStatus>().unwrap(), SyncStatus::Partial);
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_sync_state_json_shape() {
        let state = SyncState {
            service: "GA4".into(),
            resource_type: "PROPERTIES".into(),
            last_sync_timestamp: None,
            last_sync_count: 3,
            last_sync_status: SyncStatus::Success,
            sync_mode: SyncMode::Full,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["resourceType"], "PROPERTIES");
        assert_eq!(json["lastSyncStatus"], "SUCCESS");
        assert_eq!(json["syncMode"], "FULL");
        assert!(json.get("lastSyncTimestamp").is_none());
    }
}
