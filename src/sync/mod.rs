//! Incremental sync state.
//!
//! This module tracks what has already been audited so later runs can skip
//! unchanged work:
//!
//! - **State**: per (service, resource type) watermark with bounded history
//! - **Mode**: FULL vs INCREMENTAL selection and watermark filtering
//! - **Hashing**: SHA256 content hashing for row change detection
//!
//! # Example
//!
//! ```ignore
//! use sa::sync::{plan_audit, SyncStateStore, SyncStatus};
//!
//! let store = SyncStateStore::new(&storage);
//! let plan = plan_audit(&store, "GA4", "Properties", false, true);
//! // ... fetch + reconcile ...
//! store.record_sync_state("GA4", "Properties", 42, SyncStatus::Success, plan.mode.into());
//! ```

mod hash;
mod mode;
mod state;
mod types;

pub use hash::{content_hash, row_hash};
pub use mode::{
    AuditMode, AuditPlan, effective_mode, filter_incremental, get_audit_mode, plan_audit,
};
pub use state::{
    HISTORY_KEY_PREFIX, HISTORY_LIMIT, STATE_KEY_PREFIX, SyncStateMap, SyncStateStore,
    history_key, state_key,
};
pub use types::{SyncMode, SyncState, SyncStatus};
