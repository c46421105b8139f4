//! Sheet reconciliation.
//!
//! Fetched records reach a managed sheet through one of four strategies:
//!
//! - **Append**: add every record after the last row (audit logs, history)
//! - **Merge**: overwrite rows by primary key, append unknown keys
//! - **Selective**: like merge, but skip rows whose content hash is unchanged
//! - **Overwrite**: replace all data rows (point-in-time snapshots)
//!
//! Sheets are created lazily with a header row on first write.

mod headers;
mod reconcile;
mod types;

pub use headers::default_headers;
pub use reconcile::Reconciler;
pub use types::{
    DEFAULT_BATCH_PAUSE, DEFAULT_BATCH_SIZE, ReconcileOptions, ReconciliationStrategy,
    UpdateResult, UpdateStatus,
};
