//! Audit runs: fetch, filter by watermark, reconcile, record sync state.

mod fetch;
mod runner;

pub use fetch::{FetchedRecord, JsonlFetcher, ResourceFetcher};
pub use runner::{AuditRunReport, AuditRunner, ResourceReport, sheet_name_for};
