//! Long-running analytical jobs.
//!
//! - **Orchestrator**: submit, poll and finalize one job per family
//! - **Handles**: typed repository over the `<FAMILY>_JOB_ID` keys
//! - **Engine**: the `QueryEngine` trait and its BigQuery REST client
//! - **Supervisor**: in-process polling with a per-family single-flight guard
//! - **Triggers**: dispatch of due deferred checks

mod bigquery;
mod engine;
mod handle;
mod orchestrator;
mod query;
mod supervisor;
mod triggers;
mod types;

pub use bigquery::{BigQueryClient, DEFAULT_ENDPOINT};
pub use engine::QueryEngine;
pub use handle::{JobHandleRepository, job_id_key, project_id_key, submitted_at_key};
pub use orchestrator::{
    DEFAULT_POLL_INTERVAL, JobOrchestrator, cancel_family_checks, reset_family,
};
pub use query::{
    QueryTarget, build_query, data_inventory_sql, dimensional_health_sql, heartbeat_sql,
    smart_discovery_sql,
};
pub use supervisor::{FlightGuard, JobSupervisor};
pub use triggers::{TriggerRun, run_due_callbacks};
pub use types::{JobFamily, JobHandle, JobState, JobStatus, PollOutcome, QueryResults};
