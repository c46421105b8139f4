//! Query engine trait.
//!
//! The orchestrator talks to the analytical engine only through this trait.
//! Calls arrive already authenticated; transient failures are retried by the
//! implementation, never by the orchestrator.

use crate::error::Result;
use crate::jobs::types::{JobStatus, QueryResults};

/// An external engine that runs long analytical queries as jobs.
pub trait QueryEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Submit `sql` as a job in `project_id`. Returns the engine job id.
    fn submit_query(
        &self,
        project_id: &str,
        sql: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    /// Current state of a job.
    fn get_job_status(
        &self,
        project_id: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<JobStatus>> + Send;

    /// Full result set of a finished job.
    fn get_job_results(
        &self,
        project_id: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<QueryResults>> + Send;
}
