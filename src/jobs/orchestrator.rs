//! Long-running job orchestration.
//!
//! Each job family moves through `NONE -> SUBMITTED -> RUNNING* -> DONE`.
//! Waiting is split into short steps: every status check either finishes the
//! job or asks for another check after the poll interval. The handle is
//! persisted before the first check is scheduled, and every terminal state
//! clears both the handle and the family's pending checks.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::finalize::ResultFinalizer;
use crate::host::{KeyValueStore, Scheduler};

use super::engine::QueryEngine;
use super::handle::JobHandleRepository;
use super::types::{JobFamily, JobHandle, JobState, PollOutcome};

/// Default delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Drives job families through submit, poll and finalize.
pub struct JobOrchestrator<'a, K, S, E>
where
    K: KeyValueStore + ?Sized,
    S: Scheduler + ?Sized,
    E: QueryEngine,
{
    handles: JobHandleRepository<'a, K>,
    scheduler: &'a S,
    engine: &'a E,
    poll_interval: Duration,
}

impl<'a, K, S, E> JobOrchestrator<'a, K, S, E>
where
    K: KeyValueStore + ?Sized,
    S: Scheduler + ?Sized,
    E: QueryEngine,
{
    #[must_use]
    pub fn new(kv: &'a K, scheduler: &'a S, engine: &'a E) -> Self {
        Self {
            handles: JobHandleRepository::new(kv),
            scheduler,
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Submit a job for `family` and schedule its first status check.
    ///
    /// # Errors
    ///
    /// Returns `JobAlreadyRunning` when the family already has a handle, or
    /// the engine/storage error that stopped the submission. On error no
    /// handle or schedule is left behind.
    pub async fn submit(&self, family: JobFamily, project_id: &str, sql: &str) -> Result<JobHandle> {
        if let Some(existing) = self.handles.load(family)? {
            warn!(
                category = "jobs",
                family = %family,
                job_id = %existing.job_id,
                "Rejected submission: job already in flight"
            );
            return Err(Error::JobAlreadyRunning {
                family: family.to_string(),
                job_id: existing.job_id,
            });
        }

        let job_id = self.engine.submit_query(project_id, sql).await.map_err(|e| {
            error!(category = "jobs", family = %family, error = %e, "Job submission failed");
            e
        })?;

        let handle = JobHandle {
            job_id,
            project_id: project_id.to_string(),
            submitted_at: Some(Utc::now()),
        };
        self.handles.save(family, &handle)?;

        if let Err(e) = self
            .scheduler
            .schedule_callback(family.check_function_name(), self.poll_interval)
        {
            error!(category = "jobs", family = %family, error = %e, "Failed to schedule status check");
            if let Err(cleanup) = self.handles.delete(family) {
                warn!(category = "jobs", family = %family, error = %cleanup, "Failed to remove job handle");
            }
            return Err(e);
        }

        info!(
            category = "jobs",
            family = %family,
            engine = self.engine.name(),
            job_id = %handle.job_id,
            project_id,
            "Submitted job"
        );
        Ok(handle)
    }

    /// Status-check entry point for deferred callbacks.
    ///
    /// Advances the family's job by one step and, while the job is still in
    /// flight, schedules the next check.
    pub async fn check_status<F>(&self, family: JobFamily, finalizer: &F) -> PollOutcome
    where
        F: ResultFinalizer + ?Sized,
    {
        let outcome = self.advance(family, finalizer).await;
        if outcome == PollOutcome::Rescheduled {
            if let Err(e) = self
                .scheduler
                .schedule_callback(family.check_function_name(), self.poll_interval)
            {
                return self.fail(family, None, format!("Failed to schedule status check: {e}"));
            }
        }
        outcome
    }

    /// Poll the engine once and handle terminal states.
    ///
    /// Never schedules anything. Returns `Rescheduled` when the caller should
    /// check again later.
    pub async fn advance<F>(&self, family: JobFamily, finalizer: &F) -> PollOutcome
    where
        F: ResultFinalizer + ?Sized,
    {
        let handle = match self.handles.load(family) {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                warn!(category = "jobs", family = %family, "Status check with no job in flight");
                self.cancel_schedules(family);
                return PollOutcome::NoJob;
            }
            Err(e) => return self.fail(family, None, format!("Failed to load job handle: {e}")),
        };

        let status = match self
            .engine
            .get_job_status(&handle.project_id, &handle.job_id)
            .await
        {
            Ok(status) => status,
            Err(e) => return self.fail(family, Some(&handle), format!("Status check failed: {e}")),
        };

        match &status.state {
            JobState::Pending | JobState::Running => {
                debug!(
                    category = "jobs",
                    family = %family,
                    job_id = %handle.job_id,
                    state = ?status.state,
                    "Job still running"
                );
                PollOutcome::Rescheduled
            }
            JobState::Done => {
                if let Some(message) = status.error_result.clone() {
                    return self.fail(family, Some(&handle), message);
                }
                let results = match self
                    .engine
                    .get_job_results(&handle.project_id, &handle.job_id)
                    .await
                {
                    Ok(results) => results,
                    Err(e) => {
                        return self.fail(family, Some(&handle), format!("Fetching results failed: {e}"));
                    }
                };
                match finalizer.finalize(family, &results) {
                    Ok(summary) => {
                        self.clear(family);
                        info!(
                            category = "jobs",
                            family = %family,
                            job_id = %handle.job_id,
                            rows = results.rows.len(),
                            "Job completed"
                        );
                        PollOutcome::Completed(summary)
                    }
                    Err(e) => self.fail(family, Some(&handle), format!("Finalizing results failed: {e}")),
                }
            }
            JobState::Unknown(state) => {
                self.fail(family, Some(&handle), format!("Unexpected job state: {state}"))
            }
        }
    }

    /// Clear a family's handle and pending checks by hand.
    ///
    /// Returns the handle that was cleared, if any. The engine job itself is
    /// not cancelled.
    pub fn reset(&self, family: JobFamily) -> Result<Option<JobHandle>> {
        reset_family(self.handles.kv(), self.scheduler, family)
    }

    /// Every family with a job in flight.
    pub fn pending_jobs(&self) -> Result<Vec<(JobFamily, JobHandle)>> {
        self.handles.list()
    }

    /// Cancel every pending check for `family`. Other callbacks are untouched.
    pub fn cancel_schedules(&self, family: JobFamily) -> usize {
        cancel_family_checks(self.scheduler, family)
    }

    pub(crate) fn schedule_check(&self, family: JobFamily) -> Result<String> {
        self.scheduler
            .schedule_callback(family.check_function_name(), self.poll_interval)
    }

    fn clear(&self, family: JobFamily) {
        if let Err(e) = self.handles.delete(family) {
            warn!(category = "jobs", family = %family, error = %e, "Failed to delete job handle");
        }
        self.cancel_schedules(family);
    }

    fn fail(&self, family: JobFamily, handle: Option<&JobHandle>, message: String) -> PollOutcome {
        error!(
            category = "jobs",
            family = %family,
            job_id = handle.map_or("-", |h| h.job_id.as_str()),
            error = %message,
            "Job failed"
        );
        self.clear(family);
        PollOutcome::Failed { message }
    }
}

/// Cancel every pending check for `family`. Other callbacks are untouched.
///
/// Returns how many were cancelled. Failures are logged, not returned.
pub fn cancel_family_checks<S: Scheduler + ?Sized>(scheduler: &S, family: JobFamily) -> usize {
    let callbacks = match scheduler.list_scheduled_callbacks() {
        Ok(callbacks) => callbacks,
        Err(e) => {
            warn!(category = "jobs", family = %family, error = %e, "Failed to list scheduled checks");
            return 0;
        }
    };

    let mut cancelled = 0;
    for callback in callbacks
        .iter()
        .filter(|c| c.function_name == family.check_function_name())
    {
        match scheduler.cancel_scheduled_callback(&callback.id) {
            Ok(()) => cancelled += 1,
            Err(e) => warn!(
                category = "jobs",
                family = %family,
                callback_id = %callback.id,
                error = %e,
                "Failed to cancel scheduled check"
            ),
        }
    }
    cancelled
}

/// Clear a family's handle and pending checks without touching the engine.
///
/// Returns the handle that was cleared, if any.
pub fn reset_family<K, S>(kv: &K, scheduler: &S, family: JobFamily) -> Result<Option<JobHandle>>
where
    K: KeyValueStore + ?Sized,
    S: Scheduler + ?Sized,
{
    let handles = JobHandleRepository::new(kv);
    let handle = handles.load(family)?;
    handles.delete(family)?;
    let cancelled = cancel_family_checks(scheduler, family);
    info!(
        category = "jobs",
        family = %family,
        had_job = handle.is_some(),
        cancelled,
        "Reset job family"
    );
    Ok(handle)
}
