//! Deferred callback dispatch.
//!
//! Hosts that re-enter the process on a timer call [`run_due_callbacks`],
//! which takes every due callback off the scheduler and routes job checks to
//! the orchestrator. Callbacks this module does not own are put back.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::finalize::ResultFinalizer;
use crate::host::{KeyValueStore, ScheduledCallback, Scheduler};

use super::engine::QueryEngine;
use super::orchestrator::JobOrchestrator;
use super::types::{JobFamily, PollOutcome};

/// One dispatched callback and what it led to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRun {
    pub callback_id: String,
    pub function_name: String,
    pub family: JobFamily,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TriggerRun {
    fn new(callback: &ScheduledCallback, family: JobFamily, outcome: &PollOutcome) -> Self {
        let message = match outcome {
            PollOutcome::Failed { message } => Some(message.clone()),
            PollOutcome::Completed(summary) => Some(summary.message.clone()),
            PollOutcome::NoJob | PollOutcome::Rescheduled => None,
        };
        Self {
            callback_id: callback.id.clone(),
            function_name: callback.function_name.clone(),
            family,
            outcome: outcome.label().to_string(),
            message,
        }
    }
}

/// Run every job check due at or before `now`.
///
/// Several due checks for the same family collapse into one status check.
///
/// # Errors
///
/// Returns an error only if the scheduler cannot be read. Failures inside a
/// check end up in that check's outcome, and a callback that cannot be put
/// back is logged and dropped without stopping the remaining checks.
pub async fn run_due_callbacks<K, S, E, F>(
    orchestrator: &JobOrchestrator<'_, K, S, E>,
    scheduler: &S,
    finalizer: &F,
    now: DateTime<Utc>,
) -> Result<Vec<TriggerRun>>
where
    K: KeyValueStore + ?Sized,
    S: Scheduler + ?Sized,
    E: QueryEngine,
    F: ResultFinalizer + ?Sized,
{
    let due = scheduler.take_due_callbacks(now)?;
    let mut runs = Vec::new();
    let mut checked: Vec<JobFamily> = Vec::new();

    for callback in &due {
        let Some(family) = JobFamily::from_check_function(&callback.function_name) else {
            warn!(
                category = "triggers",
                function = %callback.function_name,
                "Unknown callback; rescheduling untouched"
            );
            if let Err(e) =
                scheduler.schedule_callback(&callback.function_name, std::time::Duration::ZERO)
            {
                warn!(
                    category = "triggers",
                    function = %callback.function_name,
                    error = %e,
                    "Failed to put back unknown callback"
                );
            }
            continue;
        };
        if checked.contains(&family) {
            continue;
        }
        checked.push(family);

        let outcome = orchestrator.check_status(family, finalizer).await;
        info!(
            category = "triggers",
            family = %family,
            callback_id = %callback.id,
            outcome = outcome.label(),
            "Ran deferred check"
        );
        runs.push(TriggerRun::new(callback, family, &outcome));
    }

    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::orchestrator::tests::{CountingFinalizer, RecordingScheduler, ScriptedEngine};
    use crate::jobs::types::JobStatus;
    use crate::storage::SqliteStorage;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispatches_due_checks() {
        let kv = SqliteStorage::open_memory().unwrap();
        let scheduler = RecordingScheduler::new();
        let engine = ScriptedEngine::new(vec![JobStatus::running(), JobStatus::done()]);
        let finalizer = CountingFinalizer::default();
        let orchestrator =
            JobOrchestrator::new(&kv, &scheduler, &engine).with_poll_interval(Duration::ZERO);

        orchestrator.submit(JobFamily::Heartbeat, "acme", "SELECT 1").await.unwrap();
        let later = Utc::now() + ChronoDuration::seconds(1);

        let first = run_due_callbacks(&orchestrator, &scheduler, &finalizer, later).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].outcome, "rescheduled");

        let second = run_due_callbacks(&orchestrator, &scheduler, &finalizer, later).await.unwrap();
        assert_eq!(second[0].outcome, "completed");
        assert_eq!(finalizer.calls.borrow().len(), 1);

        let third = run_due_callbacks(&orchestrator, &scheduler, &finalizer, later).await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn test_leaves_foreign_callbacks_alone() {
        let kv = SqliteStorage::open_memory().unwrap();
        let scheduler = RecordingScheduler::new();
        let engine = ScriptedEngine::new(Vec::new());
        let finalizer = CountingFinalizer::default();
        let orchestrator = JobOrchestrator::new(&kv, &scheduler, &engine);

        scheduler.schedule_callback("sync.nightly", Duration::ZERO).unwrap();
        let later = Utc::now() + ChronoDuration::seconds(1);
        let runs = run_due_callbacks(&orchestrator, &scheduler, &finalizer, later).await.unwrap();

        assert!(runs.is_empty());
        assert_eq!(scheduler.pending("sync.nightly"), 1);
        assert_eq!(engine.status_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_put_back_does_not_strand_job_checks() {
        let kv = SqliteStorage::open_memory().unwrap();
        let scheduler = RecordingScheduler::new();
        let engine = ScriptedEngine::new(vec![JobStatus::running()]);
        let finalizer = CountingFinalizer::default();
        let orchestrator =
            JobOrchestrator::new(&kv, &scheduler, &engine).with_poll_interval(Duration::ZERO);

        scheduler.schedule_callback("sync.nightly", Duration::ZERO).unwrap();
        orchestrator.submit(JobFamily::Heartbeat, "acme", "SELECT 1").await.unwrap();
        scheduler.reject("sync.nightly");

        let later = Utc::now() + ChronoDuration::seconds(1);
        let runs = run_due_callbacks(&orchestrator, &scheduler, &finalizer, later).await.unwrap();

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].family, JobFamily::Heartbeat);
        assert_eq!(runs[0].outcome, "rescheduled");
        assert_eq!(scheduler.pending("heartbeat.check_status"), 1);
        assert_eq!(scheduler.pending("sync.nightly"), 0);
        assert_eq!(orchestrator.pending_jobs().unwrap().len(), 1);
    }
}
