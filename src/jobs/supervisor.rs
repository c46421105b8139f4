//! In-process job supervision.
//!
//! When the process can stay alive while a job runs, [`JobSupervisor`] polls
//! the family itself with `tokio::time::sleep` between checks instead of
//! going through deferred callbacks. A single-flight set keyed by family
//! guarantees at most one poller per family inside the process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::finalize::ResultFinalizer;
use crate::host::{KeyValueStore, Scheduler};

use super::engine::QueryEngine;
use super::orchestrator::JobOrchestrator;
use super::types::{JobFamily, PollOutcome};

/// Single-flight registry of supervised families.
#[derive(Debug, Clone, Default)]
pub struct JobSupervisor {
    in_flight: Arc<Mutex<HashSet<JobFamily>>>,
}

/// Proof that a family is being supervised. Releases the family on drop.
#[derive(Debug)]
pub struct FlightGuard {
    family: JobFamily,
    in_flight: Arc<Mutex<HashSet<JobFamily>>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.family);
    }
}

impl JobSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `family` for this caller.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySupervised` when another caller holds the family.
    pub fn try_acquire(&self, family: JobFamily) -> Result<FlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(family) {
            return Err(Error::AlreadySupervised {
                family: family.to_string(),
            });
        }
        Ok(FlightGuard {
            family,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Whether `family` is currently supervised.
    #[must_use]
    pub fn is_supervised(&self, family: JobFamily) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&family)
    }

    /// Poll `family` until it reaches a terminal state.
    ///
    /// Pending deferred checks for the family are cancelled first, since this
    /// call owns the polling. With `max_polls`, supervision stops after that
    /// many in-flight checks and hands the job back to a deferred check.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySupervised` when the family is already being watched,
    /// or the scheduler error when handing the job back fails.
    pub async fn watch<K, S, E, F>(
        &self,
        orchestrator: &JobOrchestrator<'_, K, S, E>,
        family: JobFamily,
        finalizer: &F,
        max_polls: Option<usize>,
    ) -> Result<PollOutcome>
    where
        K: KeyValueStore + ?Sized,
        S: Scheduler + ?Sized,
        E: QueryEngine,
        F: ResultFinalizer + ?Sized,
    {
        let _guard = self.try_acquire(family)?;
        let cancelled = orchestrator.cancel_schedules(family);
        debug!(category = "jobs", family = %family, cancelled, "Supervising job");

        let mut polls = 0;
        loop {
            let outcome = orchestrator.advance(family, finalizer).await;
            if outcome != PollOutcome::Rescheduled {
                return Ok(outcome);
            }

            polls += 1;
            if max_polls.is_some_and(|max| polls >= max) {
                orchestrator.schedule_check(family)?;
                info!(
                    category = "jobs",
                    family = %family,
                    polls,
                    "Still running; handed back to deferred checks"
                );
                return Ok(outcome);
            }
            tokio::time::sleep(orchestrator.poll_interval()).await;
        }
    }
}
