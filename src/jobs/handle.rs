//! Persisted job handles.
//!
//! A family's handle lives under three keys: `<FAMILY>_JOB_ID`,
//! `<FAMILY>_PROJECT_ID` and `<FAMILY>_SUBMITTED_AT`. The job id key is
//! written last and deleted first, so its presence marks a complete handle.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::Result;
use crate::host::KeyValueStore;
use crate::jobs::types::{JobFamily, JobHandle};

#[must_use]
pub fn job_id_key(family: JobFamily) -> String {
    format!("{}_JOB_ID", family.key_prefix())
}

#[must_use]
pub fn project_id_key(family: JobFamily) -> String {
    format!("{}_PROJECT_ID", family.key_prefix())
}

#[must_use]
pub fn submitted_at_key(family: JobFamily) -> String {
    format!("{}_SUBMITTED_AT", family.key_prefix())
}

/// Job handle repository over any key/value store.
pub struct JobHandleRepository<'a, K: KeyValueStore + ?Sized> {
    kv: &'a K,
}

impl<'a, K: KeyValueStore + ?Sized> JobHandleRepository<'a, K> {
    #[must_use]
    pub fn new(kv: &'a K) -> Self {
        Self { kv }
    }

    pub(crate) fn kv(&self) -> &'a K {
        self.kv
    }

    /// Load the family's handle, `None` when no job is in flight.
    ///
    /// A job id without a project id is incomplete and reads as absent.
    pub fn load(&self, family: JobFamily) -> Result<Option<JobHandle>> {
        let Some(job_id) = self.kv.get(&job_id_key(family))?.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let Some(project_id) = self.kv.get(&project_id_key(family))?.filter(|p| !p.is_empty())
        else {
            warn!(
                category = "jobs",
                family = %family,
                job_id = %job_id,
                "Job handle has no project id; treating as absent"
            );
            return Ok(None);
        };
        let submitted_at = self
            .kv
            .get(&submitted_at_key(family))?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Some(JobHandle {
            job_id,
            project_id,
            submitted_at,
        }))
    }

    /// Persist a handle, replacing any previous one.
    pub fn save(&self, family: JobFamily, handle: &JobHandle) -> Result<()> {
        self.kv.set(&project_id_key(family), &handle.project_id)?;
        if let Some(at) = handle.submitted_at {
            self.kv.set(&submitted_at_key(family), &at.to_rfc3339())?;
        }
        self.kv.set(&job_id_key(family), &handle.job_id)
    }

    /// Delete the family's handle. Deleting an absent handle is a no-op.
    pub fn delete(&self, family: JobFamily) -> Result<()> {
        self.kv.delete(&job_id_key(family))?;
        self.kv.delete(&project_id_key(family))?;
        self.kv.delete(&submitted_at_key(family))
    }

    /// Every family that currently has a handle.
    pub fn list(&self) -> Result<Vec<(JobFamily, JobHandle)>> {
        let mut handles = Vec::new();
        for family in JobFamily::ALL {
            if let Some(handle) = self.load(family)? {
                handles.push((family, handle));
            }
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn handle(job_id: &str) -> JobHandle {
        JobHandle {
            job_id: job_id.to_string(),
            project_id: "acme-analytics".to_string(),
            submitted_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_save_load_delete() {
        let storage = SqliteStorage::open_memory().unwrap();
        let repo = JobHandleRepository::new(&storage);

        assert!(repo.load(JobFamily::Heartbeat).unwrap().is_none());

        let saved = handle("job_abc");
        repo.save(JobFamily::Heartbeat, &saved).unwrap();
        let loaded = repo.load(JobFamily::Heartbeat).unwrap().unwrap();
        assert_eq!(loaded.job_id, "job_abc");
        assert_eq!(loaded.project_id, "acme-analytics");
        assert!(loaded.submitted_at.is_some());

        // Other families are independent
        assert!(repo.load(JobFamily::DataInventory).unwrap().is_none());

        repo.delete(JobFamily::Heartbeat).unwrap();
        repo.delete(JobFamily::Heartbeat).unwrap();
        assert!(repo.load(JobFamily::Heartbeat).unwrap().is_none());
        assert!(storage.get("HEARTBEAT_PROJECT_ID").unwrap().is_none());
    }

    #[test]
    fn test_incomplete_handle_reads_as_absent() {
        let storage = SqliteStorage::open_memory().unwrap();
        storage.set("SMART_DISCOVERY_JOB_ID", "job_orphan").unwrap();

        let repo = JobHandleRepository::new(&storage);
        assert!(repo.load(JobFamily::SmartDiscovery).unwrap().is_none());
    }

    #[test]
    fn test_list_handles() {
        let storage = SqliteStorage::open_memory().unwrap();
        let repo = JobHandleRepository::new(&storage);
        repo.save(JobFamily::DataInventory, &handle("job_1")).unwrap();
        repo.save(JobFamily::Heartbeat, &handle("job_2")).unwrap();

        let families: Vec<JobFamily> = repo.list().unwrap().into_iter().map(|(f, _)| f).collect();
        assert_eq!(families, vec![JobFamily::Heartbeat, JobFamily::DataInventory]);
    }
}
