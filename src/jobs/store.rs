//! Job Store contract and the in-memory implementation.

use crate::jobs::types::{Job, JobStatus};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors emitted by job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// A record with the same job id already exists.
    #[error("job `{0}` already exists")]
    DuplicateJob(Uuid),
    /// The backing store rejected or lost the operation.
    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

/// Durable record keeper for [`Job`] entities.
///
/// The store persists state decided elsewhere; it never computes the next
/// status itself. The orchestrator is the only writer for a given job id
/// during its run, so no per-record locking is required beyond the map.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` record. Fails with [`JobStoreError::DuplicateJob`]
    /// when the id is taken, leaving the existing record unmodified.
    async fn create(
        &self,
        job_id: Uuid,
        filename: &str,
        owner: Option<String>,
    ) -> Result<(), JobStoreError>;

    /// Overwrite status/step/error and bump the updated-at stamp.
    ///
    /// Returns `Ok(false)` when no record exists for `job_id`; a missing job
    /// during update is a benign race, not a hard error, and no record is
    /// created.
    async fn update(
        &self,
        job_id: Uuid,
        status: JobStatus,
        step: Option<String>,
        error: Option<String>,
    ) -> Result<bool, JobStoreError>;

    /// Point lookup by job id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError>;
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<Uuid, Job>,
    by_owner: HashMap<String, HashSet<Uuid>>,
    by_status: HashMap<JobStatus, HashSet<Uuid>>,
}

impl StoreInner {
    fn reindex_status(&mut self, job_id: Uuid, from: JobStatus, to: JobStatus) {
        if from == to {
            return;
        }
        if let Some(ids) = self.by_status.get_mut(&from) {
            ids.remove(&job_id);
        }
        self.by_status.entry(to).or_default().insert(job_id);
    }
}

/// In-memory job store keyed by job id, with owner and status secondary
/// indexes maintained on every write so listing queries stay cheap.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Job ids currently recorded for the given owner.
    pub async fn jobs_for_owner(&self, owner: &str) -> Vec<Uuid> {
        let inner = self.inner.read().await;
        inner
            .by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Job ids currently in the given status.
    pub async fn jobs_with_status(&self, status: JobStatus) -> Vec<Uuid> {
        let inner = self.inner.read().await;
        inner
            .by_status
            .get(&status)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(
        &self,
        job_id: Uuid,
        filename: &str,
        owner: Option<String>,
    ) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job_id) {
            return Err(JobStoreError::DuplicateJob(job_id));
        }
        let job = Job::new(job_id, filename, owner.clone());
        if let Some(owner) = owner {
            inner.by_owner.entry(owner).or_default().insert(job_id);
        }
        inner
            .by_status
            .entry(JobStatus::Pending)
            .or_default()
            .insert(job_id);
        inner.jobs.insert(job_id, job);
        Ok(())
    }

    async fn update(
        &self,
        job_id: Uuid,
        status: JobStatus,
        step: Option<String>,
        error: Option<String>,
    ) -> Result<bool, JobStoreError> {
        let mut inner = self.inner.write().await;
        let Some(mut job) = inner.jobs.remove(&job_id) else {
            return Ok(false);
        };
        let previous = job.status;
        job.set_status(status, step, error);
        inner.jobs.insert(job_id, job);
        inner.reindex_status(job_id, previous, status);
        Ok(true)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>, JobStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&job_id).cloned())
    }
}
