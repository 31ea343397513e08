//! In-memory job store.
//!
//! Two lock levels: the outer map lock is held only for lookup and
//! insertion, and each job sits behind its own `RwLock`, so updates to one
//! job never serialize polls of another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::job::Job;

/// Shared handle to one job record.
pub type JobHandle = Arc<RwLock<Job>>;

/// Keeps every known job, including finished ones until they expire.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job, returning its handle.
    pub async fn insert(&self, job: Job) -> JobHandle {
        let id = job.id;
        let handle = Arc::new(RwLock::new(job));
        self.jobs.write().await.insert(id, Arc::clone(&handle));
        handle
    }

    /// Look up a job handle.
    pub async fn get(&self, id: Uuid) -> Option<JobHandle> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Clone the current state of a job. Expired or unknown ids fail with
    /// `JobError::NotFound`.
    pub async fn snapshot(&self, id: Uuid) -> Result<Job, JobError> {
        let handle = self.get(id).await.ok_or(JobError::NotFound { id })?;
        let job = handle.read().await;
        Ok(job.clone())
    }

    /// Remove a job outright.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.jobs.write().await.remove(&id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drop finished jobs whose terminal timestamp is older than `ttl`.
    /// Queued and running jobs are never touched. Returns how many were
    /// removed.
    pub async fn expire_finished(&self, ttl: Duration) -> usize {
        // A TTL outside chrono's range means nothing can be old enough.
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let mut expired = Vec::new();
        {
            let jobs = self.jobs.read().await;
            for (id, handle) in jobs.iter() {
                let job = handle.read().await;
                if let Some(completed_at) = job.completed_at {
                    if job.status.is_terminal() && completed_at < cutoff {
                        expired.push(*id);
                    }
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut jobs = self.jobs.write().await;
        let mut removed = 0;
        for id in expired {
            if jobs.remove(&id).is_some() {
                debug!(job_id = %id, "expired finished job");
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobStatus;
    use crate::workflow::{WorkflowPlan, WorkflowStep};

    fn job() -> Job {
        Job::new(WorkflowPlan::new(vec![WorkflowStep::new(1, "echo", "out")]))
    }

    #[tokio::test]
    async fn test_insert_and_snapshot() {
        let store = JobStore::new();
        let id = {
            let job = job();
            let id = job.id;
            store.insert(job).await;
            id
        };

        let snapshot = store.snapshot(id).await.unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(snapshot.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_snapshot_unknown_id() {
        let store = JobStore::new();
        let err = store.snapshot(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, JobError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_expire_finished_removes_only_old_terminal_jobs() {
        let store = JobStore::new();

        let mut finished = job();
        finished.transition(JobStatus::Running).unwrap();
        finished.transition(JobStatus::Completed).unwrap();
        let finished_id = finished.id;
        store.insert(finished).await;

        let queued_id = {
            let job = job();
            let id = job.id;
            store.insert(job).await;
            id
        };

        // Zero TTL: anything terminal is already past the cutoff.
        let removed = store.expire_finished(Duration::ZERO).await;
        assert_eq!(removed, 1);
        assert!(store.get(finished_id).await.is_none());
        assert!(store.get(queued_id).await.is_some());
    }

    #[tokio::test]
    async fn test_expire_finished_respects_ttl() {
        let store = JobStore::new();
        let mut finished = job();
        finished.transition(JobStatus::Running).unwrap();
        finished.transition(JobStatus::Completed).unwrap();
        store.insert(finished).await;

        // A generous TTL keeps freshly finished jobs pollable.
        let removed = store.expire_finished(Duration::from_secs(3600)).await;
        assert_eq!(removed, 0);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_expire_finished_tolerates_oversized_ttl() {
        let store = JobStore::new();
        let mut finished = job();
        finished.transition(JobStatus::Running).unwrap();
        finished.transition(JobStatus::Completed).unwrap();
        store.insert(finished).await;

        // Past chrono's representable range the TTL means "never expire".
        let removed = store.expire_finished(Duration::from_secs(u64::MAX)).await;
        assert_eq!(removed, 0);
        assert_eq!(store.count().await, 1);
    }
}
