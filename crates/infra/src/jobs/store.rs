//! Job persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending (or retry-due) job that is ready at `now`.
    /// The claimed job is handed out in `Running` status.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError>;

    fn list_by_status(&self, status: &JobStatus) -> Result<Vec<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String, now: DateTime<Utc>)
    -> Result<(), JobStoreError>;

    fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending for another round.
    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    dead_letters: Vec<DeadLetterEntry>,
}

/// Hash-map backed store for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let id = job.id;
        self.inner.write().unwrap().jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.inner.read().unwrap().jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        if !inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        let candidate = inner
            .jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready(now)
            })
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        job.mark_running(now);
        Ok(Some(job.clone()))
    }

    fn list_by_status(&self, status: &JobStatus) -> Result<Vec<Job>, JobStoreError> {
        let inner = self.inner.read().unwrap();
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| {
                std::mem::discriminant(&j.status) == std::mem::discriminant(status)
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    fn dead_letter(
        &self,
        job: Job,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), JobStoreError> {
        self.inner.write().unwrap().dead_letters.push(DeadLetterEntry {
            job,
            dead_lettered_at: now,
            reason,
        });
        Ok(())
    }

    fn list_dead_letters(&self) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        Ok(self.inner.read().unwrap().dead_letters.clone())
    }

    fn retry_dead_letter(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Job, JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        let position = inner
            .dead_letters
            .iter()
            .position(|e| e.job.id == job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        let mut job = inner.dead_letters.remove(position).job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = now;
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }
}
