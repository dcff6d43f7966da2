//! Job registry.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;
use uuid::Uuid;

use super::model::{Job, JobTransition};
use crate::{Error, Result};

/// Store of upload jobs shared by the API handlers and the running transfers.
///
/// Every call is a short synchronous operation; implementations must never
/// make a caller wait on transfer I/O.
pub trait JobRegistry: Send + Sync {
    /// Register a fresh `queued` job under a new unique id.
    fn create_job(&self) -> Result<Job>;

    /// Snapshot of a job.
    fn get_job(&self, id: &str) -> Result<Job>;

    /// Apply `transition` atomically and return the updated snapshot.
    fn update_job(&self, id: &str, transition: JobTransition) -> Result<Job>;

    /// Number of jobs tracked.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-lifetime registry kept in memory.
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct InMemoryJobRegistry {
    jobs: DashMap<String, Job>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobRegistry for InMemoryJobRegistry {
    fn create_job(&self) -> Result<Job> {
        loop {
            let job = Job::new(Uuid::new_v4().to_string());
            // Ids are never reused.
            if let Entry::Vacant(slot) = self.jobs.entry(job.id.clone()) {
                slot.insert(job.clone());
                debug!(job_id = %job.id, "Job registered");
                return Ok(job);
            }
        }
    }

    fn get_job(&self, id: &str) -> Result<Job> {
        self.jobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found("Job", id))
    }

    fn update_job(&self, id: &str, transition: JobTransition) -> Result<Job> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;
        entry.apply(transition)?;
        Ok(entry.value().clone())
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}
