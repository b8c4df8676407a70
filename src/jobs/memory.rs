//! In-memory job store.
//!
//! Useful for testing and for one-shot local runs that don't need history.

use super::{Job, JobLogEntry, JobStatus, JobStore};
use crate::error::{PodscribeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Inner {
    /// Jobs in insertion order.
    jobs: Vec<Job>,
    logs: HashMap<String, Vec<JobLogEntry>>,
}

/// In-memory job store.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| PodscribeError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| PodscribeError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> Result<()> {
        let mut inner = self.write()?;
        if inner.jobs.iter().any(|j| j.job_id == job.job_id) {
            return Err(PodscribeError::Store(format!("Duplicate job id: {}", job.job_id)));
        }
        inner.jobs.push(job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        let mut inner = self.write()?;
        match inner.jobs.iter_mut().find(|j| j.job_id == job.job_id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(PodscribeError::NotFound(job.job_id.clone())),
        }
    }

    async fn find_job(&self, job_id: &str) -> Result<Option<Job>> {
        let inner = self.read()?;
        Ok(inner.jobs.iter().find(|j| j.job_id == job_id).cloned())
    }

    async fn delete_job(&self, job_id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let before = inner.jobs.len();
        inner.jobs.retain(|j| j.job_id != job_id);
        inner.logs.remove(job_id);
        Ok(inner.jobs.len() < before)
    }

    async fn append_log(&self, entry: &JobLogEntry) -> Result<()> {
        let mut inner = self.write()?;
        if !inner.jobs.iter().any(|j| j.job_id == entry.job_id) {
            return Err(PodscribeError::NotFound(entry.job_id.clone()));
        }
        inner
            .logs
            .entry(entry.job_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>> {
        let inner = self.read()?;
        let mut logs = inner.logs.get(job_id).cloned().unwrap_or_default();
        // Stable sort keeps insertion order for equal timestamps.
        logs.sort_by_key(|e| e.timestamp);
        Ok(logs)
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let inner = self.read()?;
        Ok(inner
            .jobs
            .iter()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Job>> {
        let inner = self.read()?;
        let mut jobs = inner.jobs.clone();
        jobs.reverse();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
