use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use watchbot_model::JobStatus;

use crate::job::{Job, JobId};

/// Snapshot of one in-flight job.
#[derive(Clone, Debug)]
pub struct JobEntry {
    pub id: JobId,
    pub message_id: String,
    pub status: JobStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// In-flight job set, keyed by message id.
///
/// This is the only state shared between concurrent jobs. Entries are added
/// when a job is dispatched and removed when its [`Admission`] is dropped,
/// so the count stays accurate even if a job task panics.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<HashMap<String, JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobEntry>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobEntry>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a job unless its message is already in flight.
    pub fn admit(&self, job: &Job) -> Option<Admission> {
        let key = job.message().id.clone();
        let mut map = self.write();
        if map.contains_key(&key) {
            return None;
        }
        let now = SystemTime::now();
        map.insert(
            key.clone(),
            JobEntry {
                id: job.id().clone(),
                message_id: key.clone(),
                status: JobStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        Some(Admission {
            registry: self.clone(),
            key,
        })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Free slots under `limit`.
    pub fn available(&self, limit: usize) -> usize {
        limit.saturating_sub(self.len())
    }

    /// Entries ordered by dispatch time.
    pub fn list(&self) -> Vec<JobEntry> {
        let mut entries: Vec<_> = self.read().values().cloned().collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }

    fn set_status(&self, key: &str, status: JobStatus) {
        if let Some(entry) = self.write().get_mut(key) {
            entry.status = status;
            entry.updated_at = SystemTime::now();
        }
    }

    fn remove(&self, key: &str) {
        self.write().remove(key);
    }
}

/// Proof that a job holds a registry slot; releases it on drop.
pub struct Admission {
    registry: JobRegistry,
    key: String,
}

impl Admission {
    pub fn set_status(&self, status: JobStatus) {
        self.registry.set_status(&self.key, status);
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}
