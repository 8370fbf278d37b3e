//! Latest known snapshot per job.
//!
//! Snapshots are replaced wholesale and handed out as `Arc`s. Epochs come from
//! one store-wide counter: [`JobStore::invalidate`] advances it and drops the
//! id's entry, and an id without an entry reports the counter itself. Writers
//! that captured an older epoch before their request went out are ignored by
//! the `*_if_current` writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{CalibrationRecord, Job, JobId};

#[derive(Debug)]
struct Entry {
    epoch: u64,
    job: Option<Arc<Job>>,
    calibration: Option<Arc<CalibrationRecord>>,
}

impl Entry {
    fn at(epoch: u64) -> Self {
        Self {
            epoch,
            job: None,
            calibration: None,
        }
    }
}

/// Per-id epochs captured by [`JobStore::epochs`].
#[derive(Debug, Clone)]
pub struct EpochSnapshot {
    known: HashMap<JobId, u64>,
    fallback: u64,
}

impl EpochSnapshot {
    pub fn epoch(&self, id: &JobId) -> u64 {
        self.known.get(id).copied().unwrap_or(self.fallback)
    }
}

#[derive(Debug, Default)]
pub struct JobStore {
    entries: RwLock<HashMap<JobId, Entry>>,
    next_epoch: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Entry>> {
        match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Entry>> {
        match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Current epoch for `id`; capture it before issuing a read whose result
    /// goes through [`replace_job_if_current`](Self::replace_job_if_current).
    pub fn epoch(&self, id: &JobId) -> u64 {
        let entries = self.read();
        match entries.get(id) {
            Some(entry) => entry.epoch,
            None => self.next_epoch.load(Ordering::SeqCst),
        }
    }

    /// Epochs of every id at once, for reads that return many jobs.
    pub fn epochs(&self) -> EpochSnapshot {
        let entries = self.read();
        EpochSnapshot {
            known: entries.iter().map(|(id, e)| (id.clone(), e.epoch)).collect(),
            fallback: self.next_epoch.load(Ordering::SeqCst),
        }
    }

    /// Locks the map and yields `id`'s entry if `epoch` is still current for
    /// it. A missing entry is created at `epoch`.
    fn with_current<T>(
        &self,
        id: &JobId,
        epoch: u64,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> Option<T> {
        let mut entries = self.write();
        let current = match entries.get(id) {
            Some(entry) => entry.epoch,
            None => self.next_epoch.load(Ordering::SeqCst),
        };
        if current != epoch {
            log::debug!(
                "Discarding stale write for job {} (epoch {} != {})",
                id,
                epoch,
                current
            );
            return None;
        }
        Some(f(entries.entry(id.clone()).or_insert_with(|| Entry::at(epoch))))
    }

    /// Stores `job` unconditionally.
    pub fn replace_job(&self, job: Job) -> Arc<Job> {
        let job = Arc::new(job);
        let mut entries = self.write();
        let fresh = self.next_epoch.load(Ordering::SeqCst);
        entries
            .entry(job.id.clone())
            .or_insert_with(|| Entry::at(fresh))
            .job = Some(Arc::clone(&job));
        job
    }

    /// Stores `job` only if its id has not been invalidated since `epoch`.
    pub fn replace_job_if_current(
        &self,
        job: impl Into<Arc<Job>>,
        epoch: u64,
    ) -> Option<Arc<Job>> {
        let job = job.into();
        self.with_current(&job.id, epoch, |entry| {
            entry.job = Some(Arc::clone(&job));
        })?;
        Some(job)
    }

    pub fn job(&self, id: &JobId) -> Option<Arc<Job>> {
        self.read().get(id).and_then(|e| e.job.clone())
    }

    /// All stored snapshots, ordered by id.
    pub fn jobs(&self) -> Vec<Arc<Job>> {
        let mut jobs: Vec<Arc<Job>> = self.read().values().filter_map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| natural_order(a.id.as_str(), b.id.as_str()));
        jobs
    }

    /// Stores the calibration record read for `id` unless `id` has been
    /// invalidated since `epoch`. Returns whether it was stored.
    pub fn replace_calibration_if_current(
        &self,
        id: &JobId,
        record: Option<CalibrationRecord>,
        epoch: u64,
    ) -> bool {
        self.with_current(id, epoch, |entry| {
            entry.calibration = record.map(Arc::new);
        })
        .is_some()
    }

    pub fn calibration(&self, id: &JobId) -> Option<Arc<CalibrationRecord>> {
        self.read().get(id).and_then(|e| e.calibration.clone())
    }

    /// Drops everything cached for `id` and returns its new epoch.
    pub fn invalidate(&self, id: &JobId) -> u64 {
        let mut entries = self.write();
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        entries.remove(id);
        log::debug!("Invalidated job {} (epoch {})", id, epoch);
        epoch
    }

    /// Number of ids with cached data.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Numeric ids sort numerically, anything else lexically after them.
fn natural_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    fn job(id: &str, status: JobStatus) -> Job {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "filename": "road.mp4",
            "status": status.to_string(),
        }))
        .unwrap()
    }

    #[test]
    fn test_replace_is_wholesale() {
        let store = JobStore::new();
        let first = store.replace_job(job("1", JobStatus::Uploaded));
        store.replace_job(job("1", JobStatus::Processing));

        assert_eq!(first.status, JobStatus::Uploaded);
        assert_eq!(
            store.job(&JobId::new("1")).unwrap().status,
            JobStatus::Processing
        );
    }

    #[test]
    fn test_invalidate_discards_in_flight_reads() {
        let store = JobStore::new();
        let id = JobId::new("1");
        store.replace_job(job("1", JobStatus::Processing));

        let before = store.epoch(&id);
        let after = store.invalidate(&id);
        assert!(after > before);
        assert!(store.job(&id).is_none());

        assert!(store
            .replace_job_if_current(job("1", JobStatus::Processing), before)
            .is_none());
        assert!(store.job(&id).is_none());

        assert!(store
            .replace_job_if_current(job("1", JobStatus::Completed), after)
            .is_some());
        assert_eq!(store.job(&id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_invalidate_clears_calibration() {
        let store = JobStore::new();
        let id = JobId::new("2");
        let epoch = store.epoch(&id);
        assert!(store.replace_calibration_if_current(
            &id,
            Some(CalibrationRecord::default()),
            epoch
        ));
        assert!(store.calibration(&id).is_some());

        store.invalidate(&id);
        assert!(store.calibration(&id).is_none());
        assert!(!store.replace_calibration_if_current(
            &id,
            Some(CalibrationRecord::default()),
            epoch
        ));
        assert!(store.calibration(&id).is_none());
    }

    #[test]
    fn test_invalidated_ids_leave_no_entry() {
        let store = JobStore::new();
        for n in 1..=50u64 {
            let id = JobId::from(n);
            let epoch = store.epoch(&id);
            store.replace_job_if_current(job(id.as_str(), JobStatus::Completed), epoch);
            store.invalidate(&id);
            assert!(store
                .replace_job_if_current(job(id.as_str(), JobStatus::Completed), epoch)
                .is_none());
        }
        assert!(store.is_empty());
        assert!(store.jobs().is_empty());
    }

    #[test]
    fn test_unknown_id_accepts_write_at_current_epoch() {
        let store = JobStore::new();
        store.invalidate(&JobId::new("1"));

        let id = JobId::new("9");
        let epoch = store.epoch(&id);
        assert!(store
            .replace_job_if_current(job("9", JobStatus::Uploaded), epoch)
            .is_some());
        assert_eq!(store.epoch(&id), epoch);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_jobs_ordered_by_id() {
        let store = JobStore::new();
        for id in ["10", "2", "abc", "1"] {
            store.replace_job(job(id, JobStatus::Uploaded));
        }
        let ids: Vec<String> = store.jobs().iter().map(|j| j.id.to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "10", "abc"]);
    }
}
