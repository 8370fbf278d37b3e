//! Adaptive status polling, one task per watched job.
//!
//! A poll task reads the job, applies the snapshot, and only then sleeps for
//! the interval chosen from the fresh status, so reads for one id never
//! overlap. Watchers of the same id share the task through a reference count;
//! when the last [`PollSubscription`] goes away the task is aborted, which
//! cancels the timer and any in-flight read together.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::AbortHandle;
use tracing::Instrument;

use super::policy::{NextPoll, PollPolicy};
use crate::broadcast::{JobStore, SyncEvent, SyncEventBroadcaster};
use crate::gateway::JobGateway;
use crate::models::{Job, JobId, JobStatus};

/// Polling state of one job id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Polling,
    Stopped,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Polling => write!(f, "polling"),
            SyncState::Stopped => write!(f, "stopped"),
        }
    }
}

struct Watch {
    /// Identifies this table entry; subscriptions release against it.
    key: u64,
    /// Identifies the running task; snapshots from other tasks are dropped.
    generation: u64,
    refs: usize,
    /// `None` once the job reached a terminal status.
    task: Option<AbortHandle>,
}

struct Inner {
    gateway: JobGateway,
    store: Arc<JobStore>,
    policy: PollPolicy,
    events: SyncEventBroadcaster,
    watches: Mutex<HashMap<JobId, Watch>>,
    /// Ids whose polling ended with a terminal status after every watcher left.
    finished: Mutex<HashSet<JobId>>,
    counter: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Synchronizer lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl Inner {
    fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, id: &JobId, generation: u64) -> bool {
        lock(&self.watches)
            .get(id)
            .is_some_and(|w| w.task.is_some() && w.generation == generation)
    }

    /// Applies a snapshot if `generation` still owns the id. The check and the
    /// store write happen under the watch-table lock.
    fn apply(&self, job: Job, generation: u64, epoch: u64) -> Result<Option<Arc<Job>>, ()> {
        let watches = lock(&self.watches);
        match watches.get(&job.id) {
            Some(w) if w.task.is_some() && w.generation == generation => {}
            _ => return Err(()),
        }
        Ok(self.store.replace_job_if_current(job, epoch))
    }

    fn finish(&self, id: &JobId, generation: u64, status: JobStatus) {
        let mut watches = lock(&self.watches);
        if let Some(w) = watches.get_mut(id) {
            if w.generation == generation {
                w.task = None;
                log::info!("Job {} is {}, polling stopped", id, status);
                self.events.send(SyncEvent::Stopped {
                    job_id: id.clone(),
                    status,
                });
            }
        }
    }

    fn release(&self, id: &JobId, key: u64) {
        let mut watches = lock(&self.watches);
        let Some(w) = watches.get_mut(id) else {
            return;
        };
        if w.key != key {
            return;
        }

        w.refs = w.refs.saturating_sub(1);
        if w.refs > 0 {
            return;
        }

        if let Some(w) = watches.remove(id) {
            match w.task {
                Some(task) => {
                    task.abort();
                    log::debug!("Last watcher of job {} left, polling cancelled", id);
                    self.events.send(SyncEvent::Cancelled { job_id: id.clone() });
                }
                None => {
                    lock(&self.finished).insert(id.clone());
                }
            }
        }
    }
}

/// Keeps job snapshots fresh while someone is interested in them.
///
/// Cloning is cheap and clones share the same watch table.
#[derive(Clone)]
pub struct StatusSynchronizer {
    inner: Arc<Inner>,
}

impl StatusSynchronizer {
    pub fn new(
        gateway: JobGateway,
        store: Arc<JobStore>,
        policy: PollPolicy,
        event_capacity: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                store,
                policy,
                events: SyncEventBroadcaster::new(event_capacity.max(1)),
                watches: Mutex::new(HashMap::new()),
                finished: Mutex::new(HashSet::new()),
                counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> PollPolicy {
        self.inner.policy
    }

    /// Starts (or joins) polling for `id`. A job whose polling already
    /// stopped is polled again. Must be called from within a tokio runtime.
    pub fn watch(&self, id: &JobId) -> PollSubscription {
        let inner = &self.inner;
        let mut watches = lock(&inner.watches);
        let events = inner.events.subscribe();

        let key = match watches.get_mut(id) {
            Some(w) if w.task.is_some() => {
                w.refs += 1;
                log::debug!("Job {} already polled, {} watchers", id, w.refs);
                w.key
            }
            Some(w) => {
                w.refs += 1;
                w.generation = inner.next_id();
                w.task = Some(spawn_poll(Arc::clone(inner), id.clone(), w.generation));
                log::debug!("Restarting polling for job {}", id);
                w.key
            }
            None => {
                let key = inner.next_id();
                let generation = inner.next_id();
                let task = spawn_poll(Arc::clone(inner), id.clone(), generation);
                watches.insert(
                    id.clone(),
                    Watch {
                        key,
                        generation,
                        refs: 1,
                        task: Some(task),
                    },
                );
                log::debug!("Started polling job {}", id);
                key
            }
        };
        lock(&inner.finished).remove(id);

        PollSubscription {
            inner: Arc::clone(inner),
            job_id: id.clone(),
            key,
            events,
            done: false,
        }
    }

    /// Cancels polling for `id` regardless of how many watchers remain.
    pub fn stop(&self, id: &JobId) {
        let removed = lock(&self.inner.watches).remove(id);
        lock(&self.inner.finished).remove(id);

        if let Some(w) = removed {
            if let Some(task) = w.task {
                task.abort();
            }
            log::debug!("Polling for job {} stopped explicitly", id);
            self.inner
                .events
                .send(SyncEvent::Cancelled { job_id: id.clone() });
        }
    }

    pub fn state(&self, id: &JobId) -> SyncState {
        if let Some(w) = lock(&self.inner.watches).get(id) {
            return match w.task {
                Some(_) => SyncState::Polling,
                None => SyncState::Stopped,
            };
        }
        if lock(&self.inner.finished).contains(id) {
            SyncState::Stopped
        } else {
            SyncState::Idle
        }
    }

    /// Ids with a running poll task.
    pub fn polling_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = lock(&self.inner.watches)
            .iter()
            .filter(|(_, w)| w.task.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn latest(&self, id: &JobId) -> Option<Arc<Job>> {
        self.inner.store.job(id)
    }

    /// Events for every watched id.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }
}

fn spawn_poll(inner: Arc<Inner>, id: JobId, generation: u64) -> AbortHandle {
    let span = tracing::info_span!("sync.poll", job_id = %id, generation);
    tokio::spawn(poll_loop(inner, id, generation).instrument(span)).abort_handle()
}

async fn poll_loop(inner: Arc<Inner>, id: JobId, generation: u64) {
    let mut last_interval: Option<Duration> = None;

    loop {
        let epoch = inner.store.epoch(&id);

        match inner.gateway.get(&id).await {
            Ok(job) => {
                let status = job.status;
                let progress = job.progress;

                match inner.apply(job, generation, epoch) {
                    Ok(Some(snapshot)) => {
                        tracing::debug!(%status, progress, "snapshot applied");
                        inner.events.send(SyncEvent::Snapshot(snapshot));
                    }
                    Ok(None) => {
                        tracing::debug!(%status, "snapshot predates an invalidation, reading again");
                        continue;
                    }
                    Err(()) => return,
                }

                match inner.policy.next(status) {
                    NextPoll::Stop => {
                        inner.finish(&id, generation, status);
                        return;
                    }
                    NextPoll::After(interval) => {
                        last_interval = Some(interval);
                        tokio::time::sleep(interval).await;
                    }
                }
            }
            Err(e) => {
                if !inner.is_current(&id, generation) {
                    return;
                }
                let retry_in = inner.policy.retry_after(last_interval);
                tracing::warn!(error = %e, retry_ms = retry_in.as_millis() as u64, "poll failed");
                inner.events.send(SyncEvent::PollFailed {
                    job_id: id.clone(),
                    error: e.user_message(),
                    retry_in,
                });
                tokio::time::sleep(retry_in).await;
            }
        }
    }
}

/// Interest in one job's status. Dropping it releases the interest; the poll
/// task is cancelled when no subscription for the id remains.
pub struct PollSubscription {
    inner: Arc<Inner>,
    job_id: JobId,
    key: u64,
    events: broadcast::Receiver<SyncEvent>,
    done: bool,
}

impl PollSubscription {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn latest(&self) -> Option<Arc<Job>> {
        self.inner.store.job(&self.job_id)
    }

    /// Next event for this job. Returns `None` after polling stopped or was
    /// cancelled.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        if self.done {
            return None;
        }
        loop {
            match self.events.recv().await {
                Ok(event) if event.job_id() == &self.job_id => {
                    if event.is_final() {
                        self.done = true;
                    }
                    return Some(event);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "Watcher of job {} fell behind, {} events skipped",
                        self.job_id,
                        skipped
                    );
                }
                Err(RecvError::Closed) => {
                    self.done = true;
                    return None;
                }
            }
        }
    }

    /// Waits until polling ends and returns the last stored snapshot.
    pub async fn finished(&mut self) -> Option<Arc<Job>> {
        while self.next_event().await.is_some() {}
        self.latest()
    }
}

impl Drop for PollSubscription {
    fn drop(&mut self) {
        self.inner.release(&self.job_id, self.key);
    }
}

impl std::fmt::Debug for PollSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollSubscription")
            .field("job_id", &self.job_id)
            .field("done", &self.done)
            .finish()
    }
}

/// The single job a detail view is currently showing. Focusing another id
/// releases the previous one.
pub struct FocusedJob {
    sync: StatusSynchronizer,
    current: Option<PollSubscription>,
}

impl FocusedJob {
    pub fn new(sync: StatusSynchronizer) -> Self {
        Self {
            sync,
            current: None,
        }
    }

    pub fn job_id(&self) -> Option<&JobId> {
        self.current.as_ref().map(|s| s.job_id())
    }

    pub fn focus(&mut self, id: &JobId) -> &mut PollSubscription {
        if self.job_id() != Some(id) {
            // Release the old id first
            self.current = None;
            self.current = Some(self.sync.watch(id));
        }
        self.current.get_or_insert_with(|| self.sync.watch(id))
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn subscription(&mut self) -> Option<&mut PollSubscription> {
        self.current.as_mut()
    }
}
