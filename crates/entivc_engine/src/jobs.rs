//! Asynchronous job tracking.
//!
//! Create and load requests are fire-and-forget: the submitter gets a
//! request id immediately and polls for status, because remote-store
//! commits and multi-entity imports outlive typical request timeouts.
//! The job keeps running after a polling client gives up; cancellation
//! is not supported.

use entivc_types::{EntityType, JobStatus, RequestId, TenantId};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

enum JobSlot<T> {
    Running,
    Finished { result: T, finished_at: Instant },
}

struct TrackerShared<T> {
    jobs: RwLock<HashMap<RequestId, JobSlot<T>>>,
    retention: Duration,
}

/// Tracks asynchronous jobs and their terminal results.
///
/// Request ids are generated fresh per submission, never supplied by
/// callers, so two executions can never share an id. A terminal result
/// is stored exactly once and never mutated afterwards; finished
/// entries are evicted after the retention window.
pub struct JobTracker<T> {
    shared: Arc<TrackerShared<T>>,
}

impl<T> Clone for JobTracker<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> JobTracker<T> {
    /// Creates a tracker with the given retention window for finished
    /// jobs.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                jobs: RwLock::new(HashMap::new()),
                retention,
            }),
        }
    }

    /// Starts a job on its own thread and returns its request id.
    ///
    /// The closure must encode failures in `T` itself; nothing is
    /// thrown across the async boundary to the submitter.
    pub fn start<F>(&self, job: F) -> RequestId
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let id = RequestId::random();
        self.shared.jobs.write().insert(id, JobSlot::Running);

        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || {
            let result = job();
            let mut jobs = shared.jobs.write();
            jobs.insert(
                id,
                JobSlot::Finished {
                    result,
                    finished_at: Instant::now(),
                },
            );
            sweep(&mut jobs, shared.retention);
            debug!(request = %id, "job finished");
        });

        id
    }

    /// Polls a job. `None` means the id is unknown or already evicted.
    #[must_use]
    pub fn get(&self, id: RequestId) -> Option<JobStatus<T>> {
        {
            let mut jobs = self.shared.jobs.write();
            sweep(&mut jobs, self.shared.retention);
        }
        match self.shared.jobs.read().get(&id) {
            None => None,
            Some(JobSlot::Running) => Some(JobStatus::InProgress),
            Some(JobSlot::Finished { result, .. }) => Some(JobStatus::Done(result.clone())),
        }
    }

    /// Number of tracked jobs, running and finished.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.jobs.read().len()
    }

    /// Returns true if no jobs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.jobs.read().is_empty()
    }
}

fn sweep<T>(jobs: &mut HashMap<RequestId, JobSlot<T>>, retention: Duration) {
    jobs.retain(|_, slot| match slot {
        JobSlot::Running => true,
        JobSlot::Finished { finished_at, .. } => finished_at.elapsed() < retention,
    });
}

/// Serializes destructive imports per `(tenant, entity type)`.
///
/// Two jobs racing a `remove_other_entities` import on the same type
/// could otherwise interleave deletes with the other job's creates. One
/// of them is rejected instead.
#[derive(Debug, Default)]
pub struct DestructiveImportLocks {
    held: Mutex<HashSet<(TenantId, EntityType)>>,
}

impl DestructiveImportLocks {
    /// Creates an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires all keys or none.
    ///
    /// On conflict returns the first contended entity type; the caller
    /// rejects its job with a concurrent-import error.
    pub fn try_acquire(
        self: &Arc<Self>,
        tenant: TenantId,
        types: &[EntityType],
    ) -> Result<DestructiveImportGuard, EntityType> {
        let mut held = self.held.lock();
        if let Some(contended) = types.iter().find(|ty| held.contains(&(tenant, **ty))) {
            return Err(*contended);
        }
        for ty in types {
            held.insert((tenant, *ty));
        }
        Ok(DestructiveImportGuard {
            locks: Arc::clone(self),
            tenant,
            types: types.to_vec(),
        })
    }
}

/// Releases the acquired keys on drop.
pub struct DestructiveImportGuard {
    locks: Arc<DestructiveImportLocks>,
    tenant: TenantId,
    types: Vec<EntityType>,
}

impl Drop for DestructiveImportGuard {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for ty in &self.types {
            held.remove(&(self.tenant, *ty));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn unknown_id_is_none() {
        let tracker: JobTracker<u32> = JobTracker::new(Duration::from_secs(60));
        assert!(tracker.get(RequestId::random()).is_none());
    }

    #[test]
    fn job_lifecycle() {
        let tracker: JobTracker<u32> = JobTracker::new(Duration::from_secs(60));
        let (release, gate) = mpsc::channel::<()>();

        let id = tracker.start(move || {
            gate.recv().ok();
            42
        });
        assert_eq!(tracker.get(id), Some(JobStatus::InProgress));

        release.send(()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match tracker.get(id) {
                Some(JobStatus::Done(result)) => {
                    assert_eq!(result, 42);
                    break;
                }
                Some(JobStatus::InProgress) => {
                    assert!(Instant::now() < deadline, "job did not finish");
                    std::thread::sleep(Duration::from_millis(2));
                }
                None => panic!("job vanished"),
            }
        }
    }

    #[test]
    fn finished_jobs_are_evicted_after_retention() {
        let tracker: JobTracker<u32> = JobTracker::new(Duration::from_millis(20));
        let id = tracker.start(|| 1);

        // Wait for completion, then past the retention window.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !matches!(tracker.get(id), Some(JobStatus::Done(_))) {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(2));
        }
        std::thread::sleep(Duration::from_millis(40));
        assert!(tracker.get(id).is_none());
    }

    #[test]
    fn fresh_ids_per_submission() {
        let tracker: JobTracker<u32> = JobTracker::new(Duration::from_secs(60));
        let a = tracker.start(|| 1);
        let b = tracker.start(|| 2);
        assert_ne!(a, b);
    }

    #[test]
    fn destructive_locks_conflict_on_overlap() {
        let locks = Arc::new(DestructiveImportLocks::new());
        let tenant = TenantId::random();

        let guard = locks
            .try_acquire(tenant, &[EntityType::Device, EntityType::Asset])
            .unwrap();

        let contended = locks
            .try_acquire(tenant, &[EntityType::Asset])
            .unwrap_err();
        assert_eq!(contended, EntityType::Asset);

        // Disjoint types and other tenants are fine.
        let _other_type = locks.try_acquire(tenant, &[EntityType::Dashboard]).unwrap();
        let _other_tenant = locks
            .try_acquire(TenantId::random(), &[EntityType::Device])
            .unwrap();

        drop(guard);
        let _reacquired = locks.try_acquire(tenant, &[EntityType::Asset]).unwrap();
    }
}
