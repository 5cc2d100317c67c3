// Job Repository Port (Interface)
// The only component allowed to read or write job status.

use crate::domain::{ControlFlag, Job, JobKind, JobStatus, StatusCounts};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome of a stale-lease sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleSweep {
    /// Stale in-progress jobs returned to pending
    pub requeued: u64,
    /// Stale in-progress jobs failed because they hit the attempt ceiling
    pub abandoned: u64,
}

/// Repository interface for job persistence
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Job>>;

    /// Atomically claim up to `limit` pending jobs, oldest first.
    ///
    /// Selection and the pending -> in_progress transition happen in one
    /// conditional update, so concurrent callers never receive the same id.
    /// Claimed rows get `claimed_at`/`updated_at` stamped and `last_error`
    /// cleared. `kind = None` claims across all job families.
    async fn claim_batch(&self, limit: usize, kind: Option<JobKind>) -> Result<Vec<Job>>;

    /// Set status=done for the claim stamped `lease` (its `claimed_at`).
    ///
    /// Lands only while that claim is current, or when the job is already
    /// done (a repeat is a plain overwrite). Returns false when the claim was
    /// lost to a requeue or another worker; `NotFound` for an unknown id.
    async fn mark_done(&self, id: &str, lease: i64) -> Result<bool>;

    /// Set status=failed and store the error text.
    /// Same lease rule as `mark_done`, without the done -> done case.
    async fn mark_failed(&self, id: &str, lease: i64, error: &str) -> Result<bool>;

    /// Increment attempt_count, returning the new value
    async fn record_attempt(&self, id: &str) -> Result<i32>;

    /// Return an in-progress job to pending (claimed but never started).
    /// Returns false when the job was not in progress.
    async fn release(&self, id: &str) -> Result<bool>;

    /// Read the global control flag
    async fn read_control_flag(&self) -> Result<bool>;

    /// Full control flag row, `None` when the row is missing
    async fn load_control_flag(&self) -> Result<Option<ControlFlag>>;

    /// Set the global control flag (operator action, never called by the pipeline)
    async fn set_control_flag(&self, enabled: bool) -> Result<()>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;

    /// Counts for every status
    async fn status_counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for status in JobStatus::ALL {
            counts.set(status, self.count_by_status(status).await?);
        }
        Ok(counts)
    }

    /// Jobs in a status, most recently updated first
    async fn find_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>>;

    /// Requeue in-progress jobs claimed before `claimed_before`.
    /// Jobs whose attempt_count reached `max_total_attempts` are failed instead.
    async fn requeue_stale(&self, claimed_before: i64, max_total_attempts: i32)
        -> Result<StaleSweep>;

    /// Move failed jobs below the attempt ceiling back to pending
    async fn resume_failed(&self, max_total_attempts: i32) -> Result<u64>;
}

/// Message stored on jobs abandoned by the stale-lease sweep
pub fn abandoned_message(attempts: i32) -> String {
    format!(
        "abandoned after {} attempts: claim expired without a terminal status",
        attempts
    )
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::time_provider::{SystemTimeProvider, TimeProvider};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory JobRepository with the same claim semantics as the SQL store
    pub struct InMemoryJobRepository {
        jobs: Mutex<BTreeMap<String, Job>>,
        enabled: AtomicBool,
        flag_updated_at: AtomicI64,
        fail_flag_reads: AtomicBool,
        fail_marks: AtomicBool,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobRepository {
        pub fn new() -> Self {
            Self::with_time_provider(Arc::new(SystemTimeProvider))
        }

        pub fn with_time_provider(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(BTreeMap::new()),
                enabled: AtomicBool::new(true),
                flag_updated_at: AtomicI64::new(0),
                fail_flag_reads: AtomicBool::new(false),
                fail_marks: AtomicBool::new(false),
                time_provider,
            }
        }

        /// Make `read_control_flag` return a database error (store outage)
        pub fn set_fail_flag_reads(&self, fail: bool) {
            self.fail_flag_reads.store(fail, Ordering::SeqCst);
        }

        /// Make `mark_done`/`mark_failed` return a database error
        pub fn set_fail_marks(&self, fail: bool) {
            self.fail_marks.store(fail, Ordering::SeqCst);
        }

        pub fn seed(&self, jobs: impl IntoIterator<Item = Job>) {
            let mut map = self.jobs.lock().unwrap();
            for job in jobs {
                map.insert(job.id.clone(), job);
            }
        }

        pub fn get(&self, id: &str) -> Option<Job> {
            self.jobs.lock().unwrap().get(id).cloned()
        }

        pub fn all(&self) -> Vec<Job> {
            self.jobs.lock().unwrap().values().cloned().collect()
        }

        fn with_job<T>(&self, id: &str, f: impl FnOnce(&mut Job, i64) -> T) -> Result<T> {
            let now = self.time_provider.now_millis();
            let mut map = self.jobs.lock().unwrap();
            let job = map
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            Ok(f(job, now))
        }

        /// Claim stamp of an in-progress job, for tests that finalize by hand
        pub fn lease(&self, id: &str) -> i64 {
            self.get(id).and_then(|job| job.claimed_at).unwrap_or_default()
        }

        fn check_marks(&self) -> Result<()> {
            if self.fail_marks.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected write failure".to_string()));
            }
            Ok(())
        }
    }

    fn holds_lease(job: &Job, lease: i64) -> bool {
        job.status == JobStatus::InProgress && job.claimed_at == Some(lease)
    }

    impl Default for InMemoryJobRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut map = self.jobs.lock().unwrap();
            if map.contains_key(&job.id) {
                return Err(AppError::Database(format!(
                    "Unique constraint violation: jobs.id {}",
                    job.id
                )));
            }
            map.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Job>> {
            Ok(self.get(id))
        }

        async fn claim_batch(&self, limit: usize, kind: Option<JobKind>) -> Result<Vec<Job>> {
            let now = self.time_provider.now_millis();
            let mut map = self.jobs.lock().unwrap();

            let mut candidates: Vec<(i64, String)> = map
                .values()
                .filter(|j| j.status == JobStatus::Pending)
                .filter(|j| kind.map_or(true, |k| j.kind == k))
                .map(|j| (j.created_at, j.id.clone()))
                .collect();
            candidates.sort();
            candidates.truncate(limit);

            let mut claimed = Vec::with_capacity(candidates.len());
            for (_, id) in candidates {
                if let Some(job) = map.get_mut(&id) {
                    job.claim(now)?;
                    claimed.push(job.clone());
                }
            }
            Ok(claimed)
        }

        async fn mark_done(&self, id: &str, lease: i64) -> Result<bool> {
            self.check_marks()?;
            self.with_job(id, |job, now| {
                let owned = job.status == JobStatus::Done || holds_lease(job, lease);
                owned && job.complete(now).is_ok()
            })
        }

        async fn mark_failed(&self, id: &str, lease: i64, error: &str) -> Result<bool> {
            self.check_marks()?;
            self.with_job(id, |job, now| {
                holds_lease(job, lease) && job.fail(now, error).is_ok()
            })
        }

        async fn record_attempt(&self, id: &str) -> Result<i32> {
            self.with_job(id, |job, now| {
                job.attempt_count += 1;
                job.updated_at = now;
                job.attempt_count
            })
        }

        async fn release(&self, id: &str) -> Result<bool> {
            self.with_job(id, |job, now| {
                job.status == JobStatus::InProgress && job.requeue(now).is_ok()
            })
        }

        async fn read_control_flag(&self) -> Result<bool> {
            if self.fail_flag_reads.load(Ordering::SeqCst) {
                return Err(AppError::Database("injected store outage".to_string()));
            }
            Ok(self.enabled.load(Ordering::SeqCst))
        }

        async fn load_control_flag(&self) -> Result<Option<ControlFlag>> {
            Ok(Some(ControlFlag {
                enabled: self.read_control_flag().await?,
                updated_at: self.flag_updated_at.load(Ordering::SeqCst),
            }))
        }

        async fn set_control_flag(&self, enabled: bool) -> Result<()> {
            self.enabled.store(enabled, Ordering::SeqCst);
            self.flag_updated_at
                .store(self.time_provider.now_millis(), Ordering::SeqCst);
            Ok(())
        }

        async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
            let map = self.jobs.lock().unwrap();
            Ok(map.values().filter(|j| j.status == status).count() as i64)
        }

        async fn find_by_status(&self, status: JobStatus, limit: usize) -> Result<Vec<Job>> {
            let map = self.jobs.lock().unwrap();
            let mut jobs: Vec<Job> = map
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect();
            jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            jobs.truncate(limit);
            Ok(jobs)
        }

        async fn requeue_stale(
            &self,
            claimed_before: i64,
            max_total_attempts: i32,
        ) -> Result<StaleSweep> {
            let now = self.time_provider.now_millis();
            let mut map = self.jobs.lock().unwrap();
            let mut sweep = StaleSweep::default();

            for job in map.values_mut() {
                let stale = job.status == JobStatus::InProgress
                    && job.claimed_at.map_or(true, |at| at < claimed_before);
                if !stale {
                    continue;
                }
                if job.attempt_count >= max_total_attempts {
                    job.fail(now, abandoned_message(job.attempt_count))?;
                    sweep.abandoned += 1;
                } else {
                    job.requeue(now)?;
                    sweep.requeued += 1;
                }
            }
            Ok(sweep)
        }

        async fn resume_failed(&self, max_total_attempts: i32) -> Result<u64> {
            let now = self.time_provider.now_millis();
            let mut map = self.jobs.lock().unwrap();
            let mut resumed = 0;
            for job in map.values_mut() {
                if job.status == JobStatus::Failed && job.attempt_count < max_total_attempts {
                    job.requeue(now)?;
                    resumed += 1;
                }
            }
            Ok(resumed)
        }
    }
}
