// Job Domain Model and status state machine

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (UUID v4)
pub type JobId = String;

/// Job Status
///
/// `Pending` is the initial state. `InProgress` is only reachable through an
/// atomic claim. `Done` and `Failed` are terminal for the pipeline; leaving
/// `Failed` requires an operator resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::InProgress,
        JobStatus::Done,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    /// Valid transitions:
    /// - pending -> in_progress (claim)
    /// - in_progress -> done | failed (finalize)
    /// - in_progress -> pending (release / stale lease requeue)
    /// - failed -> pending (operator resume)
    /// - done -> done (repeated mark is an overwrite)
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (InProgress, Pending)
                | (Failed, Pending)
                | (Done, Done)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// Job family; selects the item processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Push a content record to the content host
    Publish,
    /// Probe a scan target over HTTP
    Scan,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Publish => "publish",
            JobKind::Scan => "scan",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "publish" => Ok(JobKind::Publish),
            "scan" => Ok(JobKind::Scan),
            other => Err(DomainError::UnknownKind(other.to_string())),
        }
    }
}

/// Job Entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Opaque to the pipeline; only the item processor resolves it
    pub payload_ref: String,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
    /// Lease stamp, set while the job is in progress
    pub claimed_at: Option<i64>,
}

impl Job {
    /// Create a pending job
    ///
    /// ID and timestamp are injected so callers decide where they come from
    /// (providers in production, fixed values in tests).
    pub fn new(
        id: impl Into<String>,
        kind: JobKind,
        payload_ref: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Pending,
            payload_ref: payload_ref.into(),
            attempt_count: 0,
            last_error: None,
            created_at,
            updated_at: created_at,
            claimed_at: None,
        }
    }

    /// Create a test job with a deterministic ID and increasing timestamp
    ///
    /// **Note**: tests only. Production code injects IDs and time via providers.
    pub fn new_test(kind: JobKind, payload_ref: impl Into<String>) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            kind,
            payload_ref,
            (counter * 1000) as i64,
        )
    }

    fn transition(&mut self, next: JobStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_millis;
        Ok(())
    }

    /// pending -> in_progress
    pub fn claim(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::InProgress, now_millis)?;
        self.claimed_at = Some(now_millis);
        self.last_error = None;
        Ok(())
    }

    /// in_progress -> done (done -> done is accepted as an overwrite)
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Done, now_millis)?;
        self.claimed_at = None;
        Ok(())
    }

    /// in_progress -> failed
    pub fn fail(&mut self, now_millis: i64, error: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed, now_millis)?;
        self.claimed_at = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// in_progress -> pending, or failed -> pending
    pub fn requeue(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Pending, now_millis)?;
        self.claimed_at = None;
        Ok(())
    }
}

/// Count of jobs per status (dashboard view)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub done: i64,
    pub failed: i64,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> i64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::InProgress => self.in_progress,
            JobStatus::Done => self.done,
            JobStatus::Failed => self.failed,
        }
    }

    pub fn set(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Pending => self.pending = count,
            JobStatus::InProgress => self.in_progress = count,
            JobStatus::Done => self.done = count,
            JobStatus::Failed => self.failed = count,
        }
    }

    pub fn total(&self) -> i64 {
        self.pending + self.in_progress + self.done + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_claim_only_from_pending() {
        let mut job = Job::new("a", JobKind::Publish, "content-1", 10);
        job.claim(20).unwrap();
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.claimed_at, Some(20));
        assert_eq!(job.updated_at, 20);

        let err = job.claim(30).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStatusTransition {
                from: "in_progress".to_string(),
                to: "in_progress".to_string(),
            }
        );
    }

    #[test]
    fn test_fail_records_error_and_clears_lease() {
        let mut job = Job::new("a", JobKind::Scan, "target-1", 10);
        job.claim(20).unwrap();
        job.fail(30, "HTTP 500").unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("HTTP 500"));
        assert_eq!(job.claimed_at, None);
    }

    #[test]
    fn test_reclaim_after_resume_clears_last_error() {
        let mut job = Job::new("a", JobKind::Publish, "content-1", 10);
        job.claim(20).unwrap();
        job.fail(30, "boom").unwrap();
        job.requeue(40).unwrap();
        job.claim(50).unwrap();

        assert_eq!(job.last_error, None);
    }

    #[test]
    fn test_done_is_idempotent_but_terminal() {
        let mut job = Job::new("a", JobKind::Publish, "content-1", 10);
        job.claim(20).unwrap();
        job.complete(30).unwrap();
        job.complete(40).unwrap();

        assert_eq!(job.status, JobStatus::Done);
        assert!(job.requeue(50).is_err());
        assert!(job.fail(50, "late").is_err());
    }

    #[test]
    fn test_pending_cannot_finish_without_claim() {
        let mut job = Job::new("a", JobKind::Publish, "content-1", 10);
        assert!(job.complete(20).is_err());
        assert!(job.fail(20, "x").is_err());
    }

    #[test]
    fn test_status_counts_total() {
        let mut counts = StatusCounts::default();
        counts.set(JobStatus::Pending, 3);
        counts.set(JobStatus::Failed, 2);
        assert_eq!(counts.get(JobStatus::Pending), 3);
        assert_eq!(counts.total(), 5);
    }
}
