// Stale claim reaper
// Jobs carry no heartbeat; a crashed instance leaves rows in_progress.
// The sweep requeues claims older than the claim timeout.
use crate::port::{JobRepository, StaleSweep, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct StaleClaimReaper {
    job_repo: Arc<dyn JobRepository>,
    time_provider: Arc<dyn TimeProvider>,
    claim_timeout: Duration,
    max_total_attempts: i32,
}

impl StaleClaimReaper {
    /// # Arguments
    /// * `claim_timeout` - Age after which an in-progress claim counts as orphaned
    /// * `max_total_attempts` - Stale jobs at or above this attempt_count are failed, not requeued
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        time_provider: Arc<dyn TimeProvider>,
        claim_timeout: Duration,
        max_total_attempts: i32,
    ) -> Self {
        Self {
            job_repo,
            time_provider,
            claim_timeout,
            max_total_attempts,
        }
    }

    /// Requeue every in-progress job whose claim is older than the timeout
    pub async fn sweep(&self) -> crate::error::Result<StaleSweep> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.claim_timeout.as_millis() as i64;

        let sweep = self
            .job_repo
            .requeue_stale(cutoff, self.max_total_attempts)
            .await?;

        if sweep.requeued > 0 || sweep.abandoned > 0 {
            info!(
                cutoff = cutoff,
                requeued = sweep.requeued,
                abandoned = sweep.abandoned,
                "Stale claims swept"
            );
        }
        if sweep.abandoned > 0 {
            warn!(
                abandoned = sweep.abandoned,
                max_total_attempts = self.max_total_attempts,
                "Jobs abandoned at attempt ceiling"
            );
        }
        Ok(sweep)
    }
}
