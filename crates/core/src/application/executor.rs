// Bounded Executor - runs a claimed batch under a concurrency ceiling

use crate::application::constants::{
    DEFAULT_CONCURRENCY_LIMIT, DEFAULT_INTER_ITEM_DELAY, DEFAULT_ITEM_TIMEOUT,
};
use crate::application::events::{EventBus, JobEvent};
use crate::application::panic_guard::{execute_guarded, PanicGuardResult};
use crate::application::processor::{ItemProcessor, ProcessError};
use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::JobRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// When the control flag is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCheck {
    /// Once per batch, before claiming (publish workers)
    #[default]
    PerBatch,
    /// Also before each item starts; unstarted items are released when paused
    PerItem,
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub concurrency_limit: usize,
    pub inter_item_delay: Duration,
    /// Ceiling on one `process` call, retries included
    pub call_timeout: Duration,
    pub flag_check: FlagCheck,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            inter_item_delay: DEFAULT_INTER_ITEM_DELAY,
            call_timeout: DEFAULT_ITEM_TIMEOUT,
            flag_check: FlagCheck::PerBatch,
        }
    }
}

/// Per-batch tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub done: usize,
    pub failed: usize,
    /// Returned to pending because the pipeline was paused mid-batch
    pub released: usize,
    /// Finished after the claim had been requeued and taken over; result discarded
    pub lost: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.done + self.failed + self.released + self.lost
    }
}

enum ItemOutcome {
    Done,
    Failed,
    Lost,
}

pub struct BoundedExecutor {
    repo: Arc<dyn JobRepository>,
    config: ExecutorConfig,
    events: EventBus,
}

impl BoundedExecutor {
    pub fn new(repo: Arc<dyn JobRepository>, config: ExecutorConfig, events: EventBus) -> Self {
        Self {
            repo,
            config,
            events,
        }
    }

    /// Run `processor` over `jobs` with at most `concurrency_limit` in flight.
    ///
    /// Every job ends `done` or `failed` (or `pending` again when released by
    /// a per-item pause). Item failures, panics and timeouts are recorded on
    /// the job and never reach sibling items. Results are written against the
    /// claim's `claimed_at`; a job whose claim expired and was taken over is
    /// left to its new owner and counted as `lost`. An `Err` is returned only
    /// for store failures; affected jobs stay `in_progress` for the
    /// stale-lease sweep to pick up.
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        processor: Arc<dyn ItemProcessor>,
    ) -> Result<BatchReport> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit.max(1)));
        let mut tasks: JoinSet<Result<ItemOutcome>> = JoinSet::new();
        let mut report = BatchReport::default();
        let mut store_error: Option<AppError> = None;
        let mut paused = false;

        for job in jobs {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| AppError::Internal(format!("executor semaphore closed: {}", e)))?;

            if !paused && self.config.flag_check == FlagCheck::PerItem {
                match self.repo.read_control_flag().await {
                    Ok(true) => {}
                    Ok(false) => {
                        info!("Pipeline disabled mid-batch, releasing unstarted jobs");
                        paused = true;
                    }
                    Err(e) => {
                        error!(error = %e, "Control flag read failed mid-batch");
                        store_error.get_or_insert(e);
                        paused = true;
                    }
                }
            }

            if paused {
                drop(permit);
                match self.repo.release(&job.id).await {
                    Ok(_) => {
                        report.released += 1;
                        self.events.publish(JobEvent::Released {
                            job_id: job.id.clone(),
                            kind: job.kind,
                        });
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to release job");
                        store_error.get_or_insert(e);
                    }
                }
                continue;
            }

            let repo = Arc::clone(&self.repo);
            let processor = Arc::clone(&processor);
            let events = self.events.clone();
            let call_timeout = self.config.call_timeout;
            let inter_item_delay = self.config.inter_item_delay;

            tasks.spawn(async move {
                let outcome =
                    process_one(repo.as_ref(), processor.as_ref(), &events, &job, call_timeout)
                        .await;
                if !inter_item_delay.is_zero() {
                    tokio::time::sleep(inter_item_delay).await;
                }
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(ItemOutcome::Done)) => report.done += 1,
                Ok(Ok(ItemOutcome::Failed)) => report.failed += 1,
                Ok(Ok(ItemOutcome::Lost)) => report.lost += 1,
                Ok(Err(e)) => {
                    store_error.get_or_insert(e);
                }
                Err(join_err) => {
                    // process_one catches processor panics; this is a panic in the bookkeeping
                    error!(error = ?join_err, "Executor task aborted");
                    store_error.get_or_insert(AppError::Internal(join_err.to_string()));
                }
            }
        }

        match store_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// Process one job and persist its terminal status
async fn process_one(
    repo: &dyn JobRepository,
    processor: &dyn ItemProcessor,
    events: &EventBus,
    job: &Job,
    call_timeout: Duration,
) -> Result<ItemOutcome> {
    let Some(lease) = job.claimed_at else {
        warn!(job_id = %job.id, "Job has no claim stamp, skipping");
        return Ok(ItemOutcome::Lost);
    };

    let guarded = execute_guarded(tokio::time::timeout(call_timeout, processor.process(job)));

    let result = match guarded.await {
        PanicGuardResult::Completed(Ok(result)) => result,
        PanicGuardResult::Completed(Err(_elapsed)) => Err(ProcessError::Fatal(format!(
            "timed out after {}ms",
            call_timeout.as_millis()
        ))),
        PanicGuardResult::Panicked(msg) => {
            Err(ProcessError::Fatal(format!("processor panicked: {}", msg)))
        }
    };

    match result {
        Ok(()) => {
            if !repo.mark_done(&job.id, lease).await? {
                return Ok(lost_claim(job));
            }
            info!(job_id = %job.id, kind = %job.kind, "Job done");
            events.publish(JobEvent::Completed {
                job_id: job.id.clone(),
                kind: job.kind,
            });
            Ok(ItemOutcome::Done)
        }
        Err(e) => {
            let message = e.message().to_string();
            if !repo.mark_failed(&job.id, lease, &message).await? {
                return Ok(lost_claim(job));
            }
            warn!(job_id = %job.id, kind = %job.kind, error = %message, "Job failed");
            events.publish(JobEvent::Failed {
                job_id: job.id.clone(),
                kind: job.kind,
                error: message,
            });
            Ok(ItemOutcome::Failed)
        }
    }
}

fn lost_claim(job: &Job) -> ItemOutcome {
    warn!(
        job_id = %job.id,
        kind = %job.kind,
        "Claim expired before the result was stored, leaving the job to its current owner"
    );
    ItemOutcome::Lost
}
