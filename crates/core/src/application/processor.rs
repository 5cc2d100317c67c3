// Item Processor - the pluggable per-job action

use crate::domain::{Job, JobKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Failure of a single item
///
/// The executor does not distinguish the two variants: both end as
/// `failed` with the message stored in `last_error`. `Retryable` exists so
/// the backoff wrapper can decide whether another attempt is worthwhile.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("{0}")]
    Retryable(String),

    #[error("{0}")]
    Fatal(String),
}

impl ProcessError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ProcessError::Retryable(msg) | ProcessError::Fatal(msg) => msg,
        }
    }
}

/// Performs the external action for one job (publish, probe, ...)
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<(), ProcessError>;
}

/// Dispatches each job to the processor registered for its kind
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<JobKind, Arc<dyn ItemProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: JobKind, processor: Arc<dyn ItemProcessor>) -> Self {
        self.processors.insert(kind, processor);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<&Arc<dyn ItemProcessor>> {
        self.processors.get(&kind)
    }

    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<_> = self.processors.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

#[async_trait]
impl ItemProcessor for ProcessorRegistry {
    async fn process(&self, job: &Job) -> Result<(), ProcessError> {
        match self.processors.get(&job.kind) {
            Some(processor) => processor.process(job).await,
            None => Err(ProcessError::Fatal(format!(
                "no processor registered for job kind {}",
                job.kind
            ))),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock processor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        Succeed,
        Fail(ProcessError),
        Panic(String),
        /// Succeed after sleeping (for concurrency and timeout tests)
        Sleep(Duration),
    }

    /// Instrumented processor: counts calls and tracks peak concurrency
    pub struct MockProcessor {
        default: MockBehavior,
        per_job: Mutex<HashMap<String, MockBehavior>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl MockProcessor {
        pub fn new(default: MockBehavior) -> Self {
            Self {
                default,
                per_job: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(MockBehavior::Succeed)
        }

        pub fn sleeping(duration: Duration) -> Self {
            Self::new(MockBehavior::Sleep(duration))
        }

        /// Override behavior for a single job id
        pub fn with_job(self, job_id: impl Into<String>, behavior: MockBehavior) -> Self {
            self.per_job.lock().unwrap().insert(job_id.into(), behavior);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ItemProcessor for MockProcessor {
        async fn process(&self, job: &Job) -> Result<(), ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            let behavior = self
                .per_job
                .lock()
                .unwrap()
                .get(&job.id)
                .cloned()
                .unwrap_or_else(|| self.default.clone());

            match behavior {
                MockBehavior::Succeed => Ok(()),
                MockBehavior::Fail(err) => Err(err),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Sleep(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(())
                }
            }
        }
    }
}
