// Application Layer - Use Cases and Business Logic

pub mod admin;
pub mod backoff;
pub mod claim;
pub mod constants;
pub mod events;
pub mod executor;
pub mod panic_guard;
pub mod processor;
pub mod publish;
pub mod reaper;
pub mod scan;
pub mod scheduler;

// Re-exports
pub use admin::{AdminService, NewContent, StatusReport};
pub use backoff::{with_backoff, RetryDecision, RetryPolicy};
pub use claim::ClaimManager;
pub use events::{EventBus, JobEvent};
pub use executor::{BatchReport, BoundedExecutor, ExecutorConfig, FlagCheck};
pub use processor::{ItemProcessor, ProcessError, ProcessorRegistry};
pub use publish::PublishProcessor;
pub use reaper::StaleClaimReaper;
pub use scan::ScanProcessor;
pub use scheduler::{
    shutdown_channel, IterationOutcome, LoopState, Scheduler, SchedulerConfig, ShutdownSender,
    ShutdownToken,
};
