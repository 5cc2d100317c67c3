// Domain Layer - Jobs, payload records and the control flag

pub mod control;
pub mod error;
pub mod job;
pub mod payload;

// Re-exports
pub use control::ControlFlag;
pub use error::DomainError;
pub use job::{Job, JobId, JobKind, JobStatus, StatusCounts};
pub use payload::{parse_http_url, ContentRecord, ScanTarget};
