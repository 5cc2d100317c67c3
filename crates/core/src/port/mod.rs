// Port Layer - Interfaces for external collaborators

pub mod content_host;
pub mod id_provider;
pub mod job_repository;
pub mod payload_store;
pub mod renderer;
pub mod time_provider;
pub mod url_prober;

// Re-exports
pub use content_host::{ContentHost, HostError, PublishReceipt, PublishRequest};
pub use id_provider::IdProvider;
pub use job_repository::{JobRepository, StaleSweep};
pub use payload_store::PayloadStore;
pub use renderer::{ContentRenderer, RenderError};
pub use time_provider::TimeProvider;
pub use url_prober::{ProbeOutcome, UrlProber};
