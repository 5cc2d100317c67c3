// Herald Infrastructure - SQLite Adapter
// Implements: JobRepository, PayloadStore

mod connection;
mod job_repository;
mod migration;
mod payload_store;

pub use connection::{create_pool, create_pool_with};
pub use job_repository::SqliteJobRepository;
pub use migration::run_migrations;
pub use payload_store::SqlitePayloadStore;

// sqlx::Error -> AppError goes through a local helper (orphan rule)
