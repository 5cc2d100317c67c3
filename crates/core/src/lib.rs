// Herald Core - Job pipeline domain, ports and services
// No infrastructure dependencies: storage and HTTP live behind ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
