// SQLite Connection Pool Setup

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create SQLite connection pool with WAL mode
///
/// Accepts `sqlite://path`, `sqlite:path` or a bare filesystem path.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    create_pool_with(database_url, DEFAULT_MAX_CONNECTIONS).await
}

pub async fn create_pool_with(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, Box<dyn std::error::Error>> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        if let Some(parent) = std::path::Path::new(database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        format!("sqlite://{}", database_url)
    };

    let options = SqliteConnectOptions::from_str(&url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(|e| herald_core::error::AppError::Database(e.to_string()))?;

    Ok(pool)
}
