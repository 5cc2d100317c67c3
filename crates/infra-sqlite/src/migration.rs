// Migration Runner

use sqlx::SqlitePool;
use tracing::info;

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "Initial schema",
        include_str!("../migrations/001_initial_schema.sql"),
    ),
    (
        2,
        "Payload tables",
        include_str!("../migrations/002_add_payloads.sql"),
    ),
    (
        3,
        "Claim lease",
        include_str!("../migrations/003_add_claim_lease.sql"),
    ),
];

/// Run database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Running database migrations...");

    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await?;

    let current_version: i64 = if table_exists > 0 {
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?
            .unwrap_or(0)
    } else {
        0
    };

    info!("Current schema version: {}", current_version);

    for (version, name, sql) in MIGRATIONS {
        if current_version < *version {
            info!("Applying migration {:03}: {}", version, name);
            apply_migration(pool, sql).await?;
        }
    }

    info!("All migrations applied successfully");
    Ok(())
}

/// Apply a single migration SQL file
async fn apply_migration(pool: &SqlitePool, sql: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut tx = pool.begin().await?;

    // Statements are split on ';', so migration files must not use it elsewhere
    for statement in sql.split(';') {
        let clean_statement: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if !clean_statement.is_empty() {
            sqlx::query(&clean_statement).execute(&mut *tx).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}
