// SQLite PayloadStore Implementation

use crate::job_repository::map_sqlx_error;
use async_trait::async_trait;
use herald_core::domain::{ContentRecord, ScanTarget};
use herald_core::error::{AppError, Result};
use herald_core::port::PayloadStore;
use sqlx::SqlitePool;

pub struct SqlitePayloadStore {
    pool: SqlitePool,
}

impl SqlitePayloadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayloadStore for SqlitePayloadStore {
    async fn insert_content(&self, record: &ContentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content_records (id, title, handle, body, metadata, external_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.handle)
        .bind(&record.body)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(&record.external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_content(&self, id: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query_as::<_, ContentRow>("SELECT * FROM content_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ContentRow::into_record).transpose()
    }

    async fn record_published(&self, id: &str, external_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE content_records SET external_id = ? WHERE id = ?")
            .bind(external_id)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Content {} not found", id)));
        }
        Ok(())
    }

    async fn insert_scan_target(&self, target: &ScanTarget) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_targets (id, url, last_http_status, last_probed_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&target.id)
        .bind(&target.url)
        .bind(target.last_http_status.map(i64::from))
        .bind(target.last_probed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn load_scan_target(&self, id: &str) -> Result<Option<ScanTarget>> {
        let row = sqlx::query_as::<_, ScanTargetRow>("SELECT * FROM scan_targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(ScanTargetRow::into_target).transpose()
    }

    async fn record_probe(&self, id: &str, http_status: u16, probed_at: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scan_targets SET last_http_status = ?, last_probed_at = ? WHERE id = ?",
        )
        .bind(i64::from(http_status))
        .bind(probed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Scan target {} not found", id)));
        }
        Ok(())
    }

    async fn delete_content(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM content_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn delete_scan_target(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scan_targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ContentRow {
    id: String,
    title: String,
    handle: String,
    body: String,
    metadata: String,
    external_id: Option<String>,
}

impl ContentRow {
    fn into_record(self) -> Result<ContentRecord> {
        Ok(ContentRecord {
            metadata: serde_json::from_str(&self.metadata)?,
            id: self.id,
            title: self.title,
            handle: self.handle,
            body: self.body,
            external_id: self.external_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ScanTargetRow {
    id: String,
    url: String,
    last_http_status: Option<i64>,
    last_probed_at: Option<i64>,
}

impl ScanTargetRow {
    fn into_target(self) -> Result<ScanTarget> {
        let last_http_status = self
            .last_http_status
            .map(u16::try_from)
            .transpose()
            .map_err(|e| AppError::Database(format!("Invalid HTTP status column: {}", e)))?;

        Ok(ScanTarget {
            id: self.id,
            url: self.url,
            last_http_status,
            last_probed_at: self.last_probed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (SqlitePayloadStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(dir.path().join("payloads.db").to_str().unwrap())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        (SqlitePayloadStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_content_lifecycle() {
        let (store, _dir) = setup().await;
        let record = ContentRecord {
            id: "c1".to_string(),
            title: "Desk lamp".to_string(),
            handle: "desk-lamp".to_string(),
            body: "Adjustable arm".to_string(),
            metadata: json!({ "vendor": "acme", "tags": ["lighting"] }),
            external_id: None,
        };

        store.insert_content(&record).await.unwrap();
        assert_eq!(store.load_content("c1").await.unwrap(), Some(record));

        store.record_published("c1", "page-9").await.unwrap();
        let loaded = store.load_content("c1").await.unwrap().unwrap();
        assert_eq!(loaded.external_id.as_deref(), Some("page-9"));

        assert!(matches!(
            store.record_published("ghost", "x").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_target_probe_recorded() {
        let (store, _dir) = setup().await;
        store
            .insert_scan_target(&ScanTarget {
                id: "t1".to_string(),
                url: "https://shop.example/".to_string(),
                last_http_status: None,
                last_probed_at: None,
            })
            .await
            .unwrap();

        store.record_probe("t1", 301, 77).await.unwrap();

        let target = store.load_scan_target("t1").await.unwrap().unwrap();
        assert_eq!(target.last_http_status, Some(301));
        assert_eq!(target.last_probed_at, Some(77));
        assert!(store.load_scan_target("nope").await.unwrap().is_none());

        store.delete_scan_target("t1").await.unwrap();
        store.delete_scan_target("t1").await.unwrap();
        assert!(store.load_scan_target("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_content() {
        let (store, _dir) = setup().await;
        let record = ContentRecord {
            id: "c1".to_string(),
            title: "Stool".to_string(),
            handle: "stool".to_string(),
            body: "Three legs".to_string(),
            metadata: serde_json::Value::Null,
            external_id: None,
        };
        store.insert_content(&record).await.unwrap();

        store.delete_content("c1").await.unwrap();

        assert!(store.load_content("c1").await.unwrap().is_none());
        store.delete_content("ghost").await.unwrap();
    }
}
