// Payload Store Port
// Resolves `payload_ref` into the records item processors act on, and
// persists what they learn (external ids, probe results).

use crate::domain::{ContentRecord, ScanTarget};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait PayloadStore: Send + Sync {
    async fn insert_content(&self, record: &ContentRecord) -> Result<()>;

    async fn load_content(&self, id: &str) -> Result<Option<ContentRecord>>;

    /// Store the host-assigned identifier on the content record
    async fn record_published(&self, id: &str, external_id: &str) -> Result<()>;

    async fn insert_scan_target(&self, target: &ScanTarget) -> Result<()>;

    async fn load_scan_target(&self, id: &str) -> Result<Option<ScanTarget>>;

    async fn record_probe(&self, id: &str, http_status: u16, probed_at: i64) -> Result<()>;

    /// Remove a record whose job was never enqueued. Missing ids are ignored.
    async fn delete_content(&self, id: &str) -> Result<()>;

    async fn delete_scan_target(&self, id: &str) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryPayloadStore {
        content: Mutex<HashMap<String, ContentRecord>>,
        targets: Mutex<HashMap<String, ScanTarget>>,
    }

    impl InMemoryPayloadStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn content(&self, id: &str) -> Option<ContentRecord> {
            self.content.lock().unwrap().get(id).cloned()
        }

        pub fn target(&self, id: &str) -> Option<ScanTarget> {
            self.targets.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl PayloadStore for InMemoryPayloadStore {
        async fn insert_content(&self, record: &ContentRecord) -> Result<()> {
            self.content
                .lock()
                .unwrap()
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn load_content(&self, id: &str) -> Result<Option<ContentRecord>> {
            Ok(self.content(id))
        }

        async fn record_published(&self, id: &str, external_id: &str) -> Result<()> {
            let mut map = self.content.lock().unwrap();
            let record = map
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Content {} not found", id)))?;
            record.external_id = Some(external_id.to_string());
            Ok(())
        }

        async fn insert_scan_target(&self, target: &ScanTarget) -> Result<()> {
            self.targets
                .lock()
                .unwrap()
                .insert(target.id.clone(), target.clone());
            Ok(())
        }

        async fn load_scan_target(&self, id: &str) -> Result<Option<ScanTarget>> {
            Ok(self.target(id))
        }

        async fn record_probe(&self, id: &str, http_status: u16, probed_at: i64) -> Result<()> {
            let mut map = self.targets.lock().unwrap();
            let target = map
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("Scan target {} not found", id)))?;
            target.last_http_status = Some(http_status);
            target.last_probed_at = Some(probed_at);
            Ok(())
        }

        async fn delete_content(&self, id: &str) -> Result<()> {
            self.content.lock().unwrap().remove(id);
            Ok(())
        }

        async fn delete_scan_target(&self, id: &str) -> Result<()> {
            self.targets.lock().unwrap().remove(id);
            Ok(())
        }
    }
}
