// ID Provider Port (deterministic IDs in tests)

/// Source of new job and record identifiers
pub trait IdProvider: Send + Sync {
    fn generate_id(&self) -> String;
}

/// UUID v4 ids (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ids with a fixed prefix: `{prefix}-1`, `{prefix}-2`, ...
pub struct SequentialIdProvider {
    prefix: String,
    next: std::sync::atomic::AtomicU64,
}

impl SequentialIdProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
