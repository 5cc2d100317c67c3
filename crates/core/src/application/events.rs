// In-process job event broadcast
// Scoped to the process lifetime; subscribers receive events by message passing.

use crate::domain::{JobId, JobKind};
use tokio::sync::broadcast;

/// Status change observed by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Claimed { job_id: JobId, kind: JobKind },
    Completed { job_id: JobId, kind: JobKind },
    Failed { job_id: JobId, kind: JobKind, error: String },
    /// Claimed but returned to pending before it started (paused mid-batch)
    Released { job_id: JobId, kind: JobKind },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Claimed { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Released { job_id, .. } => job_id,
        }
    }
}

/// Publish/subscribe registry for job events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishing with no subscribers is not an error
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::application::constants::EVENT_BUS_CAPACITY)
    }
}
