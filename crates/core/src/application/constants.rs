// Pipeline defaults (no magic values in services)
use std::time::Duration;

/// Jobs claimed per iteration
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Simultaneous item processor invocations per batch
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

/// Idle sleep for batch workers once the queue is drained (20s)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(20);

/// Idle sleep for tight scan loops (500ms)
pub const DEFAULT_SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Sleep after an iteration-level failure before polling again (5s)
pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(5);

/// Pause after each item completes, holding its concurrency slot (250ms)
pub const DEFAULT_INTER_ITEM_DELAY: Duration = Duration::from_millis(250);

/// Upper bound on a single outbound HTTP request (30s)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on one item processor invocation, backoff sleeps included (5 min)
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// External attempts per item before a rate-limited call is given up
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Linear backoff unit: attempt N waits N * base (2s)
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(2);

/// Claims older than this without a terminal status are considered orphaned (30 min).
/// Must outlast a full default batch: 5 waves of 10 items at up to 5 min each.
pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How often the scheduler loop sweeps stale claims (60s)
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// attempt_count ceiling above which a job is never requeued again
pub const DEFAULT_MAX_TOTAL_ATTEMPTS: i32 = 25;

/// Buffered job events per subscriber before lagging
pub const EVENT_BUS_CAPACITY: usize = 256;
