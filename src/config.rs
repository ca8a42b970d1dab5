//! Dispatcher configuration and tuning constants.

use std::time::Duration;

/// Default maximum number of payloads in a single batch.
pub const DEFAULT_MAX_BATCH: usize = 20;

/// Default maximum time a partial batch waits for more payloads.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(200);

/// How long the worker sleeps between polls of an empty intake queue.
pub(crate) const IDLE_POLL: Duration = Duration::from_millis(1);

/// How often `flush` re-checks for pipeline idleness.
pub(crate) const FLUSH_POLL: Duration = Duration::from_micros(100);

/// How long `shutdown` waits for the worker to exit before proceeding.
pub(crate) const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Batching knobs, immutable once the dispatcher is built.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Maximum payloads per batch. Always at least 1.
    pub max_batch: usize,
    /// Maximum time a partial batch waits in the batching phase.
    pub max_wait: Duration,
}

impl DispatchConfig {
    /// Intake queue capacity: large enough to absorb transient bursts,
    /// small enough that persistent overload surfaces as visible drops.
    pub(crate) fn queue_capacity(&self) -> usize {
        self.max_batch * 3
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_MAX_BATCH,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}
