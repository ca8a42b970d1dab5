//! The downstream executor seam.

use crate::error::SinkError;
use crate::types::TaskPayload;
use parking_lot::Mutex;
use tracing::debug;

/// Downstream executor interface.
///
/// The dispatcher hands over non-empty batches whose element order matches
/// the order the payloads left the intake queue. Delivery is synchronous
/// from the dispatcher's perspective: `deliver` either returns `Ok` or the
/// batch is logged and dropped. Failed batches are not retried.
pub trait TaskSink: Send + Sync {
    /// Accept one batch of payloads.
    fn deliver(&self, batch: Vec<TaskPayload>) -> Result<(), SinkError>;
}

/// Sink that logs each batch at debug level and discards it.
///
/// Stands in for a real executor in examples and local development; used
/// as the default when a dispatcher is built without a sink.
#[derive(Debug, Default)]
pub struct LogSink;

impl TaskSink for LogSink {
    fn deliver(&self, batch: Vec<TaskPayload>) -> Result<(), SinkError> {
        debug!(len = batch.len(), "executed batch");
        Ok(())
    }
}

/// Sink that records every delivered batch in memory.
///
/// Lets tests observe batch boundaries and payload ordering.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<TaskPayload>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All batches delivered so far, in delivery order.
    pub fn batches(&self) -> Vec<Vec<TaskPayload>> {
        self.batches.lock().clone()
    }

    /// Number of deliveries so far.
    pub fn delivery_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Every payload delivered so far, flattened in delivery order.
    pub fn payloads(&self) -> Vec<TaskPayload> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl TaskSink for MemorySink {
    fn deliver(&self, batch: Vec<TaskPayload>) -> Result<(), SinkError> {
        self.batches.lock().push(batch);
        Ok(())
    }
}
