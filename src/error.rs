//! Error types for the dispatch pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors raised inside the dispatch pipeline.
///
/// None of these propagate out of the public facade: the dispatcher is a
/// fire-and-forget surface, so they are logged at the point of failure and
/// the offending payloads dropped.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The intake queue rejected an enqueue.
    #[error("intake queue full (capacity {capacity}), payload dropped")]
    QueueFull { capacity: usize },

    /// The sink rejected a batch.
    #[error("sink rejected batch: {0}")]
    Sink(#[from] SinkError),

    /// The worker did not exit within the shutdown join window.
    #[error("worker did not stop within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },
}

/// Failure reported by a [`TaskSink`](crate::TaskSink) delivery.
///
/// The batch that produced the error is dropped; failed deliveries are
/// never retried.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    /// Create a sink error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
