//! Background worker: drains the intake queue and delivers batches.

use crate::config::IDLE_POLL;
use crate::dispatcher::Shared;
use crate::error::DispatchError;
use crate::types::TaskPayload;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error};

/// The dispatcher's long-lived background task.
///
/// Runs one epoch at a time: acquire a seed payload, opportunistically
/// collect whatever else is already queued, then either deliver the batch
/// immediately or wait out the batching deadline. The worker holds only a
/// weak reference to the dispatcher internals, so once every dispatcher
/// handle is dropped it retires at the next epoch boundary.
pub(crate) struct Worker {
    shared: Weak<Shared>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    pub(crate) fn new(shared: Weak<Shared>, stop: Arc<AtomicBool>) -> Self {
        Self { shared, stop }
    }

    pub(crate) async fn run(self) {
        debug!("dispatch worker running");
        loop {
            // The stop signal is only observed between epochs; a batch
            // already being assembled or delivered is finished first.
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let Some(shared) = self.shared.upgrade() else {
                break;
            };

            if !Self::seed(&shared) {
                drop(shared);
                tokio::time::sleep(IDLE_POLL).await;
                continue;
            }

            Self::collect(&shared);
            if Self::process_buffer(&shared) {
                Self::timed_batching(&shared);
            }
        }
        debug!("dispatch worker stopped");
    }

    /// Pull the first payload of the next batch into the buffer.
    ///
    /// The dequeue happens under the buffer lock so `processing_complete`
    /// can never observe a payload that is in neither the queue nor the
    /// buffer.
    fn seed(shared: &Shared) -> bool {
        let mut buffer = shared.buffer.lock();
        match shared.queue.try_get() {
            Some(payload) => {
                buffer.push(payload);
                true
            }
            None => false,
        }
    }

    /// Non-blocking drain: absorb whatever is already queued, up to the
    /// batch cap, without touching the deadline timer.
    fn collect(shared: &Shared) {
        let max_batch = shared.config.max_batch;
        let mut buffer = shared.buffer.lock();
        while buffer.len() < max_batch {
            match shared.queue.try_get() {
                Some(payload) => buffer.push(payload),
                None => break,
            }
        }
    }

    /// Decide what to do with the collected buffer.
    ///
    /// Full batches and lone payloads go out immediately, as does a
    /// multi-payload burst whose source has already drained. Returns true
    /// when the buffer should instead enter the timed batching phase.
    fn process_buffer(shared: &Shared) -> bool {
        let mut buffer = shared.buffer.lock();
        if buffer.is_empty() {
            return false;
        }
        if buffer.len() == shared.config.max_batch {
            Self::deliver(shared, &mut buffer, "full");
            return false;
        }
        if buffer.len() == 1 {
            // A lone payload is not worth the batching wait.
            Self::deliver(shared, &mut buffer, "single");
            return false;
        }
        if shared.queue.is_empty() {
            // The burst has fully drained and is not expected to grow soon.
            Self::deliver(shared, &mut buffer, "drained");
            return false;
        }
        true
    }

    /// Wait out the batching deadline, appending payloads as they arrive.
    ///
    /// Exits on the first of: deadline reached, buffer full, or the queue
    /// coming up empty. The last case delivers immediately: once the
    /// source has gone quiet we prefer latency over further accumulation.
    fn timed_batching(shared: &Shared) {
        let deadline = Instant::now() + shared.config.max_wait;
        loop {
            let mut buffer = shared.buffer.lock();
            if Instant::now() >= deadline {
                Self::deliver(shared, &mut buffer, "timeout");
                return;
            }
            match shared.queue.try_get() {
                Some(payload) => {
                    buffer.push(payload);
                    if buffer.len() == shared.config.max_batch {
                        Self::deliver(shared, &mut buffer, "full-during-wait");
                        return;
                    }
                }
                None => {
                    if !buffer.is_empty() {
                        Self::deliver(shared, &mut buffer, "drained-during-wait");
                    }
                    return;
                }
            }
        }
    }

    /// Snapshot the buffer into a batch, clear it, then call the sink.
    ///
    /// The buffer is cleared before the sink call so its length invariant
    /// holds even while a slow sink is running. The caller keeps the
    /// buffer lock across the call, which is what makes `flush` returning
    /// mean the sink has actually accepted everything submitted before it.
    fn deliver(shared: &Shared, buffer: &mut Vec<TaskPayload>, reason: &str) {
        let batch: Vec<TaskPayload> = buffer.drain(..).collect();
        debug!(reason, len = batch.len(), "delivering batch");
        if let Err(err) = shared.sink.deliver(batch) {
            let err = DispatchError::from(err);
            error!(reason, %err, "payloads dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatcher::Shared;
    use crate::queue::IntakeQueue;
    use crate::sink::MemorySink;
    use parking_lot::Mutex;
    use serde_json::{json, Map};
    use std::collections::HashMap;
    use std::time::Duration;

    fn payload(n: i64) -> TaskPayload {
        TaskPayload::new("t", vec![json!(n)], Map::new())
    }

    fn shared_with(max_batch: usize, max_wait: Duration) -> (Arc<Shared>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = DispatchConfig {
            max_batch,
            max_wait,
        };
        let queue = IntakeQueue::new(config.queue_capacity());
        let shared = Arc::new(Shared {
            name: "test".to_string(),
            config,
            sink: sink.clone(),
            queue,
            buffer: Mutex::new(Vec::new()),
            worker: Mutex::new(None),
            registry: Mutex::new(HashMap::new()),
        });
        (shared, sink)
    }

    fn batch_args(batch: &[TaskPayload]) -> Vec<i64> {
        batch.iter().map(|p| p.args[0].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_seed_then_collect_caps_at_max_batch() {
        let (shared, _sink) = shared_with(3, Duration::from_millis(200));
        for n in 0..5 {
            shared.queue.try_put(payload(n)).unwrap();
        }

        assert!(Worker::seed(&shared));
        Worker::collect(&shared);

        assert_eq!(shared.buffer.lock().len(), 3);
        assert_eq!(shared.queue.len(), 2);
    }

    #[test]
    fn test_process_buffer_sends_full_batch() {
        let (shared, sink) = shared_with(2, Duration::from_millis(200));
        shared.buffer.lock().extend([payload(0), payload(1)]);

        assert!(!Worker::process_buffer(&shared));
        assert_eq!(sink.batches(), vec![vec![payload(0), payload(1)]]);
        assert!(shared.buffer.lock().is_empty());
    }

    #[test]
    fn test_process_buffer_sends_lone_payload() {
        let (shared, sink) = shared_with(20, Duration::from_millis(200));
        shared.buffer.lock().push(payload(7));

        assert!(!Worker::process_buffer(&shared));
        assert_eq!(sink.delivery_count(), 1);
        assert_eq!(batch_args(&sink.batches()[0]), vec![7]);
    }

    #[test]
    fn test_process_buffer_sends_drained_burst() {
        let (shared, sink) = shared_with(20, Duration::from_millis(200));
        shared.buffer.lock().extend([payload(0), payload(1), payload(2)]);

        assert!(!Worker::process_buffer(&shared));
        assert_eq!(batch_args(&sink.batches()[0]), vec![0, 1, 2]);
    }

    #[test]
    fn test_process_buffer_waits_when_queue_active() {
        let (shared, sink) = shared_with(20, Duration::from_millis(200));
        shared.buffer.lock().extend([payload(0), payload(1)]);
        shared.queue.try_put(payload(2)).unwrap();

        assert!(Worker::process_buffer(&shared));
        assert_eq!(sink.delivery_count(), 0);
        assert_eq!(shared.buffer.lock().len(), 2);
    }

    #[test]
    fn test_timed_batching_timeout_sends_partial_batch() {
        // A zero deadline forces the timeout branch on the first check.
        let (shared, sink) = shared_with(20, Duration::ZERO);
        shared.buffer.lock().extend([payload(0), payload(1)]);

        Worker::timed_batching(&shared);

        assert_eq!(batch_args(&sink.batches()[0]), vec![0, 1]);
        assert!(shared.buffer.lock().is_empty());
    }

    #[test]
    fn test_timed_batching_delivers_when_source_goes_quiet() {
        let (shared, sink) = shared_with(20, Duration::from_secs(5));
        shared.buffer.lock().extend([payload(0), payload(1)]);
        shared.queue.try_put(payload(2)).unwrap();

        Worker::timed_batching(&shared);

        assert_eq!(sink.delivery_count(), 1);
        assert_eq!(batch_args(&sink.batches()[0]), vec![0, 1, 2]);
    }

    #[test]
    fn test_timed_batching_sends_when_batch_fills() {
        let (shared, sink) = shared_with(3, Duration::from_secs(5));
        shared.buffer.lock().extend([payload(0), payload(1)]);
        shared.queue.try_put(payload(2)).unwrap();
        shared.queue.try_put(payload(3)).unwrap();

        Worker::timed_batching(&shared);

        assert_eq!(batch_args(&sink.batches()[0]), vec![0, 1, 2]);
        // The payload that did not fit stays queued for the next epoch.
        assert_eq!(shared.queue.len(), 1);
    }
}
