//! Bounded intake queue between submitters and the dispatcher worker.

use crate::error::DispatchError;
use crate::types::TaskPayload;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Bounded multi-producer, single-consumer FIFO.
///
/// Producers enqueue with [`try_put`](Self::try_put); only the worker
/// dequeues. All operations are non-blocking. The capacity is fixed so
/// that persistent overload shows up as visible drops rather than
/// unbounded memory growth.
pub(crate) struct IntakeQueue {
    items: Mutex<VecDeque<TaskPayload>>,
    capacity: usize,
}

impl IntakeQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Non-blocking enqueue. Fails when the queue is at capacity.
    pub(crate) fn try_put(&self, payload: TaskPayload) -> Result<(), DispatchError> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(DispatchError::QueueFull {
                capacity: self.capacity,
            });
        }
        items.push_back(payload);
        Ok(())
    }

    /// Non-blocking dequeue. Returns `None` when the queue is empty.
    pub(crate) fn try_get(&self) -> Option<TaskPayload> {
        self.items.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
