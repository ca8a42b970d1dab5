//! Dispatcher facade: submission, worker lifecycle, and synchronization.

use crate::config::{
    DispatchConfig, DEFAULT_MAX_BATCH, DEFAULT_MAX_WAIT, FLUSH_POLL, SHUTDOWN_JOIN_TIMEOUT,
};
use crate::error::DispatchError;
use crate::queue::IntakeQueue;
use crate::sink::{LogSink, TaskSink};
use crate::task::{TaskFn, TaskHandle};
use crate::types::TaskPayload;
use crate::worker::Worker;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Builder for configuring a [`Dispatcher`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct DispatcherBuilder {
    name: String,
    max_batch: usize,
    max_wait: Duration,
    sink: Option<Arc<dyn TaskSink>>,
}

impl DispatcherBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_batch: DEFAULT_MAX_BATCH,
            max_wait: DEFAULT_MAX_WAIT,
            sink: None,
        }
    }

    /// Set the maximum batch size. Values below 1 are clamped to 1.
    pub fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Set the maximum time a partial batch waits for more payloads.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the downstream sink.
    pub fn sink<S: TaskSink + 'static>(self, sink: S) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Set the downstream sink from a shared handle.
    ///
    /// Useful when the caller wants to keep its own reference to the sink,
    /// e.g. to inspect recorded batches in tests.
    pub fn shared_sink(mut self, sink: Arc<dyn TaskSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the dispatcher. The worker is not started until the first
    /// [`submit`](Dispatcher::submit).
    pub fn build(self) -> Dispatcher {
        let config = DispatchConfig {
            max_batch: self.max_batch,
            max_wait: self.max_wait,
        };
        let queue = IntakeQueue::new(config.queue_capacity());
        Dispatcher {
            inner: Arc::new(Shared {
                name: self.name,
                config,
                sink: self.sink.unwrap_or_else(|| Arc::new(LogSink)),
                queue,
                buffer: Mutex::new(Vec::new()),
                worker: Mutex::new(None),
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Handle to the live worker task. At most one exists per dispatcher.
pub(crate) struct WorkerHandle {
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) join: JoinHandle<()>,
}

/// State shared between dispatcher handles and the worker.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) config: DispatchConfig,
    pub(crate) sink: Arc<dyn TaskSink>,
    pub(crate) queue: IntakeQueue,
    /// Accumulation buffer for the batch being assembled. Mutated only by
    /// the worker; the lock also covers dequeues and sink calls so that
    /// idleness checks and deliveries cannot interleave.
    pub(crate) buffer: Mutex<Vec<TaskPayload>>,
    pub(crate) worker: Mutex<Option<WorkerHandle>>,
    pub(crate) registry: Mutex<HashMap<String, TaskFn>>,
}

/// In-process task-dispatch client.
///
/// Accepts individually submitted payloads and forwards them to the sink
/// in batches: full batches go out immediately, partial batches after a
/// short deadline, and a lone payload right away. A background worker is
/// started lazily on the first submission and restarted if it terminated.
///
/// Cloning is cheap; all clones share one pipeline.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Shared>,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration and a [`LogSink`].
    pub fn new(name: impl Into<String>) -> Self {
        Self::builder(name).build()
    }

    /// Create a builder for a customized dispatcher.
    pub fn builder(name: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(name)
    }

    /// Identifying name given at construction.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Batching configuration fixed at build time.
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Register an application function under `name` and return a handle
    /// whose `submit` serializes calls into this dispatcher.
    ///
    /// Registering the same name again replaces the previous function.
    pub fn register<F>(&self, name: impl Into<String>, func: F) -> TaskHandle
    where
        F: Fn(&[Value], &Map<String, Value>) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        let func: TaskFn = Arc::new(func);
        if self
            .inner
            .registry
            .lock()
            .insert(name.clone(), func.clone())
            .is_some()
        {
            debug!(task = %name, "task re-registered");
        }
        TaskHandle::new(name, func, self.clone())
    }

    /// Look up a registered task function by name.
    pub fn task_fn(&self, name: &str) -> Option<TaskFn> {
        self.inner.registry.lock().get(name).cloned()
    }

    /// Enqueue one payload for batched delivery.
    ///
    /// Starts the worker on first use and restarts it if it has
    /// terminated. Never blocks beyond the enqueue attempt and never
    /// fails: when the intake queue is full the payload is dropped with a
    /// warning.
    pub fn submit(&self, payload: TaskPayload) {
        self.ensure_worker();
        if let Err(err) = self.inner.queue.try_put(payload) {
            warn!(dispatcher = %self.inner.name, %err, "dropping payload");
        }
    }

    /// True when the intake queue and the accumulation buffer are both
    /// empty at the moment of the check.
    ///
    /// This is a point-in-time snapshot; callers that need the pipeline to
    /// stay idle should use [`flush`](Self::flush) on a quiescent
    /// submitter side.
    pub fn processing_complete(&self) -> bool {
        let buffer = self.inner.buffer.lock();
        self.inner.queue.is_empty() && buffer.is_empty()
    }

    /// Wait until everything submitted so far has been handed to the sink
    /// (or dropped at enqueue time).
    ///
    /// Returns immediately when the pipeline is already idle. If payloads
    /// are queued but no worker is alive (a submit made outside a tokio
    /// runtime, or a worker that terminated abnormally), flush starts one
    /// so the backlog still drains. Does not stop the worker, and makes no
    /// guarantee once new submissions race it.
    pub async fn flush(&self) {
        loop {
            if self.processing_complete() {
                return;
            }
            if !self.worker_alive() {
                self.ensure_worker();
                if !self.worker_alive() {
                    return;
                }
            }
            tokio::time::sleep(FLUSH_POLL).await;
        }
    }

    /// Stop the worker, waiting up to a bounded join timeout.
    ///
    /// The stop signal is observed at epoch boundaries, so a batch in
    /// flight is finished but payloads still in the intake queue are
    /// abandoned. Call [`flush`](Self::flush) first to drain. Safe to call
    /// repeatedly; a later [`submit`](Self::submit) starts a fresh worker.
    pub async fn shutdown(&self) {
        let handle = self.inner.worker.lock().take();
        let Some(handle) = handle else {
            return;
        };
        handle.stop.store(true, Ordering::Release);
        match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, handle.join).await {
            Ok(Ok(())) => debug!(dispatcher = %self.inner.name, "worker stopped"),
            Ok(Err(err)) => {
                warn!(dispatcher = %self.inner.name, %err, "worker terminated abnormally")
            }
            Err(_) => {
                let err = DispatchError::ShutdownTimeout {
                    timeout: SHUTDOWN_JOIN_TIMEOUT,
                };
                warn!(dispatcher = %self.inner.name, %err, "proceeding without join");
            }
        }
    }

    fn worker_alive(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.join.is_finished())
    }

    /// Atomic check-and-spawn: exactly one live worker per dispatcher.
    fn ensure_worker(&self) {
        let mut slot = self.inner.worker.lock();
        if slot.as_ref().is_some_and(|handle| !handle.join.is_finished()) {
            return;
        }
        if slot.take().is_some() {
            debug!(dispatcher = %self.inner.name, "worker terminated, restarting");
        }
        let Ok(runtime) = Handle::try_current() else {
            // The payload is still enqueued; a later submit or flush made
            // inside a runtime starts the worker and drains it.
            warn!(dispatcher = %self.inner.name, "no tokio runtime, worker not started");
            return;
        };
        let stop = Arc::new(AtomicBool::new(false));
        let worker = Worker::new(Arc::downgrade(&self.inner), stop.clone());
        let join = runtime.spawn(worker.run());
        debug!(dispatcher = %self.inner.name, "worker started");
        *slot = Some(WorkerHandle { stop, join });
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("worker_alive", &self.worker_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_clamps_max_batch() {
        let dispatcher = Dispatcher::builder("clamped").max_batch(0).build();
        assert_eq!(dispatcher.config().max_batch, 1);
    }

    #[test]
    fn test_flush_without_worker_returns_immediately() {
        let dispatcher = Dispatcher::new("idle");
        tokio_test::block_on(dispatcher.flush());
        assert!(dispatcher.processing_complete());
    }

    #[test]
    fn test_shutdown_without_worker_is_a_noop() {
        let dispatcher = Dispatcher::new("idle");
        tokio_test::block_on(async {
            dispatcher.shutdown().await;
            dispatcher.shutdown().await;
        });
    }

    #[test]
    fn test_register_and_call_directly() {
        let dispatcher = Dispatcher::new("registry");
        let add = dispatcher.register("math.add", |args, _kwargs| {
            let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
            json!(total)
        });

        assert_eq!(add.name(), "math.add");
        assert_eq!(add.call(&[json!(2), json!(3)], &Map::new()), json!(5));

        let looked_up = dispatcher.task_fn("math.add").unwrap();
        assert_eq!(looked_up(&[json!(1)], &Map::new()), json!(1));
        assert!(dispatcher.task_fn("math.missing").is_none());
    }

    #[test]
    fn test_handle_serializes_calls() {
        let dispatcher = Dispatcher::new("serialize");
        let handle = dispatcher.register("notify", |_args, _kwargs| json!(null));

        let payload = handle.payload(vec![json!("alice")], Map::new());
        assert_eq!(payload.task, "notify");
        assert_eq!(payload.args, vec![json!("alice")]);

        let wire = handle.to_json(vec![json!("alice")], Map::new()).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&wire).unwrap(),
            json!({"task": "notify", "args": ["alice"], "kwargs": {}})
        );
    }
}
