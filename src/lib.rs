//! In-process task dispatch with batched delivery.
//!
//! `taskrelay` accepts individually submitted task invocations and forwards
//! them to a downstream executor in batches, amortizing the per-call cost of
//! contacting the executor while bounding the latency any one payload can
//! incur. Full batches go out immediately, a lone payload is sent right
//! away, and partial batches wait out a short deadline. A lazily started
//! background worker drains the bounded intake queue; `flush` and
//! `shutdown` are the synchronization points.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use serde_json::{json, Map};
//! use taskrelay::Dispatcher;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new("worker");
//!
//!     let resize = dispatcher.register("images.resize", |args, _kwargs| {
//!         json!({ "resized": args })
//!     });
//!
//!     // Fire-and-forget: serialized and enqueued for batched delivery.
//!     resize.submit(vec![json!(640), json!(480)], Map::new());
//!
//!     // Wait until everything queued so far has reached the sink.
//!     dispatcher.flush().await;
//!     dispatcher.shutdown().await;
//! }
//! ```

mod config;
mod dispatcher;
mod error;
mod queue;
mod sink;
mod task;
mod types;
mod worker;

pub use config::{DispatchConfig, DEFAULT_MAX_BATCH, DEFAULT_MAX_WAIT};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, SinkError};
pub use sink::{LogSink, MemorySink, TaskSink};
pub use task::{TaskFn, TaskHandle};
pub use types::TaskPayload;
