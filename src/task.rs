//! Task registration and submission handles.

use crate::dispatcher::Dispatcher;
use crate::types::TaskPayload;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A registered application function.
pub type TaskFn = Arc<dyn Fn(&[Value], &Map<String, Value>) -> Value + Send + Sync>;

/// Handle to a registered task.
///
/// Created by [`Dispatcher::register`]. The handle supports direct
/// invocation ([`call`](Self::call)) and fire-and-forget submission of a
/// serialized call to the dispatcher ([`submit`](Self::submit)).
#[derive(Clone)]
pub struct TaskHandle {
    name: String,
    func: TaskFn,
    dispatcher: Dispatcher,
}

impl TaskHandle {
    pub(crate) fn new(name: String, func: TaskFn, dispatcher: Dispatcher) -> Self {
        Self {
            name,
            func,
            dispatcher,
        }
    }

    /// Registered task identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the registered function directly, bypassing the dispatcher.
    pub fn call(&self, args: &[Value], kwargs: &Map<String, Value>) -> Value {
        (self.func)(args, kwargs)
    }

    /// Serialize a call into a payload without submitting it.
    pub fn payload(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> TaskPayload {
        TaskPayload::new(self.name.clone(), args, kwargs)
    }

    /// Serialize a call to its JSON wire form.
    pub fn to_json(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> serde_json::Result<String> {
        self.payload(args, kwargs).to_json()
    }

    /// Serialize a call and enqueue it for batched delivery.
    pub fn submit(&self, args: Vec<Value>, kwargs: Map<String, Value>) {
        self.dispatcher.submit(self.payload(args, kwargs));
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("dispatcher", &self.dispatcher.name())
            .finish()
    }
}
