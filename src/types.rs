//! Payload types passed between submitters, the dispatcher, and the sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One serialized task invocation.
///
/// The dispatcher treats payloads as opaque values: the fields pass through
/// to the sink unmodified, in submission order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Registered task identifier.
    pub task: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Named options.
    pub kwargs: Map<String, Value>,
}

impl TaskPayload {
    /// Create a payload for the named task.
    pub fn new(task: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            task: task.into(),
            args,
            kwargs,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_json_shape() {
        let mut kwargs = Map::new();
        kwargs.insert("retries".to_string(), json!(3));
        let payload = TaskPayload::new("images.resize", vec![json!(640), json!(480)], kwargs);

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "task": "images.resize",
                "args": [640, 480],
                "kwargs": {"retries": 3},
            })
        );
    }

    #[test]
    fn test_payload_round_trips() {
        let payload = TaskPayload::new("reports.build", vec![json!("daily")], Map::new());
        let parsed: TaskPayload = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(parsed, payload);
    }
}
