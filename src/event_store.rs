use crate::error::BridgeError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// One JSON object reported by the device, tagged with its arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Starts at 1, never reused
    pub id: u64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

struct Inner {
    events: Vec<Arc<Event>>,
    last_id: u64,
}

/// Append-only sequence of device events shared by the serial listener and HTTP handlers.
pub struct EventStore {
    line_prefix: String,
    inner: RwLock<Inner>,
}

impl EventStore {
    pub fn new(line_prefix: impl Into<String>) -> Self {
        Self {
            line_prefix: line_prefix.into(),
            inner: RwLock::new(Inner {
                events: Vec::new(),
                last_id: 0,
            }),
        }
    }

    /// Parses one device line and records it. A rejected line leaves the id counter untouched.
    pub async fn append(&self, raw_line: &str) -> Result<Arc<Event>, BridgeError> {
        let mut fields = self.parse_line(raw_line)?;
        // The assigned id wins over anything the firmware sent
        fields.remove("id");

        let mut inner = self.inner.write().await;
        inner.last_id += 1;
        let event = Arc::new(Event {
            id: inner.last_id,
            fields,
        });
        inner.events.push(Arc::clone(&event));
        Ok(event)
    }

    pub async fn latest(&self) -> Option<Arc<Event>> {
        self.inner.read().await.events.last().cloned()
    }

    /// Events with an id greater than `after_id`, oldest first.
    pub async fn since(&self, after_id: u64) -> Vec<Arc<Event>> {
        let inner = self.inner.read().await;
        // ids are dense and start at 1, so event `n` lives at index `n - 1`
        let start = usize::try_from(after_id)
            .unwrap_or(usize::MAX)
            .min(inner.events.len());
        inner.events[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    fn parse_line(&self, raw_line: &str) -> Result<Map<String, Value>, BridgeError> {
        let trimmed = raw_line.trim();
        let payload = if self.line_prefix.is_empty() {
            trimmed
        } else {
            trimmed.strip_prefix(self.line_prefix.as_str()).unwrap_or(trimmed)
        };

        let fail = |reason: String| BridgeError::LineParse {
            line: raw_line.to_string(),
            reason,
        };

        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(other) => Err(fail(format!("expected a JSON object, got {}", type_name(&other)))),
            Err(e) => Err(fail(e.to_string())),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
