//! Task definition and wire format.

use crate::error::DecodeError;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Handler-interpreted task arguments.
pub type Payload = Map<String, Value>;

/// The unit of work pulled from the queue.
///
/// A task is never mutated while a worker holds it; a retry produces a new
/// copy through [`Task::next_attempt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Type tag selecting the handler
    #[serde(rename = "type", default)]
    pub task_type: String,
    /// Handler arguments; `None` when the message carried no payload
    #[serde(default)]
    pub payload: Option<Payload>,
    /// Remaining retry budget
    #[serde(default)]
    pub retries: u32,
    /// Failed attempts so far; producers normally leave this out
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Task {
    /// Create a task with the given type, payload and retry budget.
    pub fn new(task_type: impl Into<String>, payload: Payload, retries: u32) -> Self {
        Self {
            task_type: task_type.into(),
            payload: Some(payload),
            retries,
            attempts: 0,
        }
    }

    /// Decode a raw queue message.
    ///
    /// Only a JSON object is accepted; the derived deserializer would also
    /// take the positional array form.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Value>(raw)? {
            value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
            _ => Err(DecodeError(serde_json::Error::custom(
                "task message must be a JSON object",
            ))),
        }
    }

    /// Encode this task for the queue.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The copy that goes back on the queue after a failed attempt.
    ///
    /// `None` when the budget is already spent.
    pub fn next_attempt(&self) -> Option<Self> {
        let retries = self.retries.checked_sub(1)?;
        Some(Self {
            retries,
            attempts: self.attempts.saturating_add(1),
            ..self.clone()
        })
    }

    /// True when the payload is absent or has no keys.
    pub fn has_empty_payload(&self) -> bool {
        self.payload.as_ref().is_none_or(Map::is_empty)
    }

    /// Look up a payload field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }
}
