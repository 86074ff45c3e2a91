use serde::Serialize;
use serde_json::Value;

use crate::protocol::DecodeError;
use crate::topics::TypeName;

/// Control verb adding the entity's type to the sender's subscriptions
pub const SUBSCRIBE_TYPE: &str = "__subscribe__";

/// Control verb removing the entity's type from the sender's subscriptions
pub const UNSUBSCRIBE_TYPE: &str = "__unsubscribe__";

/// Returns true for the reserved control verbs
pub fn is_control_type(message_type: &str) -> bool {
    message_type == SUBSCRIBE_TYPE || message_type == UNSUBSCRIBE_TYPE
}

/// Unit of routed data
///
/// `message_type` is the routing key and is never empty for a decoded
/// envelope. `entity` is opaque payload; the broker only looks inside it for
/// control verbs.
///
/// On the wire this is the JSON object `{"type": ..., "entity": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub entity: Value,
}

/// Routing-state change requested by a control envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Subscribe(TypeName),
    Unsubscribe(TypeName),
}

impl Envelope {
    pub fn new(message_type: impl Into<String>, entity: impl Into<Value>) -> Self {
        Self {
            message_type: message_type.into(),
            entity: entity.into(),
        }
    }

    pub fn subscribe(message_type: &TypeName) -> Self {
        Self::new(SUBSCRIBE_TYPE, message_type.as_str())
    }

    pub fn unsubscribe(message_type: &TypeName) -> Self {
        Self::new(UNSUBSCRIBE_TYPE, message_type.as_str())
    }

    pub fn is_control(&self) -> bool {
        is_control_type(&self.message_type)
    }

    /// Classify this envelope
    ///
    /// Returns `Ok(None)` for a publish. A control verb whose entity is not a
    /// non-empty string is a protocol violation.
    pub fn control(&self) -> Result<Option<Control>, DecodeError> {
        let make: fn(TypeName) -> Control = match self.message_type.as_str() {
            SUBSCRIBE_TYPE => Control::Subscribe,
            UNSUBSCRIBE_TYPE => Control::Unsubscribe,
            _ => return Ok(None),
        };

        let name = self.entity.as_str().ok_or_else(|| {
            DecodeError::malformed(format!(
                "{} entity must be a type name string",
                self.message_type
            ))
        })?;
        let type_name = TypeName::try_from(name).map_err(|_| {
            DecodeError::malformed(format!("{} entity must not be empty", self.message_type))
        })?;

        Ok(Some(make(type_name)))
    }
}
