/// Failure to turn wire bytes into an [`Envelope`](crate::protocol::Envelope)
///
/// Every variant is a protocol violation that is fatal to the offending
/// connection only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Bytes are not a well-formed envelope encoding
    #[error("malformed envelope: {reason}")]
    Malformed { reason: String },
    /// A required envelope field is absent
    #[error("envelope is missing required field '{field}'")]
    MissingField { field: &'static str },
    /// Declared frame length exceeds the configured maximum
    #[error("frame too large: length {actual}, max {max}")]
    FrameTooLarge { max: usize, actual: usize },
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            reason: reason.into(),
        }
    }
}

/// Failure to turn an envelope into wire bytes
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize envelope")]
    Serialize(#[source] serde_json::Error),
    #[error("frame too large: length {actual}, max {max}")]
    FrameTooLarge { max: usize, actual: usize },
}
