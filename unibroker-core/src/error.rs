use std::path::PathBuf;

use crate::address::AddressError;
use crate::connection::CloseReason;
use crate::protocol::EncodeError;

/// Errors raised while setting up or driving a broker
///
/// Failures of a single connection never surface here; they close that
/// connection and are logged.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to create listening socket")]
    SocketCreation(#[source] std::io::Error),

    #[error("failed to bind {}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid broker address")]
    Address(#[from] AddressError),

    #[error("broker is not serving")]
    NotServing,
}

/// Errors raised by the client facade
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {}", path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid broker address")]
    Address(#[from] AddressError),

    #[error("message type must not be empty")]
    EmptyType,

    #[error("message type '{0}' is reserved for control messages")]
    ReservedType(String),

    #[error("failed to encode envelope")]
    Encode(#[from] EncodeError),

    #[error("connection closed: {0}")]
    Closed(CloseReason),

    #[error("timed out with {pending} frames unsent")]
    FlushTimeout { pending: usize },
}
