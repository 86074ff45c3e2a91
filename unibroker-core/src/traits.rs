//! I/O abstractions the broker core is written against
//!
//! The core never touches OS sockets directly. A runtime crate provides
//! non-blocking implementations of [`Listener`] and [`Stream`]; tests use
//! in-memory doubles.

use std::io::ErrorKind;

/// Non-blocking byte stream
pub trait Stream {
    /// Read whatever is available into `buf` without blocking
    ///
    /// Returns `Ok(0)` once the peer has closed the stream and
    /// `Err(NetworkError::WouldBlock)` when no data is ready yet.
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError>;

    /// Write as much of `buf` as the socket accepts without blocking
    fn try_write(&mut self, buf: &[u8]) -> Result<usize, NetworkError>;

    /// Close the stream
    fn close(&mut self) -> Result<(), NetworkError>;
}

/// Non-blocking connection listener
pub trait Listener {
    /// The stream type produced by this listener
    type Stream: Stream;

    /// Try to accept a new connection without blocking
    ///
    /// Returns `Err(NetworkError::WouldBlock)` immediately if no connection
    /// is pending, so the event loop can carry on with other work.
    fn try_accept(&mut self) -> Result<(Self::Stream, PeerAddr), NetworkError>;

    /// Stop listening and release the listening socket
    fn close(&mut self) -> Result<(), NetworkError>;
}

/// Sleep abstraction used by the scheduling loop between idle cycles
pub trait Delay {
    /// Sleep for `millis` milliseconds
    fn sleep_ms(&self, millis: u64);
}

/// Diagnostic label for the remote end of a connection
///
/// Never used for routing. UNIX stream peers are usually unnamed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PeerAddr(String);

impl PeerAddr {
    pub fn new(label: impl Into<String>) -> Self {
        PeerAddr(label.into())
    }

    pub fn unnamed() -> Self {
        PeerAddr("<unnamed>".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network error enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The operation cannot make progress right now; retry on the next cycle
    #[error("operation would block")]
    WouldBlock,
    /// The peer closed or reset the connection
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// Reading from the socket failed
    #[error("read failed: {0:?}")]
    ReadFailed(ErrorKind),
    /// Writing to the socket failed
    #[error("write failed: {0:?}")]
    WriteFailed(ErrorKind),
    /// Accepting a pending connection failed
    #[error("accept failed: {0:?}")]
    AcceptFailed(ErrorKind),
    /// Closing the socket failed
    #[error("close failed: {0:?}")]
    CloseFailed(ErrorKind),
}

impl NetworkError {
    /// Classify an I/O error raised while reading
    pub fn from_read(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::WouldBlock | ErrorKind::Interrupted => NetworkError::WouldBlock,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                NetworkError::ConnectionClosed
            }
            other => NetworkError::ReadFailed(other),
        }
    }

    /// Classify an I/O error raised while writing
    pub fn from_write(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::WouldBlock | ErrorKind::Interrupted => NetworkError::WouldBlock,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                NetworkError::ConnectionClosed
            }
            other => NetworkError::WriteFailed(other),
        }
    }

    /// Classify an I/O error raised while accepting
    pub fn from_accept(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::WouldBlock | ErrorKind::Interrupted => NetworkError::WouldBlock,
            other => NetworkError::AcceptFailed(other),
        }
    }
}
