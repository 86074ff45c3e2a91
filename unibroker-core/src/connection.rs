//! Connection endpoints
//!
//! An [`Endpoint`] is one stream socket together with its inbound frame
//! decoder, its outbound queue and its liveness. The broker wraps each
//! accepted stream in a [`Connection`]; the client facade embeds an endpoint
//! of its own. Both reach the shared operations through [`HasEndpoint`].

use std::collections::BTreeSet;
use std::io::ErrorKind;

use bytes::Bytes;
use log::{debug, trace};

use crate::config::EndpointConfig;
use crate::egress::{EgressQueue, EnqueueOutcome};
use crate::protocol::{
    encode_with_limit, DecodeError, DecodedFrame, EncodeError, Envelope, FrameDecoder,
};
use crate::topics::TypeName;
use crate::traits::{NetworkError, PeerAddr, Stream};

/// Broker-assigned connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why an endpoint stopped being alive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    Protocol(DecodeError),
    Network(NetworkError),
    EgressOverflow { depth: usize },
    /// Turned away at accept time
    Rejected,
    Shutdown,
    /// Closed by its owner
    Local,
}

impl core::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed the connection"),
            CloseReason::Protocol(e) => write!(f, "protocol violation: {}", e),
            CloseReason::Network(e) => write!(f, "network error: {}", e),
            CloseReason::EgressOverflow { depth } => {
                write!(f, "egress queue overflow at {} frames", depth)
            }
            CloseReason::Rejected => write!(f, "connection limit reached"),
            CloseReason::Shutdown => write!(f, "broker shutting down"),
            CloseReason::Local => write!(f, "closed locally"),
        }
    }
}

/// Traffic counters of one endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub frames_in: u64,
    pub frames_out: u64,
}

/// Socket plus inbound/outbound buffering and liveness
#[derive(Debug)]
pub struct Endpoint<S: Stream> {
    stream: S,
    decoder: FrameDecoder,
    egress: EgressQueue,
    read_buf: Vec<u8>,
    config: EndpointConfig,
    close_reason: Option<CloseReason>,
    stats: EndpointStats,
}

impl<S: Stream> Endpoint<S> {
    pub fn new(stream: S, config: EndpointConfig) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(config.max_frame_len),
            egress: EgressQueue::new(config.max_egress_depth, config.overflow_policy),
            read_buf: vec![0; config.read_chunk_size.max(1)],
            config,
            close_reason: None,
            stats: EndpointStats::default(),
        }
    }

    /// One non-blocking read, returning every envelope it completed
    ///
    /// Envelopes decoded ahead of a bad frame are still returned; the bad
    /// frame closes the endpoint.
    pub fn read_available(&mut self) -> Vec<Envelope> {
        self.read_frames()
            .into_iter()
            .map(|decoded| decoded.envelope)
            .collect()
    }

    /// Same as [`read_available`](Self::read_available), keeping each
    /// envelope's original frame
    pub fn read_frames(&mut self) -> Vec<DecodedFrame> {
        if !self.is_alive() {
            return Vec::new();
        }

        match self.stream.try_read(&mut self.read_buf) {
            Ok(0) => {
                self.close(CloseReason::PeerClosed);
                return Vec::new();
            }
            Ok(n) => {
                trace!("Read {} bytes", n);
                self.stats.bytes_in += n as u64;
                self.decoder.extend(&self.read_buf[..n]);
            }
            Err(NetworkError::WouldBlock) => return Vec::new(),
            Err(NetworkError::ConnectionClosed) => {
                self.close(CloseReason::PeerClosed);
                return Vec::new();
            }
            Err(e) => {
                self.close(CloseReason::Network(e));
                return Vec::new();
            }
        }

        let mut frames = Vec::new();
        loop {
            match self.decoder.decode_next_frame() {
                Ok(Some(decoded)) => frames.push(decoded),
                Ok(None) => break,
                Err(e) => {
                    self.close(CloseReason::Protocol(e));
                    break;
                }
            }
        }
        self.stats.frames_in += frames.len() as u64;
        frames
    }

    /// Encode `envelope` and append it to the egress queue
    pub fn enqueue_outbound(&mut self, envelope: &Envelope) -> Result<EnqueueOutcome, EncodeError> {
        let frame = encode_with_limit(envelope, self.config.max_frame_len)?;
        Ok(self.enqueue_frame(frame))
    }

    /// Append an already encoded frame
    ///
    /// Under [`OverflowPolicy::DropConnection`](crate::egress::OverflowPolicy::DropConnection)
    /// a full queue closes the endpoint.
    pub fn enqueue_frame(&mut self, frame: Bytes) -> EnqueueOutcome {
        if !self.is_alive() {
            return EnqueueOutcome::Discarded;
        }

        let outcome = self.egress.push(frame);
        match outcome {
            EnqueueOutcome::Overflow => {
                let depth = self.egress.len();
                self.close(CloseReason::EgressOverflow { depth });
            }
            EnqueueOutcome::DroppedOldest | EnqueueOutcome::DroppedNewest => {
                debug!(
                    "Egress queue full, {:?} ({} dropped so far)",
                    outcome,
                    self.egress.dropped()
                );
            }
            EnqueueOutcome::Queued | EnqueueOutcome::Discarded => {}
        }
        outcome
    }

    /// One non-blocking write of the front frame's unwritten bytes
    ///
    /// Returns the number of bytes written.
    pub fn flush_outbound(&mut self) -> usize {
        if !self.is_alive() {
            return 0;
        }
        let Some(pending) = self.egress.front_remaining() else {
            return 0;
        };

        match self.stream.try_write(pending) {
            Ok(0) => {
                self.close(CloseReason::Network(NetworkError::WriteFailed(
                    ErrorKind::WriteZero,
                )));
                0
            }
            Ok(n) => {
                trace!("Wrote {} bytes", n);
                if self.egress.advance(n) {
                    self.stats.frames_out += 1;
                }
                self.stats.bytes_out += n as u64;
                n
            }
            Err(NetworkError::WouldBlock) => 0,
            Err(NetworkError::ConnectionClosed) => {
                self.close(CloseReason::PeerClosed);
                0
            }
            Err(e) => {
                self.close(CloseReason::Network(e));
                0
            }
        }
    }

    pub fn is_alive(&self) -> bool {
        self.close_reason.is_none()
    }

    /// Mark the endpoint dead, drop queued egress and close the socket
    ///
    /// Idempotent: the first reason is kept.
    pub fn close(&mut self, reason: CloseReason) {
        if self.close_reason.is_some() {
            return;
        }
        self.egress.clear();
        self.decoder.clear();
        if let Err(e) = self.stream.close() {
            debug!("Error closing stream: {}", e);
        }
        self.close_reason = Some(reason);
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Frames waiting to be written
    pub fn pending_outbound(&self) -> usize {
        self.egress.len()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.egress.dropped()
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }
}

/// Types that own an [`Endpoint`]
///
/// Provides the endpoint operations to every embedding type.
pub trait HasEndpoint {
    type Stream: Stream;

    fn endpoint(&self) -> &Endpoint<Self::Stream>;

    fn endpoint_mut(&mut self) -> &mut Endpoint<Self::Stream>;

    fn read_available(&mut self) -> Vec<Envelope> {
        self.endpoint_mut().read_available()
    }

    fn read_frames(&mut self) -> Vec<DecodedFrame> {
        self.endpoint_mut().read_frames()
    }

    fn enqueue_outbound(&mut self, envelope: &Envelope) -> Result<EnqueueOutcome, EncodeError> {
        self.endpoint_mut().enqueue_outbound(envelope)
    }

    fn enqueue_frame(&mut self, frame: Bytes) -> EnqueueOutcome {
        self.endpoint_mut().enqueue_frame(frame)
    }

    fn flush_outbound(&mut self) -> usize {
        self.endpoint_mut().flush_outbound()
    }

    fn is_alive(&self) -> bool {
        self.endpoint().is_alive()
    }

    fn close(&mut self, reason: CloseReason) {
        self.endpoint_mut().close(reason)
    }

    fn close_reason(&self) -> Option<&CloseReason> {
        self.endpoint().close_reason()
    }

    fn pending_outbound(&self) -> usize {
        self.endpoint().pending_outbound()
    }
}

/// Broker-side view of one accepted client
#[derive(Debug)]
pub struct Connection<S: Stream> {
    id: ConnectionId,
    peer: PeerAddr,
    endpoint: Endpoint<S>,
    subscriptions: BTreeSet<TypeName>,
}

impl<S: Stream> Connection<S> {
    pub fn new(id: ConnectionId, peer: PeerAddr, stream: S, config: EndpointConfig) -> Self {
        Self {
            id,
            peer,
            endpoint: Endpoint::new(stream, config),
            subscriptions: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Types this connection is subscribed to
    pub fn subscriptions(&self) -> impl Iterator<Item = &TypeName> {
        self.subscriptions.iter()
    }

    pub(crate) fn add_subscription(&mut self, message_type: TypeName) -> bool {
        self.subscriptions.insert(message_type)
    }

    pub(crate) fn remove_subscription(&mut self, message_type: &str) -> bool {
        self.subscriptions.remove(message_type)
    }
}

impl<S: Stream> HasEndpoint for Connection<S> {
    type Stream = S;

    fn endpoint(&self) -> &Endpoint<S> {
        &self.endpoint
    }

    fn endpoint_mut(&mut self) -> &mut Endpoint<S> {
        &mut self.endpoint
    }
}
