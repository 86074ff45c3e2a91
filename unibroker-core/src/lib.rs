//! # Unibroker Core
//!
//! Transport-agnostic core of a local publish/subscribe broker.
//!
//! Clients exchange typed JSON envelopes through a broker. A client
//! subscribes to message types by name; every envelope published under a
//! type is forwarded to each connection subscribed to it.
//!
//! This crate holds the routing engine, wire framing and client facade. It
//! is written against the non-blocking [`traits::Listener`] and
//! [`traits::Stream`] abstractions; `unibroker-unix` binds them to UNIX
//! domain sockets.
//!
//! ## Features
//!
//! - **Single-threaded** - one non-blocking event loop, no locks
//! - **Isolated clients** - a malformed frame or slow reader only affects its own connection
//! - **Bounded egress** - per-connection queue depth with a configurable overflow policy
//! - **Ordered delivery** - per-subscriber FIFO
//!
//! ## Limitations
//!
//! - Exact type-name matching only (no wildcards or hierarchies)
//! - No persistence, replay or acknowledgements
//! - No authentication

pub mod address;
pub mod broker;
pub mod client;
pub mod config;
pub mod connection;
pub mod egress;
pub mod error;
pub mod protocol;
pub mod topics;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{AddressError, SocketAddress};
pub use broker::{Broker, CycleStats};
pub use client::Client;
pub use config::{BrokerConfig, EndpointConfig};
pub use connection::{CloseReason, Connection, ConnectionId, Endpoint, HasEndpoint};
pub use egress::{EnqueueOutcome, OverflowPolicy};
pub use error::{BrokerError, ClientError};
pub use protocol::{DecodeError, EncodeError, Envelope};
pub use topics::{SubscriptionRegistry, TypeName};
pub use traits::{Delay, Listener, NetworkError, PeerAddr, Stream};
