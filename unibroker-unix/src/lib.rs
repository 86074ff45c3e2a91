//! # unibroker-unix
//!
//! UNIX domain socket runtime for `unibroker-core`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use unibroker_unix::{bind, connect, Settings, StdDelay};
//!
//! let settings = Settings::default();
//! let mut broker = bind(&settings, "broker").unwrap();
//!
//! let mut client = connect(&settings, "sensor", "broker").unwrap();
//! client.send("sensors.temp", 21.5).unwrap();
//! client.flush();
//!
//! let stop = AtomicBool::new(false);
//! broker.run(&StdDelay, &stop).unwrap();
//! ```

pub use unibroker_core::{
    BrokerConfig, BrokerError, ClientError, CycleStats, Envelope, OverflowPolicy,
};

pub mod broker;
pub mod client;
pub mod logging;
pub mod network;
pub mod settings;

pub use broker::{bind, StdDelay, UnixBroker};
pub use client::{connect, UnixClient};
pub use network::{UnixSocketListener, UnixSocketStream};
pub use settings::{Settings, SettingsError, SettingsOverride};
