use std::time::Duration;

use log::info;
use unibroker_core::{Broker, BrokerError, Delay};

use crate::network::UnixSocketListener;
use crate::settings::Settings;

/// Broker serving on a UNIX domain socket
pub type UnixBroker = Broker<UnixSocketListener>;

/// [`Delay`] backed by `std::thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl Delay for StdDelay {
    fn sleep_ms(&self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

/// Bind the broker called `broker_name`
///
/// Listens on the address derived from `settings`. Nothing is left behind on
/// failure.
pub fn bind(settings: &Settings, broker_name: &str) -> Result<UnixBroker, BrokerError> {
    let address = settings.address(broker_name)?;
    let listener = UnixSocketListener::bind(address.path())?;
    info!("Listening on {}", address);
    Ok(Broker::new(broker_name, listener, settings.broker.clone()))
}
