use std::os::unix::net::UnixStream;

use log::debug;
use unibroker_core::{Client, ClientError};

use crate::network::UnixSocketStream;
use crate::settings::Settings;

/// Client talking to a broker over a UNIX domain socket
pub type UnixClient = Client<UnixSocketStream>;

/// Connect `client_name` to the broker called `broker_name`
///
/// The connect itself blocks; the returned client never does.
pub fn connect(
    settings: &Settings,
    client_name: &str,
    broker_name: &str,
) -> Result<UnixClient, ClientError> {
    let address = settings.address(broker_name)?;
    let connect_error = |source| ClientError::Connect {
        path: address.path().to_path_buf(),
        source,
    };

    let stream = UnixStream::connect(address.path()).map_err(connect_error)?;
    let stream = UnixSocketStream::from_unix_stream(stream).map_err(connect_error)?;
    debug!("Connected to {}", address);

    Ok(Client::new(client_name, stream, settings.client_endpoint()))
}
