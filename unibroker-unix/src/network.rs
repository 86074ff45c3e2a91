//! UNIX domain socket implementation of the core I/O traits

use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use unibroker_core::{BrokerError, Listener, NetworkError, PeerAddr, Stream};

/// Non-blocking UNIX stream socket
#[derive(Debug)]
pub struct UnixSocketStream {
    inner: UnixStream,
}

impl UnixSocketStream {
    /// Wrap a connected stream, switching it to non-blocking mode
    pub fn from_unix_stream(stream: UnixStream) -> std::io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(UnixSocketStream { inner: stream })
    }
}

impl Stream for UnixSocketStream {
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        self.inner
            .read(buf)
            .map_err(|e| NetworkError::from_read(e.kind()))
    }

    fn try_write(&mut self, buf: &[u8]) -> Result<usize, NetworkError> {
        self.inner
            .write(buf)
            .map_err(|e| NetworkError::from_write(e.kind()))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(NetworkError::CloseFailed(e.kind())),
        }
    }
}

/// Removes the socket file when dropped
#[derive(Debug)]
struct SocketCleanupGuard {
    path: PathBuf,
}

impl Drop for SocketCleanupGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed socket file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove socket file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Non-blocking UNIX listening socket owning its socket file
#[derive(Debug)]
pub struct UnixSocketListener {
    inner: Option<UnixListener>,
    guard: Option<SocketCleanupGuard>,
    path: PathBuf,
}

impl UnixSocketListener {
    /// Bind `path`, replacing a stale socket file nobody answers on
    pub fn bind(path: &Path) -> Result<Self, BrokerError> {
        remove_stale_socket(path)?;

        let listener = UnixListener::bind(path).map_err(|source| BrokerError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        let guard = SocketCleanupGuard {
            path: path.to_path_buf(),
        };
        listener
            .set_nonblocking(true)
            .map_err(BrokerError::SocketCreation)?;

        Ok(UnixSocketListener {
            inner: Some(listener),
            guard: Some(guard),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Listener for UnixSocketListener {
    type Stream = UnixSocketStream;

    fn try_accept(&mut self) -> Result<(UnixSocketStream, PeerAddr), NetworkError> {
        let Some(listener) = self.inner.as_ref() else {
            return Err(NetworkError::AcceptFailed(ErrorKind::NotConnected));
        };

        let (stream, addr) = listener
            .accept()
            .map_err(|e| NetworkError::from_accept(e.kind()))?;
        let stream = UnixSocketStream::from_unix_stream(stream)
            .map_err(|e| NetworkError::AcceptFailed(e.kind()))?;

        let peer = match addr.as_pathname() {
            Some(path) => PeerAddr::new(path.display().to_string()),
            None => PeerAddr::unnamed(),
        };
        Ok((stream, peer))
    }

    fn close(&mut self) -> Result<(), NetworkError> {
        self.inner = None;
        self.guard = None;
        Ok(())
    }
}

/// Clear `path` for binding
///
/// A socket file nobody accepts on is left over from a dead broker and is
/// removed. A live broker or a non-socket file makes the bind fail.
fn remove_stale_socket(path: &Path) -> Result<(), BrokerError> {
    let bind_error = |source| BrokerError::Bind {
        path: path.to_path_buf(),
        source,
    };

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(bind_error(e)),
    };

    if !metadata.file_type().is_socket() {
        return Err(bind_error(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        )));
    }

    if UnixStream::connect(path).is_ok() {
        return Err(bind_error(std::io::Error::new(
            ErrorKind::AddrInUse,
            "another broker is serving on this socket",
        )));
    }

    info!("Removing stale socket {}", path.display());
    std::fs::remove_file(path).map_err(bind_error)
}
