//! Broker socket addresses
//!
//! A broker named `name` listens on `{base_directory}/{namespace}.{name}`.
//! The composed path must fit the platform's `sun_path` field, NUL
//! terminator included, so it is checked here rather than truncated later.

use std::path::{Path, PathBuf};

/// Default directory holding broker sockets
pub const DEFAULT_BASE_DIRECTORY: &str = "/tmp";

/// Default namespace prefix of broker socket names
pub const DEFAULT_NAMESPACE: &str = "test";

#[cfg(any(target_os = "linux", target_os = "android"))]
const SUN_PATH_LEN: usize = 108;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SUN_PATH_LEN: usize = 104;

/// Longest usable socket path in bytes
pub const MAX_ADDRESS_LEN: usize = SUN_PATH_LEN - 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("socket path is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Resolved, length-checked socket path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    path: PathBuf,
}

impl SocketAddress {
    pub fn resolve(
        base_directory: impl AsRef<Path>,
        namespace: &str,
        name: &str,
    ) -> Result<Self, AddressError> {
        check_component(namespace)?;
        check_component(name)?;

        let path = base_directory
            .as_ref()
            .join(format!("{}.{}", namespace, name));
        let len = path.as_os_str().len();
        if len > MAX_ADDRESS_LEN {
            return Err(AddressError::TooLong {
                len,
                max: MAX_ADDRESS_LEN,
            });
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl core::fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn check_component(value: &str) -> Result<(), AddressError> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.contains('/') {
        "must not contain '/'"
    } else if value.contains('\0') {
        "must not contain NUL"
    } else {
        return Ok(());
    };
    Err(AddressError::InvalidName {
        name: value.to_string(),
        reason,
    })
}
