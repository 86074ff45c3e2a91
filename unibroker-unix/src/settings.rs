use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use serde::Deserialize;
use unibroker_core::address::{DEFAULT_BASE_DIRECTORY, DEFAULT_NAMESPACE};
use unibroker_core::{AddressError, BrokerConfig, EndpointConfig, SocketAddress};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read config file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown log level '{0}'")]
    LogLevel(String),
}

/// Process-wide settings
///
/// Read from an optional JSON file; any field left out keeps its default.
///
/// ```json
/// {
///   "base_directory": "/run/unibroker",
///   "namespace": "prod",
///   "log_level": "debug",
///   "broker": { "max_egress_depth": 4096, "overflow_policy": "drop_oldest" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding broker sockets
    pub base_directory: PathBuf,
    /// Prefix of broker socket names
    pub namespace: String,
    /// Minimum level written to the log
    pub log_level: String,
    pub broker: BrokerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from(DEFAULT_BASE_DIRECTORY),
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_level: "info".to_string(),
            broker: BrokerConfig::default(),
        }
    }
}

/// Values given on the command line, taking precedence over the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsOverride {
    pub base_directory: Option<PathBuf>,
    pub namespace: Option<String>,
    pub log_level: Option<String>,
}

impl Settings {
    /// Load `path` if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, overrides: SettingsOverride) {
        if let Some(base_directory) = overrides.base_directory {
            self.base_directory = base_directory;
        }
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
    }

    pub fn level_filter(&self) -> Result<LevelFilter, SettingsError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| SettingsError::LogLevel(self.log_level.clone()))
    }

    /// Socket address of the broker called `broker_name`
    pub fn address(&self, broker_name: &str) -> Result<SocketAddress, AddressError> {
        SocketAddress::resolve(&self.base_directory, &self.namespace, broker_name)
    }

    /// Endpoint settings for a client
    ///
    /// Clients queue without bound; they drain their own queue.
    pub fn client_endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            max_egress_depth: 0,
            ..self.broker.endpoint()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unibroker_core::OverflowPolicy;

    #[test]
    fn test_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.base_directory, PathBuf::from("/tmp"));
        assert_eq!(settings.namespace, "test");
        assert_eq!(settings.level_filter().unwrap(), LevelFilter::Info);
        assert_eq!(
            settings.address("broker").unwrap().path(),
            Path::new("/tmp/test.broker")
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unibroker.json");
        std::fs::write(
            &path,
            r#"{"namespace": "prod", "broker": {"overflow_policy": "drop_oldest"}}"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.namespace, "prod");
        assert_eq!(settings.base_directory, PathBuf::from("/tmp"));
        assert_eq!(settings.broker.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(settings.broker.max_egress_depth, 1024);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Settings::load(Some(&path)),
            Err(SettingsError::Parse { .. })
        ));
        assert!(matches!(
            Settings::load(Some(&dir.path().join("missing.json"))),
            Err(SettingsError::Read { .. })
        ));
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::default();
        settings.apply(SettingsOverride {
            base_directory: Some(PathBuf::from("/run")),
            namespace: None,
            log_level: Some("debug".to_string()),
        });

        assert_eq!(settings.base_directory, PathBuf::from("/run"));
        assert_eq!(settings.namespace, "test");
        assert_eq!(settings.level_filter().unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.level_filter(),
            Err(SettingsError::LogLevel(level)) if level == "chatty"
        ));
    }

    #[test]
    fn test_client_queue_is_unbounded() {
        let settings = Settings::default();
        assert_eq!(settings.client_endpoint().max_egress_depth, 0);
    }
}
