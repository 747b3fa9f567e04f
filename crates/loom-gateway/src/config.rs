//! TOML configuration for the streaming gateway.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use loom_compositor::CompositorConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:8790";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;
pub const DEFAULT_FIXTURES_DIR: &str = "fixtures";

/// Enumerates supported `ConfigError` values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `[gateway]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub bind: String,
    pub channel_capacity: usize,
    /// Extra line written after the last envelope, e.g. `data: [DONE]`.
    pub done_message: Option<String>,
    pub fixtures_dir: PathBuf,
    pub replay_delay_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_GATEWAY_BIND.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            done_message: None,
            fixtures_dir: PathBuf::from(DEFAULT_FIXTURES_DIR),
            replay_delay_ms: 0,
        }
    }
}

/// Whole gateway configuration file.
///
/// # Examples
///
/// ```
/// use loom_gateway::GatewayConfig;
///
/// let config = GatewayConfig::from_toml_str(
///     "[gateway]\nbind = \"0.0.0.0:9000\"\n\n[compositor]\ndedup_threshold_chars = 16\n",
/// )
/// .expect("config parses");
/// assert_eq!(config.gateway.channel_capacity, 128);
/// assert_eq!(config.compositor.dedup_threshold_chars, 16);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub gateway: GatewaySettings,
    pub compositor: CompositorConfig,
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, Path::new("<inline>"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Loads `path` when given, else the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "gateway.channel_capacity must be greater than 0".to_string(),
            ));
        }
        self.bind_addr()?;
        self.compositor
            .validate()
            .map_err(|error| ConfigError::Invalid(error.to_string()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.gateway.bind.parse::<SocketAddr>().map_err(|error| {
            ConfigError::Invalid(format!(
                "gateway.bind '{}' is not a socket address: {error}",
                self.gateway.bind
            ))
        })
    }
}
