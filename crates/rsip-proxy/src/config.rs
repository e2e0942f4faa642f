//! # Proxy Configuration
//!
//! Optional TOML file, overridden by command line flags.
//!
//! ```toml
//! bind = "[::1]:1080"
//! mode = "rotating"            # or "random"
//!
//! [pool]
//! valid_lifetime_secs = 90
//! preferred_lifetime_secs = 0
//! refresh_interval_secs = 60
//! rotate_interval_secs = 0     # 0 disables timed rotation
//!
//! [dialer]
//! connect_timeout_secs = 10    # 0 disables the timeout
//! seed = 42                    # fixed seed for random mode
//! ```

use std::fs;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use rsip_selection::PoolConfig;
use serde::Deserialize;
use thiserror::Error;

/// Source address strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One managed address per interface, replaced on rotation.
    #[default]
    Rotating,
    /// Random pick among the addresses already on the interface.
    Random,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    bind: Option<SocketAddr>,
    mode: Option<Mode>,
    #[serde(default)]
    pool: PoolSection,
    #[serde(default)]
    dialer: DialerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PoolSection {
    valid_lifetime_secs: Option<u64>,
    preferred_lifetime_secs: Option<u64>,
    refresh_interval_secs: Option<u64>,
    rotate_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DialerSection {
    connect_timeout_secs: Option<u64>,
    seed: Option<u64>,
}

/// Resolved proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub bind: SocketAddr,
    pub mode: Mode,
    pub pool: PoolConfig,
    /// Timed rotation period; `None` rotates on operator request only.
    pub rotate_interval: Option<Duration>,
    /// Per-attempt connect bound; zero disables it.
    pub connect_timeout: Duration,
    /// Seed for random mode; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 1080, 0, 0)),
            mode: Mode::default(),
            pool: PoolConfig::default(),
            rotate_interval: None,
            connect_timeout: Duration::from_secs(10),
            seed: None,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Missing keys take defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::default();

        let pool = PoolConfig {
            valid_lifetime: file
                .pool
                .valid_lifetime_secs
                .map_or(defaults.pool.valid_lifetime, Duration::from_secs),
            preferred_lifetime: file
                .pool
                .preferred_lifetime_secs
                .map_or(defaults.pool.preferred_lifetime, Duration::from_secs),
            refresh_interval: file
                .pool
                .refresh_interval_secs
                .map_or(defaults.pool.refresh_interval, Duration::from_secs),
        };

        let config = Self {
            bind: file.bind.unwrap_or(defaults.bind),
            mode: file.mode.unwrap_or(defaults.mode),
            pool,
            rotate_interval: file
                .pool
                .rotate_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            connect_timeout: file
                .dialer
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            seed: file.dialer.seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        Ok(())
    }
}

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid pool settings: {0}")]
    Pool(#[from] rsip_selection::ConfigError),
}
