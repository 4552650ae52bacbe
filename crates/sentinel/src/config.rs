//! Agent configuration

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Network;
use crate::logging::LogConfig;

/// Default config file name
pub const FILENAME: &str = "sentinel.toml";
/// Prefix of environment variables overriding config values, e.g.
/// `SENTINEL_RPC__PORT`
pub const ENV_PREFIX: &str = "SENTINEL";
/// Default store snapshot path
pub const DEFAULT_DB_PATH: &str = "database/sentinel.json";

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Error while reading config: {0}")]
    ReadError(config::ConfigError),
    #[error("Error while deserializing config: {0}")]
    DeserializationError(config::ConfigError),
    #[error("Error while writing config: {0}")]
    WriteError(std::io::Error),
    #[error("Error while serializing to toml: {0}")]
    TomlError(toml::ser::Error),
    #[error("A config file already exists at {0}")]
    AlreadyExists(PathBuf),
}

/// Result of a config operation
pub type Result<T> = std::result::Result<T, Error>;

/// Agent configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network the node runs on
    pub network: Network,
    /// Path of the store snapshot
    pub db_path: PathBuf,
    /// Daemon RPC connection
    pub rpc: RpcConfig,
    /// Log output
    pub log: LogConfig,
}

/// Daemon RPC connection settings
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub host: String,
    /// Port of the daemon's RPC server. `0` picks the network default.
    pub port: u16,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::default(),
            db_path: DEFAULT_DB_PATH.into(),
            rpc: RpcConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            user: String::new(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Read the config from `file_path`, if it exists, with `SENTINEL_*`
    /// environment overrides applied on top.
    pub fn read(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        let mut builder = config::Config::builder();
        if file_path.exists() {
            builder = builder.add_source(config::File::from(file_path));
        }
        let mut config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).separator("__"),
            )
            .build()
            .map_err(Error::ReadError)?
            .try_deserialize()
            .map_err(Error::DeserializationError)?;
        if config.rpc.port == 0 {
            config.rpc.port = config.network.default_rpc_port();
        }
        Ok(config)
    }

    /// Write a config file at `file_path` holding the defaults with any
    /// `SENTINEL_*` overrides applied. An existing file is never replaced.
    pub fn init(file_path: impl AsRef<Path>) -> Result<Self> {
        let file_path = file_path.as_ref();
        if file_path.exists() {
            return Err(Error::AlreadyExists(file_path.to_path_buf()));
        }
        let config = Self::read(file_path)?;
        config.write(file_path)?;
        Ok(config)
    }

    /// Write configuration to a file.
    pub fn write(&self, file_path: impl AsRef<Path>) -> Result<()> {
        let file_path = file_path.as_ref();
        if let Some(dir) = file_path.parent() {
            if !dir.as_os_str().is_empty() {
                create_dir_all(dir).map_err(Error::WriteError)?;
            }
        }
        let mut file = File::create(file_path).map_err(Error::WriteError)?;
        let toml = toml::ser::to_string(&self).map_err(Error::TomlError)?;
        file.write_all(toml.as_bytes()).map_err(Error::WriteError)
    }
}
