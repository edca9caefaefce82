//! Layered settings for the server and client programs.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! `HEARTWATCH_*` environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use heartwatch_sdk::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HOSTNAME, DEFAULT_PORT, DEFAULT_PROBE_TIMEOUT,
    DEFAULT_TICK_INTERVAL,
};
use serde::Deserialize;

/// Environment variable prefix, e.g. `HEARTWATCH_PORT`.
pub const ENV_PREFIX: &str = "HEARTWATCH";

/// Default client name.
pub const DEFAULT_CLIENT_NAME: &str = "heartwatch-client";

/// Log file value that sends logs to stderr instead.
pub const STDERR_LOG: &str = "-";

/// Server program settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    pub hostname: String,
    pub port: u16,
    pub tick_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub log_file: String,
}

/// Client program settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub tick_interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect: bool,
    pub log_file: String,
}

/// Command-line values that override every other source when set.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub tick_interval_ms: Option<u64>,
    pub reconnect: Option<bool>,
    pub log_file: Option<String>,
}

impl ServerSettings {
    /// Load server settings from every source.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let builder = common_defaults(Config::builder(), "heartwatch-server.log")?;
        let config = layer(builder, config_path, overrides)?.build()?;
        config
            .try_deserialize()
            .context("Invalid server settings")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Log file path, or `None` for stderr.
    pub fn log_path(&self) -> Option<PathBuf> {
        log_path(&self.log_file)
    }
}

impl ClientSettings {
    /// Load client settings from every source.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let builder = common_defaults(Config::builder(), "heartwatch-client.log")?
            .set_default("name", DEFAULT_CLIENT_NAME)?
            .set_default("connect_timeout_ms", millis(DEFAULT_CONNECT_TIMEOUT))?
            .set_default("reconnect", false)?;
        let config = layer(builder, config_path, overrides)?
            .set_override_option("name", overrides.name.clone())?
            .set_override_option("reconnect", overrides.reconnect)?
            .build()?;
        let settings: Self = config
            .try_deserialize()
            .context("Invalid client settings")?;

        if settings.name.trim().is_empty() {
            anyhow::bail!("Client name must not be empty");
        }
        Ok(settings)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Server address as `host:port`.
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.hostname, self.port)
    }

    /// Log file path, or `None` for stderr.
    pub fn log_path(&self) -> Option<PathBuf> {
        log_path(&self.log_file)
    }
}

fn common_defaults(
    builder: ConfigBuilder<DefaultState>,
    log_file: &str,
) -> Result<ConfigBuilder<DefaultState>> {
    Ok(builder
        .set_default("hostname", DEFAULT_HOSTNAME)?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("tick_interval_ms", millis(DEFAULT_TICK_INTERVAL))?
        .set_default("probe_timeout_ms", millis(DEFAULT_PROBE_TIMEOUT))?
        .set_default("log_file", log_file)?)
}

fn layer(
    mut builder: ConfigBuilder<DefaultState>,
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> Result<ConfigBuilder<DefaultState>> {
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path));
    }

    Ok(builder
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .set_override_option("hostname", overrides.hostname.clone())?
        .set_override_option("port", overrides.port.map(i64::from))?
        .set_override_option(
            "tick_interval_ms",
            overrides.tick_interval_ms.map(|ms| ms as i64),
        )?
        .set_override_option("log_file", overrides.log_file.clone())?)
}

fn millis(d: Duration) -> i64 {
    d.as_millis() as i64
}

fn log_path(value: &str) -> Option<PathBuf> {
    if value == STDERR_LOG {
        None
    } else {
        Some(PathBuf::from(value))
    }
}
