//! Relay settings, merged from three layers.
//!
//! A setting given on the command line (or through its environment variable,
//! which clap folds into the same argument) wins over the `config.toml`
//! layer, which wins over the built-in defaults. The file lives at
//! `<config dir>/roomchat-relay/config.toml` unless `--config` names one:
//!
//! ```toml
//! [server]
//! bind_addr = "127.0.0.1:4000"
//! max_payload_size = 65536
//!
//! [rooms]
//! backlog_capacity = 100
//! ```

use std::path::{Path, PathBuf};

use crate::backlog::DEFAULT_BACKLOG_CAPACITY;
use crate::relay::DEFAULT_MAX_PAYLOAD_SIZE;

/// Port the relay listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 4000;

/// Errors raised while reading the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML or has a value of the wrong type.
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line flags of `roomchat-relay`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Chat room relay over WebSocket")]
pub struct RelayCliArgs {
    /// Full listen address, e.g. `127.0.0.1:4000`.
    #[arg(short, long, env = "ROOMCHAT_ADDR")]
    pub bind: Option<String>,

    /// Listen on all interfaces at this port. `--bind` takes precedence.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Settings file to use instead of the per-user default.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest inbound text frame accepted, in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// How many recent messages each room keeps for late joiners.
    #[arg(long)]
    pub backlog_capacity: Option<usize>,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "ROOMCHAT_LOG")]
    pub log_level: String,
}

impl RelayCliArgs {
    /// Listen address requested on the command line, if any.
    fn requested_bind_addr(&self) -> Option<String> {
        self.bind
            .clone()
            .or_else(|| self.port.map(all_interfaces))
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SettingsFile {
    server: ServerSection,
    rooms: RoomsSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RoomsSection {
    backlog_capacity: Option<usize>,
}

/// Settings the relay runs with after all layers are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Socket address the listener binds.
    pub bind_addr: String,
    /// Frames longer than this many bytes are dropped.
    pub max_payload_size: usize,
    /// Per-room backlog length.
    pub backlog_capacity: usize,
    /// Fallback tracing filter.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: all_interfaces(DEFAULT_PORT),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Reads the settings file and merges it under the command line.
    ///
    /// An explicit `--config` must exist. The per-user default file is
    /// optional and skipped when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a settings file exists but cannot be
    /// read or parsed, or when an explicit one is missing.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_settings(path)?,
            None => match default_settings_path() {
                Some(path) if path.exists() => read_settings(&path)?,
                _ => SettingsFile::default(),
            },
        };
        Ok(Self::merge(cli, file))
    }

    fn merge(cli: &RelayCliArgs, file: SettingsFile) -> Self {
        let fallback = Self::default();
        Self {
            bind_addr: cli
                .requested_bind_addr()
                .or(file.server.bind_addr)
                .unwrap_or(fallback.bind_addr),
            max_payload_size: cli
                .max_payload_size
                .or(file.server.max_payload_size)
                .unwrap_or(fallback.max_payload_size),
            backlog_capacity: cli
                .backlog_capacity
                .or(file.rooms.backlog_capacity)
                .unwrap_or(fallback.backlog_capacity),
            log_level: cli.log_level.clone(),
        }
    }
}

fn all_interfaces(port: u16) -> String {
    format!("0.0.0.0:{port}")
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("roomchat-relay").join("config.toml"))
}

fn read_settings(path: &Path) -> Result<SettingsFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(path, &text)
}

fn parse_settings(path: &Path, text: &str) -> Result<SettingsFile, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
