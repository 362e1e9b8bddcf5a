//! Command line and configuration file handling.
//!
//! Precedence: command line, then the TOML file (`-f`, or `hdhr-proxy.toml`
//! in the working directory), then built-in defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

use hdhr_protocol::DEFAULT_MODULATION;

use crate::logging::LoggingConfig;

/// Config file picked up from the working directory when `-f` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "hdhr-proxy.toml";

const DEFAULT_HDHOMERUN_CONFIG: &str = "hdhomerun_config";
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 15;
const DEFAULT_LISTEN: &str = "0.0.0.0:5004";
const DEFAULT_PLAYLIST_PATH: &str = "/lineup.m3u";
const DEFAULT_STREAM_PREFIX: &str = "/auto/v";
const DEFAULT_HEARTBEAT_SECS: u64 = 300;
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;
const DEFAULT_LOG_LEVEL: &str = "info";

/// hdhr-proxy - HTTP front end for legacy HDHomeRun tuners
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Device IP address (discovered when omitted)
    #[arg(long, env = "HDHOMERUN_IP")]
    pub device: Option<String>,

    /// Path to the hdhomerun_config tool
    #[arg(long)]
    pub hdhomerun_config: Option<PathBuf>,

    /// Number of tuners on the device (discovered when omitted)
    #[arg(long)]
    pub tuners: Option<usize>,

    /// Modulation prefix for tune commands
    #[arg(long)]
    pub modulation: Option<String>,

    /// Timeout for device control commands, in seconds
    #[arg(long)]
    pub command_timeout: Option<u64>,

    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Host (and port) written into playlist URLs when the request has no Host header
    #[arg(long)]
    pub advertise_host: Option<String>,

    /// Keep-alive probe interval, in seconds
    #[arg(long)]
    pub heartbeat_interval: Option<u64>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Directory where log files are stored
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    pub log_retention_days: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub address: Option<String>,
    pub hdhomerun_config: Option<String>,
    pub tuner_count: Option<usize>,
    pub modulation: Option<String>,
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub listen: Option<String>,
    pub advertise_host: Option<String>,
    pub playlist_path: Option<String>,
    pub stream_prefix: Option<String>,
    pub heartbeat_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Device-side settings.
#[derive(Debug, Clone)]
pub struct DeviceSettings {
    /// Fixed device address; `None` means locate it with `hdhomerun_config discover`.
    pub address: Option<String>,
    pub hdhomerun_config: PathBuf,
    /// Fixed tuner count; `None` means use `discover.json`.
    pub tuner_count: Option<usize>,
    pub modulation: String,
    pub command_timeout: Duration,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub advertise_host: String,
    /// Whether `advertise_host` came from the command line or file.
    pub advertise_host_set: bool,
    pub playlist_path: String,
    pub stream_prefix: String,
    pub heartbeat_interval: Duration,
}

impl ServerSettings {
    /// True when playlist URLs may fall back to a wildcard listen address
    /// that no client can connect to.
    pub fn advertises_unspecified_host(&self) -> bool {
        !self.advertise_host_set && self.listen.ip().is_unspecified()
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub device: DeviceSettings,
    pub server: ServerSettings,
    pub logging: LoggingConfig,
}

/// Load a TOML configuration file.
pub fn load_config(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Config file to use: explicit path > auto-detect > none.
pub fn config_path(args: &Args) -> Option<PathBuf> {
    args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    })
}

impl ProxyConfig {
    /// Merge command line arguments over the config file.
    pub fn resolve(args: Args, file: ConfigFile) -> Result<Self, ConfigError> {
        let ConfigFile {
            device,
            server,
            logging,
        } = file;

        let tuner_count = args.tuners.or(device.tuner_count);
        if tuner_count == Some(0) {
            return Err(ConfigError::Invalid {
                field: "tuner count",
                reason: "must be at least 1".to_string(),
            });
        }

        let command_timeout = positive_secs(
            "command timeout",
            args.command_timeout
                .or(device.command_timeout_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )?;

        let modulation = args
            .modulation
            .or(device.modulation)
            .unwrap_or_else(|| DEFAULT_MODULATION.to_string());
        if modulation.is_empty() || modulation.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                field: "modulation",
                reason: format!("{:?} is not a modulation name", modulation),
            });
        }

        let device = DeviceSettings {
            address: args.device.or(device.address).filter(|a| !a.is_empty()),
            hdhomerun_config: args
                .hdhomerun_config
                .or_else(|| device.hdhomerun_config.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HDHOMERUN_CONFIG)),
            tuner_count,
            modulation,
            command_timeout,
        };

        let listen = match args.listen {
            Some(addr) => addr,
            None => {
                let raw = server.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
                raw.parse().map_err(|e| ConfigError::Invalid {
                    field: "server.listen",
                    reason: format!("{:?}: {}", raw, e),
                })?
            }
        };

        let advertise_host = args.advertise_host.or(server.advertise_host);
        let server = ServerSettings {
            listen,
            advertise_host_set: advertise_host.is_some(),
            advertise_host: advertise_host.unwrap_or_else(|| listen.to_string()),
            playlist_path: url_path(
                "server.playlist_path",
                server.playlist_path.unwrap_or_else(|| DEFAULT_PLAYLIST_PATH.to_string()),
            )?,
            stream_prefix: url_path(
                "server.stream_prefix",
                server.stream_prefix.unwrap_or_else(|| DEFAULT_STREAM_PREFIX.to_string()),
            )?,
            heartbeat_interval: positive_secs(
                "heartbeat interval",
                args.heartbeat_interval
                    .or(server.heartbeat_interval_secs)
                    .unwrap_or(DEFAULT_HEARTBEAT_SECS),
            )?,
        };

        let level = if args.verbose {
            "debug".to_string()
        } else {
            logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        };
        let logging = LoggingConfig {
            log_dir: args
                .log_dir
                .or_else(|| logging.log_dir.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            retention_days: args
                .log_retention_days
                .or(logging.retention_days)
                .unwrap_or(DEFAULT_LOG_RETENTION_DAYS),
            level,
        };

        Ok(Self {
            device,
            server,
            logging,
        })
    }
}

fn positive_secs(field: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn url_path(field: &'static str, path: String) -> Result<String, ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{:?} must start with '/'", path),
        });
    }
    Ok(path)
}
