//! TOML-based configuration for the overlay server.
//!
//! Reads [`OverlayConfig`] from the file given with `--config`, or from the
//! platform config directory:
//! - `$XDG_CONFIG_HOME/input-overlay/config.toml`, or
//! - `~/.config/input-overlay/config.toml`
//!
//! A missing default file is not an error: the built-in defaults apply.  An
//! explicitly named file must exist.
//!
//! ```toml
//! [server]
//! listen_address = "127.0.0.1"
//! listen_port = 16899
//! queue_capacity = 256
//! shutdown_grace_ms = 500
//! wire_format = "native"      # or "uiohook"
//!
//! [capture]
//! include = []                # substrings of device name or path
//! exclude = ["consumer control"]
//! coalesce_window_ms = 15     # 0 disables mouse-move coalescing
//!
//! [logging]
//! log_level = "info"
//! ```
//!
//! Every field has a serde default, so a file only needs to name what it
//! changes.  [`OverlayConfig::validate`] runs before any device is opened or
//! socket bound, and names the offending field and value.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use overlay_core::WireFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::decode_input::DEFAULT_COALESCE_WINDOW;
use crate::application::hub::DEFAULT_QUEUE_CAPACITY;
use crate::infrastructure::input_capture::DeviceFilter;

/// Largest accepted coalescing window.
pub const MAX_COALESCE_WINDOW_MS: u64 = 1_000;

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the server cannot run with.
    #[error("invalid value {value:?} for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverlayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Viewer endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to listen on.  `"0.0.0.0"` accepts viewers from the LAN.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Events buffered per viewer before the oldest are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long viewers get to drain their queue on shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub wire_format: WireFormat,
}

/// Device selection and decoding settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// Case-insensitive substrings of device name or path to read.  Empty = all.
    #[serde(default)]
    pub include: Vec<String>,
    /// Case-insensitive substrings of device name or path to skip.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"` or `"off"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}
fn default_listen_port() -> u16 {
    16899
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_shutdown_grace_ms() -> u64 {
    500
}
fn default_coalesce_window_ms() -> u64 {
    DEFAULT_COALESCE_WINDOW.as_millis() as u64
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            wire_format: WireFormat::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            coalesce_window_ms: default_coalesce_window_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Derived values and validation ─────────────────────────────────────────────

impl OverlayConfig {
    /// Checks every field the server depends on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if self.server.listen_port == 0 {
            return Err(ConfigError::invalid(
                "server.listen_port",
                0,
                "viewers need a fixed port to connect to",
            ));
        }
        if self.server.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "server.queue_capacity",
                0,
                "must hold at least one event",
            ));
        }
        if self.capture.coalesce_window_ms > MAX_COALESCE_WINDOW_MS {
            return Err(ConfigError::invalid(
                "capture.coalesce_window_ms",
                self.capture.coalesce_window_ms,
                format!("must be at most {MAX_COALESCE_WINDOW_MS}"),
            ));
        }
        validate_patterns("capture.include", &self.capture.include)?;
        validate_patterns("capture.exclude", &self.capture.exclude)?;
        if let Some(both) = self.capture.include.iter().find(|p| {
            self.capture
                .exclude
                .iter()
                .any(|q| q.eq_ignore_ascii_case(p))
        }) {
            return Err(ConfigError::invalid(
                "capture.exclude",
                both,
                "pattern is also listed in capture.include",
            ));
        }

        let level = self.logging.log_level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(
                "logging.log_level",
                &self.logging.log_level,
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }
        Ok(())
    }

    /// The socket address viewers connect to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `server.listen_address` is not an
    /// IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.server.listen_address.trim().parse().map_err(|_| {
            ConfigError::invalid(
                "server.listen_address",
                &self.server.listen_address,
                "not an IPv4 or IPv6 address",
            )
        })?;
        Ok(SocketAddr::new(ip, self.server.listen_port))
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.capture.coalesce_window_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.server.shutdown_grace_ms)
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(&self.capture.include, &self.capture.exclude)
    }
}

fn validate_patterns(field: &'static str, patterns: &[String]) -> Result<(), ConfigError> {
    match patterns.iter().find(|p| p.trim().is_empty()) {
        Some(empty) => Err(ConfigError::invalid(
            field,
            empty,
            "empty pattern would match every device",
        )),
        None => Ok(()),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("input-overlay").join("config.toml"))
}

/// Parses configuration from TOML text.  Does not validate.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a field has the
/// wrong type.
pub fn parse_config(text: &str) -> Result<OverlayConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

/// Loads configuration from `explicit`, or from the default path.
///
/// Returns [`OverlayConfig::default()`] when no explicit path is given and
/// the default file does not exist.  Does not validate.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors (including a missing
/// explicit file) and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<OverlayConfig, ConfigError> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Ok(path) => (path, false),
            Err(_) => return Ok(OverlayConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(OverlayConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}
