//! Input overlay server: entry point.
//!
//! Reads keyboard and mouse activity from the local input devices and
//! broadcasts it, as JSON text messages, to every connected WebSocket viewer.
//! A typical viewer is a browser source in streaming software that draws the
//! pressed keys on screen.
//!
//! # Usage
//!
//! ```text
//! overlay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML config file
//!   --listen-address <ADDR>      IP address to listen on [default: 127.0.0.1]
//!   --port <PORT>                Viewer port [default: 16899]
//!   --queue-capacity <N>         Events buffered per viewer [default: 256]
//!   --wire-format <FORMAT>       native | uiohook [default: native]
//!   --include <PATTERN>          Only read matching devices (repeatable)
//!   --exclude <PATTERN>          Skip matching devices (repeatable)
//!   --coalesce-window-ms <MS>    Mouse-move merge window, 0 disables [default: 15]
//!   --log-level <LEVEL>          error | warn | info | debug | trace
//! ```
//!
//! Command-line values override the config file; each option can also be set
//! through the `OVERLAY_*` variable named in `--help`.  `RUST_LOG`, when set,
//! takes priority over `--log-level`.
//!
//! # Startup order
//!
//! 1. Load and validate configuration.  Nothing is opened before this passes.
//! 2. Bind the viewer endpoint, so a port conflict is reported before any
//!    device is grabbed.
//! 3. Create the [`EventHub`] and start the [`DeviceReader`] publishing into it.
//! 4. Serve viewers until Ctrl+C or SIGTERM, then flush viewers and release
//!    devices.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use overlay_core::WireFormat;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use overlay_server::application::device_reader::DeviceReader;
use overlay_server::application::hub::EventHub;
use overlay_server::infrastructure::input_capture::{platform_source, CaptureError};
use overlay_server::infrastructure::network::ws_server::{ServerSettings, SessionServer};
use overlay_server::infrastructure::storage::config::{load_config, OverlayConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Keyboard and mouse overlay server.
///
/// Captures local input and streams it to WebSocket viewers.
#[derive(Debug, Parser)]
#[command(
    name = "overlay-server",
    about = "Streams keyboard and mouse input to WebSocket overlay viewers",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    ///
    /// Defaults to `$XDG_CONFIG_HOME/input-overlay/config.toml`; a missing
    /// default file is fine, a missing explicit file is an error.
    #[arg(long, env = "OVERLAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.  Use `0.0.0.0` to accept LAN viewers.
    #[arg(long, env = "OVERLAY_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// TCP port viewers connect to.
    #[arg(long, env = "OVERLAY_PORT")]
    port: Option<u16>,

    /// Events buffered per viewer before the oldest are dropped.
    #[arg(long, env = "OVERLAY_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Message format sent to viewers.
    #[arg(long, env = "OVERLAY_WIRE_FORMAT")]
    wire_format: Option<WireFormat>,

    /// Only read devices whose name or path contains this text.
    #[arg(long, env = "OVERLAY_INCLUDE", value_delimiter = ',')]
    include: Vec<String>,

    /// Skip devices whose name or path contains this text.
    #[arg(long, env = "OVERLAY_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Mouse moves closer together than this are merged.  0 disables merging.
    #[arg(long, env = "OVERLAY_COALESCE_WINDOW_MS")]
    coalesce_window_ms: Option<u64>,

    /// Log level when `RUST_LOG` is not set.
    #[arg(long, env = "OVERLAY_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration fails validation.
    fn into_config(self) -> anyhow::Result<OverlayConfig> {
        let mut config = load_config(self.config.as_deref()).context("failed to load config")?;
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(self, config: &mut OverlayConfig) {
        if let Some(address) = self.listen_address {
            config.server.listen_address = address;
        }
        if let Some(port) = self.port {
            config.server.listen_port = port;
        }
        if let Some(capacity) = self.queue_capacity {
            config.server.queue_capacity = capacity;
        }
        if let Some(format) = self.wire_format {
            config.server.wire_format = format;
        }
        if !self.include.is_empty() {
            config.capture.include = self.include;
        }
        if !self.exclude.is_empty() {
            config.capture.exclude = self.exclude;
        }
        if let Some(window) = self.coalesce_window_ms {
            config.capture.coalesce_window_ms = window;
        }
        if let Some(level) = self.log_level {
            config.logging.log_level = level;
        }
    }
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

// ── Stop signals ──────────────────────────────────────────────────────────────

/// Resolves with the name of the first stop signal received.
///
/// Ctrl+C everywhere; on Unix also SIGTERM, which service managers send.
async fn stop_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "Ctrl+C"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}

/// Flips `shutdown` once `signal` fires.
async fn forward_stop_signal<F>(signal: F, shutdown: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<&'static str>>,
{
    match signal.await {
        Ok(name) => {
            info!(signal = name, "stop signal received; shutting down");
            let _ = shutdown.send(true);
        }
        Err(e) => error!("failed to listen for stop signals: {e}"),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Cli::parse().into_config()?;
    init_logging(&config.logging.log_level);

    info!(
        listen = %config.server.listen_address,
        port = config.server.listen_port,
        wire_format = %config.server.wire_format,
        "input overlay server starting"
    );

    let settings = ServerSettings {
        wire_format: config.server.wire_format,
        shutdown_grace: config.shutdown_grace(),
    };
    let server = SessionServer::bind(config.listen_addr()?, settings).await?;

    let hub = EventHub::new(config.server.queue_capacity);
    let source = platform_source(config.device_filter())?;
    let publisher = hub.clone();
    let mut reader = match DeviceReader::start(source, config.coalesce_window(), move |event| {
        publisher.publish(event);
    }) {
        Ok(reader) => reader,
        Err(CaptureError::NoAccessibleDevices) => {
            error!(
                "no readable keyboard or mouse found; add your user to the `input` group \
                 or check the capture.include / capture.exclude patterns"
            );
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("failed to start input capture"),
    };

    // ── Graceful shutdown signal ───────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(forward_stop_signal(stop_signal(), shutdown_tx));

    server.serve(hub, shutdown_rx).await;
    reader.stop().await;

    info!("input overlay server stopped");
    Ok(ExitCode::SUCCESS)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_without_arguments_overrides_nothing() {
        // Arrange
        let cli = Cli::parse_from(["overlay-server"]);
        let mut config = OverlayConfig::default();

        // Act
        cli.apply(&mut config);

        // Assert
        assert_eq!(config, OverlayConfig::default());
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["overlay-server", "--port", "9000"]);
        let mut config = OverlayConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.listen_port, 9000);
    }

    #[test]
    fn test_cli_wire_format_override() {
        let cli = Cli::parse_from(["overlay-server", "--wire-format", "uiohook"]);
        let mut config = OverlayConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.server.wire_format, WireFormat::Uiohook);
    }

    #[test]
    fn test_cli_rejects_unknown_wire_format() {
        let result = Cli::try_parse_from(["overlay-server", "--wire-format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_device_patterns_replace_config_lists() {
        // Arrange
        let cli = Cli::parse_from([
            "overlay-server",
            "--include",
            "keyboard,mouse",
            "--exclude",
            "consumer",
        ]);
        let mut config = OverlayConfig::default();
        config.capture.include = vec!["tablet".to_string()];

        // Act
        cli.apply(&mut config);

        // Assert
        assert_eq!(config.capture.include, vec!["keyboard", "mouse"]);
        assert_eq!(config.capture.exclude, vec!["consumer"]);
    }

    #[test]
    fn test_cli_coalesce_and_log_level_override() {
        let cli = Cli::parse_from([
            "overlay-server",
            "--coalesce-window-ms",
            "0",
            "--log-level",
            "debug",
        ]);
        let mut config = OverlayConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.capture.coalesce_window_ms, 0);
        assert_eq!(config.logging.log_level, "debug");
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        // Arrange
        let cli = Cli::parse_from(["overlay-server", "--listen-address", "not.an.ip"]);
        let mut config = OverlayConfig::default();

        // Act
        cli.apply(&mut config);

        // Assert
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let cli = Cli::parse_from([
            "overlay-server",
            "--config",
            "/nonexistent/input-overlay/config.toml",
        ]);
        let message = format!("{:#}", cli.into_config().unwrap_err());
        assert!(message.contains("failed to load config"), "{message}");
    }

    #[tokio::test]
    async fn test_stop_signal_flips_shutdown() {
        // Arrange
        let (tx, rx) = watch::channel(false);

        // Act
        forward_stop_signal(async { Ok::<_, std::io::Error>("SIGTERM") }, tx).await;

        // Assert
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_failed_signal_listener_leaves_server_running() {
        let (tx, rx) = watch::channel(false);

        forward_stop_signal(
            async {
                Err::<&'static str, _>(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "no signal driver",
                ))
            },
            tx,
        )
        .await;

        assert!(!*rx.borrow());
    }
}
