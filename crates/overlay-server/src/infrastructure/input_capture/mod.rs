//! Input capture infrastructure.
//!
//! On Linux, input is read straight from the kernel's evdev character devices
//! (`/dev/input/event*`).  Every selected device is read by its own tokio
//! task; raw events are put into an unbounded channel and consumed by the
//! [`DeviceReader`](crate::application::device_reader::DeviceReader), which
//! decodes them into [`Event`](overlay_core::Event)s.
//!
//! # Permissions
//!
//! Opening `/dev/input/event*` requires membership of the `input` group or
//! root.  Devices the process cannot open are skipped; if none remain the
//! source fails with [`CaptureError::NoAccessibleDevices`].
//!
//! # Testability
//!
//! The [`InputSource`] trait allows tests to inject synthetic events through
//! [`mock::MockInputSource`] without any device access.

use std::sync::Arc;

use overlay_core::ScrollAxis;
use tokio::sync::mpsc;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod linux;

/// Key state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Released,
    Pressed,
    /// Auto-repeat generated by the OS while the key is held.
    Repeat,
}

impl KeyState {
    /// Maps an evdev `EV_KEY` value (0, 1, 2) to a state.
    pub fn from_evdev_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(KeyState::Released),
            1 => Some(KeyState::Pressed),
            2 => Some(KeyState::Repeat),
            _ => None,
        }
    }
}

/// A raw input event produced by an input source.
///
/// Timestamps are microseconds on a monotonic clock anchored when the source
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawInputEvent {
    /// A key or mouse button changed state.
    Key {
        /// Linux evdev `EV_KEY` code (`KEY_*` or `BTN_*`).
        code: u16,
        state: KeyState,
        time_us: u64,
    },
    /// Relative pointer motion from one device report.
    RelativeMotion { dx: i32, dy: i32, time_us: u64 },
    /// A wheel turned.
    Wheel {
        axis: ScrollAxis,
        /// Signed detents; positive = away from the user / to the right.
        delta: i32,
        time_us: u64,
    },
}

impl RawInputEvent {
    pub fn time_us(&self) -> u64 {
        match *self {
            RawInputEvent::Key { time_us, .. }
            | RawInputEvent::RelativeMotion { time_us, .. }
            | RawInputEvent::Wheel { time_us, .. } => time_us,
        }
    }
}

/// Message delivered by an input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Input(RawInputEvent),
    /// A device stopped delivering events (unplugged, permission revoked).
    DeviceLost {
        device: String,
        reason: String,
        /// Devices still being read after this loss.
        remaining: usize,
    },
}

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(
        "no accessible input devices found; add the user to the `input` group or run as root"
    )]
    NoAccessibleDevices,
    #[error("input source has already been started")]
    AlreadyStarted,
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting input event production.
///
/// The production implementation reads evdev devices; tests use
/// [`mock::MockInputSource`].
pub trait InputSource: Send + Sync {
    /// Starts the input source and returns a receiver for captured events.
    ///
    /// The channel closes once every device has stopped.  Must be called
    /// from within a tokio runtime.
    fn start(&self) -> Result<mpsc::UnboundedReceiver<SourceEvent>, CaptureError>;
    /// Stops the input source and releases all device handles.  Idempotent.
    fn stop(&self);
}

/// Creates the input source for the current platform.
///
/// # Errors
///
/// Returns [`CaptureError::UnsupportedPlatform`] outside Linux.
pub fn platform_source(filter: DeviceFilter) -> Result<Arc<dyn InputSource>, CaptureError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::EvdevInputSource::new(filter)))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = filter;
        Err(CaptureError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// Include/exclude rules for device selection.
///
/// Patterns are case-insensitive substrings matched against the device name
/// and its path.  An empty include list selects every device; exclusion is
/// applied after inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl DeviceFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        let lower = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect::<Vec<_>>()
        };
        Self {
            include: lower(include),
            exclude: lower(exclude),
        }
    }

    /// Returns `true` if a device with this name and path should be read.
    pub fn allows(&self, name: &str, path: &str) -> bool {
        let name = name.to_lowercase();
        let path = path.to_lowercase();
        let hit = |pattern: &String| name.contains(pattern.as_str()) || path.contains(pattern.as_str());

        let included = self.include.is_empty() || self.include.iter().any(hit);
        included && !self.exclude.iter().any(hit)
    }
}
