//! Mock input source for testing.
//!
//! Allows tests to inject synthetic [`RawInputEvent`]s, or device-loss
//! notifications, without opening any `/dev/input` device.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, UnboundedSender};

use super::{CaptureError, InputSource, RawInputEvent, SourceEvent};

/// A mock implementation of [`InputSource`] that allows tests to inject events.
#[derive(Debug, Default)]
pub struct MockInputSource {
    sender: Mutex<Option<UnboundedSender<SourceEvent>>>,
    fail_with_no_devices: bool,
}

impl MockInputSource {
    /// Creates a new mock input source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source whose `start` fails as if no device could be opened.
    pub fn without_devices() -> Self {
        Self {
            sender: Mutex::new(None),
            fail_with_no_devices: true,
        }
    }

    fn sender(&self) -> MutexGuard<'_, Option<UnboundedSender<SourceEvent>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Injects a synthetic event, as if read from a device.
    ///
    /// Returns `false` if the source is not running or the reader is gone.
    pub fn inject_event(&self, event: RawInputEvent) -> bool {
        self.send(SourceEvent::Input(event))
    }

    /// Injects a device-loss notification.
    pub fn inject_device_lost(&self, device: &str, reason: &str, remaining: usize) -> bool {
        self.send(SourceEvent::DeviceLost {
            device: device.to_string(),
            reason: reason.to_string(),
            remaining,
        })
    }

    pub fn is_running(&self) -> bool {
        self.sender().is_some()
    }

    fn send(&self, message: SourceEvent) -> bool {
        match self.sender().as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::UnboundedReceiver<SourceEvent>, CaptureError> {
        if self.fail_with_no_devices {
            return Err(CaptureError::NoAccessibleDevices);
        }
        let mut sender = self.sender();
        if sender.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sender = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        self.sender().take();
    }
}
