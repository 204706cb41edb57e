//! Event-to-text encoding for viewer connections.
//!
//! [`EventEncoder`] turns one [`Event`] into at most one text message in the
//! selected [`WireFormat`].  Each viewer session owns its own encoder: the
//! `uiohook` format is stateful (held-button mask and accumulated pointer
//! position), and that state must follow exactly the events *this* viewer was
//! sent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::domain::event::{Event, EventKind, Payload, ScrollAxis};
use crate::keymap::KeyMapper;
use crate::protocol::messages::{
    UiohookMessage, WireEvent, WHEEL_HORIZONTAL_DIRECTION, WHEEL_VERTICAL_DIRECTION,
};

/// Errors produced while encoding viewer messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),

    /// The wire format name is not recognised.
    #[error("unknown wire format {0:?} (expected \"native\" or \"uiohook\")")]
    UnknownFormat(String),
}

/// Message shape delivered to viewers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Self-describing [`WireEvent`] JSON.
    #[default]
    Native,
    /// libuiohook-style [`UiohookMessage`] JSON.
    Uiohook,
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Native => f.write_str("native"),
            WireFormat::Uiohook => f.write_str("uiohook"),
        }
    }
}

impl FromStr for WireFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(WireFormat::Native),
            "uiohook" => Ok(WireFormat::Uiohook),
            _ => Err(ProtocolError::UnknownFormat(s.to_string())),
        }
    }
}

/// Per-viewer state needed by the `uiohook` format.
#[derive(Debug, Default, Clone, Copy)]
struct UiohookState {
    button_mask: u16,
    x: i64,
    y: i64,
}

/// Encodes events for a single viewer.
#[derive(Debug)]
pub struct EventEncoder {
    format: WireFormat,
    uiohook: UiohookState,
}

impl EventEncoder {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            uiohook: UiohookState::default(),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Encodes `event` as a JSON text message.
    ///
    /// Returns `Ok(None)` when the event has no representation in the
    /// selected format (only possible for [`WireFormat::Uiohook`]).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Json`] if serialization fails.
    pub fn encode(&mut self, event: &Event) -> Result<Option<String>, ProtocolError> {
        match self.format {
            WireFormat::Native => Ok(Some(serde_json::to_string(&WireEvent::from(event))?)),
            WireFormat::Uiohook => match self.to_uiohook(event) {
                Some(msg) => Ok(Some(serde_json::to_string(&msg)?)),
                None => {
                    trace!(
                        kind = event.kind().as_str(),
                        code = %event.code(),
                        "event has no uiohook representation"
                    );
                    Ok(None)
                }
            },
        }
    }

    fn to_uiohook(&mut self, event: &Event) -> Option<UiohookMessage> {
        let state = &mut self.uiohook;
        match (event.kind(), event.payload()) {
            (EventKind::KeyDown, _) => KeyMapper::key_to_uiohook_vc(event.code())
                .map(|keycode| UiohookMessage::KeyPressed { keycode }),
            (EventKind::KeyUp, _) => KeyMapper::key_to_uiohook_vc(event.code())
                .map(|keycode| UiohookMessage::KeyReleased { keycode }),
            (EventKind::MouseButtonDown, _) => {
                let (button, bit) = KeyMapper::uiohook_button(event.code())?;
                state.button_mask |= bit;
                Some(UiohookMessage::MousePressed {
                    button,
                    mask: state.button_mask,
                })
            }
            (EventKind::MouseButtonUp, _) => {
                let (button, bit) = KeyMapper::uiohook_button(event.code())?;
                state.button_mask &= !bit;
                Some(UiohookMessage::MouseReleased {
                    button,
                    mask: state.button_mask,
                })
            }
            (EventKind::MouseMove, Payload::Motion { dx, dy }) => {
                state.x += i64::from(dx);
                state.y += i64::from(dy);
                Some(UiohookMessage::MouseMoved {
                    x: state.x,
                    y: state.y,
                })
            }
            (EventKind::MouseScroll, Payload::Scroll { delta }) if delta != 0 => {
                let direction = match event.scroll_axis() {
                    Some(ScrollAxis::Horizontal) => WHEEL_HORIZONTAL_DIRECTION,
                    _ => WHEEL_VERTICAL_DIRECTION,
                };
                Some(UiohookMessage::MouseWheel {
                    direction,
                    rotation: delta.signum(),
                })
            }
            _ => None,
        }
    }
}
