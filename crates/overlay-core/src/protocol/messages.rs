//! JSON message types sent to viewers.
//!
//! Two shapes exist:
//!
//! - [`WireEvent`] – the native, self-describing format.  One object per
//!   event with `kind`, `code`, `timestamp`, and kind-dependent payload
//!   fields:
//!
//!   ```json
//!   {"kind":"KeyDown","code":"A","timestamp":0}
//!   {"kind":"MouseMove","code":"MouseMove","timestamp":8000,"dx":8,"dy":0}
//!   {"kind":"MouseScroll","code":"MouseWheel","timestamp":9000,"delta":-1}
//!   ```
//!
//! - [`UiohookMessage`] – the libuiohook-style format expected by existing
//!   input-overlay front-ends:
//!
//!   ```json
//!   {"event_type":"key_pressed","keycode":30}
//!   {"event_type":"mouse_pressed","button":0,"mask":256}
//!   {"event_type":"mouse_moved","x":120,"y":-4}
//!   {"event_type":"mouse_wheel","direction":3,"rotation":-1}
//!   ```
//!
//! Both derive `Deserialize` so tests and Rust viewers can parse them back.
//! Unknown fields are ignored on deserialization, so newer servers may add
//! fields without breaking older readers.

use serde::{Deserialize, Serialize};

use crate::domain::event::{Event, EventKind, Payload};

/// Native viewer message for one [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    /// Event kind, serialized as its variant name (e.g. `"KeyDown"`).
    pub kind: EventKind,
    /// Symbolic code (e.g. `"A"`, `"LeftShift"`, `"MouseLeft"`, `"Unknown"`).
    pub code: String,
    /// Capture time in microseconds.
    pub timestamp: u64,
    /// Horizontal motion, present only for `MouseMove`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dx: Option<i32>,
    /// Vertical motion, present only for `MouseMove`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dy: Option<i32>,
    /// Wheel delta, present only for `MouseScroll`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i32>,
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        let (dx, dy, delta) = match event.payload() {
            Payload::None => (None, None, None),
            Payload::Motion { dx, dy } => (Some(dx), Some(dy), None),
            Payload::Scroll { delta } => (None, None, Some(delta)),
        };
        Self {
            kind: event.kind(),
            code: event.code().name().to_string(),
            timestamp: event.timestamp_us(),
            dx,
            dy,
            delta,
        }
    }
}

/// libuiohook wheel direction for the vertical wheel (`WHEEL_VERTICAL_DIRECTION`).
pub const WHEEL_VERTICAL_DIRECTION: u8 = 3;
/// libuiohook wheel direction for the horizontal wheel (`WHEEL_HORIZONTAL_DIRECTION`).
pub const WHEEL_HORIZONTAL_DIRECTION: u8 = 4;

/// libuiohook-style viewer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UiohookMessage {
    KeyPressed {
        /// libuiohook `VC_*` code.
        keycode: u16,
    },
    KeyReleased {
        keycode: u16,
    },
    MousePressed {
        /// 0-based button index.
        button: u8,
        /// Held-button mask *after* this press.
        mask: u16,
    },
    MouseReleased {
        button: u8,
        /// Held-button mask *after* this release.
        mask: u16,
    },
    MouseMoved {
        /// Accumulated pointer position since the session started.
        x: i64,
        y: i64,
    },
    MouseWheel {
        /// [`WHEEL_VERTICAL_DIRECTION`] or [`WHEEL_HORIZONTAL_DIRECTION`].
        direction: u8,
        /// `1` or `-1`.
        rotation: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::ScrollAxis;
    use crate::keymap::key_code::KeyCode;

    #[test]
    fn test_key_event_has_no_payload_fields() {
        // Arrange
        let event = Event::press(KeyCode::A, 42);

        // Act
        let json = serde_json::to_value(WireEvent::from(&event)).unwrap();

        // Assert
        assert_eq!(
            json,
            serde_json::json!({"kind": "KeyDown", "code": "A", "timestamp": 42})
        );
    }

    #[test]
    fn test_mouse_move_includes_dx_and_dy() {
        let event = Event::mouse_move(8, 0, 8_000);
        let json = serde_json::to_value(WireEvent::from(&event)).unwrap();
        assert_eq!(json["kind"], "MouseMove");
        assert_eq!(json["dx"], 8);
        assert_eq!(json["dy"], 0);
        assert!(json.get("delta").is_none());
    }

    #[test]
    fn test_mouse_scroll_includes_delta_only() {
        let event = Event::mouse_scroll(ScrollAxis::Horizontal, -2, 1);
        let json = serde_json::to_value(WireEvent::from(&event)).unwrap();
        assert_eq!(json["code"], "MouseHWheel");
        assert_eq!(json["delta"], -2);
        assert!(json.get("dx").is_none());
    }

    #[test]
    fn test_wire_event_tolerates_unknown_fields() {
        let text = r#"{"kind":"KeyUp","code":"Space","timestamp":7,"future":true}"#;
        let parsed: WireEvent = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.kind, EventKind::KeyUp);
        assert_eq!(parsed.code, "Space");
    }

    #[test]
    fn test_uiohook_message_uses_snake_case_tag() {
        let msg = UiohookMessage::KeyPressed { keycode: 0x1E };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event_type": "key_pressed", "keycode": 30})
        );
    }

    #[test]
    fn test_uiohook_wheel_message_shape() {
        let msg = UiohookMessage::MouseWheel {
            direction: WHEEL_VERTICAL_DIRECTION,
            rotation: -1,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event_type"], "mouse_wheel");
        assert_eq!(json["direction"], 3);
        assert_eq!(json["rotation"], -1);
    }
}
