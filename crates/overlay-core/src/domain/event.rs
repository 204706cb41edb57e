//! The normalized input [`Event`] record.
//!
//! An `Event` is the only thing that travels from the device reader to the
//! viewers.  It is immutable once built and `Copy`, so every viewer session
//! holds its own independent value and no state is shared between sessions.
//!
//! The kind-dependent payload is enforced by construction: the only way to
//! obtain an `Event` is through the constructors below, each of which pairs a
//! [`EventKind`] with the matching [`Payload`].

use serde::{Deserialize, Serialize};

use crate::keymap::key_code::KeyCode;

/// The kind of input action an [`Event`] describes.
///
/// The serialized names are part of the viewer wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    KeyDown,
    KeyUp,
    MouseButtonDown,
    MouseButtonUp,
    MouseMove,
    MouseScroll,
}

impl EventKind {
    /// Returns the wire name of this kind (e.g. `"KeyDown"`).
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::KeyDown => "KeyDown",
            EventKind::KeyUp => "KeyUp",
            EventKind::MouseButtonDown => "MouseButtonDown",
            EventKind::MouseButtonUp => "MouseButtonUp",
            EventKind::MouseMove => "MouseMove",
            EventKind::MouseScroll => "MouseScroll",
        }
    }
}

/// Which wheel produced a scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScrollAxis {
    /// The ordinary wheel; positive deltas scroll away from the user.
    Vertical,
    /// Tilt wheel or horizontal wheel; positive deltas scroll right.
    Horizontal,
}

/// Kind-dependent data carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    /// Key and button transitions carry nothing beyond their code.
    None,
    /// Relative pointer motion.
    Motion { dx: i32, dy: i32 },
    /// Signed wheel delta in detents.
    Scroll { delta: i32 },
}

/// One discrete, fully decoded input action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    kind: EventKind,
    code: KeyCode,
    timestamp_us: u64,
    payload: Payload,
}

impl Event {
    /// A key or mouse button was pressed.
    ///
    /// The kind is [`EventKind::MouseButtonDown`] for mouse button codes and
    /// [`EventKind::KeyDown`] for everything else, including
    /// [`KeyCode::Unknown`].
    pub fn press(code: KeyCode, timestamp_us: u64) -> Self {
        let kind = if code.is_mouse_button() {
            EventKind::MouseButtonDown
        } else {
            EventKind::KeyDown
        };
        Self {
            kind,
            code,
            timestamp_us,
            payload: Payload::None,
        }
    }

    /// A key or mouse button was released.
    pub fn release(code: KeyCode, timestamp_us: u64) -> Self {
        let kind = if code.is_mouse_button() {
            EventKind::MouseButtonUp
        } else {
            EventKind::KeyUp
        };
        Self {
            kind,
            code,
            timestamp_us,
            payload: Payload::None,
        }
    }

    /// The pointer moved by `(dx, dy)` device units.
    pub fn mouse_move(dx: i32, dy: i32, timestamp_us: u64) -> Self {
        Self {
            kind: EventKind::MouseMove,
            code: KeyCode::MouseMove,
            timestamp_us,
            payload: Payload::Motion { dx, dy },
        }
    }

    /// A wheel turned by `delta` detents.
    pub fn mouse_scroll(axis: ScrollAxis, delta: i32, timestamp_us: u64) -> Self {
        let code = match axis {
            ScrollAxis::Vertical => KeyCode::MouseWheel,
            ScrollAxis::Horizontal => KeyCode::MouseHWheel,
        };
        Self {
            kind: EventKind::MouseScroll,
            code,
            timestamp_us,
            payload: Payload::Scroll { delta },
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn code(&self) -> KeyCode {
        self.code
    }

    /// Capture time in microseconds on the reader's monotonic clock.
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    /// Returns `(dx, dy)` for motion events.
    pub fn motion(&self) -> Option<(i32, i32)> {
        match self.payload {
            Payload::Motion { dx, dy } => Some((dx, dy)),
            _ => None,
        }
    }

    /// Returns the wheel delta for scroll events.
    pub fn scroll_delta(&self) -> Option<i32> {
        match self.payload {
            Payload::Scroll { delta } => Some(delta),
            _ => None,
        }
    }

    /// Returns the wheel axis for scroll events.
    pub fn scroll_axis(&self) -> Option<ScrollAxis> {
        match (self.kind, self.code) {
            (EventKind::MouseScroll, KeyCode::MouseHWheel) => Some(ScrollAxis::Horizontal),
            (EventKind::MouseScroll, _) => Some(ScrollAxis::Vertical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_of_keyboard_key_is_key_down() {
        let event = Event::press(KeyCode::A, 10);
        assert_eq!(event.kind(), EventKind::KeyDown);
        assert_eq!(event.code(), KeyCode::A);
        assert_eq!(event.payload(), Payload::None);
    }

    #[test]
    fn test_press_of_mouse_button_is_mouse_button_down() {
        let event = Event::press(KeyCode::MouseLeft, 10);
        assert_eq!(event.kind(), EventKind::MouseButtonDown);
    }

    #[test]
    fn test_release_of_mouse_button_is_mouse_button_up() {
        let event = Event::release(KeyCode::MouseRight, 10);
        assert_eq!(event.kind(), EventKind::MouseButtonUp);
    }

    #[test]
    fn test_unknown_code_is_still_a_key_event() {
        // Unmapped codes must stay visible as key transitions.
        let down = Event::press(KeyCode::Unknown, 1);
        let up = Event::release(KeyCode::Unknown, 2);
        assert_eq!(down.kind(), EventKind::KeyDown);
        assert_eq!(up.kind(), EventKind::KeyUp);
    }

    #[test]
    fn test_mouse_move_carries_motion_payload() {
        let event = Event::mouse_move(8, -3, 5_000);
        assert_eq!(event.kind(), EventKind::MouseMove);
        assert_eq!(event.code(), KeyCode::MouseMove);
        assert_eq!(event.motion(), Some((8, -3)));
        assert_eq!(event.scroll_delta(), None);
    }

    #[test]
    fn test_mouse_scroll_axis_selects_code() {
        let v = Event::mouse_scroll(ScrollAxis::Vertical, -1, 0);
        let h = Event::mouse_scroll(ScrollAxis::Horizontal, 2, 0);
        assert_eq!(v.code(), KeyCode::MouseWheel);
        assert_eq!(h.code(), KeyCode::MouseHWheel);
        assert_eq!(v.scroll_axis(), Some(ScrollAxis::Vertical));
        assert_eq!(h.scroll_axis(), Some(ScrollAxis::Horizontal));
        assert_eq!(h.scroll_delta(), Some(2));
    }

    #[test]
    fn test_key_event_has_no_scroll_axis() {
        assert_eq!(Event::press(KeyCode::Space, 0).scroll_axis(), None);
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(EventKind::KeyDown.as_str(), "KeyDown");
        assert_eq!(EventKind::MouseScroll.as_str(), "MouseScroll");
    }
}
