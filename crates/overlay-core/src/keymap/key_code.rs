//! Symbolic key and button identifiers.
//!
//! [`KeyCode`] is the canonical, device-independent representation used on
//! the wire.  Raw hardware codes are translated to it at the capture boundary
//! so that a display built against one keyboard works with every other.
//!
//! # The `Unknown` sentinel
//!
//! Any raw code without a table entry becomes [`KeyCode::Unknown`].  Such
//! events are still emitted: an overlay used for debugging or streaming should
//! show that *something* was pressed rather than silently hide it.

use std::fmt;
use std::str::FromStr;

/// Declares [`KeyCode`] together with its wire names and the `ALL` table.
macro_rules! key_codes {
    ($( $(#[$meta:meta])* $variant:ident => $name:literal, )+) => {
        /// Symbolic identifier of a physical key, mouse button, or pointer axis.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum KeyCode {
            $( $(#[$meta])* $variant, )+
        }

        impl KeyCode {
            /// Every code, in declaration order.
            pub const ALL: &'static [KeyCode] = &[ $( KeyCode::$variant, )+ ];

            /// Returns the stable wire name of this code (e.g. `"LeftShift"`).
            pub fn name(self) -> &'static str {
                match self {
                    $( KeyCode::$variant => $name, )+
                }
            }
        }
    };
}

key_codes! {
    // Letters
    A => "A",
    B => "B",
    C => "C",
    D => "D",
    E => "E",
    F => "F",
    G => "G",
    H => "H",
    I => "I",
    J => "J",
    K => "K",
    L => "L",
    M => "M",
    N => "N",
    O => "O",
    P => "P",
    Q => "Q",
    R => "R",
    S => "S",
    T => "T",
    U => "U",
    V => "V",
    W => "W",
    X => "X",
    Y => "Y",
    Z => "Z",

    // Number row
    Digit1 => "1",
    Digit2 => "2",
    Digit3 => "3",
    Digit4 => "4",
    Digit5 => "5",
    Digit6 => "6",
    Digit7 => "7",
    Digit8 => "8",
    Digit9 => "9",
    Digit0 => "0",
    Minus => "Minus",
    Equal => "Equal",
    Grave => "Grave",

    // Editing and whitespace
    Escape => "Escape",
    Enter => "Enter",
    Backspace => "Backspace",
    Tab => "Tab",
    Space => "Space",
    LeftBracket => "LeftBracket",
    RightBracket => "RightBracket",
    Backslash => "Backslash",
    /// The extra key next to left shift on ISO layouts.
    IntlBackslash => "IntlBackslash",
    Semicolon => "Semicolon",
    Apostrophe => "Apostrophe",
    Comma => "Comma",
    Period => "Period",
    Slash => "Slash",

    // Locks
    CapsLock => "CapsLock",
    NumLock => "NumLock",
    ScrollLock => "ScrollLock",

    // Function keys
    F1 => "F1",
    F2 => "F2",
    F3 => "F3",
    F4 => "F4",
    F5 => "F5",
    F6 => "F6",
    F7 => "F7",
    F8 => "F8",
    F9 => "F9",
    F10 => "F10",
    F11 => "F11",
    F12 => "F12",
    F13 => "F13",
    F14 => "F14",
    F15 => "F15",
    F16 => "F16",
    F17 => "F17",
    F18 => "F18",
    F19 => "F19",
    F20 => "F20",
    F21 => "F21",
    F22 => "F22",
    F23 => "F23",
    F24 => "F24",

    // Navigation cluster
    PrintScreen => "PrintScreen",
    Pause => "Pause",
    Insert => "Insert",
    Delete => "Delete",
    Home => "Home",
    End => "End",
    PageUp => "PageUp",
    PageDown => "PageDown",
    Up => "Up",
    Down => "Down",
    Left => "Left",
    Right => "Right",

    // Modifiers
    LeftShift => "LeftShift",
    RightShift => "RightShift",
    LeftCtrl => "LeftCtrl",
    RightCtrl => "RightCtrl",
    LeftAlt => "LeftAlt",
    RightAlt => "RightAlt",
    LeftMeta => "LeftMeta",
    RightMeta => "RightMeta",
    Menu => "Menu",

    // Numpad
    Numpad0 => "Numpad0",
    Numpad1 => "Numpad1",
    Numpad2 => "Numpad2",
    Numpad3 => "Numpad3",
    Numpad4 => "Numpad4",
    Numpad5 => "Numpad5",
    Numpad6 => "Numpad6",
    Numpad7 => "Numpad7",
    Numpad8 => "Numpad8",
    Numpad9 => "Numpad9",
    NumpadDivide => "NumpadDivide",
    NumpadMultiply => "NumpadMultiply",
    NumpadSubtract => "NumpadSubtract",
    NumpadAdd => "NumpadAdd",
    NumpadEnter => "NumpadEnter",
    NumpadDecimal => "NumpadDecimal",
    NumpadEqual => "NumpadEqual",

    // Media
    Mute => "Mute",
    VolumeDown => "VolumeDown",
    VolumeUp => "VolumeUp",
    MediaPlayPause => "MediaPlayPause",
    MediaStop => "MediaStop",
    MediaPrevious => "MediaPrevious",
    MediaNext => "MediaNext",

    // Mouse buttons
    MouseLeft => "MouseLeft",
    MouseRight => "MouseRight",
    MouseMiddle => "MouseMiddle",
    MouseSide => "MouseSide",
    MouseExtra => "MouseExtra",
    MouseForward => "MouseForward",
    MouseBack => "MouseBack",
    MouseTask => "MouseTask",

    // Pointer axes
    MouseMove => "MouseMove",
    MouseWheel => "MouseWheel",
    MouseHWheel => "MouseHWheel",

    /// Any raw code without a table entry.
    Unknown => "Unknown",
}

impl KeyCode {
    /// Returns `true` for mouse buttons (as opposed to keyboard keys and axes).
    pub fn is_mouse_button(self) -> bool {
        matches!(
            self,
            KeyCode::MouseLeft
                | KeyCode::MouseRight
                | KeyCode::MouseMiddle
                | KeyCode::MouseSide
                | KeyCode::MouseExtra
                | KeyCode::MouseForward
                | KeyCode::MouseBack
                | KeyCode::MouseTask
        )
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing a name that is not a [`KeyCode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key code name: {0:?}")]
pub struct ParseKeyCodeError(pub String);

impl FromStr for KeyCode {
    type Err = ParseKeyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyCode::ALL
            .iter()
            .copied()
            .find(|code| code.name() == s)
            .ok_or_else(|| ParseKeyCodeError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_wire_names_are_unique() {
        let mut seen = HashSet::new();
        for code in KeyCode::ALL {
            assert!(
                seen.insert(code.name()),
                "duplicate wire name {:?}",
                code.name()
            );
        }
    }

    #[test]
    fn test_names_match_documented_examples() {
        assert_eq!(KeyCode::A.name(), "A");
        assert_eq!(KeyCode::LeftShift.name(), "LeftShift");
        assert_eq!(KeyCode::MouseLeft.name(), "MouseLeft");
        assert_eq!(KeyCode::Unknown.name(), "Unknown");
        assert_eq!(KeyCode::Digit1.name(), "1");
    }

    #[test]
    fn test_from_str_parses_every_name() {
        for &code in KeyCode::ALL {
            assert_eq!(code.name().parse::<KeyCode>(), Ok(code));
        }
    }

    #[test]
    fn test_from_str_rejects_unknown_name() {
        let result = "NotAKey".parse::<KeyCode>();
        assert_eq!(result, Err(ParseKeyCodeError("NotAKey".to_string())));
    }

    #[test]
    fn test_mouse_buttons_are_classified() {
        assert!(KeyCode::MouseLeft.is_mouse_button());
        assert!(KeyCode::MouseBack.is_mouse_button());
        assert!(!KeyCode::A.is_mouse_button());
        assert!(!KeyCode::MouseMove.is_mouse_button());
        assert!(!KeyCode::Unknown.is_mouse_button());
    }

    #[test]
    fn test_display_uses_wire_name() {
        assert_eq!(KeyCode::NumpadEnter.to_string(), "NumpadEnter");
    }
}
