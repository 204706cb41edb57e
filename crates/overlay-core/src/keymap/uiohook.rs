//! [`KeyCode`] to libuiohook virtual code (`VC_*`) translation table.
//!
//! Overlay front-ends written against libuiohook expect key events carrying
//! its `VC_*` codes and mouse events carrying a 0-based button index plus a
//! bitmask of held buttons.  This table covers the keys those front-ends
//! render; anything else has no libuiohook representation.
//!
//! Reference: libuiohook `include/uiohook.h`.

use super::key_code::KeyCode;

/// Bit of the button mask for the first mouse button (`MASK_BUTTON1`).
const MASK_BUTTON1: u16 = 1 << 8;

/// Translates a [`KeyCode`] to a libuiohook `VC_*` code.
///
/// Returns `None` for mouse buttons, axes, and keys libuiohook does not name.
pub fn key_to_vc(key: KeyCode) -> Option<u16> {
    let vc = match key {
        // Function keys
        KeyCode::Escape => 0x0001,
        KeyCode::F1 => 0x003B,
        KeyCode::F2 => 0x003C,
        KeyCode::F3 => 0x003D,
        KeyCode::F4 => 0x003E,
        KeyCode::F5 => 0x003F,
        KeyCode::F6 => 0x0040,
        KeyCode::F7 => 0x0041,
        KeyCode::F8 => 0x0042,
        KeyCode::F9 => 0x0043,
        KeyCode::F10 => 0x0044,
        KeyCode::F11 => 0x0057,
        KeyCode::F12 => 0x0058,

        // Number row
        KeyCode::Grave => 0x0029,
        KeyCode::Digit1 => 0x0002,
        KeyCode::Digit2 => 0x0003,
        KeyCode::Digit3 => 0x0004,
        KeyCode::Digit4 => 0x0005,
        KeyCode::Digit5 => 0x0006,
        KeyCode::Digit6 => 0x0007,
        KeyCode::Digit7 => 0x0008,
        KeyCode::Digit8 => 0x0009,
        KeyCode::Digit9 => 0x000A,
        KeyCode::Digit0 => 0x000B,
        KeyCode::Minus => 0x000C,
        KeyCode::Equal => 0x000D,
        KeyCode::Backspace => 0x000E,

        // Top row
        KeyCode::Tab => 0x000F,
        KeyCode::Q => 0x0010,
        KeyCode::W => 0x0011,
        KeyCode::E => 0x0012,
        KeyCode::R => 0x0013,
        KeyCode::T => 0x0014,
        KeyCode::Y => 0x0015,
        KeyCode::U => 0x0016,
        KeyCode::I => 0x0017,
        KeyCode::O => 0x0018,
        KeyCode::P => 0x0019,
        KeyCode::LeftBracket => 0x001A,
        KeyCode::RightBracket => 0x001B,
        KeyCode::Backslash => 0x002B,

        // Home row
        KeyCode::CapsLock => 0x003A,
        KeyCode::A => 0x001E,
        KeyCode::S => 0x001F,
        KeyCode::D => 0x0020,
        KeyCode::F => 0x0021,
        KeyCode::G => 0x0022,
        KeyCode::H => 0x0023,
        KeyCode::J => 0x0024,
        KeyCode::K => 0x0025,
        KeyCode::L => 0x0026,
        KeyCode::Semicolon => 0x0027,
        KeyCode::Apostrophe => 0x0028,
        KeyCode::Enter => 0x001C,

        // Bottom row
        KeyCode::LeftShift => 0x002A,
        KeyCode::Z => 0x002C,
        KeyCode::X => 0x002D,
        KeyCode::C => 0x002E,
        KeyCode::V => 0x002F,
        KeyCode::B => 0x0030,
        KeyCode::N => 0x0031,
        KeyCode::M => 0x0032,
        KeyCode::Comma => 0x0033,
        KeyCode::Period => 0x0034,
        KeyCode::Slash => 0x0035,
        KeyCode::RightShift => 0x0036,

        // Modifiers and space bar row
        KeyCode::LeftCtrl => 0x001D,
        KeyCode::LeftMeta => 0x0E5B,
        KeyCode::LeftAlt => 0x0038,
        KeyCode::Space => 0x0039,
        KeyCode::RightAlt => 0x0E38,
        KeyCode::RightMeta => 0x0E5C,
        KeyCode::Menu => 0x0E5D,
        KeyCode::RightCtrl => 0x0E1D,

        // Navigation cluster
        KeyCode::PrintScreen => 0x0E37,
        KeyCode::ScrollLock => 0x0046,
        KeyCode::Pause => 0x0E45,
        KeyCode::Insert => 0x0E52,
        KeyCode::Home => 0x0E47,
        KeyCode::PageUp => 0x0E49,
        KeyCode::Delete => 0x0E53,
        KeyCode::End => 0x0E4F,
        KeyCode::PageDown => 0x0E51,

        // Arrows
        KeyCode::Up => 0x0E48,
        KeyCode::Left => 0x0E4B,
        KeyCode::Right => 0x0E4D,
        KeyCode::Down => 0x0E50,

        // Numpad
        KeyCode::NumLock => 0x0045,
        KeyCode::NumpadDivide => 0x0E35,
        KeyCode::NumpadMultiply => 0x0037,
        KeyCode::NumpadSubtract => 0x004A,
        KeyCode::NumpadAdd => 0x004E,
        KeyCode::NumpadEnter => 0x0E1C,
        KeyCode::Numpad1 => 0x004F,
        KeyCode::Numpad2 => 0x0050,
        KeyCode::Numpad3 => 0x0051,
        KeyCode::Numpad4 => 0x004B,
        KeyCode::Numpad5 => 0x004C,
        KeyCode::Numpad6 => 0x004D,
        KeyCode::Numpad7 => 0x0047,
        KeyCode::Numpad8 => 0x0048,
        KeyCode::Numpad9 => 0x0049,
        KeyCode::Numpad0 => 0x0052,
        KeyCode::NumpadDecimal => 0x0053,

        _ => return None,
    };
    Some(vc)
}

/// Returns the 0-based libuiohook button index for a mouse button.
///
/// libuiohook knows five buttons; `MouseForward`, `MouseBack` and `MouseTask`
/// have no index.
pub fn button_index(key: KeyCode) -> Option<u8> {
    match key {
        KeyCode::MouseLeft => Some(0),
        KeyCode::MouseRight => Some(1),
        KeyCode::MouseMiddle => Some(2),
        KeyCode::MouseSide => Some(3),
        KeyCode::MouseExtra => Some(4),
        _ => None,
    }
}

/// Returns the held-button mask bit for a mouse button (`MASK_BUTTON1..5`).
pub fn button_mask(key: KeyCode) -> Option<u16> {
    button_index(key).map(|index| MASK_BUTTON1 << index)
}
