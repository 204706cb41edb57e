//! Key code translation tables.
//!
//! The canonical representation is the symbolic [`KeyCode`].  Raw platform
//! codes are translated to it at the capture boundary, and it is translated
//! onward only when a viewer asks for a legacy encoding.

pub mod key_code;
pub mod linux_evdev;
pub mod uiohook;

pub use key_code::KeyCode;

/// Unified key mapper providing all translation directions.
pub struct KeyMapper;

impl KeyMapper {
    /// Translates a Linux evdev `EV_KEY` code to a [`KeyCode`].
    ///
    /// Returns [`KeyCode::Unknown`] if no mapping exists for `code`.
    pub fn evdev_to_key(code: u16) -> KeyCode {
        linux_evdev::evdev_to_key(code)
    }

    /// Translates a [`KeyCode`] to a libuiohook `VC_*` code.
    ///
    /// Returns `None` if the key has no libuiohook equivalent.
    pub fn key_to_uiohook_vc(key: KeyCode) -> Option<u16> {
        uiohook::key_to_vc(key)
    }

    /// Translates a mouse button [`KeyCode`] to its libuiohook index and mask bit.
    pub fn uiohook_button(key: KeyCode) -> Option<(u8, u16)> {
        Some((uiohook::button_index(key)?, uiohook::button_mask(key)?))
    }
}
