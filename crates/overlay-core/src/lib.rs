//! # overlay-core
//!
//! Shared library for the input overlay server containing the normalized
//! input event model, key code translation tables, and the encoders that turn
//! events into viewer messages.
//!
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview
//!
//! The overlay server reads raw keyboard and mouse events from the operating
//! system and pushes them to display clients (for example a browser source in
//! streaming software) over WebSocket.  This crate is the pure part of that
//! pipeline:
//!
//! - **`domain`** – The [`Event`] record: one discrete input action with a
//!   symbolic code and a microsecond timestamp.
//!
//! - **`keymap`** – Translation tables from Linux evdev codes to the symbolic
//!   [`KeyCode`] used on the wire, and from [`KeyCode`] to the libuiohook
//!   virtual codes some overlay front-ends expect.
//!
//! - **`protocol`** – How an [`Event`] becomes a text message for a viewer.
//!   The native format is self-describing JSON; the `uiohook` format mimics
//!   the messages emitted by libuiohook-based input hooks.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::event::{Event, EventKind, Payload, ScrollAxis};
pub use keymap::key_code::KeyCode;
pub use protocol::codec::{EventEncoder, ProtocolError, WireFormat};
pub use protocol::messages::WireEvent;
