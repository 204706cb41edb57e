//! Network infrastructure: the viewer WebSocket endpoint.
//!
//! - **`ws_server`** – Binds the listener, accepts viewers, and supervises one
//!   task per viewer.
//! - **`delivery`**  – The per-viewer send loop and the [`ViewerSink`]
//!   abstraction it writes through.
//!
//! [`ViewerSink`]: delivery::ViewerSink

pub mod delivery;
pub mod ws_server;
