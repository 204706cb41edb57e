//! Infrastructure layer for the overlay server.
//!
//! Contains OS-facing adapters: input device capture, the viewer WebSocket
//! endpoint, and configuration file storage.

pub mod input_capture;
pub mod network;
pub mod storage;
