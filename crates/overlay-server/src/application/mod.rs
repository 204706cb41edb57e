//! Application layer of the overlay server.
//!
//! Use cases in this layer orchestrate the pipeline without touching sockets
//! or device files directly; they depend on the [`InputSource`] abstraction
//! and on plain queues.
//!
//! [`InputSource`]: crate::infrastructure::input_capture::InputSource
//!
//! # Sub-modules
//!
//! - **`decode_input`**   – Turns raw device events into normalized events:
//!   repeat suppression, key-code mapping and mouse-move coalescing.
//!
//! - **`device_reader`**  – Runs an input source and the decoder on a task and
//!   hands every decoded event to a callback (the hub's `publish`).
//!
//! - **`hub`**            – The fan-out registry.  One bounded queue per
//!   viewer; publishing never waits on a viewer.
//!
//! - **`session_queue`**  – The bounded drop-oldest queue itself.
//!
//! - **`session`**        – Viewer session state machine and the errors a
//!   session can hit.

pub mod decode_input;
pub mod device_reader;
pub mod hub;
pub mod session;
pub mod session_queue;
