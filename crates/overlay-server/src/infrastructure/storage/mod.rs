//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file, fills in
//! defaults for anything it does not mention, and validates the result
//! before the server opens any device or socket.

pub mod config;
