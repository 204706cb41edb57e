//! Domain entities for the input overlay.
//!
//! This layer has no I/O dependencies and contains only pure data types.

pub mod event;
