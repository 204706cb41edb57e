//! Viewer wire protocol: message types and the per-viewer encoder.

pub mod codec;
pub mod messages;

pub use codec::{EventEncoder, ProtocolError, WireFormat};
pub use messages::{UiohookMessage, WireEvent};
