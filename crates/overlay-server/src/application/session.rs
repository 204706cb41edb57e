//! Viewer session lifecycle.
//!
//! ```text
//! Connecting ──► Active ──► Closing ──► Closed
//!      │                       ▲
//!      └───────────────────────┘   (aborted before registration)
//! ```
//!
//! - `Connecting`: the connection was accepted; the handshake may still be in
//!   progress and the session is not yet registered with the hub.
//! - `Active`: registered; events published from now on are queued for it.
//! - `Closing`: deregistered; queued events may still be flushed.
//! - `Closed`: the connection has been released.
//!
//! No transition skips a state.  The one exit from `Connecting` other than
//! `Active` is `Closing`, for a viewer that goes away before it was registered;
//! deregistration is then a no-op.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use overlay_core::ProtocolError;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::application::hub::{EventHub, Subscription};
use crate::application::session_queue::SessionQueue;

/// Opaque session identifier, unique for the life of the process.
pub type SessionId = Uuid;

/// Lifecycle state of a viewer [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The viewer sent a Close frame or the stream ended.
    ViewerClosed,
    /// Sending to or reading from the viewer failed.
    TransportError(String),
    /// The server is shutting down.
    Shutdown,
    /// The connection failed before the session was registered.
    Aborted(String),
}

/// Errors local to a single viewer session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("viewer transport error: {0}")]
    Transport(String),

    #[error("failed to encode event for viewer: {0}")]
    Protocol(#[from] ProtocolError),
}

/// One connected viewer and its delivery state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    subscription: Option<Subscription>,
    close_reason: Option<CloseReason>,
    sent: u64,
    opened_at: Instant,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            state: SessionState::Connecting,
            subscription: None,
            close_reason: None,
            sent: 0,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    /// Registers with `hub` and moves `Connecting → Active`.
    ///
    /// Returns the queue the delivery loop should drain.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless the session is
    /// `Connecting`.
    pub fn activate(&mut self, hub: &EventHub) -> Result<Arc<SessionQueue>, SessionError> {
        self.transition(SessionState::Active)?;
        let subscription = hub.register(self.id);
        let queue = Arc::clone(subscription.queue());
        self.subscription = Some(subscription);
        Ok(queue)
    }

    /// Moves `Active | Connecting → Closing` and deregisters from the hub.
    ///
    /// The queue stops accepting events but keeps what is pending, so the
    /// delivery loop can still flush it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] from `Closing` or `Closed`.
    pub fn begin_close(&mut self, reason: CloseReason) -> Result<(), SessionError> {
        self.transition(SessionState::Closing)?;
        if let Some(subscription) = &self.subscription {
            subscription.deregister();
        }
        debug!(session = %self.id, ?reason, "session closing");
        self.close_reason = Some(reason);
        Ok(())
    }

    /// Moves `Closing → Closed` and releases the hub registration handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless the session is
    /// `Closing`.
    pub fn finish_close(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Closed)?;
        self.subscription = None;
        Ok(())
    }

    /// Records one message delivered to the viewer.
    pub fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Events this session lost to the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.subscription
            .as_ref()
            .map_or(0, |subscription| subscription.queue().dropped())
    }

    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        let allowed = matches!(
            (self.state, to),
            (SessionState::Connecting, SessionState::Active)
                | (SessionState::Connecting, SessionState::Closing)
                | (SessionState::Active, SessionState::Closing)
                | (SessionState::Closing, SessionState::Closed)
        );
        if !allowed {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use overlay_core::{Event, KeyCode};

    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[test]
    fn test_new_session_is_connecting_with_unique_id() {
        let a = Session::new(peer());
        let b = Session::new(peer());
        assert_eq!(a.state(), SessionState::Connecting);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_full_lifecycle_registers_and_deregisters_once() {
        // Arrange
        let hub = EventHub::new(8);
        let mut session = Session::new(peer());

        // Act
        let queue = session.activate(&hub).expect("connecting → active");
        hub.publish(Event::press(KeyCode::A, 0));
        session.begin_close(CloseReason::ViewerClosed).expect("active → closing");
        session.finish_close().expect("closing → closed");

        // Assert
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(queue.snapshot().len(), 1);
        let stats = hub.stats();
        assert_eq!(stats.registrations, 1);
        assert_eq!(stats.deregistrations, 1);
        assert_eq!(stats.active_sessions, 0);
    }

    #[test]
    fn test_abort_before_registration_skips_hub() {
        let hub = EventHub::new(8);
        let mut session = Session::new(peer());

        session
            .begin_close(CloseReason::Aborted("handshake failed".into()))
            .expect("connecting → closing");
        session.finish_close().expect("closing → closed");

        assert_eq!(hub.stats().deregistrations, 0);
        assert!(matches!(session.close_reason(), Some(CloseReason::Aborted(_))));
    }

    #[test]
    fn test_closed_session_cannot_reactivate() {
        let hub = EventHub::new(8);
        let mut session = Session::new(peer());
        session.begin_close(CloseReason::Shutdown).unwrap();
        session.finish_close().unwrap();

        let result = session.activate(&hub);

        assert!(matches!(
            result,
            Err(SessionError::InvalidTransition {
                from: SessionState::Closed,
                to: SessionState::Active
            })
        ));
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_connecting_cannot_jump_to_closed() {
        let mut session = Session::new(peer());
        assert!(session.finish_close().is_err());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_second_begin_close_is_rejected() {
        let hub = EventHub::new(8);
        let mut session = Session::new(peer());
        session.activate(&hub).unwrap();
        session.begin_close(CloseReason::Shutdown).unwrap();

        assert!(session
            .begin_close(CloseReason::TransportError("broken pipe".into()))
            .is_err());
        assert_eq!(session.close_reason(), Some(&CloseReason::Shutdown));
        assert_eq!(hub.stats().deregistrations, 1);
    }

    #[test]
    fn test_dropped_reports_queue_drops() {
        let hub = EventHub::new(1);
        let mut session = Session::new(peer());
        session.activate(&hub).unwrap();
        hub.publish(Event::press(KeyCode::A, 0));
        hub.publish(Event::release(KeyCode::A, 1));
        assert_eq!(session.dropped(), 1);
    }
}
