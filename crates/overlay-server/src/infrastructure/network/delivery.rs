//! Per-session delivery loop.
//!
//! One loop runs per viewer.  It waits on three things at once:
//!
//! - the session's queue, for the next event to send;
//! - the viewer's inbound half, which resolves when the viewer goes away;
//! - the server's shutdown signal.
//!
//! Whichever fires first decides how the session ends.  A viewer disconnect
//! unblocks the loop immediately even while the queue is empty.  On shutdown
//! the session is deregistered first (no new events), then the remaining
//! queue is flushed for at most the grace period before the Close frame.
//!
//! The loop talks to the viewer through [`ViewerSink`] so tests can drive it
//! with an in-memory sink instead of a socket.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt};
use overlay_core::{Event, EventEncoder};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, warn};

use crate::application::session::{CloseReason, Session, SessionError};
use crate::application::session_queue::SessionQueue;

/// Outbound half of a viewer connection.
#[async_trait]
pub trait ViewerSink: Send {
    /// Sends one text message.
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;
    /// Sends a Close frame and shuts the connection.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// [`ViewerSink`] over the write half of a WebSocket.
pub struct WsViewerSink<S> {
    inner: S,
}

impl<S> WsViewerSink<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> ViewerSink for WsViewerSink<S>
where
    S: Sink<WsMessage, Error = WsError> + Unpin + Send,
{
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.inner
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.inner.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SessionError::Transport(e.to_string())),
        }
    }
}

/// Timing for one delivery loop.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryOptions {
    /// How long queued events may still be flushed after shutdown begins.
    pub shutdown_grace: Duration,
}

/// Resolves once shutdown has been requested.
///
/// A dropped sender means nobody can request shutdown any more, so this then
/// never resolves.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let sender_gone = shutdown.wait_for(|stop| *stop).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

/// Drives an `Active` session until it ends, then closes it.
///
/// Returns the reason the session ended.  On return the session is `Closed`
/// and deregistered from the hub.
pub async fn run_delivery<K, D>(
    session: &mut Session,
    queue: Arc<SessionQueue>,
    sink: &mut K,
    encoder: &mut EventEncoder,
    disconnected: D,
    mut shutdown: watch::Receiver<bool>,
    options: DeliveryOptions,
) -> CloseReason
where
    K: ViewerSink,
    D: Future<Output = CloseReason>,
{
    tokio::pin!(disconnected);

    let reason = loop {
        tokio::select! {
            biased;

            reason = &mut disconnected => break reason,

            _ = shutdown_requested(&mut shutdown) => break CloseReason::Shutdown,

            next = queue.recv() => match next {
                Some(event) => {
                    if let Err(e) = send_event(session, sink, encoder, &event).await {
                        break CloseReason::TransportError(e.to_string());
                    }
                }
                // Closed from outside the session (the hub went away).
                None => break CloseReason::Shutdown,
            },
        }
    };

    if let Err(e) = session.begin_close(reason.clone()) {
        warn!(session = %session.id(), "unexpected state while closing: {e}");
    }

    match &reason {
        CloseReason::Shutdown => {
            flush_remaining(session, &queue, sink, encoder, options.shutdown_grace).await;
            if let Err(e) = sink.close().await {
                debug!(session = %session.id(), "close frame not delivered: {e}");
            }
        }
        CloseReason::ViewerClosed => {
            if let Err(e) = sink.close().await {
                debug!(session = %session.id(), "close after viewer close failed: {e}");
            }
        }
        CloseReason::TransportError(_) | CloseReason::Aborted(_) => {}
    }

    if let Err(e) = session.finish_close() {
        warn!(session = %session.id(), "unexpected state while closing: {e}");
    }
    reason
}

async fn send_event<K: ViewerSink>(
    session: &mut Session,
    sink: &mut K,
    encoder: &mut EventEncoder,
    event: &Event,
) -> Result<(), SessionError> {
    match encoder.encode(event) {
        Ok(Some(text)) => {
            sink.send_text(text).await?;
            session.record_sent();
            Ok(())
        }
        Ok(None) => Ok(()),
        // An event that cannot be encoded is skipped; the session stays up.
        Err(e) => {
            warn!(session = %session.id(), "skipping event: {e}");
            Ok(())
        }
    }
}

async fn flush_remaining<K: ViewerSink>(
    session: &mut Session,
    queue: &SessionQueue,
    sink: &mut K,
    encoder: &mut EventEncoder,
    grace: Duration,
) {
    let pending = queue.len();
    if pending == 0 {
        return;
    }
    let id = session.id();
    let flush = async {
        while let Some(event) = queue.try_pop() {
            if let Err(e) = send_event(session, sink, encoder, &event).await {
                debug!(session = %id, "flush stopped: {e}");
                return;
            }
        }
    };
    if tokio::time::timeout(grace, flush).await.is_err() {
        warn!(session = %id, pending, remaining = queue.len(), "shutdown grace period elapsed before queue was flushed");
    }
}
