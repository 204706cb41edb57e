//! WebSocket server: accept loop and per-viewer task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from viewers.
//! 3. Upgrading each connection to a WebSocket session and registering it
//!    with the [`EventHub`].
//! 4. Running the per-session delivery loop
//!    ([`run_delivery`](super::delivery::run_delivery)) alongside a reader that
//!    watches the viewer's inbound half for Close / disconnect.
//! 5. Shutting down: when the shutdown signal flips, the accept loop stops,
//!    every session flushes what it has queued within the grace period, and
//!    sessions still alive after that are aborted.
//!
//! Each viewer runs in its own tokio task inside a `JoinSet`, so a failing
//! viewer only ever ends its own task.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use futures_util::{Stream, StreamExt};
use overlay_core::{EventEncoder, WireFormat};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use crate::application::hub::EventHub;
use crate::application::session::{CloseReason, Session, SessionId};
use crate::infrastructure::network::delivery::{
    run_delivery, shutdown_requested, DeliveryOptions, WsViewerSink,
};

/// Longest time a viewer may take to complete the WebSocket handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed `accept()` (e.g. too many open files).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Extra time allowed past the grace period before sessions are aborted.
const ABORT_MARGIN: Duration = Duration::from_millis(250);

/// Per-viewer settings shared by every session.
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    pub wire_format: WireFormat,
    pub shutdown_grace: Duration,
}

/// Totals reported when [`SessionServer::serve`] returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub accepted: u64,
    pub aborted: usize,
}

/// Bound viewer endpoint.
pub struct SessionServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    settings: ServerSettings,
}

impl SessionServer {
    /// Binds the viewer endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound (e.g. the port is
    /// already in use or the process lacks permission to bind).
    pub async fn bind(addr: SocketAddr, settings: ServerSettings) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind viewer listener on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound listener address")?;

        info!(%local_addr, wire_format = %settings.wire_format, "viewer endpoint listening");
        Ok(Self {
            listener,
            local_addr,
            settings,
        })
    }

    /// The address actually bound (useful with port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts viewers until `shutdown` flips to `true`, then shuts every
    /// session down.
    pub async fn serve(self, hub: EventHub, mut shutdown: watch::Receiver<bool>) -> ServeSummary {
        let mut sessions = JoinSet::new();
        let mut summary = ServeSummary::default();

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("shutdown requested; stopping accept loop");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        summary.accepted += 1;
                        sessions.spawn(handle_viewer(
                            stream,
                            peer,
                            hub.clone(),
                            self.settings,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        // Transient accept error; keep serving.
                        error!("accept error: {e}");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        warn!("viewer task ended abnormally: {e}");
                    }
                }
            }
        }

        drop(self.listener);
        summary.aborted = drain_sessions(&mut sessions, self.settings.shutdown_grace).await;
        let stats = hub.stats();
        info!(
            accepted = summary.accepted,
            aborted = summary.aborted,
            published = stats.published,
            dropped = stats.dropped,
            "viewer endpoint stopped"
        );
        summary
    }
}

/// Waits for sessions to finish their shutdown flush, aborting stragglers.
///
/// Returns the number of aborted sessions.
async fn drain_sessions(sessions: &mut JoinSet<()>, grace: Duration) -> usize {
    let wait_all = async {
        while sessions.join_next().await.is_some() {}
    };
    if timeout(grace + ABORT_MARGIN, wait_all).await.is_ok() {
        return 0;
    }

    let remaining = sessions.len();
    warn!(remaining, "force-closing viewer sessions after grace period");
    sessions.abort_all();
    while sessions.join_next().await.is_some() {}
    remaining
}

/// Runs the complete lifecycle of a single viewer connection.
async fn handle_viewer(
    stream: TcpStream,
    peer: SocketAddr,
    hub: EventHub,
    settings: ServerSettings,
    shutdown: watch::Receiver<bool>,
) {
    let mut session = Session::new(peer);
    let id = session.id();
    debug!(session = %id, %peer, "viewer connecting");

    let ws_stream = match timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => return abort(session, format!("WebSocket handshake failed: {e}")),
        Err(_) => return abort(session, "WebSocket handshake timed out".to_string()),
    };

    let queue = match session.activate(&hub) {
        Ok(queue) => queue,
        Err(e) => return abort(session, e.to_string()),
    };
    info!(session = %id, %peer, "viewer connected");

    let (ws_tx, ws_rx) = ws_stream.split();
    let mut sink = WsViewerSink::new(ws_tx);
    let mut encoder = EventEncoder::new(settings.wire_format);
    let options = DeliveryOptions {
        shutdown_grace: settings.shutdown_grace,
    };

    let reason = run_delivery(
        &mut session,
        queue,
        &mut sink,
        &mut encoder,
        watch_viewer(ws_rx, id),
        shutdown,
        options,
    )
    .await;

    match &reason {
        CloseReason::TransportError(e) => warn!(
            session = %id,
            sent = session.sent(),
            dropped = session.dropped(),
            "viewer connection failed: {e}"
        ),
        _ => info!(
            session = %id,
            sent = session.sent(),
            dropped = session.dropped(),
            uptime_ms = session.uptime().as_millis() as u64,
            ?reason,
            "viewer disconnected"
        ),
    }
}

fn abort(mut session: Session, reason: String) {
    warn!(session = %session.id(), peer = %session.peer(), "{reason}");
    if session.begin_close(CloseReason::Aborted(reason)).is_ok() {
        let _ = session.finish_close();
    }
}

/// Reads the viewer's inbound half until it closes.
///
/// Viewers are not expected to send anything; text and binary frames are
/// ignored.
async fn watch_viewer<S>(mut inbound: S, id: SessionId) -> CloseReason
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(WsMessage::Close(_)) => return CloseReason::ViewerClosed,
            Ok(other) => debug!(session = %id, bytes = other.len(), "ignoring inbound frame"),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                return CloseReason::ViewerClosed
            }
            Err(e) => return CloseReason::TransportError(e.to_string()),
        }
    }
    CloseReason::ViewerClosed
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_watch_viewer_ignores_data_frames_until_close() {
        // Arrange
        let frames = stream::iter(vec![
            Ok(WsMessage::Text("hello".into())),
            Ok(WsMessage::Binary(vec![1, 2, 3])),
            Ok(WsMessage::Close(None)),
            Ok(WsMessage::Text("never read".into())),
        ]);

        // Act
        let reason = watch_viewer(frames, Uuid::new_v4()).await;

        // Assert
        assert_eq!(reason, CloseReason::ViewerClosed);
    }

    #[tokio::test]
    async fn test_watch_viewer_treats_end_of_stream_as_close() {
        let frames = stream::iter(Vec::<Result<WsMessage, WsError>>::new());
        assert_eq!(
            watch_viewer(frames, Uuid::new_v4()).await,
            CloseReason::ViewerClosed
        );
    }

    #[tokio::test]
    async fn test_watch_viewer_reports_transport_errors() {
        let frames = stream::iter(vec![Err(WsError::Utf8)]);
        assert!(matches!(
            watch_viewer(frames, Uuid::new_v4()).await,
            CloseReason::TransportError(_)
        ));
    }

    #[tokio::test]
    async fn test_bind_reports_port_in_use() {
        let settings = ServerSettings {
            wire_format: WireFormat::Native,
            shutdown_grace: Duration::from_millis(50),
        };
        let first = SessionServer::bind("127.0.0.1:0".parse().unwrap(), settings)
            .await
            .expect("first bind should succeed");

        let second = SessionServer::bind(first.local_addr(), settings).await;

        let message = format!("{:#}", second.err().expect("second bind must fail"));
        assert!(message.contains("failed to bind viewer listener"), "{message}");
    }

    #[tokio::test]
    async fn test_serve_returns_promptly_on_shutdown() {
        let settings = ServerSettings {
            wire_format: WireFormat::Native,
            shutdown_grace: Duration::from_millis(50),
        };
        let server = SessionServer::bind("127.0.0.1:0".parse().unwrap(), settings)
            .await
            .unwrap();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(server.serve(EventHub::new(8), stop_rx));

        stop_tx.send(true).unwrap();

        let summary = timeout(Duration::from_secs(2), task)
            .await
            .expect("serve must stop")
            .unwrap();
        assert_eq!(summary, ServeSummary::default());
    }
}
