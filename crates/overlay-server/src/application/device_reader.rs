//! DeviceReader: runs an [`InputSource`] and emits decoded [`Event`]s.
//!
//! `start` starts the source and spawns one tokio task that owns the
//! [`InputDecoder`].  For every raw event it decodes and hands each finished
//! [`Event`] to the `emit` callback, synchronously, on that task.  In the
//! server `emit` is [`EventHub::publish`](super::hub::EventHub::publish), which
//! never waits on a viewer, so the read loop is never stalled by one.
//!
//! A coalesced mouse move that is still pending when input goes quiet is
//! flushed by a timer once the coalescing window has elapsed, so the last
//! move of a gesture is never held back indefinitely.
//!
//! The returned [`ReaderHandle`] owns the source: stopping it, or dropping it,
//! stops the source and releases its devices.

use std::sync::Arc;
use std::time::Duration;

use overlay_core::Event;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::application::decode_input::InputDecoder;
use crate::infrastructure::input_capture::{CaptureError, InputSource, SourceEvent};

/// Upper bound on how long [`ReaderHandle::stop`] waits for the read task.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Counters reported when the reader finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    pub emitted: u64,
    pub suppressed_repeats: u64,
    pub devices_lost: u64,
}

/// Starts device readers.
pub struct DeviceReader;

impl DeviceReader {
    /// Starts `source` and begins emitting decoded events.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates the source's start error, most importantly
    /// [`CaptureError::NoAccessibleDevices`].
    pub fn start<F>(
        source: Arc<dyn InputSource>,
        coalesce_window: Duration,
        emit: F,
    ) -> Result<ReaderHandle, CaptureError>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let rx = source.start()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let decoder = InputDecoder::new(coalesce_window);
        let task = tokio::spawn(run_reader(rx, shutdown_rx, decoder, coalesce_window, emit));
        info!(
            coalesce_window_ms = coalesce_window.as_millis() as u64,
            "device reader started"
        );

        Ok(ReaderHandle {
            source,
            shutdown: shutdown_tx,
            task: Some(task),
        })
    }
}

/// Owned handle to a running device reader.
pub struct ReaderHandle {
    source: Arc<dyn InputSource>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<ReaderSummary>>,
}

impl ReaderHandle {
    /// Returns `true` until the read task has finished.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Stops reading and releases the devices.
    ///
    /// Idempotent: later calls return `None`.  Waits a bounded time for the
    /// read task, which flushes any pending coalesced move before exiting.
    pub async fn stop(&mut self) -> Option<ReaderSummary> {
        let mut task = self.task.take()?;
        self.source.stop();
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(summary)) => {
                info!(
                    emitted = summary.emitted,
                    suppressed_repeats = summary.suppressed_repeats,
                    devices_lost = summary.devices_lost,
                    "device reader stopped"
                );
                Some(summary)
            }
            Ok(Err(e)) => {
                warn!("device reader task failed: {e}");
                None
            }
            Err(_) => {
                warn!("device reader did not stop within {STOP_TIMEOUT:?}; aborting it");
                task.abort();
                None
            }
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.source.stop();
            let _ = self.shutdown.send(true);
        }
    }
}

async fn run_reader<F>(
    mut rx: mpsc::UnboundedReceiver<SourceEvent>,
    mut shutdown: watch::Receiver<bool>,
    mut decoder: InputDecoder,
    coalesce_window: Duration,
    mut emit: F,
) -> ReaderSummary
where
    F: FnMut(Event) + Send + 'static,
{
    let mut summary = ReaderSummary::default();
    let mut out: Vec<Event> = Vec::with_capacity(4);
    // Deadline of the open move batch, keyed by the batch's first timestamp.
    let mut flush_timer: Option<(u64, Instant)> = None;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            message = rx.recv() => match message {
                Some(SourceEvent::Input(raw)) => {
                    decoder.push(raw, &mut out);
                }
                Some(SourceEvent::DeviceLost { device, reason, remaining }) => {
                    summary.devices_lost += 1;
                    // Held keys of live devices survive the clear; see `forget_held`.
                    decoder.forget_held();
                    if remaining == 0 {
                        warn!(%device, %reason, "input device lost; no devices left");
                    } else {
                        warn!(%device, %reason, remaining, "input device lost; continuing");
                    }
                }
                None => {
                    info!("input source closed");
                    break;
                }
            },

            _ = sleep_until(flush_timer.map_or_else(Instant::now, |(_, at)| at)), if flush_timer.is_some() => {
                decoder.flush(&mut out);
            }
        }

        // Every batch gets a full window, including one opened by the move
        // that closed the previous batch.
        flush_timer = match (decoder.pending_since(), flush_timer) {
            (Some(first), Some((armed, at))) if armed == first => Some((armed, at)),
            (Some(first), _) => Some((first, Instant::now() + coalesce_window)),
            (None, _) => None,
        };

        for event in out.drain(..) {
            summary.emitted += 1;
            emit(event);
        }
    }

    decoder.flush(&mut out);
    for event in out.drain(..) {
        summary.emitted += 1;
        emit(event);
    }
    summary.suppressed_repeats = decoder.suppressed_repeats();
    debug!(?summary, "device reader loop exited");
    summary
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use overlay_core::{EventKind, KeyCode};

    use super::*;
    use crate::infrastructure::input_capture::mock::MockInputSource;
    use crate::infrastructure::input_capture::{KeyState, RawInputEvent};

    fn collector() -> (Arc<Mutex<Vec<Event>>>, impl FnMut(Event) + Send + 'static) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |event| sink.lock().unwrap().push(event))
    }

    async fn wait_for(events: &Arc<Mutex<Vec<Event>>>, count: usize) {
        for _ in 0..100 {
            if events.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count} events");
    }

    #[tokio::test]
    async fn test_start_fails_without_devices() {
        let source = Arc::new(MockInputSource::without_devices());
        let (_, emit) = collector();

        let result = DeviceReader::start(source, Duration::from_millis(15), emit);

        assert!(matches!(result, Err(CaptureError::NoAccessibleDevices)));
    }

    #[tokio::test]
    async fn test_reader_emits_decoded_events_in_order() {
        // Arrange
        let source = Arc::new(MockInputSource::new());
        let (events, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_millis(15), emit)
            .expect("start should succeed");

        // Act
        source.inject_event(RawInputEvent::Key { code: 30, state: KeyState::Pressed, time_us: 0 });
        source.inject_event(RawInputEvent::Key { code: 30, state: KeyState::Repeat, time_us: 1 });
        source.inject_event(RawInputEvent::Key { code: 30, state: KeyState::Released, time_us: 2 });
        wait_for(&events, 2).await;
        let summary = handle.stop().await.expect("reader should stop cleanly");

        // Assert
        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![Event::press(KeyCode::A, 0), Event::release(KeyCode::A, 2)]
        );
        assert_eq!(summary.suppressed_repeats, 1);
        assert_eq!(summary.emitted, 2);
    }

    #[tokio::test]
    async fn test_pending_move_is_flushed_by_timer() {
        let source = Arc::new(MockInputSource::new());
        let (events, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_millis(20), emit)
            .expect("start should succeed");

        source.inject_event(RawInputEvent::RelativeMotion { dx: 2, dy: 1, time_us: 0 });
        source.inject_event(RawInputEvent::RelativeMotion { dx: 2, dy: 1, time_us: 1_000 });

        // No further input: the timer alone must release the batch.
        wait_for(&events, 1).await;
        assert_eq!(events.lock().unwrap()[0], Event::mouse_move(4, 2, 1_000));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_source() {
        let source = Arc::new(MockInputSource::new());
        let (_, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_millis(15), emit)
            .expect("start should succeed");
        assert!(source.is_running());

        assert!(handle.stop().await.is_some());
        assert!(handle.stop().await.is_none());

        assert!(!source.is_running());
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_device_loss_is_not_fatal() {
        let source = Arc::new(MockInputSource::new());
        let (events, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_millis(15), emit)
            .expect("start should succeed");

        source.inject_device_lost("USB Mouse", "No such device", 1);
        source.inject_event(RawInputEvent::Key { code: 0x110, state: KeyState::Pressed, time_us: 5 });
        wait_for(&events, 1).await;

        assert!(handle.is_running());
        assert_eq!(events.lock().unwrap()[0].kind(), EventKind::MouseButtonDown);
        let summary = handle.stop().await.expect("reader should stop cleanly");
        assert_eq!(summary.devices_lost, 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_pending_move() {
        let source = Arc::new(MockInputSource::new());
        let (events, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_secs(1), emit)
            .expect("start should succeed");

        source.inject_event(RawInputEvent::RelativeMotion { dx: 7, dy: 0, time_us: 0 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        assert_eq!(*events.lock().unwrap(), vec![Event::mouse_move(7, 0, 0)]);
    }

    #[tokio::test]
    async fn test_batch_opened_by_closing_move_gets_a_full_window() {
        // Arrange
        let source = Arc::new(MockInputSource::new());
        let (events, emit) = collector();
        let mut handle = DeviceReader::start(source.clone(), Duration::from_millis(50), emit)
            .expect("start should succeed");

        // Act: the second move closes batch one and opens batch two just
        // before batch one's deadline; the third lands inside batch two.
        source.inject_event(RawInputEvent::RelativeMotion { dx: 1, dy: 0, time_us: 0 });
        tokio::time::sleep(Duration::from_millis(40)).await;
        source.inject_event(RawInputEvent::RelativeMotion { dx: 1, dy: 0, time_us: 60_000 });
        tokio::time::sleep(Duration::from_millis(25)).await;
        source.inject_event(RawInputEvent::RelativeMotion { dx: 1, dy: 0, time_us: 85_000 });
        wait_for(&events, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::mouse_move(1, 0, 0), Event::mouse_move(2, 0, 85_000)]
        );
        handle.stop().await;
    }

    /// Sets its flag when dropped, i.e. when the read task has gone away.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_gives_up_on_a_reader_stuck_in_emit() {
        // Arrange: an emit callback that blocks its worker thread
        let source = Arc::new(MockInputSource::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let guard = DropFlag(Arc::clone(&dropped));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let mut handle = DeviceReader::start(source.clone(), Duration::ZERO, move |_| {
            let _alive = &guard;
            let _ = release_rx.lock().unwrap().recv();
        })
        .expect("start should succeed");
        source.inject_event(RawInputEvent::Key { code: 30, state: KeyState::Pressed, time_us: 0 });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act: stop times out, then the blocked emit is released
        let summary = handle.stop().await;
        release_tx.send(()).unwrap();
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Assert
        assert!(summary.is_none());
        assert!(dropped.load(Ordering::SeqCst), "read task must not outlive stop");
        assert!(handle.stop().await.is_none());
    }
}
