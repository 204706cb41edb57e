//! Linux evdev input source.
//!
//! # How it works
//!
//! 1. `evdev::enumerate()` lists every `/dev/input/event*` node the process
//!    can open.  Nodes it cannot open (usually a permission problem) are
//!    silently absent from that list.
//! 2. A device is kept if it reports keyboard keys (`KEY_A`), mouse buttons
//!    (`BTN_LEFT`) or relative motion (`REL_X`), and passes the configured
//!    [`DeviceFilter`].
//! 3. Each kept device is converted into an async event stream and read by
//!    its own tokio task.  Kernel events arrive in report frames terminated by
//!    `SYN_REPORT`; X and Y motion within one frame become a single
//!    [`RawInputEvent::RelativeMotion`].
//! 4. A read error ends that device's task and is reported as
//!    [`SourceEvent::DeviceLost`]; the other devices keep running.
//!
//! Devices are not grabbed: the desktop keeps receiving input as usual.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use evdev::{Device, EventStream, Key, RelativeAxisType};
use overlay_core::ScrollAxis;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{CaptureError, DeviceFilter, InputSource, KeyState, RawInputEvent, SourceEvent};

// Raw kernel codes (linux/input-event-codes.h).
const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const EV_REL: u16 = 0x02;
const SYN_REPORT: u16 = 0;
const SYN_DROPPED: u16 = 3;
const REL_X: u16 = 0x00;
const REL_Y: u16 = 0x01;
const REL_HWHEEL: u16 = 0x06;
const REL_WHEEL: u16 = 0x08;

/// Reads keyboards and mice through evdev.
#[derive(Debug)]
pub struct EvdevInputSource {
    filter: DeviceFilter,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl EvdevInputSource {
    pub fn new(filter: DeviceFilter) -> Self {
        Self {
            filter,
            shutdown: Mutex::new(None),
        }
    }

    fn shutdown(&self) -> MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.shutdown.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputSource for EvdevInputSource {
    fn start(&self) -> Result<mpsc::UnboundedReceiver<SourceEvent>, CaptureError> {
        let mut shutdown = self.shutdown();
        if shutdown.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let epoch = Instant::now();
        let alive = Arc::new(AtomicUsize::new(0));

        for (path, device) in discover_devices(&self.filter) {
            let name = device.name().unwrap_or("unnamed device").to_string();
            let path = path.display().to_string();
            match device.into_event_stream() {
                Ok(stream) => {
                    info!(device = %name, path = %path, "reading input device");
                    alive.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(read_device(DeviceTask {
                        stream,
                        name,
                        epoch,
                        tx: tx.clone(),
                        stop: stop_rx.clone(),
                        alive: Arc::clone(&alive),
                    }));
                }
                Err(e) => warn!(device = %name, path = %path, "cannot stream device: {e}"),
            }
        }

        if alive.load(Ordering::SeqCst) == 0 {
            return Err(CaptureError::NoAccessibleDevices);
        }

        *shutdown = Some(stop_tx);
        Ok(rx)
    }

    fn stop(&self) {
        if let Some(stop_tx) = self.shutdown().take() {
            // Tasks may already have exited; a closed channel is fine.
            let _ = stop_tx.send(true);
        }
    }
}

impl Drop for EvdevInputSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Lists openable devices that look like keyboards or mice and pass `filter`.
fn discover_devices(filter: &DeviceFilter) -> Vec<(std::path::PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(path, device)| {
            let name = device.name().unwrap_or_default();
            if !is_input_device(device) {
                debug!(device = %name, path = %path.display(), "skipping non keyboard/mouse device");
                return false;
            }
            if !filter.allows(name, &path_str(path)) {
                debug!(device = %name, path = %path.display(), "device excluded by filter");
                return false;
            }
            true
        })
        .collect()
}

fn is_input_device(device: &Device) -> bool {
    let has_keys = device
        .supported_keys()
        .map_or(false, |keys| keys.contains(Key::KEY_A) || keys.contains(Key::BTN_LEFT));
    let has_motion = device
        .supported_relative_axes()
        .map_or(false, |axes| axes.contains(RelativeAxisType::REL_X));
    has_keys || has_motion
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

struct DeviceTask {
    stream: EventStream,
    name: String,
    epoch: Instant,
    tx: mpsc::UnboundedSender<SourceEvent>,
    stop: watch::Receiver<bool>,
    alive: Arc<AtomicUsize>,
}

async fn read_device(task: DeviceTask) {
    let DeviceTask {
        mut stream,
        name,
        epoch,
        tx,
        mut stop,
        alive,
    } = task;
    let mut frame = ReportFrame::default();
    let mut out = Vec::with_capacity(4);

    let lost = loop {
        tokio::select! {
            _ = stop.changed() => break None,
            result = stream.next_event() => match result {
                Ok(ev) => {
                    let time_us = micros_since(epoch);
                    frame.feed(ev.event_type().0, ev.code(), ev.value(), time_us, &mut out);
                    if frame.take_overrun() {
                        warn!(device = %name, "kernel event buffer overrun; events were lost");
                    }
                    let receiver_gone = out
                        .drain(..)
                        .any(|raw| tx.send(SourceEvent::Input(raw)).is_err());
                    if receiver_gone {
                        break None;
                    }
                }
                Err(e) => break Some(e.to_string()),
            },
        }
    };

    let remaining = alive.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
    match lost {
        Some(reason) => {
            let _ = tx.send(SourceEvent::DeviceLost {
                device: name,
                reason,
                remaining,
            });
        }
        None => debug!(device = %name, "device reader stopped"),
    }
}

fn micros_since(epoch: Instant) -> u64 {
    u64::try_from(epoch.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Accumulates one evdev report frame.
///
/// Key and wheel events are forwarded as they arrive.  X/Y motion is summed
/// and emitted on `SYN_REPORT` so a diagonal move is one record, not two.
#[derive(Debug, Default)]
struct ReportFrame {
    dx: i32,
    dy: i32,
    motion: bool,
    overrun: bool,
}

impl ReportFrame {
    fn feed(&mut self, ev_type: u16, code: u16, value: i32, time_us: u64, out: &mut Vec<RawInputEvent>) {
        match (ev_type, code) {
            (EV_KEY, _) => {
                if let Some(state) = KeyState::from_evdev_value(value) {
                    self.flush_motion(time_us, out);
                    out.push(RawInputEvent::Key {
                        code,
                        state,
                        time_us,
                    });
                }
            }
            (EV_REL, REL_X) => {
                self.dx = self.dx.saturating_add(value);
                self.motion = true;
            }
            (EV_REL, REL_Y) => {
                self.dy = self.dy.saturating_add(value);
                self.motion = true;
            }
            (EV_REL, REL_WHEEL) => {
                self.flush_motion(time_us, out);
                out.push(RawInputEvent::Wheel {
                    axis: ScrollAxis::Vertical,
                    delta: value,
                    time_us,
                });
            }
            (EV_REL, REL_HWHEEL) => {
                self.flush_motion(time_us, out);
                out.push(RawInputEvent::Wheel {
                    axis: ScrollAxis::Horizontal,
                    delta: value,
                    time_us,
                });
            }
            (EV_SYN, SYN_REPORT) => self.flush_motion(time_us, out),
            (EV_SYN, SYN_DROPPED) => {
                self.dx = 0;
                self.dy = 0;
                self.motion = false;
                self.overrun = true;
            }
            _ => {}
        }
    }

    fn flush_motion(&mut self, time_us: u64, out: &mut Vec<RawInputEvent>) {
        if !self.motion {
            return;
        }
        if self.dx != 0 || self.dy != 0 {
            out.push(RawInputEvent::RelativeMotion {
                dx: self.dx,
                dy: self.dy,
                time_us,
            });
        }
        self.dx = 0;
        self.dy = 0;
        self.motion = false;
    }

    fn take_overrun(&mut self) -> bool {
        std::mem::take(&mut self.overrun)
    }
}
