//! InputDecoder: raw device events to normalized [`Event`]s.
//!
//! This is the pure decision logic of the device reader.  It has no I/O and
//! no clock of its own; every decision is made from the raw event stream and
//! the timestamps it carries, so it is tested deterministically.
//!
//! # Rules
//!
//! - **Auto-repeat suppression.**  A key-down for a key already held, and
//!   every evdev repeat (value `2`), is dropped.  A held key therefore yields
//!   exactly one KeyDown and, on release, one KeyUp.  A key-up for a key that
//!   was never seen pressed is still emitted.
//! - **Symbolic codes.**  Raw evdev codes go through the static table in
//!   [`overlay_core::keymap`]; unmapped codes become `Unknown` and are still
//!   emitted.
//! - **Motion coalescing.**  Consecutive relative moves whose timestamps fall
//!   within `coalesce_window` of the first move in the batch are summed into
//!   one MouseMove stamped with the time of the last move.  Any non-motion
//!   event flushes the pending batch first, so order is preserved across
//!   kinds.  A window of zero disables coalescing.

use std::collections::HashSet;
use std::time::Duration;

use overlay_core::keymap::KeyMapper;
use overlay_core::Event;
use tracing::trace;

use crate::infrastructure::input_capture::{KeyState, RawInputEvent};

/// Default mouse-move coalescing window.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(15);

#[derive(Debug, Clone, Copy)]
struct PendingMove {
    dx: i32,
    dy: i32,
    first_us: u64,
    last_us: u64,
}

/// Stateful decoder for one input source.
#[derive(Debug)]
pub struct InputDecoder {
    held: HashSet<u16>,
    window_us: u64,
    pending: Option<PendingMove>,
    suppressed_repeats: u64,
}

impl InputDecoder {
    pub fn new(coalesce_window: Duration) -> Self {
        Self {
            held: HashSet::new(),
            window_us: u64::try_from(coalesce_window.as_micros()).unwrap_or(u64::MAX),
            pending: None,
            suppressed_repeats: 0,
        }
    }

    /// Decodes one raw event, appending any completed events to `out`.
    pub fn push(&mut self, raw: RawInputEvent, out: &mut Vec<Event>) {
        match raw {
            RawInputEvent::RelativeMotion { dx, dy, time_us } => self.push_motion(dx, dy, time_us, out),
            RawInputEvent::Key {
                code,
                state,
                time_us,
            } => {
                self.flush(out);
                self.push_key(code, state, time_us, out);
            }
            RawInputEvent::Wheel {
                axis,
                delta,
                time_us,
            } => {
                self.flush(out);
                if delta != 0 {
                    out.push(Event::mouse_scroll(axis, delta, time_us));
                }
            }
        }
    }

    /// Emits the pending coalesced move, if any.
    pub fn flush(&mut self, out: &mut Vec<Event>) {
        if let Some(pending) = self.pending.take() {
            out.push(Event::mouse_move(pending.dx, pending.dy, pending.last_us));
        }
    }

    /// Returns `true` while a coalesced move is waiting to be emitted.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Timestamp of the first move in the pending batch.
    ///
    /// Changes whenever a new batch opens, so a caller timing the batch can
    /// tell a fresh batch from the one it is already waiting on.
    pub fn pending_since(&self) -> Option<u64> {
        self.pending.map(|pending| pending.first_us)
    }

    /// Forgets which keys are held, on every device.
    ///
    /// Used when a device disappears mid-press: its key-ups will never come.
    /// Keys still held on a live device lose nothing: their repeats arrive
    /// as evdev value 2 and are suppressed without the held set, and their
    /// release is emitted whether or not it was seen pressed.  The kernel
    /// sends a value-1 press once per physical press, so the same device
    /// cannot produce a second KeyDown for a cleared key.
    pub fn forget_held(&mut self) {
        self.held.clear();
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Repeats dropped so far.
    pub fn suppressed_repeats(&self) -> u64 {
        self.suppressed_repeats
    }

    fn push_key(&mut self, code: u16, state: KeyState, time_us: u64, out: &mut Vec<Event>) {
        let key = KeyMapper::evdev_to_key(code);
        match state {
            KeyState::Pressed => {
                if self.held.insert(code) {
                    out.push(Event::press(key, time_us));
                } else {
                    self.suppressed_repeats += 1;
                    trace!(code, %key, "duplicate key-down suppressed");
                }
            }
            KeyState::Repeat => {
                self.suppressed_repeats += 1;
                trace!(code, %key, "auto-repeat suppressed");
            }
            KeyState::Released => {
                self.held.remove(&code);
                out.push(Event::release(key, time_us));
            }
        }
    }

    fn push_motion(&mut self, dx: i32, dy: i32, time_us: u64, out: &mut Vec<Event>) {
        if self.window_us == 0 {
            out.push(Event::mouse_move(dx, dy, time_us));
            return;
        }
        match self.pending.as_mut() {
            Some(pending) if time_us.saturating_sub(pending.first_us) <= self.window_us => {
                pending.dx = pending.dx.saturating_add(dx);
                pending.dy = pending.dy.saturating_add(dy);
                pending.last_us = time_us;
            }
            _ => {
                self.flush(out);
                self.pending = Some(PendingMove {
                    dx,
                    dy,
                    first_us: time_us,
                    last_us: time_us,
                });
            }
        }
    }
}

impl Default for InputDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_COALESCE_WINDOW)
    }
}
