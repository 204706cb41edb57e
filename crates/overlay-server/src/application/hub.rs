//! EventHub: fan-out of decoded input events to every registered viewer.
//!
//! The hub owns the registry of viewer sessions.  Each registration gets its
//! own [`SessionQueue`]; [`EventHub::publish`] appends a copy of the event to
//! every queue while holding the registry lock, so every publish sees a
//! consistent set of sessions and a session registered after a publish never
//! receives that event (no backlog replay).
//!
//! # Flow
//!
//! ```text
//!  DeviceReader ──publish──► EventHub ──push──► SessionQueue(A) ──► delivery loop A
//!                                     ├─push──► SessionQueue(B) ──► delivery loop B
//!                                     └─push──► SessionQueue(C) ──► delivery loop C
//! ```
//!
//! `publish` never waits for a viewer: a full queue discards its oldest event
//! (see [`SessionQueue::push`]).  The work done per publish is one short
//! critical section per session and never depends on how fast any viewer
//! drains its queue.
//!
//! # Deregistration
//!
//! [`Subscription`] is the session's only handle into the hub.  Dropping it,
//! or calling [`Subscription::deregister`], removes the session and closes its
//! queue.  Removal happens at most once per subscription no matter how many
//! code paths ask for it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use overlay_core::Event;
use tracing::{debug, info};

use crate::application::session::SessionId;
use crate::application::session_queue::{PushOutcome, SessionQueue};

/// Default per-session queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Point-in-time counters describing hub activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Events passed to [`EventHub::publish`].
    pub published: u64,
    /// Events discarded across all sessions by the drop-oldest policy.
    pub dropped: u64,
    /// Sessions ever registered.
    pub registrations: u64,
    /// Sessions actually removed from the registry.
    pub deregistrations: u64,
    /// Sessions currently registered.
    pub active_sessions: usize,
}

#[derive(Debug, Default)]
struct HubCounters {
    published: AtomicU64,
    dropped: AtomicU64,
    registrations: AtomicU64,
    deregistrations: AtomicU64,
}

#[derive(Debug)]
struct HubInner {
    sessions: Mutex<HashMap<SessionId, Arc<SessionQueue>>>,
    queue_capacity: usize,
    counters: HubCounters,
}

impl HubInner {
    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<SessionQueue>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes `id` if it still maps to `queue`.  Returns `true` on removal.
    fn remove(&self, id: SessionId, queue: &Arc<SessionQueue>) -> bool {
        let removed = {
            let mut sessions = self.sessions();
            match sessions.get(&id) {
                Some(current) if Arc::ptr_eq(current, queue) => sessions.remove(&id).is_some(),
                _ => false,
            }
        };
        queue.close();
        if removed {
            self.counters.deregistrations.fetch_add(1, Ordering::Relaxed);
            info!(session = %id, dropped = queue.dropped(), "session deregistered");
        }
        removed
    }
}

/// Cloneable handle to the shared fan-out registry.
#[derive(Debug, Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Creates a hub whose sessions each buffer up to `queue_capacity` events.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: Mutex::new(HashMap::new()),
                queue_capacity: queue_capacity.max(1),
                counters: HubCounters::default(),
            }),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    /// Appends `event` to every registered session's queue.
    ///
    /// Returns the number of sessions the event was queued for.  Never waits
    /// on a viewer.
    pub fn publish(&self, event: Event) -> usize {
        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

        let sessions = self.inner.sessions();
        let mut delivered = 0;
        for (id, queue) in sessions.iter() {
            match queue.push(event) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::DroppedOldest => {
                    delivered += 1;
                    self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(session = %id, total = queue.dropped(), "queue full, dropped oldest event");
                }
                PushOutcome::Closed => {}
            }
        }
        delivered
    }

    /// Adds a session to the fan-out set.
    ///
    /// The session receives every event published after this call returns.
    pub fn register(&self, id: SessionId) -> Subscription {
        let queue = Arc::new(SessionQueue::new(self.inner.queue_capacity));
        let replaced = self.inner.sessions().insert(id, Arc::clone(&queue));
        if let Some(old) = replaced {
            old.close();
        }
        self.inner.counters.registrations.fetch_add(1, Ordering::Relaxed);
        debug!(session = %id, capacity = queue.capacity(), "session registered");

        Subscription {
            id,
            queue,
            hub: Arc::downgrade(&self.inner),
            deregistered: AtomicBool::new(false),
        }
    }

    /// Removes the session behind `subscription`.
    ///
    /// Idempotent.  Returns `true` only for the call that actually removed it.
    pub fn deregister(&self, subscription: &Subscription) -> bool {
        subscription.deregister()
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.inner.sessions().contains_key(&id)
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions().len()
    }

    pub fn stats(&self) -> HubStats {
        let counters = &self.inner.counters;
        HubStats {
            published: counters.published.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            registrations: counters.registrations.load(Ordering::Relaxed),
            deregistrations: counters.deregistrations.load(Ordering::Relaxed),
            active_sessions: self.session_count(),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// A session's registration with the [`EventHub`].
///
/// Holds the session's queue and a weak handle back to the hub, so a
/// subscription outliving the hub is harmless.
#[derive(Debug)]
pub struct Subscription {
    id: SessionId,
    queue: Arc<SessionQueue>,
    hub: Weak<HubInner>,
    deregistered: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The queue the hub fills for this session.
    pub fn queue(&self) -> &Arc<SessionQueue> {
        &self.queue
    }

    pub fn is_deregistered(&self) -> bool {
        self.deregistered.load(Ordering::Acquire)
    }

    /// Removes this session from the hub and closes its queue.
    ///
    /// Idempotent.  Returns `true` only for the call that actually removed
    /// the session.
    pub fn deregister(&self) -> bool {
        if self.deregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        match self.hub.upgrade() {
            Some(hub) => hub.remove(self.id, &self.queue),
            None => {
                self.queue.close();
                false
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.deregister();
    }
}
