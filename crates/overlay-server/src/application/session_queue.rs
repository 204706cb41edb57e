//! Bounded, drop-oldest outbound queue owned by one viewer session.
//!
//! Exactly two parties touch a queue: the [`EventHub`](super::hub::EventHub)
//! pushes into it from the device reader's context, and the session's
//! delivery loop pops from it.  The push side never waits: when the queue is
//! full the oldest pending event is discarded so the viewer always catches up
//! to the most recent input.
//!
//! ```text
//!  capacity = 4          push(E5)
//!  ┌────┬────┬────┬────┐          ┌────┬────┬────┬────┐
//!  │ E1 │ E2 │ E3 │ E4 │   ──►    │ E2 │ E3 │ E4 │ E5 │   dropped = 1
//!  └────┴────┴────┴────┘          └────┴────┴────┴────┘
//! ```
//!
//! Once [`SessionQueue::close`] has been called no further events are
//! accepted, but whatever is already queued can still be drained; `recv`
//! returns `None` only when the queue is both closed and empty.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use overlay_core::Event;
use tokio::sync::Notify;

/// Result of a single [`SessionQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event was appended.
    Queued,
    /// The queue was full; the oldest event was discarded to make room.
    DroppedOldest,
    /// The queue is closed; the event was discarded.
    Closed,
}

#[derive(Debug)]
struct QueueState {
    events: VecDeque<Event>,
    dropped: u64,
    closed: bool,
}

/// Single-producer, single-consumer ring buffer of pending [`Event`]s.
#[derive(Debug)]
pub struct SessionQueue {
    state: Mutex<QueueState>,
    ready: Notify,
    capacity: usize,
}

impl SessionQueue {
    /// Creates an empty queue.  A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    // The lock is never held across an await or a call that can panic, so a
    // poisoned mutex still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `event`, discarding the oldest pending event if the queue is full.
    ///
    /// Never blocks on the consumer.
    pub fn push(&self, event: Event) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.events.len() >= self.capacity {
                state.events.pop_front();
                state.dropped += 1;
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Queued
            };
            state.events.push_back(event);
            outcome
        };
        self.ready.notify_one();
        outcome
    }

    /// Removes and returns the oldest pending event without waiting.
    pub fn try_pop(&self) -> Option<Event> {
        self.lock().events.pop_front()
    }

    /// Waits for the oldest pending event.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            // Created before the check so a push between the check and the
            // await leaves a stored permit instead of a lost wake-up.
            let notified = self.ready.notified();
            {
                let mut state = self.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stops accepting new events and wakes a waiting consumer.
    ///
    /// Already queued events remain available to [`recv`](Self::recv).
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Copy of the pending events, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().events.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use overlay_core::KeyCode;

    use super::*;

    fn key(ts: u64) -> Event {
        Event::press(KeyCode::A, ts)
    }

    #[test]
    fn test_push_and_pop_preserve_fifo_order() {
        // Arrange
        let queue = SessionQueue::new(8);

        // Act
        for ts in 0..3 {
            assert_eq!(queue.push(key(ts)), PushOutcome::Queued);
        }

        // Assert
        let order: Vec<u64> = std::iter::from_fn(|| queue.try_pop())
            .map(|e| e.timestamp_us())
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_full_queue_drops_oldest_and_keeps_newest() {
        // Arrange
        let queue = SessionQueue::new(3);
        for ts in 0..3 {
            queue.push(key(ts));
        }

        // Act
        let outcome = queue.push(key(3));

        // Assert
        assert_eq!(outcome, PushOutcome::DroppedOldest);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);
        let pending: Vec<u64> = queue.snapshot().iter().map(|e| e.timestamp_us()).collect();
        assert_eq!(pending, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let queue = SessionQueue::new(0);
        assert_eq!(queue.capacity(), 1);
        queue.push(key(0));
        queue.push(key(1));
        assert_eq!(queue.snapshot(), vec![key(1)]);
    }

    #[test]
    fn test_closed_queue_rejects_new_events() {
        let queue = SessionQueue::new(4);
        queue.push(key(0));
        queue.close();
        assert_eq!(queue.push(key(1)), PushOutcome::Closed);
        assert_eq!(queue.len(), 1);
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_recv_drains_remaining_events_after_close() {
        // Arrange
        let queue = SessionQueue::new(4);
        queue.push(key(0));
        queue.push(key(1));

        // Act
        queue.close();

        // Assert
        assert_eq!(queue.recv().await, Some(key(0)));
        assert_eq!(queue.recv().await, Some(key(1)));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_recv_wakes_when_event_is_pushed() {
        let queue = Arc::new(SessionQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(key(7));

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer must wake")
            .expect("task must not panic");
        assert_eq!(received, Some(key(7)));
    }

    #[tokio::test]
    async fn test_close_unblocks_waiting_consumer() {
        let queue = Arc::new(SessionQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("close must wake the consumer")
            .expect("task must not panic");
        assert_eq!(received, None);
    }
}
