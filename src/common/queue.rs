//! Blocking FIFO queue for producer/consumer handoff
//!
//! # Design Principles (KISS)
//! - Strict FIFO: items come out in exactly the order they went in
//! - No loss, no duplicate delivery, no peek
//! - Optional capacity bound: a full queue blocks the producer (backpressure
//!   into the driver thread) instead of dropping data
//! - Split producer/consumer handles so a dropped side is observable from
//!   the other end
//!
//! The queue carries data from the driver callback thread to the consumer
//! thread. Single producer, single consumer; neither handle is cloneable.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Error returned by [`Producer::put`] when the consumer is gone.
///
/// The rejected item is handed back so the caller can decide what to do
/// with it (usually: log and abandon the measurement).
#[derive(Debug, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue consumer dropped")
    }
}

/// Error returned by [`Consumer::get`] when the producer is gone and the
/// queue is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvError;

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue producer dropped")
    }
}

impl std::error::Error for RecvError {}

/// Error returned by [`Consumer::get_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// No item arrived within the deadline
    Timeout,
    /// Producer is gone and the queue is drained
    Disconnected,
}

impl std::fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecvTimeoutError::Timeout => write!(f, "queue receive timed out"),
            RecvTimeoutError::Disconnected => write!(f, "queue producer dropped"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

struct Inner<T> {
    items: VecDeque<T>,
    producer_alive: bool,
    consumer_alive: bool,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: Option<usize>,
}

/// Producing half of the queue, owned by the driver callback thread.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// Consuming half of the queue, owned by the measurement loop thread.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a queue bounded to `capacity` items.
///
/// A full queue blocks `put` until the consumer makes room. The bound must
/// be at least 1.
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    with_capacity(Some(capacity.max(1)))
}

/// Create an unbounded queue (`put` never blocks).
pub fn unbounded<T>() -> (Producer<T>, Consumer<T>) {
    with_capacity(None)
}

fn with_capacity<T>(capacity: Option<usize>) -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            items: VecDeque::new(),
            producer_alive: true,
            consumer_alive: true,
        }),
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
        capacity,
    });
    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

impl<T> Producer<T> {
    /// Append an item at the tail, blocking while the queue is full.
    ///
    /// Returns the item back if the consumer has been dropped; nothing is
    /// ever discarded silently.
    pub fn put(&self, item: T) -> Result<(), SendError<T>> {
        let mut inner = self.shared.inner.lock();
        if let Some(cap) = self.shared.capacity {
            while inner.items.len() >= cap && inner.consumer_alive {
                self.shared.not_full.wait(&mut inner);
            }
        }
        if !inner.consumer_alive {
            return Err(SendError(item));
        }
        inner.items.push_back(item);
        drop(inner);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Number of items currently queued (diagnostic only).
    pub fn len(&self) -> usize {
        self.shared.inner.lock().items.len()
    }

    /// Whether the queue is currently empty (diagnostic only).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.shared.inner.lock().producer_alive = false;
        self.shared.not_empty.notify_all();
    }
}

impl<T> Consumer<T> {
    /// Remove and return the oldest item, blocking while the queue is empty.
    ///
    /// Errors only when the producer has been dropped and every queued item
    /// has already been delivered.
    pub fn get(&self) -> Result<T, RecvError> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.shared.not_full.notify_one();
                return Ok(item);
            }
            if !inner.producer_alive {
                return Err(RecvError);
            }
            self.shared.not_empty.wait(&mut inner);
        }
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    ///
    /// Used by the measurement loop to detect a wedged driver that has
    /// stopped calling back entirely.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                drop(inner);
                self.shared.not_full.notify_one();
                return Ok(item);
            }
            if !inner.producer_alive {
                return Err(RecvTimeoutError::Disconnected);
            }
            if self.shared.not_empty.wait_until(&mut inner, deadline).timed_out() {
                // One last look: the item may have arrived as the wait expired.
                return match inner.items.pop_front() {
                    Some(item) => {
                        drop(inner);
                        self.shared.not_full.notify_one();
                        Ok(item)
                    }
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }

    /// Number of items currently queued (diagnostic only).
    pub fn len(&self) -> usize {
        self.shared.inner.lock().items.len()
    }

    /// Whether the queue is currently empty (diagnostic only).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.shared.inner.lock().consumer_alive = false;
        self.shared.not_full.notify_all();
    }
}
