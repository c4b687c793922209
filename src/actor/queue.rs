//! Message Queue: unbounded many-producer, single-consumer conduit into the
//! event loop.
//!
//! Closing is idempotent and one-way. After close, `dequeue` returns `None`
//! (dropping anything still buffered) and late `enqueue` calls are silently
//! discarded, so commands finishing after shutdown never error.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What actually travels through the channel.
enum Slot<T> {
    Item(T),
    /// Sent once by `close` to wake a blocked consumer.
    Wake,
}

/// Consumer side, owned by the event loop.
pub struct MessageQueue<T> {
    tx: Sender<Slot<T>>,
    rx: Receiver<Slot<T>>,
    closed: Arc<AtomicBool>,
}

/// Producer side; cheap to clone and safe to use from any thread.
pub struct QueueSender<T> {
    tx: Sender<Slot<T>>,
    closed: Arc<AtomicBool>,
}

impl<T> MessageQueue<T> {
    /// Create an open, empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A new producer handle.
    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Block until an item is available or the queue is closed.
    ///
    /// Returns `None` once the queue is closed.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            match self.rx.recv() {
                Ok(Slot::Item(item)) => {
                    if self.is_closed() {
                        return None;
                    }
                    return Some(item);
                }
                Ok(Slot::Wake) => {}
                Err(_) => return None,
            }
        }
    }

    /// Take the next item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        loop {
            if self.is_closed() {
                return None;
            }
            match self.rx.try_recv() {
                Ok(Slot::Item(item)) => return Some(item),
                Ok(Slot::Wake) => {}
                Err(_) => return None,
            }
        }
    }

    /// Close the queue. Idempotent.
    pub fn close(&self) {
        close(&self.tx, &self.closed);
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueueSender<T> {
    /// Append an item. Never blocks.
    ///
    /// Returns `false` if the queue was closed and the item was dropped.
    pub fn enqueue(&self, item: T) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(Slot::Item(item)).is_ok()
    }

    /// Close the queue from the producer side. Idempotent.
    pub fn close(&self) {
        close(&self.tx, &self.closed);
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

fn close<T>(tx: &Sender<Slot<T>>, closed: &AtomicBool) {
    if !closed.swap(true, Ordering::AcqRel) {
        let _ = tx.send(Slot::Wake);
    }
}
