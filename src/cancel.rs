//! Cooperative cancellation for running commands.
//!
//! Commands are never killed. When the program shuts down it cancels its
//! [`CancelSource`]; effects that hold a [`CancelToken`] can notice and stop
//! early, and whatever they still produce is dropped by the closed queue.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Owner side: cancels every token it handed out.
#[derive(Debug)]
pub struct CancelSource {
    token: CancelToken,
    /// Dropping the sender wakes every token blocked in `sleep`.
    trigger: Mutex<Option<Sender<()>>>,
}

impl CancelSource {
    /// Create a source whose tokens are not cancelled yet.
    pub fn new() -> Self {
        let (trigger, wake) = bounded(0);
        Self {
            token: CancelToken {
                cancelled: Arc::new(AtomicBool::new(false)),
                wake,
            },
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// A token observing this source.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Cancel all tokens. Idempotent.
    pub fn cancel(&self) {
        self.token.cancelled.store(true, Ordering::Release);
        let mut trigger = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Handed to running effects so they can stop when the program exits.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl CancelToken {
    /// Whether the program has begun shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.wake.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}
