//! Signal watcher: turns host signals into loop requests.
//!
//! `SIGINT` becomes an interrupt (the run ends with
//! [`Error::Interrupted`](crate::Error::Interrupted)); `SIGTERM` asks for a
//! normal quit. In raw mode ctrl+c arrives as a key instead, so the interrupt
//! path mainly serves programs without terminal input.
//!
//! signal-hook keeps its process-wide handler installed after the watcher
//! closes, which would swallow both signals for the rest of the process. A
//! conditional default action is registered once and armed whenever no
//! watcher is running, so the default behaviour returns after `run`.

use super::messages::Envelope;
use super::queue::QueueSender;
use std::io;

#[cfg(unix)]
mod unix_signal {
    use super::{Envelope, QueueSender};
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::{Handle, Signals};
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread::{self, JoinHandle};
    use tracing::debug;

    /// Running watchers, and the flag that arms the default actions.
    struct Defaults {
        active: usize,
        armed: Option<Arc<AtomicBool>>,
    }

    static DEFAULTS: Mutex<Defaults> = Mutex::new(Defaults {
        active: 0,
        armed: None,
    });

    /// Disarm the default actions for a new watcher, registering them on
    /// first use.
    fn acquire_defaults() -> io::Result<()> {
        let mut defaults = DEFAULTS.lock().unwrap_or_else(PoisonError::into_inner);
        let armed = match &defaults.armed {
            Some(armed) => Arc::clone(armed),
            None => {
                let armed = Arc::new(AtomicBool::new(false));
                for signal in [SIGINT, SIGTERM] {
                    signal_hook::flag::register_conditional_default(signal, Arc::clone(&armed))?;
                }
                defaults.armed = Some(Arc::clone(&armed));
                armed
            }
        };
        armed.store(false, Ordering::SeqCst);
        defaults.active += 1;
        Ok(())
    }

    /// Re-arm the default actions once the last watcher is gone.
    fn release_defaults() {
        let mut defaults = DEFAULTS.lock().unwrap_or_else(PoisonError::into_inner);
        defaults.active = defaults.active.saturating_sub(1);
        if defaults.active == 0 {
            if let Some(armed) = &defaults.armed {
                armed.store(true, Ordering::SeqCst);
                debug!("default signal actions restored");
            }
        }
    }

    /// Whether `SIGINT`/`SIGTERM` currently take their default action.
    #[cfg(test)]
    pub(crate) fn defaults_restored() -> bool {
        let defaults = DEFAULTS.lock().unwrap_or_else(PoisonError::into_inner);
        match &defaults.armed {
            Some(armed) => armed.load(Ordering::SeqCst),
            None => true,
        }
    }

    /// Background thread forwarding `SIGINT`/`SIGTERM` to the loop.
    pub struct SignalWatcher {
        handle: Handle,
        thread: Option<JoinHandle<()>>,
    }

    impl SignalWatcher {
        pub(crate) fn spawn<M: Send + 'static>(sender: QueueSender<Envelope<M>>) -> io::Result<Self> {
            acquire_defaults()?;
            let mut signals = match Signals::new([SIGINT, SIGTERM]) {
                Ok(signals) => signals,
                Err(e) => {
                    release_defaults();
                    return Err(e);
                }
            };
            let handle = signals.handle();
            let thread = thread::Builder::new()
                .name("tealoop-signals".to_string())
                .spawn(move || {
                    for signal in signals.forever() {
                        let envelope = match signal {
                            SIGINT => Envelope::Interrupt,
                            _ => Envelope::Quit,
                        };
                        debug!(signal, "signal received");
                        if !sender.enqueue(envelope) {
                            break;
                        }
                    }
                });
            let thread = match thread {
                Ok(thread) => thread,
                Err(e) => {
                    handle.close();
                    release_defaults();
                    return Err(e);
                }
            };
            Ok(Self {
                handle,
                thread: Some(thread),
            })
        }

        /// Unregister the handlers, wait for the thread and give the
        /// signals their default actions back.
        pub fn stop(&mut self) {
            let Some(thread) = self.thread.take() else {
                return;
            };
            self.handle.close();
            let _ = thread.join();
            release_defaults();
        }
    }

    impl Drop for SignalWatcher {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

#[cfg(unix)]
pub use unix_signal::SignalWatcher;
#[cfg(all(test, unix))]
use unix_signal::defaults_restored;

/// Signal handling is unavailable on this platform.
#[cfg(not(unix))]
pub struct SignalWatcher;

#[cfg(not(unix))]
impl SignalWatcher {
    pub(crate) fn spawn<M: Send + 'static>(_sender: QueueSender<Envelope<M>>) -> io::Result<Self> {
        Ok(Self)
    }

    /// Nothing to stop.
    pub fn stop(&mut self) {}
}

/// Start watching signals if `enabled`.
pub(crate) fn watch<M: Send + 'static>(
    enabled: bool,
    sender: QueueSender<Envelope<M>>,
) -> io::Result<Option<SignalWatcher>> {
    if enabled {
        SignalWatcher::spawn(sender).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::actor::queue::MessageQueue;
    use std::sync::Mutex;

    /// Watchers share process-wide signal state.
    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn test_stop_is_idempotent() {
        let _serial = SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let queue = MessageQueue::<Envelope<()>>::new();
        let mut watcher = watch(true, queue.sender()).unwrap().unwrap();
        watcher.stop();
        watcher.stop();
        assert!(queue.is_empty());
        assert!(defaults_restored());
    }

    #[test]
    fn test_default_actions_return_after_last_watcher_stops() {
        let _serial = SERIAL.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let queue = MessageQueue::<Envelope<()>>::new();

        let mut first = watch(true, queue.sender()).unwrap().unwrap();
        assert!(!defaults_restored());
        let mut second = watch(true, queue.sender()).unwrap().unwrap();
        first.stop();
        assert!(!defaults_restored());
        second.stop();
        assert!(defaults_restored());

        let watcher = watch(true, queue.sender()).unwrap().unwrap();
        assert!(!defaults_restored());
        drop(watcher);
        assert!(defaults_restored());
    }

    #[test]
    fn test_disabled_watcher() {
        let queue = MessageQueue::<Envelope<()>>::new();
        assert!(watch(false, queue.sender()).unwrap().is_none());
    }
}
