//! Input Actor: Dedicated thread reading terminal input.
//!
//! With [`InputSource::Terminal`] the thread polls crossterm's event queue;
//! with [`InputSource::Reader`] it reads raw bytes and runs them through the
//! [`InputDecoder`]. Either way every decoded event is enqueued for the event
//! loop. The actor never decides to quit by itself: it stops when told to, at
//! end of input, or after posting an unrecoverable read error.

use super::messages::{
    Envelope, Event, InputEvent, KeyCode, KeyEvent, KeyModifiers, MouseAction, MouseButton,
    MouseEvent,
};
use super::queue::QueueSender;
use crate::input::InputDecoder;
use crossterm::event::{self, KeyEventKind};
use std::fmt;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Where a program reads its input from.
#[derive(Default)]
pub enum InputSource {
    /// The controlling terminal, through crossterm (raw mode is enabled).
    #[default]
    Terminal,
    /// Raw terminal bytes from any reader.
    Reader(Box<dyn Read + Send>),
    /// No input at all.
    None,
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal => f.write_str("Terminal"),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::None => f.write_str("None"),
        }
    }
}

/// Settings for the input thread.
#[derive(Debug, Clone, Copy)]
pub struct InputOptions {
    /// How long to wait for terminal events before checking for shutdown.
    pub poll_timeout: Duration,
    /// Forward mouse events (only when mouse reporting is enabled).
    pub mouse: bool,
}

/// Input actor that reads events on its own thread.
pub struct InputActor {
    /// Handle to the input thread.
    handle: Option<JoinHandle<()>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
    /// Reader threads may block in `read` forever and are never joined.
    detached: bool,
}

impl InputActor {
    /// Spawn the input thread for `source`.
    ///
    /// Returns `Ok(None)` for [`InputSource::None`].
    pub(crate) fn spawn<M: Send + 'static>(
        source: InputSource,
        sender: QueueSender<Envelope<M>>,
        options: InputOptions,
    ) -> io::Result<Option<Self>> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let builder = thread::Builder::new().name("tealoop-input".to_string());

        let (handle, detached) = match source {
            InputSource::None => return Ok(None),
            InputSource::Terminal => {
                let handle = builder.spawn(move || poll_terminal(&sender, &flag, options))?;
                (handle, false)
            }
            InputSource::Reader(reader) => {
                let handle = builder.spawn(move || read_bytes(reader, &sender, &flag, options))?;
                (handle, true)
            }
        };
        debug!(detached, "input reader started");

        Ok(Some(Self {
            handle: Some(handle),
            shutdown,
            detached,
        }))
    }

    /// Signal the input thread to shutdown.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Stop the input thread and wait for it (terminal input only).
    pub fn join(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            if !self.detached {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for InputActor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forward one event; `false` once the loop no longer listens.
fn deliver<M>(sender: &QueueSender<Envelope<M>>, event: InputEvent, options: InputOptions) -> bool {
    if matches!(event, InputEvent::Mouse(_)) && !options.mouse {
        return true;
    }
    trace!(?event, "input event");
    sender.enqueue(Envelope::Event(Event::from(event)))
}

/// Main terminal polling loop.
fn poll_terminal<M>(sender: &QueueSender<Envelope<M>>, shutdown: &AtomicBool, options: InputOptions) {
    while !shutdown.load(Ordering::Relaxed) {
        match event::poll(options.poll_timeout).and_then(|ready| {
            if ready {
                event::read().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(event)) => {
                if let Some(input) = convert_event(event) {
                    if !deliver(sender, input, options) {
                        break;
                    }
                }
            }
            // No event, continue loop (will check shutdown)
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "terminal input failed");
                sender.enqueue(Envelope::InputFailed(e.to_string()));
                break;
            }
        }
    }
    debug!("input reader stopped");
}

/// Main byte reading loop.
fn read_bytes<M>(
    mut reader: Box<dyn Read + Send>,
    sender: &QueueSender<Envelope<M>>,
    shutdown: &AtomicBool,
    options: InputOptions,
) {
    let mut decoder = InputDecoder::new();
    let mut buf = [0u8; 1024];

    while !shutdown.load(Ordering::Relaxed) {
        let events = match reader.read(&mut buf) {
            Ok(0) => {
                for input in decoder.flush() {
                    if !deliver(sender, input, options) {
                        break;
                    }
                }
                debug!("input reached end of stream");
                return;
            }
            Ok(n) => {
                let mut events = decoder.feed(&buf[..n]);
                // A bare ESC at the end of a read is the escape key; any
                // other partial sequence waits for the next read.
                if decoder.lone_escape_pending() {
                    events.extend(decoder.flush());
                }
                events
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "input read failed");
                sender.enqueue(Envelope::InputFailed(e.to_string()));
                return;
            }
        };
        for input in events {
            if shutdown.load(Ordering::Relaxed) || !deliver(sender, input, options) {
                return;
            }
        }
    }
}

/// Convert a crossterm event to our InputEvent.
fn convert_event(event: event::Event) -> Option<InputEvent> {
    match event {
        event::Event::Key(key_event) => {
            // Only process key press events (not release or repeat)
            if key_event.kind != KeyEventKind::Press {
                return None;
            }

            let code = convert_key_code(key_event.code)?;
            let modifiers = convert_modifiers(key_event.modifiers);

            Some(InputEvent::Key(KeyEvent::new(code, modifiers)))
        }

        event::Event::Mouse(mouse_event) => Some(convert_mouse_event(mouse_event)),

        event::Event::Resize(width, height) => Some(InputEvent::Resize { width, height }),

        event::Event::FocusGained => Some(InputEvent::FocusGained),

        event::Event::FocusLost => Some(InputEvent::FocusLost),

        event::Event::Paste(text) => Some(InputEvent::Paste(text)),
    }
}

/// Convert crossterm KeyCode to our KeyCode.
fn convert_key_code(code: event::KeyCode) -> Option<KeyCode> {
    Some(match code {
        event::KeyCode::Char(c) => KeyCode::Char(c),
        event::KeyCode::F(n) => KeyCode::F(n),
        event::KeyCode::Backspace => KeyCode::Backspace,
        event::KeyCode::Enter => KeyCode::Enter,
        event::KeyCode::Left => KeyCode::Left,
        event::KeyCode::Right => KeyCode::Right,
        event::KeyCode::Up => KeyCode::Up,
        event::KeyCode::Down => KeyCode::Down,
        event::KeyCode::Home => KeyCode::Home,
        event::KeyCode::End => KeyCode::End,
        event::KeyCode::PageUp => KeyCode::PageUp,
        event::KeyCode::PageDown => KeyCode::PageDown,
        event::KeyCode::Tab => KeyCode::Tab,
        event::KeyCode::BackTab => KeyCode::BackTab,
        event::KeyCode::Delete => KeyCode::Delete,
        event::KeyCode::Insert => KeyCode::Insert,
        event::KeyCode::Esc => KeyCode::Esc,
        event::KeyCode::Null => KeyCode::Null,
        _ => return None, // Ignore other key codes
    })
}

/// Convert crossterm KeyModifiers to our KeyModifiers.
fn convert_modifiers(mods: event::KeyModifiers) -> KeyModifiers {
    let mut out = KeyModifiers::empty();
    out.set(KeyModifiers::SHIFT, mods.contains(event::KeyModifiers::SHIFT));
    out.set(KeyModifiers::CONTROL, mods.contains(event::KeyModifiers::CONTROL));
    out.set(KeyModifiers::ALT, mods.contains(event::KeyModifiers::ALT));
    out.set(KeyModifiers::SUPER, mods.contains(event::KeyModifiers::SUPER));
    out
}

/// Convert crossterm MouseEvent to our InputEvent.
fn convert_mouse_event(mouse: event::MouseEvent) -> InputEvent {
    let (action, button) = match mouse.kind {
        event::MouseEventKind::Down(button) => (MouseAction::Press, Some(convert_mouse_button(button))),
        event::MouseEventKind::Up(button) => (MouseAction::Release, Some(convert_mouse_button(button))),
        event::MouseEventKind::Drag(button) => (MouseAction::Motion, Some(convert_mouse_button(button))),
        event::MouseEventKind::Moved => (MouseAction::Motion, None),
        event::MouseEventKind::ScrollUp => (MouseAction::WheelUp, None),
        event::MouseEventKind::ScrollDown => (MouseAction::WheelDown, None),
        event::MouseEventKind::ScrollLeft => (MouseAction::WheelLeft, None),
        event::MouseEventKind::ScrollRight => (MouseAction::WheelRight, None),
    };

    InputEvent::Mouse(MouseEvent {
        x: mouse.column,
        y: mouse.row,
        action,
        button,
        modifiers: convert_modifiers(mouse.modifiers),
    })
}

/// Convert crossterm MouseButton to our MouseButton.
const fn convert_mouse_button(button: event::MouseButton) -> MouseButton {
    match button {
        event::MouseButton::Left => MouseButton::Left,
        event::MouseButton::Right => MouseButton::Right,
        event::MouseButton::Middle => MouseButton::Middle,
    }
}
