//! Events delivered to `update` and the envelopes the loop receives.
//!
//! [`Event`] is what the application's `update` sees. [`Envelope`] is the
//! wider protocol carried by the message queue: application events plus the
//! requests the event loop handles itself.

use crate::command::TerminalCommand;
use crate::error::CommandError;
use bitflags::bitflags;
use std::fmt;

/// Key codes for keyboard input.
///
/// This is a simplified subset of crossterm's `KeyCode`, covering what the
/// input decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character.
    Char(char),
    /// Function key (F1-F12).
    F(u8),
    /// Backspace key.
    Backspace,
    /// Enter/Return key.
    Enter,
    /// Left arrow.
    Left,
    /// Right arrow.
    Right,
    /// Up arrow.
    Up,
    /// Down arrow.
    Down,
    /// Home key.
    Home,
    /// End key.
    End,
    /// Page Up.
    PageUp,
    /// Page Down.
    PageDown,
    /// Tab key.
    Tab,
    /// Backtab (Shift+Tab).
    BackTab,
    /// Delete key.
    Delete,
    /// Insert key.
    Insert,
    /// Escape key.
    Esc,
    /// Null (Ctrl+Space on some terminals).
    Null,
}

bitflags! {
    /// Key modifiers held during a key press or mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyModifiers: u8 {
        /// Shift key held.
        const SHIFT = 0b0001;
        /// Alt/Option key held.
        const ALT = 0b0010;
        /// Control key held.
        const CONTROL = 0b0100;
        /// Super/Command/Windows key held.
        const SUPER = 0b1000;
    }
}

impl KeyModifiers {
    /// Decode the xterm modifier parameter (`1 + bitmask`) used in CSI
    /// sequences such as `ESC [1;5A`.
    pub const fn from_xterm(param: u16) -> Self {
        let bits = param.saturating_sub(1);
        let mut mods = Self::empty();
        if bits & 1 != 0 {
            mods = mods.union(Self::SHIFT);
        }
        if bits & 2 != 0 {
            mods = mods.union(Self::ALT);
        }
        if bits & 4 != 0 {
            mods = mods.union(Self::CONTROL);
        }
        if bits & 8 != 0 {
            mods = mods.union(Self::SUPER);
        }
        mods
    }
}

/// A key press.
///
/// The [`Display`](fmt::Display) form is the canonical name applications
/// match on: `"a"`, `"down"`, `"ctrl+c"`, `"alt+enter"`, `"shift+tab"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// The key code.
    pub code: KeyCode,
    /// Modifiers held during keypress.
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    /// Create a key event.
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    /// A key without modifiers.
    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::empty())
    }

    /// A control chord such as `ctrl+c`.
    pub const fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    /// Returns a copy with `modifiers` added.
    #[must_use]
    pub const fn with_modifiers(self, modifiers: KeyModifiers) -> Self {
        Self::new(self.code, self.modifiers.union(modifiers))
    }
}

impl From<KeyCode> for KeyEvent {
    fn from(code: KeyCode) -> Self {
        Self::plain(code)
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            f.write_str("alt+")?;
        }
        if self.modifiers.contains(KeyModifiers::SUPER) {
            f.write_str("super+")?;
        }
        // Shifted characters already carry their case.
        let shift_shown = !matches!(self.code, KeyCode::Char(_) | KeyCode::BackTab);
        if shift_shown && self.modifiers.contains(KeyModifiers::SHIFT) {
            f.write_str("shift+")?;
        }
        match self.code {
            KeyCode::Char(c) => write!(f, "{c}"),
            KeyCode::F(n) => write!(f, "f{n}"),
            KeyCode::Backspace => f.write_str("backspace"),
            KeyCode::Enter => f.write_str("enter"),
            KeyCode::Left => f.write_str("left"),
            KeyCode::Right => f.write_str("right"),
            KeyCode::Up => f.write_str("up"),
            KeyCode::Down => f.write_str("down"),
            KeyCode::Home => f.write_str("home"),
            KeyCode::End => f.write_str("end"),
            KeyCode::PageUp => f.write_str("pgup"),
            KeyCode::PageDown => f.write_str("pgdown"),
            KeyCode::Tab => f.write_str("tab"),
            KeyCode::BackTab => f.write_str("shift+tab"),
            KeyCode::Delete => f.write_str("delete"),
            KeyCode::Insert => f.write_str("insert"),
            KeyCode::Esc => f.write_str("esc"),
            KeyCode::Null => f.write_str("ctrl+@"),
        }
    }
}

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left mouse button.
    Left,
    /// Right mouse button.
    Right,
    /// Middle mouse button.
    Middle,
}

/// What happened in a mouse report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    /// Button pressed.
    Press,
    /// Button released.
    Release,
    /// Pointer moved; `button` is set while dragging.
    Motion,
    /// Wheel scrolled up.
    WheelUp,
    /// Wheel scrolled down.
    WheelDown,
    /// Wheel scrolled left.
    WheelLeft,
    /// Wheel scrolled right.
    WheelRight,
}

/// Mouse event details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// X coordinate (column, 0-based).
    pub x: u16,
    /// Y coordinate (row, 0-based).
    pub y: u16,
    /// What happened.
    pub action: MouseAction,
    /// Mouse button involved (if any).
    pub button: Option<MouseButton>,
    /// Key modifiers held during mouse event.
    pub modifiers: KeyModifiers,
}

/// Terminal input, as produced by the input reader before it is wrapped in
/// an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A key was pressed.
    Key(KeyEvent),
    /// A mouse report.
    Mouse(MouseEvent),
    /// Terminal was resized.
    Resize {
        /// New width in columns.
        width: u16,
        /// New height in rows.
        height: u16,
    },
    /// Focus gained.
    FocusGained,
    /// Focus lost.
    FocusLost,
    /// Paste event (bracketed paste).
    Paste(String),
}

/// Something that happened, delivered to `Model::update` exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<M> {
    /// A key was pressed.
    Key(KeyEvent),
    /// A mouse report (only when mouse capture is enabled).
    Mouse(MouseEvent),
    /// The terminal size is known or changed.
    Resize {
        /// Width in columns.
        width: u16,
        /// Height in rows.
        height: u16,
    },
    /// Terminal focus gained.
    FocusGained,
    /// Terminal focus lost.
    FocusLost,
    /// Bracketed paste content.
    Paste(String),
    /// A command failed or panicked.
    Error(CommandError),
    /// An application message produced by a command or sent through a
    /// [`ProgramHandle`](crate::ProgramHandle).
    Message(M),
}

impl<M> Event<M> {
    /// The key press, if this is a key event.
    pub const fn key(&self) -> Option<&KeyEvent> {
        match self {
            Self::Key(key) => Some(key),
            _ => None,
        }
    }

    /// The application message, if this is one.
    pub fn into_message(self) -> Option<M> {
        match self {
            Self::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

impl<M> From<InputEvent> for Event<M> {
    fn from(input: InputEvent) -> Self {
        match input {
            InputEvent::Key(key) => Self::Key(key),
            InputEvent::Mouse(mouse) => Self::Mouse(mouse),
            InputEvent::Resize { width, height } => Self::Resize { width, height },
            InputEvent::FocusGained => Self::FocusGained,
            InputEvent::FocusLost => Self::FocusLost,
            InputEvent::Paste(text) => Self::Paste(text),
        }
    }
}

/// Everything that travels through the message queue to the event loop.
#[derive(Debug)]
pub(crate) enum Envelope<M> {
    /// Forwarded to `update` (resizes are observed by the loop first).
    Event(Event<M>),
    /// Applied by the loop directly; never reaches `update`.
    Terminal(TerminalCommand),
    /// Graceful shutdown with a final render.
    Quit,
    /// Host interrupt signal.
    Interrupt,
    /// Immediate shutdown without a final render.
    Kill,
    /// The input reader hit an unrecoverable error.
    InputFailed(String),
}
