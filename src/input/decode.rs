//! Raw terminal input decoder.
//!
//! Converts the byte stream a terminal writes in raw mode into
//! [`InputEvent`]s:
//!
//! - printable UTF-8 and C0 control keys (`ctrl+a`..`ctrl+z`, enter, tab,
//!   backspace)
//! - CSI / SS3 cursor, editing and function keys with xterm modifiers
//! - `ESC` followed by a key as the alt-modified key
//! - X10 and SGR mouse reports
//! - focus reports and bracketed paste
//!
//! The decoder never panics on garbage. A sequence that is malformed, or that
//! has not terminated after [`MAX_SEQUENCE_LEN`] bytes, is given up on: its
//! `ESC` is reported as an escape key and the remaining bytes are decoded as
//! ordinary keys.

use crate::actor::messages::{
    InputEvent, KeyCode, KeyEvent, KeyModifiers, MouseAction, MouseButton, MouseEvent,
};
use tracing::{trace, warn};

/// Longest escape sequence the decoder waits for before resynchronizing.
pub const MAX_SEQUENCE_LEN: usize = 32;

const PASTE_END: &[u8] = b"\x1b[201~";

/// Result of decoding the front of the pending buffer.
#[derive(Debug, PartialEq, Eq)]
enum Parsed {
    /// An event and the number of bytes it used.
    Event(InputEvent, usize),
    /// Start of a bracketed paste.
    PasteStart(usize),
    /// A well-formed sequence the decoder has no event for.
    Skip(usize),
    /// Not a valid sequence; fall back to literal bytes.
    Malformed,
    /// More bytes are needed.
    Incomplete,
}

/// Incremental decoder. Bytes may arrive split at any point; partial
/// sequences are held until the rest arrives or [`flush`](Self::flush) is
/// called.
#[derive(Debug, Default)]
pub struct InputDecoder {
    pending: Vec<u8>,
    paste: Option<Vec<u8>>,
}

impl InputDecoder {
    /// Create a decoder with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus anything pending) as possible.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<InputEvent> {
        self.pending.extend_from_slice(bytes);
        self.drain(false)
    }

    /// Decode everything pending, treating unfinished sequences as literal
    /// bytes and ending an open paste.
    pub fn flush(&mut self) -> Vec<InputEvent> {
        self.drain(true)
    }

    /// Whether a bracketed paste is being collected.
    pub const fn in_paste(&self) -> bool {
        self.paste.is_some()
    }

    /// Whether undecoded bytes are waiting for more input.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.paste.is_some()
    }

    /// Whether the only undecoded input is one or more bare ESC bytes,
    /// which a reader treats as Esc key presses once a read ends.
    pub fn lone_escape_pending(&self) -> bool {
        self.paste.is_none()
            && !self.pending.is_empty()
            && self.pending.iter().all(|&b| b == 0x1b)
    }

    fn drain(&mut self, finish: bool) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < self.pending.len() {
            let rest = &self.pending[pos..];

            if let Some(paste) = self.paste.as_mut() {
                if let Some(end) = find(rest, PASTE_END) {
                    paste.extend_from_slice(&rest[..end]);
                    pos += end + PASTE_END.len();
                    let text = String::from_utf8_lossy(paste).into_owned();
                    self.paste = None;
                    events.push(InputEvent::Paste(text));
                    continue;
                }
                // Keep a possible start of the terminator for the next read.
                let keep = if finish { 0 } else { partial_suffix(rest, PASTE_END) };
                paste.extend_from_slice(&rest[..rest.len() - keep]);
                pos = self.pending.len() - keep;
                break;
            }

            match parse(rest) {
                Parsed::Event(event, used) => {
                    trace!(?event, used, "decoded input");
                    events.push(event);
                    pos += used;
                }
                Parsed::PasteStart(used) => {
                    self.paste = Some(Vec::new());
                    pos += used;
                }
                Parsed::Skip(used) => {
                    trace!(used, "skipped unknown sequence");
                    pos += used;
                }
                Parsed::Malformed => {
                    warn!(byte = rest[0], "malformed input sequence");
                    events.push(fallback(rest[0]));
                    pos += 1;
                }
                Parsed::Incomplete if finish || rest.len() >= MAX_SEQUENCE_LEN => {
                    warn!(len = rest.len(), "unterminated input sequence");
                    events.push(fallback(rest[0]));
                    pos += 1;
                }
                Parsed::Incomplete => break,
            }
        }

        self.pending.drain(..pos);

        if finish {
            if let Some(paste) = self.paste.take() {
                events.push(InputEvent::Paste(String::from_utf8_lossy(&paste).into_owned()));
            }
        }
        events
    }
}

/// The event a byte stands for when it cannot start a sequence.
fn fallback(byte: u8) -> InputEvent {
    if byte == 0x1b {
        key(KeyCode::Esc)
    } else {
        key(KeyCode::Char(char::REPLACEMENT_CHARACTER))
    }
}

fn key(code: KeyCode) -> InputEvent {
    InputEvent::Key(KeyEvent::plain(code))
}

fn key_with(code: KeyCode, modifiers: KeyModifiers) -> InputEvent {
    InputEvent::Key(KeyEvent::new(code, modifiers))
}

/// Decode one event from the front of `buf` (never empty).
fn parse(buf: &[u8]) -> Parsed {
    let byte = buf[0];
    let event = match byte {
        0x1b => return parse_escape(buf),
        b'\r' | b'\n' => key(KeyCode::Enter),
        b'\t' => key(KeyCode::Tab),
        0x7f | 0x08 => key(KeyCode::Backspace),
        0x00 => key(KeyCode::Null),
        0x01..=0x1a => InputEvent::Key(KeyEvent::ctrl(char::from(b'a' + byte - 1))),
        0x1c..=0x1f => {
            let c = ['\\', ']', '^', '_'][usize::from(byte - 0x1c)];
            InputEvent::Key(KeyEvent::ctrl(c))
        }
        _ => return parse_char(buf),
    };
    Parsed::Event(event, 1)
}

/// A UTF-8 encoded character. Invalid bytes decode to U+FFFD one at a time.
fn parse_char(buf: &[u8]) -> Parsed {
    let width = match buf[0] {
        0x00..=0x7f => 1,
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => return Parsed::Event(key(KeyCode::Char(char::REPLACEMENT_CHARACTER)), 1),
    };
    let Some(bytes) = buf.get(..width) else {
        // Continuation bytes must follow; anything else is already invalid.
        if buf[1..].iter().all(|b| (0x80..=0xbf).contains(b)) {
            return Parsed::Incomplete;
        }
        return Parsed::Event(key(KeyCode::Char(char::REPLACEMENT_CHARACTER)), 1);
    };
    match std::str::from_utf8(bytes).ok().and_then(|s| s.chars().next()) {
        Some(c) => Parsed::Event(key(KeyCode::Char(c)), width),
        None => Parsed::Event(key(KeyCode::Char(char::REPLACEMENT_CHARACTER)), 1),
    }
}

fn parse_escape(buf: &[u8]) -> Parsed {
    match buf.get(1) {
        None => Parsed::Incomplete,
        Some(b'[') => parse_csi(buf),
        Some(b'O') => parse_ss3(buf),
        // Double escape: report the first, decode the second on its own.
        Some(0x1b) => Parsed::Event(key(KeyCode::Esc), 1),
        Some(_) => match parse(&buf[1..]) {
            Parsed::Event(InputEvent::Key(inner), used) => Parsed::Event(
                InputEvent::Key(inner.with_modifiers(KeyModifiers::ALT)),
                used + 1,
            ),
            Parsed::Incomplete => Parsed::Incomplete,
            _ => Parsed::Event(key(KeyCode::Esc), 1),
        },
    }
}

/// `ESC O <final>`: application-mode cursor keys and F1-F4.
fn parse_ss3(buf: &[u8]) -> Parsed {
    let Some(&last) = buf.get(2) else {
        return Parsed::Incomplete;
    };
    let code = match last {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        0x40..=0x7e => return Parsed::Skip(3),
        _ => return Parsed::Malformed,
    };
    Parsed::Event(key(code), 3)
}

/// `ESC [ params <final>`.
fn parse_csi(buf: &[u8]) -> Parsed {
    match buf.get(2) {
        Some(b'M') => return parse_x10_mouse(buf),
        Some(b'<') => return parse_sgr_mouse(buf),
        _ => {}
    }

    let mut end = None;
    for (i, &b) in buf.iter().enumerate().skip(2) {
        if i >= MAX_SEQUENCE_LEN {
            return Parsed::Malformed;
        }
        match b {
            // Parameter and intermediate bytes.
            0x20..=0x3f => {}
            0x40..=0x7e => {
                end = Some(i);
                break;
            }
            _ => return Parsed::Malformed,
        }
    }
    let Some(end) = end else {
        return Parsed::Incomplete;
    };
    let used = end + 1;

    let Some(params) = parse_params(&buf[2..end]) else {
        // Private or intermediate forms the decoder does not handle.
        return Parsed::Skip(used);
    };
    let modifiers = params
        .get(1)
        .map_or(KeyModifiers::empty(), |&m| KeyModifiers::from_xterm(m));

    let code = match buf[end] {
        b'A' => KeyCode::Up,
        b'B' => KeyCode::Down,
        b'C' => KeyCode::Right,
        b'D' => KeyCode::Left,
        b'H' => KeyCode::Home,
        b'F' => KeyCode::End,
        b'P' => KeyCode::F(1),
        b'Q' => KeyCode::F(2),
        b'R' => KeyCode::F(3),
        b'S' => KeyCode::F(4),
        b'Z' => KeyCode::BackTab,
        b'I' if params.is_empty() => return Parsed::Event(InputEvent::FocusGained, used),
        b'O' if params.is_empty() => return Parsed::Event(InputEvent::FocusLost, used),
        b'~' => match params.first().copied().unwrap_or(0) {
            1 | 7 => KeyCode::Home,
            2 => KeyCode::Insert,
            3 => KeyCode::Delete,
            4 | 8 => KeyCode::End,
            5 => KeyCode::PageUp,
            6 => KeyCode::PageDown,
            n @ 11..=15 => KeyCode::F((n - 10) as u8),
            n @ 17..=21 => KeyCode::F((n - 11) as u8),
            23 => KeyCode::F(11),
            24 => KeyCode::F(12),
            200 => return Parsed::PasteStart(used),
            _ => return Parsed::Skip(used),
        },
        _ => return Parsed::Skip(used),
    };
    Parsed::Event(key_with(code, modifiers), used)
}

/// Numeric `;`-separated parameters. `None` for anything else.
fn parse_params(params: &[u8]) -> Option<Vec<u16>> {
    if params.is_empty() {
        return Some(Vec::new());
    }
    let text = std::str::from_utf8(params).ok()?;
    text.split(';')
        .map(|part| {
            if part.is_empty() {
                Some(0)
            } else if part.bytes().all(|b| b.is_ascii_digit()) {
                Some(part.parse::<u32>().map_or(u16::MAX, |v| v.min(u32::from(u16::MAX)) as u16))
            } else {
                None
            }
        })
        .collect()
}

/// `ESC [ M cb cx cy`, each value offset by 32 (coordinates 1-based).
fn parse_x10_mouse(buf: &[u8]) -> Parsed {
    let Some(&[cb, cx, cy]) = buf.get(3..6).and_then(|s| <&[u8; 3]>::try_from(s).ok()) else {
        return Parsed::Incomplete;
    };
    if cb < 32 || cx < 33 || cy < 33 {
        return Parsed::Malformed;
    }
    let event = mouse_event(u16::from(cb - 32), u16::from(cx - 33), u16::from(cy - 33), false);
    Parsed::Event(InputEvent::Mouse(event), 6)
}

/// `ESC [ < b ; x ; y (M|m)` with 1-based coordinates; `m` is a release.
fn parse_sgr_mouse(buf: &[u8]) -> Parsed {
    let mut end = None;
    for (i, &b) in buf.iter().enumerate().skip(3) {
        if i >= MAX_SEQUENCE_LEN {
            return Parsed::Malformed;
        }
        match b {
            b'0'..=b'9' | b';' => {}
            b'M' | b'm' => {
                end = Some(i);
                break;
            }
            _ => return Parsed::Malformed,
        }
    }
    let Some(end) = end else {
        return Parsed::Incomplete;
    };
    let used = end + 1;
    match parse_params(&buf[3..end]).as_deref() {
        Some(&[cb, x, y]) => {
            let event = mouse_event(cb, x.saturating_sub(1), y.saturating_sub(1), buf[end] == b'm');
            Parsed::Event(InputEvent::Mouse(event), used)
        }
        _ => Parsed::Skip(used),
    }
}

/// Interpret the xterm button byte.
fn mouse_event(cb: u16, x: u16, y: u16, release: bool) -> MouseEvent {
    let mut modifiers = KeyModifiers::empty();
    if cb & 4 != 0 {
        modifiers |= KeyModifiers::SHIFT;
    }
    if cb & 8 != 0 {
        modifiers |= KeyModifiers::ALT;
    }
    if cb & 16 != 0 {
        modifiers |= KeyModifiers::CONTROL;
    }

    let (action, button) = if cb & 64 != 0 {
        let action = match cb & 3 {
            0 => MouseAction::WheelUp,
            1 => MouseAction::WheelDown,
            2 => MouseAction::WheelLeft,
            _ => MouseAction::WheelRight,
        };
        (action, None)
    } else {
        let button = match cb & 3 {
            0 => Some(MouseButton::Left),
            1 => Some(MouseButton::Middle),
            2 => Some(MouseButton::Right),
            _ => None,
        };
        let action = if cb & 32 != 0 {
            MouseAction::Motion
        } else if release || button.is_none() {
            MouseAction::Release
        } else {
            MouseAction::Press
        };
        (action, button)
    };

    MouseEvent {
        x,
        y,
        action,
        button,
        modifiers,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest suffix of `data` that is a proper prefix of `needle`.
fn partial_suffix(data: &[u8], needle: &[u8]) -> usize {
    (1..needle.len())
        .rev()
        .find(|&k| data.ends_with(&needle[..k]))
        .unwrap_or(0)
}
