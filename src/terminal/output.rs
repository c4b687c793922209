//! `OutputBuffer`: one frame's worth of escape sequences and text.

use std::io::Write;

/// Bytes for a single renderer frame or terminal command.
///
/// The renderer builds a whole frame here and hands it to the output stream
/// with one `write_all`, so a half-drawn frame is never visible.
pub struct OutputBuffer {
    data: Vec<u8>,
}

impl OutputBuffer {
    /// Buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Buffer sized for an 80x24 frame with styling (4 KiB).
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    /// Drop the contents, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Bytes queued so far.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of queued bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write raw bytes.
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write a string.
    #[inline]
    pub fn write_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Carriage return followed by line feed.
    #[inline]
    pub fn newline(&mut self) {
        self.data.extend_from_slice(b"\r\n");
    }

    /// Move cursor to the first column.
    #[inline]
    pub fn carriage_return(&mut self) {
        self.data.push(b'\r');
    }

    /// Move cursor up `n` rows (no-op for 0).
    #[inline]
    pub fn cursor_up(&mut self, n: usize) {
        if n > 0 {
            let _ = write!(self.data, "\x1b[{n}A");
        }
    }

    /// Move cursor down `n` rows (no-op for 0). Never scrolls.
    #[inline]
    pub fn cursor_down(&mut self, n: usize) {
        if n > 0 {
            let _ = write!(self.data, "\x1b[{n}B");
        }
    }

    /// Move cursor to the top-left corner.
    #[inline]
    pub fn cursor_home(&mut self) {
        self.data.extend_from_slice(b"\x1b[H");
    }

    /// Hide cursor.
    #[inline]
    pub fn cursor_hide(&mut self) {
        self.data.extend_from_slice(b"\x1b[?25l");
    }

    /// Show cursor.
    #[inline]
    pub fn cursor_show(&mut self) {
        self.data.extend_from_slice(b"\x1b[?25h");
    }

    /// Erase from the cursor to the end of the line.
    #[inline]
    pub fn erase_line_right(&mut self) {
        self.data.extend_from_slice(b"\x1b[K");
    }

    /// Erase the whole current line.
    #[inline]
    pub fn erase_line(&mut self) {
        self.data.extend_from_slice(b"\x1b[2K");
    }

    /// Erase from the cursor to the end of the screen.
    #[inline]
    pub fn erase_down(&mut self) {
        self.data.extend_from_slice(b"\x1b[J");
    }

    /// Erase the whole screen (ED 2). The cursor stays put.
    #[inline]
    pub fn clear_screen(&mut self) {
        self.data.extend_from_slice(b"\x1b[2J");
    }

    /// Switch to the alternate screen buffer (DEC mode 1049).
    #[inline]
    pub fn enter_alt_screen(&mut self) {
        self.data.extend_from_slice(b"\x1b[?1049h");
    }

    /// Return to the main screen buffer.
    #[inline]
    pub fn exit_alt_screen(&mut self) {
        self.data.extend_from_slice(b"\x1b[?1049l");
    }

    /// Set the window title (OSC 2). Control characters are dropped.
    pub fn set_title(&mut self, title: &str) {
        self.data.extend_from_slice(b"\x1b]2;");
        for c in title.chars().filter(|c| !c.is_control()) {
            let mut utf8 = [0u8; 4];
            self.data.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
        }
        self.data.push(0x07);
    }

    /// Turn a DEC private mode on or off.
    #[inline]
    pub fn set_private_mode(&mut self, mode: u16, enabled: bool) {
        let suffix = if enabled { 'h' } else { 'l' };
        let _ = write!(self.data, "\x1b[?{mode}{suffix}");
    }

    /// Flush to a writer in a single syscall.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails.
    pub fn flush_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.data)?;
        writer.flush()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_moves_skip_zero() {
        let mut out = OutputBuffer::new();
        out.cursor_up(0);
        out.cursor_down(0);
        assert!(out.is_empty());

        out.cursor_up(3);
        out.cursor_down(1);
        assert_eq!(out.as_bytes(), b"\x1b[3A\x1b[1B");
    }

    #[test]
    fn test_title_strips_control_characters() {
        let mut out = OutputBuffer::new();
        out.set_title("build\x07 \x1b[31mstatus");
        assert_eq!(out.as_bytes(), b"\x1b]2;build [31mstatus\x07");
    }

    #[test]
    fn test_private_modes() {
        let mut out = OutputBuffer::new();
        out.set_private_mode(2004, true);
        out.set_private_mode(1002, false);
        assert_eq!(out.as_bytes(), b"\x1b[?2004h\x1b[?1002l");
    }

    #[test]
    fn test_flush_to_writer() {
        let mut out = OutputBuffer::new();
        out.write_str("frame");
        out.newline();
        let mut sink = Vec::new();
        out.flush_to(&mut sink).unwrap();
        assert_eq!(sink, b"frame\r\n");
    }
}
