//! Renderer: line-diffing frame output.
//!
//! The renderer owns the output stream and is driven synchronously by the
//! event loop, so frames are never written concurrently. Each frame is the
//! full text of the view; only lines that differ from the previous frame are
//! rewritten, and an unchanged frame writes nothing at all.
//!
//! Side channels (alternate screen, cursor visibility, window title, mouse
//! and paste modes) are written immediately and do not go through the diff.

use crate::terminal::{ansi, ColorProfile, OutputBuffer};
use std::io::{self, Write};
use tracing::{debug, trace};

/// Mouse reporting requested from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseMode {
    /// No mouse reports.
    #[default]
    Disabled,
    /// Clicks, releases, wheel and drags (DEC 1002).
    CellMotion,
    /// Every pointer movement (DEC 1003).
    AllMotion,
}

/// Terminal modes switched on for the duration of a program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalModes {
    /// Mouse reporting.
    pub mouse: MouseMode,
    /// Bracketed paste (DEC 2004).
    pub bracketed_paste: bool,
    /// Focus in/out reports (DEC 1004).
    pub report_focus: bool,
    /// Hide the cursor while running.
    pub hide_cursor: bool,
}

/// Render statistics for debugging/profiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Frames that produced output.
    pub frames: u64,
    /// Frames that were redrawn in full.
    pub full_redraws: u64,
    /// Frames skipped because nothing changed.
    pub skipped: u64,
    /// Lines rewritten across all frames.
    pub lines_written: u64,
    /// Total bytes written to the output.
    pub bytes_written: u64,
}

/// What a call to [`Renderer::render`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing changed; no bytes were written.
    Unchanged,
    /// Only changed lines were rewritten.
    Diff {
        /// Number of lines rewritten.
        lines: usize,
    },
    /// The frame was cleared and drawn from scratch.
    Full {
        /// Number of lines drawn.
        lines: usize,
    },
}

/// Inline bookkeeping saved while the alternate screen is active.
#[derive(Debug, Clone, Default)]
struct InlineFrame {
    lines: Vec<String>,
    rendered: usize,
}

/// Incremental renderer over any output stream.
pub struct Renderer<W: Write> {
    /// Output stream (stdout for real programs).
    out: W,
    /// Pre-allocated output buffer.
    buf: OutputBuffer,
    /// Lines of the frame currently on screen.
    last_lines: Vec<String>,
    /// Rows the current frame occupies; the cursor sits on the last one.
    lines_rendered: usize,
    /// Inline frame hidden behind the alternate screen.
    saved_inline: Option<InlineFrame>,
    /// Lines queued to print above the frame.
    queued_lines: Vec<String>,
    /// Terminal width in columns (0 = unknown, no truncation).
    width: u16,
    /// Terminal height in rows (0 = unknown, no clipping).
    height: u16,
    alt_screen: bool,
    cursor_hidden: bool,
    /// Next frame must be redrawn in full.
    repaint: bool,
    profile: ColorProfile,
    modes: TerminalModes,
    started: bool,
    stopped: bool,
    stats: RenderStats,
}

impl<W: Write> Renderer<W> {
    /// Create a renderer writing to `out`.
    pub fn new(out: W, profile: ColorProfile) -> Self {
        Self {
            out,
            buf: OutputBuffer::new(),
            last_lines: Vec::new(),
            lines_rendered: 0,
            saved_inline: None,
            queued_lines: Vec::new(),
            width: 0,
            height: 0,
            alt_screen: false,
            cursor_hidden: false,
            repaint: false,
            profile,
            modes: TerminalModes::default(),
            started: false,
            stopped: false,
            stats: RenderStats::default(),
        }
    }

    /// Switch on `modes`. Call once before the first frame.
    pub fn start(&mut self, modes: TerminalModes) -> io::Result<()> {
        self.modes = modes;
        self.started = true;
        self.buf.clear();
        if modes.hide_cursor {
            self.buf.cursor_hide();
            self.cursor_hidden = true;
        }
        match modes.mouse {
            MouseMode::Disabled => {}
            MouseMode::CellMotion => {
                self.buf.set_private_mode(1002, true);
                self.buf.set_private_mode(1006, true);
            }
            MouseMode::AllMotion => {
                self.buf.set_private_mode(1003, true);
                self.buf.set_private_mode(1006, true);
            }
        }
        if modes.bracketed_paste {
            self.buf.set_private_mode(2004, true);
        }
        if modes.report_focus {
            self.buf.set_private_mode(1004, true);
        }
        self.flush_side_channel()
    }

    /// Undo everything `start` and later side channels changed: leave the
    /// alternate screen, disable modes, show the cursor and park the cursor
    /// below the frame. Idempotent.
    pub fn stop(&mut self) -> io::Result<()> {
        if self.stopped || !self.started {
            return Ok(());
        }
        self.stopped = true;
        self.buf.clear();
        if self.alt_screen {
            self.buf.exit_alt_screen();
            self.alt_screen = false;
            if let Some(inline) = self.saved_inline.take() {
                self.last_lines = inline.lines;
                self.lines_rendered = inline.rendered;
            }
        }
        if self.modes.report_focus {
            self.buf.set_private_mode(1004, false);
        }
        if self.modes.bracketed_paste {
            self.buf.set_private_mode(2004, false);
        }
        match self.modes.mouse {
            MouseMode::Disabled => {}
            MouseMode::CellMotion => {
                self.buf.set_private_mode(1006, false);
                self.buf.set_private_mode(1002, false);
            }
            MouseMode::AllMotion => {
                self.buf.set_private_mode(1006, false);
                self.buf.set_private_mode(1003, false);
            }
        }
        self.buf.cursor_show();
        self.cursor_hidden = false;
        if self.lines_rendered > 0 {
            // Leave the shell prompt on a fresh line below the frame.
            if self.last_lines.last().is_some_and(String::is_empty) {
                self.buf.carriage_return();
            } else {
                self.buf.newline();
            }
        }
        self.flush_side_channel()
    }

    /// Draw `view`, rewriting only lines that changed.
    ///
    /// `force` (or a pending repaint after a resize, alt-screen switch or
    /// clear) redraws the whole frame.
    pub fn render(&mut self, view: &str, force: bool) -> io::Result<RenderOutcome> {
        let lines = self.layout(view);
        let mut full = force || self.repaint;
        let printing = !self.alt_screen && !self.queued_lines.is_empty();

        if !full && !printing && lines == self.last_lines {
            self.stats.skipped += 1;
            return Ok(RenderOutcome::Unchanged);
        }

        self.buf.clear();
        self.move_to_frame_top();

        if printing {
            for line in std::mem::take(&mut self.queued_lines) {
                self.buf.write_str(&line);
                self.buf.erase_line_right();
                self.buf.newline();
            }
            // The frame now starts below the printed lines.
            full = true;
        }
        if !self.alt_screen {
            self.queued_lines.clear();
        }

        if full {
            self.buf.erase_down();
        }

        let previous: &[String] = if full { &[] } else { &self.last_lines };
        let mut written = 0;
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                self.buf.newline();
            }
            if previous.get(i) == Some(line) {
                continue;
            }
            self.buf.write_str(line);
            self.buf.erase_line_right();
            written += 1;
        }

        if previous.len() > lines.len() {
            let extra = previous.len() - lines.len();
            for _ in 0..extra {
                self.buf.cursor_down(1);
                self.buf.erase_line();
            }
            self.buf.cursor_up(extra);
        }

        self.buf.flush_to(&mut self.out)?;

        self.stats.frames += 1;
        self.stats.lines_written += written as u64;
        self.stats.bytes_written += self.buf.len() as u64;
        if full {
            self.stats.full_redraws += 1;
        }
        trace!(lines = lines.len(), written, full, "frame rendered");

        self.lines_rendered = lines.len();
        self.last_lines = lines;
        self.repaint = false;

        Ok(if full {
            RenderOutcome::Full { lines: written }
        } else {
            RenderOutcome::Diff { lines: written }
        })
    }

    /// Split the view into the lines that will actually be shown.
    fn layout(&self, view: &str) -> Vec<String> {
        let mut lines: Vec<String> = view
            .split('\n')
            .map(|line| {
                let line = line.strip_suffix('\r').unwrap_or(line);
                let line = if self.profile.supports_color() {
                    std::borrow::Cow::Borrowed(line)
                } else {
                    ansi::strip_sgr(line)
                };
                if self.width > 0 {
                    ansi::truncate(&line, usize::from(self.width)).into_owned()
                } else {
                    ansi::expand_tabs(&line).into_owned()
                }
            })
            .collect();
        let height = usize::from(self.height);
        if height > 0 && lines.len() > height {
            lines.drain(..lines.len() - height);
        }
        lines
    }

    /// Put the cursor at column 0 of the frame's first row.
    fn move_to_frame_top(&mut self) {
        if self.alt_screen {
            self.buf.cursor_home();
        } else {
            self.buf.cursor_up(self.lines_rendered.saturating_sub(1));
            self.buf.carriage_return();
        }
    }

    /// Record new terminal dimensions; the next frame is redrawn in full.
    pub fn resize(&mut self, width: u16, height: u16) {
        if (width, height) != (self.width, self.height) {
            debug!(width, height, "terminal resized");
        }
        self.width = width;
        self.height = height;
        self.repaint = true;
    }

    /// Switch to the alternate screen. No-op if already there.
    pub fn enter_alt_screen(&mut self) -> io::Result<()> {
        if self.alt_screen {
            return Ok(());
        }
        self.buf.clear();
        self.buf.enter_alt_screen();
        self.buf.clear_screen();
        self.buf.cursor_home();
        if self.cursor_hidden {
            // Some terminals reset cursor visibility on the switch.
            self.buf.cursor_hide();
        }
        self.flush_side_channel()?;

        self.saved_inline = Some(InlineFrame {
            lines: std::mem::take(&mut self.last_lines),
            rendered: self.lines_rendered,
        });
        self.lines_rendered = 0;
        self.alt_screen = true;
        self.repaint = true;
        debug!("entered alternate screen");
        Ok(())
    }

    /// Return to the main screen. No-op if not in the alternate screen.
    pub fn exit_alt_screen(&mut self) -> io::Result<()> {
        if !self.alt_screen {
            return Ok(());
        }
        self.buf.clear();
        self.buf.exit_alt_screen();
        if self.cursor_hidden {
            self.buf.cursor_hide();
        }
        self.flush_side_channel()?;

        let inline = self.saved_inline.take().unwrap_or_default();
        self.last_lines = inline.lines;
        self.lines_rendered = inline.rendered;
        self.alt_screen = false;
        self.repaint = true;
        debug!("left alternate screen");
        Ok(())
    }

    /// Hide the cursor.
    pub fn hide_cursor(&mut self) -> io::Result<()> {
        self.buf.clear();
        self.buf.cursor_hide();
        self.cursor_hidden = true;
        self.flush_side_channel()
    }

    /// Show the cursor.
    pub fn show_cursor(&mut self) -> io::Result<()> {
        self.buf.clear();
        self.buf.cursor_show();
        self.cursor_hidden = false;
        self.flush_side_channel()
    }

    /// Set the window title.
    pub fn set_window_title(&mut self, title: &str) -> io::Result<()> {
        self.buf.clear();
        self.buf.set_title(title);
        self.flush_side_channel()
    }

    /// Clear the screen; the next frame is redrawn in full.
    pub fn clear_screen(&mut self) -> io::Result<()> {
        self.buf.clear();
        if self.alt_screen {
            self.buf.clear_screen();
            self.buf.cursor_home();
        } else {
            self.move_to_frame_top();
            self.buf.erase_down();
        }
        self.flush_side_channel()?;
        self.last_lines.clear();
        self.lines_rendered = 1;
        self.repaint = true;
        Ok(())
    }

    /// Queue text to print above the frame on the next render.
    ///
    /// Ignored while the alternate screen is active.
    pub fn println(&mut self, text: &str) {
        if self.alt_screen {
            return;
        }
        self.queued_lines.extend(text.split('\n').map(str::to_string));
    }

    /// Write the side-channel buffer immediately.
    fn flush_side_channel(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.buf.flush_to(&mut self.out)?;
        self.stats.bytes_written += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    /// Whether the alternate screen is active.
    pub const fn alt_screen(&self) -> bool {
        self.alt_screen
    }

    /// Whether the cursor is hidden.
    pub const fn cursor_hidden(&self) -> bool {
        self.cursor_hidden
    }

    /// Current terminal dimensions as `(width, height)`.
    pub const fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// Render statistics.
    pub const fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// The output stream.
    pub const fn writer(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Drop for Renderer<W> {
    fn drop(&mut self) {
        // Restores the terminal if the loop unwound without stopping.
        let _ = self.stop();
    }
}
