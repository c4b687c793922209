//! ANSI-aware line measurement.
//!
//! Views are plain strings that may embed escape sequences (usually SGR
//! styling). Escapes take no columns; visible text is measured per grapheme
//! with its display width.

use std::borrow::Cow;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// A piece of a line: an escape sequence or a run of visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Escape(&'a str),
    Text(&'a str),
}

/// Split `line` into escape sequences and text runs.
fn segments(line: &str) -> impl Iterator<Item = Segment<'_>> {
    let mut rest = line;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let len = if rest.starts_with('\x1b') {
            escape_len(rest.as_bytes())
        } else {
            rest.find('\x1b').unwrap_or(rest.len())
        };
        let (head, tail) = rest.split_at(len);
        rest = tail;
        if head.starts_with('\x1b') {
            Some(Segment::Escape(head))
        } else {
            Some(Segment::Text(head))
        }
    })
}

/// Byte length of the escape sequence at the start of `bytes`.
///
/// Unterminated sequences extend to the end of the line.
fn escape_len(bytes: &[u8]) -> usize {
    match bytes.get(1) {
        // CSI: parameters and intermediates, then a final byte 0x40..=0x7E.
        Some(b'[') => bytes[2..]
            .iter()
            .position(|b| (0x40..=0x7e).contains(b))
            .map_or(bytes.len(), |i| i + 3),
        // OSC: terminated by BEL or ST (ESC \).
        Some(b']') => {
            let mut i = 2;
            while i < bytes.len() {
                match bytes[i] {
                    0x07 => return i + 1,
                    0x1b if bytes.get(i + 1) == Some(&b'\\') => return i + 2,
                    _ => i += 1,
                }
            }
            bytes.len()
        }
        // Two-byte escape; keep multi-byte characters intact.
        Some(&b) if b.is_ascii() => 2,
        Some(_) => 1,
        None => 1,
    }
}

/// Columns between tab stops.
pub const TAB_WIDTH: usize = 8;

/// Columns `grapheme` occupies when it starts at `column`.
fn advance(grapheme: &str, column: usize) -> usize {
    if grapheme == "\t" {
        TAB_WIDTH - column % TAB_WIDTH
    } else {
        grapheme.width()
    }
}

/// Display width of `line`, ignoring escape sequences. Tabs run to the next
/// tab stop.
pub fn display_width(line: &str) -> usize {
    segments(line).fold(0, |column, segment| match segment {
        Segment::Escape(_) => column,
        Segment::Text(text) if !text.contains('\t') => column + text.width(),
        Segment::Text(text) => text
            .graphemes(true)
            .fold(column, |column, grapheme| column + advance(grapheme, column)),
    })
}

/// Replace tabs with spaces up to the next tab stop.
pub fn expand_tabs(line: &str) -> Cow<'_, str> {
    if !line.contains('\t') {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut column = 0;
    for segment in segments(line) {
        match segment {
            Segment::Escape(escape) => out.push_str(escape),
            Segment::Text(text) => {
                for grapheme in text.graphemes(true) {
                    let w = advance(grapheme, column);
                    if grapheme == "\t" {
                        out.push_str(&" ".repeat(w));
                    } else {
                        out.push_str(grapheme);
                    }
                    column += w;
                }
            }
        }
    }
    Cow::Owned(out)
}

/// Cut `line` to at most `width` columns, expanding tabs first.
///
/// Escape sequences are always kept, so styling resets after the cut still
/// reach the terminal. A wide grapheme that would straddle the edge is
/// dropped.
pub fn truncate(line: &str, width: usize) -> Cow<'_, str> {
    match expand_tabs(line) {
        Cow::Borrowed(line) => truncate_expanded(line, width),
        Cow::Owned(line) => Cow::Owned(truncate_expanded(&line, width).into_owned()),
    }
}

fn truncate_expanded(line: &str, width: usize) -> Cow<'_, str> {
    if display_width(line) <= width {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len());
    let mut used = 0;
    let mut full = false;
    for segment in segments(line) {
        match segment {
            Segment::Escape(escape) => out.push_str(escape),
            Segment::Text(_) if full => {}
            Segment::Text(text) => {
                for grapheme in text.graphemes(true) {
                    let w = grapheme.width();
                    if used + w > width {
                        full = true;
                        break;
                    }
                    used += w;
                    out.push_str(grapheme);
                }
            }
        }
    }
    Cow::Owned(out)
}

/// Remove SGR (styling) sequences, leaving other escapes untouched.
pub fn strip_sgr(line: &str) -> Cow<'_, str> {
    if !line.contains('\x1b') {
        return Cow::Borrowed(line);
    }
    let stripped = segments(line)
        .filter(|segment| !matches!(segment, Segment::Escape(e) if e.starts_with("\x1b[") && e.ends_with('m')))
        .map(|segment| match segment {
            Segment::Escape(s) | Segment::Text(s) => s,
        })
        .collect();
    Cow::Owned(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_ignores_styling() {
        assert_eq!(display_width("hello"), 5);
        assert_eq!(display_width("\x1b[1;31mhello\x1b[0m"), 5);
        assert_eq!(display_width("\x1b]2;title\x07ok"), 2);
        assert_eq!(display_width("日本"), 4);
    }

    #[test]
    fn test_truncate_plain() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert!(matches!(truncate("short", 10), Cow::Borrowed("short")));
    }

    #[test]
    fn test_truncate_keeps_trailing_reset() {
        let line = "\x1b[31mred text\x1b[0m";
        assert_eq!(truncate(line, 3), "\x1b[31mred\x1b[0m");
    }

    #[test]
    fn test_truncate_drops_straddling_wide_grapheme() {
        assert_eq!(truncate("a日本", 2), "a");
        assert_eq!(truncate("a日本", 3), "a日");
    }

    #[test]
    fn test_tabs_run_to_next_stop() {
        assert_eq!(display_width("\t"), 8);
        assert_eq!(display_width("ab\tc"), 9);
        assert_eq!(display_width("\x1b[1mab\x1b[0m\tc"), 9);
        assert_eq!(expand_tabs("ab\tc"), "ab      c");
        assert!(matches!(expand_tabs("no tabs"), Cow::Borrowed("no tabs")));
    }

    #[test]
    fn test_truncate_counts_tabs() {
        assert_eq!(truncate("a\tb", 4), "a   ");
        assert_eq!(truncate("\tx", 80), "        x");
        assert_eq!(display_width(&truncate("\t\t\tend", 10)), 10);
    }

    #[test]
    fn test_strip_sgr() {
        assert_eq!(strip_sgr("\x1b[38;5;204mkeyword\x1b[0m plain"), "keyword plain");
        assert_eq!(strip_sgr("\x1b[2Kkeep"), "\x1b[2Kkeep");
        assert!(matches!(strip_sgr("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_unterminated_escape_is_contained() {
        assert_eq!(display_width("ab\x1b[12"), 2);
        assert_eq!(truncate("abc\x1b[", 2), "ab\x1b[");
    }
}
