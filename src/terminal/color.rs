//! Terminal colour capability.
//!
//! Detection reads the environment once; the result travels in
//! [`ProgramConfig`](crate::ProgramConfig) rather than living in a global.

/// How many colours the output terminal can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorProfile {
    /// No colour; styling is stripped from frames.
    Ascii,
    /// The 16 basic ANSI colours.
    Ansi,
    /// The 256-colour palette.
    Ansi256,
    /// 24-bit colour.
    TrueColor,
}

impl ColorProfile {
    /// Detect the profile from the process environment.
    pub fn detect() -> Self {
        Self::from_env(|key| std::env::var(key).ok())
    }

    /// Detect the profile using `lookup` to read environment variables.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            return Self::Ascii;
        }
        if let Some(colorterm) = lookup("COLORTERM") {
            let colorterm = colorterm.to_ascii_lowercase();
            if colorterm == "truecolor" || colorterm == "24bit" {
                return Self::TrueColor;
            }
        }
        let Some(term) = lookup("TERM").map(|t| t.to_ascii_lowercase()) else {
            return Self::Ascii;
        };
        if term.is_empty() || term == "dumb" {
            Self::Ascii
        } else if term.contains("truecolor") || term.contains("direct") {
            Self::TrueColor
        } else if term.contains("256color") {
            Self::Ansi256
        } else {
            Self::Ansi
        }
    }

    /// Whether any colour can be shown.
    pub const fn supports_color(self) -> bool {
        !matches!(self, Self::Ascii)
    }
}

impl Default for ColorProfile {
    fn default() -> Self {
        Self::Ansi
    }
}
