//! Error types.
//!
//! [`Error`] terminates a program run. [`CommandError`] never does: it is
//! delivered to the application as [`Event::Error`](crate::Event::Error).

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Errors that end [`Program::run`](crate::Program::run).
#[derive(Debug, Error)]
pub enum Error {
    /// Raw mode, terminal modes or the input reader could not be set up.
    #[error("terminal setup failed: {0}")]
    TerminalSetup(#[source] io::Error),

    /// The terminal could not be restored after the program stopped.
    #[error("terminal restore failed: {0}")]
    TerminalRestore(#[source] io::Error),

    /// Writing a frame to the output stream failed.
    #[error("rendering failed: {0}")]
    Render(#[source] io::Error),

    /// The input reader failed and cannot continue.
    #[error("input reader failed: {0}")]
    Input(String),

    /// The program received an interrupt signal.
    #[error("program was interrupted")]
    Interrupted,

    /// The program was killed through a [`ProgramHandle`](crate::ProgramHandle).
    #[error("program was killed")]
    Killed,

    /// `update` or `view` panicked.
    #[error("program panicked: {0}")]
    Panic(String),

    /// The log file could not be opened.
    #[error("could not open log file: {0}")]
    LogFile(#[source] io::Error),

    /// A global log subscriber is already installed.
    #[error("could not install log subscriber: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// How a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandErrorKind {
    /// The effect returned an error.
    Failed,
    /// The effect panicked.
    Panicked,
    /// No thread could be started for the command.
    Spawn,
}

/// A failed command, delivered to the application as an event.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CommandError {
    kind: CommandErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl CommandError {
    /// A failure described by a message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self {
            kind: CommandErrorKind::Failed,
            message: message.to_string(),
            cause: None,
        }
    }

    /// Wrap an error returned by an effect.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind: CommandErrorKind::Failed,
            message: error.to_string(),
            cause: Some(Arc::new(error)),
        }
    }

    /// Build from a panic payload.
    pub(crate) fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        Self {
            kind: CommandErrorKind::Panicked,
            message: format!("command panicked: {}", panic_message(payload)),
            cause: None,
        }
    }

    pub(crate) fn spawn(error: &io::Error) -> Self {
        Self {
            kind: CommandErrorKind::Spawn,
            message: format!("could not start command: {error}"),
            cause: None,
        }
    }

    /// How the command failed.
    pub const fn kind(&self) -> CommandErrorKind {
        self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the command panicked.
    pub fn is_panic(&self) -> bool {
        self.kind == CommandErrorKind::Panicked
    }
}

impl PartialEq for CommandError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl From<io::Error> for CommandError {
    fn from(error: io::Error) -> Self {
        Self::new(error)
    }
}

/// Extract the text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_keeps_source() {
        let err = CommandError::new(io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded"));
        assert_eq!(err.message(), "deadline exceeded");
        assert_eq!(err.kind(), CommandErrorKind::Failed);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_command_error_from_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        let err = CommandError::panicked(payload.as_ref());
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "command panicked: boom");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Interrupted.to_string(), "program was interrupted");
        let err = Error::Render(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        assert_eq!(err.to_string(), "rendering failed: pipe closed");
    }
}
