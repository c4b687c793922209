//! Commands: deferred effects returned from `init` and `update`.
//!
//! A [`Cmd`] is plain data until the scheduler runs it. Effects execute on
//! their own threads and report back through the message queue with at most
//! one event each.

use crate::cancel::CancelToken;
use crate::error::CommandError;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type Effect<M> = Box<dyn FnOnce(&CancelToken) -> Result<Option<M>, CommandError> + Send>;
type TickFn<M> = Box<dyn FnOnce(SystemTime) -> M + Send>;

/// A deferred effect yielding zero or one message, or a failure.
pub struct Task<M> {
    effect: Effect<M>,
}

impl<M> Task<M> {
    /// Wrap an effect.
    pub fn new<F>(effect: F) -> Self
    where
        F: FnOnce(&CancelToken) -> Result<Option<M>, CommandError> + Send + 'static,
    {
        Self {
            effect: Box::new(effect),
        }
    }

    /// Run the effect on the current thread.
    pub fn run(self, token: &CancelToken) -> Result<Option<M>, CommandError> {
        (self.effect)(token)
    }
}

/// A timer that fires once and turns the firing time into a message.
pub struct Tick<M> {
    interval: Duration,
    aligned: bool,
    callback: TickFn<M>,
}

impl<M> Tick<M> {
    /// The configured interval.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to wait from `now` before firing.
    ///
    /// Aligned ticks fire on the next multiple of the interval since the Unix
    /// epoch, so several `every` commands with the same interval fire together.
    pub fn delay_from(&self, now: SystemTime) -> Duration {
        if !self.aligned || self.interval.is_zero() {
            return self.interval;
        }
        let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
        let interval = self.interval.as_nanos();
        let into_period = since_epoch.as_nanos() % interval;
        let remaining = interval - into_period;
        Duration::from_nanos(u64::try_from(remaining).unwrap_or(u64::MAX))
    }

    /// Wait for the tick, then build the message.
    ///
    /// Returns `None` if the token was cancelled while waiting.
    pub fn run(self, token: &CancelToken) -> Option<M> {
        let delay = self.delay_from(SystemTime::now());
        if token.sleep(delay) {
            Some((self.callback)(SystemTime::now()))
        } else {
            None
        }
    }
}

/// Requests applied by the event loop to the terminal, outside of `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Switch to the alternate screen buffer.
    EnterAltScreen,
    /// Leave the alternate screen buffer.
    ExitAltScreen,
    /// Set the terminal window title.
    SetWindowTitle(String),
    /// Hide the cursor.
    HideCursor,
    /// Show the cursor.
    ShowCursor,
    /// Clear the screen and redraw the frame.
    ClearScreen,
    /// Print a line above the frame (inline mode only).
    Println(String),
    /// Deliver the current window size as a resize event.
    RequestWindowSize,
}

/// A command returned from `init` or `update`.
pub enum Cmd<M> {
    /// Do nothing.
    None,
    /// Shut the program down.
    Quit,
    /// Run all commands concurrently; results arrive in completion order.
    Batch(Vec<Cmd<M>>),
    /// Run commands one after another, each finishing before the next starts.
    Sequence(Vec<Cmd<M>>),
    /// Deliver a message without running any effect.
    Message(M),
    /// Run an effect on its own thread.
    Task(Task<M>),
    /// Fire a message after a delay.
    Tick(Tick<M>),
    /// Change terminal state.
    Terminal(TerminalCommand),
}

impl<M: Send + 'static> Cmd<M> {
    /// A command that does nothing.
    pub const fn none() -> Self {
        Self::None
    }

    /// Shut the program down after this update.
    pub const fn quit() -> Self {
        Self::Quit
    }

    /// Run commands concurrently. `Cmd::None` members are dropped and a
    /// batch of one collapses to that command.
    pub fn batch(commands: impl IntoIterator<Item = Self>) -> Self {
        let mut commands: Vec<Self> = commands.into_iter().filter(|c| !c.is_none()).collect();
        match commands.len() {
            0 => Self::None,
            1 => commands.pop().unwrap_or(Self::None),
            _ => Self::Batch(commands),
        }
    }

    /// Run commands in order. `Cmd::None` members are dropped.
    pub fn sequence(commands: impl IntoIterator<Item = Self>) -> Self {
        let commands: Vec<Self> = commands.into_iter().filter(|c| !c.is_none()).collect();
        if commands.is_empty() {
            Self::None
        } else {
            Self::Sequence(commands)
        }
    }

    /// Deliver `msg` to `update`.
    pub const fn message(msg: M) -> Self {
        Self::Message(msg)
    }

    /// Run `effect` on its own thread; `Some` results become messages.
    pub fn task<F>(effect: F) -> Self
    where
        F: FnOnce() -> Option<M> + Send + 'static,
    {
        Self::Task(Task::new(move |_| Ok(effect())))
    }

    /// Run `effect` and wrap its return value as a message.
    pub fn perform<T, F, G>(effect: F, wrap: G) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        G: FnOnce(T) -> M + Send + 'static,
    {
        Self::Task(Task::new(move |_| Ok(Some(wrap(effect())))))
    }

    /// Run a fallible effect; an `Err` becomes [`Event::Error`](crate::Event::Error).
    pub fn try_perform<T, E, F, G>(effect: F, wrap: G) -> Self
    where
        E: Into<CommandError>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
        G: FnOnce(T) -> M + Send + 'static,
    {
        Self::Task(Task::new(move |_| {
            effect().map(|value| Some(wrap(value))).map_err(Into::into)
        }))
    }

    /// Run an effect that can observe shutdown through a [`CancelToken`].
    pub fn cancellable<F>(effect: F) -> Self
    where
        F: FnOnce(&CancelToken) -> Result<Option<M>, CommandError> + Send + 'static,
    {
        Self::Task(Task::new(effect))
    }

    /// Fire once after `interval`.
    pub fn tick<F>(interval: Duration, callback: F) -> Self
    where
        F: FnOnce(SystemTime) -> M + Send + 'static,
    {
        Self::Tick(Tick {
            interval,
            aligned: false,
            callback: Box::new(callback),
        })
    }

    /// Fire once on the next wall-clock boundary of `interval`.
    ///
    /// Return another `every` from `update` to keep ticking.
    pub fn every<F>(interval: Duration, callback: F) -> Self
    where
        F: FnOnce(SystemTime) -> M + Send + 'static,
    {
        Self::Tick(Tick {
            interval,
            aligned: true,
            callback: Box::new(callback),
        })
    }

    /// Switch to the alternate screen.
    pub const fn enter_alt_screen() -> Self {
        Self::Terminal(TerminalCommand::EnterAltScreen)
    }

    /// Leave the alternate screen.
    pub const fn exit_alt_screen() -> Self {
        Self::Terminal(TerminalCommand::ExitAltScreen)
    }

    /// Set the terminal window title.
    pub fn set_window_title(title: impl Into<String>) -> Self {
        Self::Terminal(TerminalCommand::SetWindowTitle(title.into()))
    }

    /// Hide the cursor.
    pub const fn hide_cursor() -> Self {
        Self::Terminal(TerminalCommand::HideCursor)
    }

    /// Show the cursor.
    pub const fn show_cursor() -> Self {
        Self::Terminal(TerminalCommand::ShowCursor)
    }

    /// Clear the screen; the frame is redrawn in full.
    pub const fn clear_screen() -> Self {
        Self::Terminal(TerminalCommand::ClearScreen)
    }

    /// Print text above the frame. Ignored in the alternate screen.
    pub fn println(text: impl Into<String>) -> Self {
        Self::Terminal(TerminalCommand::Println(text.into()))
    }

    /// Ask for a resize event carrying the current window size.
    pub const fn window_size() -> Self {
        Self::Terminal(TerminalCommand::RequestWindowSize)
    }

    /// Whether this command does nothing.
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Convert the message type, so a parent model can run a child's commands.
    pub fn map<N, F>(self, f: F) -> Cmd<N>
    where
        N: Send + 'static,
        F: Fn(M) -> N + Send + Sync + 'static,
    {
        self.map_shared(&(Arc::new(f) as Arc<dyn Fn(M) -> N + Send + Sync>))
    }

    fn map_shared<N: Send + 'static>(self, f: &Arc<dyn Fn(M) -> N + Send + Sync>) -> Cmd<N> {
        match self {
            Self::None => Cmd::None,
            Self::Quit => Cmd::Quit,
            Self::Batch(cmds) => Cmd::Batch(cmds.into_iter().map(|c| c.map_shared(f)).collect()),
            Self::Sequence(cmds) => {
                Cmd::Sequence(cmds.into_iter().map(|c| c.map_shared(f)).collect())
            }
            Self::Message(msg) => Cmd::Message(f(msg)),
            Self::Task(task) => {
                let f = Arc::clone(f);
                Cmd::Task(Task::new(move |token| task.run(token).map(|msg| msg.map(|m| f(m)))))
            }
            Self::Tick(tick) => {
                let f = Arc::clone(f);
                let callback = tick.callback;
                Cmd::Tick(Tick {
                    interval: tick.interval,
                    aligned: tick.aligned,
                    callback: Box::new(move |at| f(callback(at))),
                })
            }
            Self::Terminal(request) => Cmd::Terminal(request),
        }
    }
}

impl<M> Default for Cmd<M> {
    fn default() -> Self {
        Self::None
    }
}

impl<M> fmt::Debug for Cmd<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Quit => f.write_str("Quit"),
            Self::Batch(cmds) => f.debug_tuple("Batch").field(cmds).finish(),
            Self::Sequence(cmds) => f.debug_tuple("Sequence").field(cmds).finish(),
            Self::Message(_) => f.write_str("Message(..)"),
            Self::Task(_) => f.write_str("Task(..)"),
            Self::Tick(tick) => f.debug_tuple("Tick").field(&tick.interval).finish(),
            Self::Terminal(request) => f.debug_tuple("Terminal").field(request).finish(),
        }
    }
}
