//! Program: the event loop that ties the actors together.
//!
//! A [`Program`] owns the application [`Model`], the output stream and the
//! message queue. [`Program::run`] sets the terminal up, starts the input
//! reader and signal watcher, then feeds every queued event through
//! `update`, schedules the returned command and re-renders `view` until the
//! program quits or fails. The terminal is restored exactly once on the way
//! out, whatever the reason for stopping.

use super::input::{InputActor, InputOptions, InputSource};
use super::messages::{Envelope, Event};
use super::queue::{MessageQueue, QueueSender};
use super::renderer::{MouseMode, Renderer, TerminalModes};
use super::scheduler::{Scheduled, Scheduler};
use super::signals::{self, SignalWatcher};
use crate::cancel::CancelSource;
use crate::command::{Cmd, TerminalCommand};
use crate::error::{panic_message, Error};
use crate::terminal::ColorProfile;
use crossterm::terminal;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// An Elm-architecture application.
///
/// The runtime owns the model and is the only caller of these methods, all
/// on the thread that called [`Program::run`].
pub trait Model {
    /// Application messages produced by commands.
    type Message: Send + 'static;

    /// Command to run once at startup.
    fn init(&self) -> Cmd<Self::Message> {
        Cmd::none()
    }

    /// Apply one event and return the next command.
    fn update(&mut self, event: Event<Self::Message>) -> Cmd<Self::Message>;

    /// Render the model as text, one terminal row per line.
    fn view(&self) -> String;
}

/// Configuration for a [`Program`].
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    /// Start in the alternate screen buffer.
    pub alt_screen: bool,
    /// Mouse reporting.
    pub mouse: MouseMode,
    /// Enable bracketed paste.
    pub bracketed_paste: bool,
    /// Report focus changes.
    pub report_focus: bool,
    /// Hide the cursor while running.
    pub hide_cursor: bool,
    /// Turn panics in `update`/`view` into [`Error::Panic`].
    pub catch_panics: bool,
    /// Watch `SIGINT`/`SIGTERM`.
    pub handle_signals: bool,
    /// Input poll timeout.
    pub input_poll_timeout: Duration,
    /// Colour profile; detected from the environment when unset.
    pub color_profile: Option<ColorProfile>,
    /// Window size to report instead of querying the terminal.
    pub window_size: Option<(u16, u16)>,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            alt_screen: false,
            mouse: MouseMode::Disabled,
            bracketed_paste: true,
            report_focus: false,
            hide_cursor: true,
            catch_panics: true,
            handle_signals: true,
            input_poll_timeout: Duration::from_millis(10),
            color_profile: None,
            window_size: None,
        }
    }
}

/// Lifecycle of a program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProgramState {
    /// Built but not started.
    Created,
    /// Processing events.
    Running,
    /// Stopping: final render and terminal restore in progress.
    ShuttingDown,
    /// `run` has returned.
    Terminated,
}

impl ProgramState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Terminated,
        }
    }
}

/// Program state shared with handles.
#[derive(Debug, Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ProgramState::Created as u8)))
    }

    fn get(&self) -> ProgramState {
        ProgramState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ProgramState) {
        debug!(?state, "program state");
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Sends messages to a program from other threads.
pub struct ProgramHandle<M> {
    sender: QueueSender<Envelope<M>>,
    state: StateCell,
}

impl<M> ProgramHandle<M> {
    /// Deliver `msg` to `update`. Returns `false` once the program stopped.
    pub fn send(&self, msg: M) -> bool {
        self.sender.enqueue(Envelope::Event(Event::Message(msg)))
    }

    /// Ask the program to quit with a final render.
    pub fn quit(&self) {
        self.sender.enqueue(Envelope::Quit);
    }

    /// Stop the program at once; `run` returns [`Error::Killed`].
    pub fn kill(&self) {
        self.sender.enqueue(Envelope::Kill);
    }

    /// Where the program is in its lifecycle.
    pub fn state(&self) -> ProgramState {
        self.state.get()
    }
}

impl<M> Clone for ProgramHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: self.state.clone(),
        }
    }
}

impl<M> std::fmt::Debug for ProgramHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramHandle")
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}

/// A model bound to a terminal, ready to run.
///
/// # Example
///
/// ```rust,ignore
/// let model = Program::new(Counter::default())
///     .with_alt_screen()
///     .run()?;
/// ```
pub struct Program<M: Model> {
    model: M,
    config: ProgramConfig,
    output: Box<dyn Write>,
    input: InputSource,
    queue: MessageQueue<Envelope<M::Message>>,
    state: StateCell,
}

impl<M: Model> Program<M> {
    /// Create a program on stdout and the controlling terminal.
    pub fn new(model: M) -> Self {
        Self::with_config(model, ProgramConfig::default())
    }

    /// Create a program with custom configuration.
    pub fn with_config(model: M, config: ProgramConfig) -> Self {
        Self {
            model,
            config,
            output: Box::new(io::stdout()),
            input: InputSource::Terminal,
            queue: MessageQueue::new(),
            state: StateCell::new(),
        }
    }

    /// Use alternate screen buffer (full-screen mode).
    #[must_use]
    pub fn with_alt_screen(mut self) -> Self {
        self.config.alt_screen = true;
        self
    }

    /// Report clicks, releases, wheel and drags.
    #[must_use]
    pub fn with_mouse_cell_motion(mut self) -> Self {
        self.config.mouse = MouseMode::CellMotion;
        self
    }

    /// Report all mouse movement, even without button presses.
    #[must_use]
    pub fn with_mouse_all_motion(mut self) -> Self {
        self.config.mouse = MouseMode::AllMotion;
        self
    }

    /// Deliver focus gained/lost events.
    #[must_use]
    pub fn with_report_focus(mut self) -> Self {
        self.config.report_focus = true;
        self
    }

    /// Disable bracketed paste mode.
    #[must_use]
    pub fn without_bracketed_paste(mut self) -> Self {
        self.config.bracketed_paste = false;
        self
    }

    /// Render to `output` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Read raw terminal bytes from `input` instead of the terminal.
    #[must_use]
    pub fn with_input(mut self, input: impl Read + Send + 'static) -> Self {
        self.input = InputSource::Reader(Box::new(input));
        self
    }

    /// Run without any input reader.
    #[must_use]
    pub fn without_input(mut self) -> Self {
        self.input = InputSource::None;
        self
    }

    /// Disable signal handling.
    #[must_use]
    pub fn without_signal_handler(mut self) -> Self {
        self.config.handle_signals = false;
        self
    }

    /// Let panics in `update`/`view` unwind out of `run`.
    #[must_use]
    pub fn without_catch_panics(mut self) -> Self {
        self.config.catch_panics = false;
        self
    }

    /// Use `profile` instead of detecting it.
    #[must_use]
    pub fn with_color_profile(mut self, profile: ColorProfile) -> Self {
        self.config.color_profile = Some(profile);
        self
    }

    /// Report `width` x `height` instead of querying the terminal.
    #[must_use]
    pub fn with_window_size(mut self, width: u16, height: u16) -> Self {
        self.config.window_size = Some((width, height));
        self
    }

    /// A handle for sending messages from other threads.
    pub fn handle(&self) -> ProgramHandle<M::Message> {
        ProgramHandle {
            sender: self.queue.sender(),
            state: self.state.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProgramState {
        self.state.get()
    }

    /// Run until the program quits, returning the final model.
    ///
    /// The terminal is restored before this returns, on success and on
    /// failure.
    pub fn run(self) -> Result<M, Error> {
        let mut runtime = Runtime::start(self)?;
        let termination = match runtime.initialize() {
            Ok(Flow::Continue) => runtime.event_loop(),
            Ok(Flow::Quit) => Termination::Quit,
            Err(e) => Termination::Failed(e),
        };
        runtime.finish(termination)
    }
}

/// Raw mode, recorded on acquire and put back exactly once.
struct TerminalGuard {
    /// Raw mode state before the run; `None` when raw mode was not touched.
    raw_before: Option<bool>,
    restored: bool,
}

impl TerminalGuard {
    fn acquire(raw: bool) -> io::Result<Self> {
        if !raw {
            return Ok(Self {
                raw_before: None,
                restored: false,
            });
        }
        let before = terminal::is_raw_mode_enabled()?;
        if !before {
            terminal::enable_raw_mode()?;
        }
        debug!(was_raw = before, "raw mode enabled");
        Ok(Self {
            raw_before: Some(before),
            restored: false,
        })
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        if self.raw_before == Some(false) {
            terminal::disable_raw_mode()?;
            debug!("raw mode restored");
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Whether the loop keeps going after an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Why the loop stopped.
#[derive(Debug)]
enum Termination {
    /// Normal quit: render the final view.
    Quit,
    /// Fatal error: restore and report it.
    Failed(Error),
}

/// Everything a running program owns.
struct Runtime<M: Model> {
    model: M,
    config: ProgramConfig,
    queue: MessageQueue<Envelope<M::Message>>,
    sender: QueueSender<Envelope<M::Message>>,
    scheduler: Scheduler<M::Message>,
    cancel: CancelSource,
    renderer: Renderer<Box<dyn Write>>,
    input: Option<InputActor>,
    signals: Option<SignalWatcher>,
    terminal_input: bool,
    guard: TerminalGuard,
    state: StateCell,
}

impl<M: Model> Runtime<M> {
    fn start(program: Program<M>) -> Result<Self, Error> {
        let Program {
            model,
            config,
            output,
            input,
            queue,
            state,
        } = program;
        debug!(?config, ?input, "starting program");

        let terminal_input = matches!(input, InputSource::Terminal);
        let guard = TerminalGuard::acquire(terminal_input).map_err(Error::TerminalSetup)?;

        let profile = config.color_profile.unwrap_or_else(ColorProfile::detect);
        let mut renderer = Renderer::new(output, profile);
        renderer
            .start(TerminalModes {
                mouse: config.mouse,
                bracketed_paste: config.bracketed_paste,
                report_focus: config.report_focus,
                hide_cursor: config.hide_cursor,
            })
            .map_err(Error::TerminalSetup)?;
        if config.alt_screen {
            renderer.enter_alt_screen().map_err(Error::TerminalSetup)?;
        }

        let sender = queue.sender();
        let size = match config.window_size {
            Some(size) => Some(size),
            None if terminal_input => Some(terminal::size().map_err(Error::TerminalSetup)?),
            None => None,
        };
        if let Some((width, height)) = size {
            renderer.resize(width, height);
            sender.enqueue(Envelope::Event(Event::Resize { width, height }));
        }

        let cancel = CancelSource::new();
        let scheduler = Scheduler::new(sender.clone(), cancel.token());
        let options = InputOptions {
            poll_timeout: config.input_poll_timeout,
            mouse: config.mouse != MouseMode::Disabled,
        };
        let input = InputActor::spawn(input, sender.clone(), options).map_err(Error::TerminalSetup)?;
        let signals =
            signals::watch(config.handle_signals, sender.clone()).map_err(Error::TerminalSetup)?;

        state.set(ProgramState::Running);
        Ok(Self {
            model,
            config,
            queue,
            sender,
            scheduler,
            cancel,
            renderer,
            input,
            signals,
            terminal_input,
            guard,
            state,
        })
    }

    /// Run `init`, schedule its command and draw the first frame.
    fn initialize(&mut self) -> Result<Flow, Error> {
        let cmd = self.guarded(|model| model.init())?;
        if self.scheduler.schedule(cmd) == Scheduled::Quit {
            return Ok(Flow::Quit);
        }
        self.render()?;
        Ok(Flow::Continue)
    }

    fn event_loop(&mut self) -> Termination {
        while let Some(envelope) = self.queue.dequeue() {
            match self.dispatch(envelope) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => return Termination::Quit,
                Err(e) => return Termination::Failed(e),
            }
        }
        Termination::Quit
    }

    /// Handle one envelope, then redraw.
    fn dispatch(&mut self, envelope: Envelope<M::Message>) -> Result<Flow, Error> {
        match envelope {
            Envelope::Quit => return Ok(Flow::Quit),
            Envelope::Kill => return Err(Error::Killed),
            Envelope::Interrupt => return Err(Error::Interrupted),
            Envelope::InputFailed(message) => return Err(Error::Input(message)),
            Envelope::Terminal(request) => self.apply(request).map_err(Error::Render)?,
            Envelope::Event(event) => {
                if let Event::Resize { width, height } = event {
                    self.renderer.resize(width, height);
                }
                let cmd = self.guarded(|model| model.update(event))?;
                if self.scheduler.schedule(cmd) == Scheduled::Quit {
                    return Ok(Flow::Quit);
                }
            }
        }
        self.render()?;
        Ok(Flow::Continue)
    }

    /// Apply a terminal request directly; `update` never sees it.
    fn apply(&mut self, request: TerminalCommand) -> io::Result<()> {
        match request {
            TerminalCommand::EnterAltScreen => self.renderer.enter_alt_screen(),
            TerminalCommand::ExitAltScreen => self.renderer.exit_alt_screen(),
            TerminalCommand::SetWindowTitle(title) => self.renderer.set_window_title(&title),
            TerminalCommand::HideCursor => self.renderer.hide_cursor(),
            TerminalCommand::ShowCursor => self.renderer.show_cursor(),
            TerminalCommand::ClearScreen => self.renderer.clear_screen(),
            TerminalCommand::Println(text) => {
                self.renderer.println(&text);
                Ok(())
            }
            TerminalCommand::RequestWindowSize => {
                if let Some((width, height)) = self.window_size() {
                    self.sender.enqueue(Envelope::Event(Event::Resize { width, height }));
                }
                Ok(())
            }
        }
    }

    /// The size to report for a window-size request.
    fn window_size(&self) -> Option<(u16, u16)> {
        if self.config.window_size.is_none() && self.terminal_input {
            match terminal::size() {
                Ok(size) => return Some(size),
                Err(e) => warn!(error = %e, "could not query window size"),
            }
        }
        match self.renderer.size() {
            (0, 0) => self.config.window_size,
            size => Some(size),
        }
    }

    fn render(&mut self) -> Result<(), Error> {
        let view = self.guarded(|model| model.view())?;
        self.renderer.render(&view, false).map_err(Error::Render)?;
        Ok(())
    }

    /// Call into the model, turning a panic into [`Error::Panic`] if
    /// configured.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut M) -> T) -> Result<T, Error> {
        if !self.config.catch_panics {
            return Ok(f(&mut self.model));
        }
        let model = &mut self.model;
        panic::catch_unwind(AssertUnwindSafe(|| f(model))).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!(%message, "model panicked");
            Error::Panic(message)
        })
    }

    /// Final render (normal quit only), teardown, and the run's result.
    fn finish(mut self, termination: Termination) -> Result<M, Error> {
        self.state.set(ProgramState::ShuttingDown);
        let primary = match termination {
            Termination::Quit => self.render().err(),
            Termination::Failed(e) => Some(e),
        };
        let teardown = self.teardown();
        self.state.set(ProgramState::Terminated);

        match (primary, teardown) {
            (Some(e), Err(restore)) => {
                warn!(error = %restore, "terminal restore failed after an error");
                Err(e)
            }
            (Some(e), Ok(())) => {
                debug!(error = %e, "program stopped with an error");
                Err(e)
            }
            (None, Err(restore)) => Err(restore),
            (None, Ok(())) => {
                debug!("program finished");
                Ok(self.model)
            }
        }
    }

    /// Stop the actors and put the terminal back.
    fn teardown(&mut self) -> Result<(), Error> {
        if let Some(input) = self.input.take() {
            input.join();
        }
        if let Some(mut watcher) = self.signals.take() {
            watcher.stop();
        }
        self.cancel.cancel();
        self.queue.close();

        let screen = self.renderer.stop();
        let raw = self.guard.restore();
        screen.and(raw).map_err(Error::TerminalRestore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Output shared with the test after the program consumed its writer.
    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
    }

    impl Model for Recorder {
        type Message = &'static str;

        fn init(&self) -> Cmd<Self::Message> {
            Cmd::message("started")
        }

        fn update(&mut self, event: Event<Self::Message>) -> Cmd<Self::Message> {
            match event {
                Event::Message("stop") => Cmd::quit(),
                Event::Message(msg) => {
                    self.seen.push(msg.to_string());
                    Cmd::none()
                }
                Event::Resize { width, height } => {
                    self.seen.push(format!("{width}x{height}"));
                    Cmd::none()
                }
                _ => Cmd::none(),
            }
        }

        fn view(&self) -> String {
            format!("seen {}", self.seen.len())
        }
    }

    fn headless<M: Model>(model: M, output: &SharedOutput) -> Program<M> {
        Program::new(model)
            .with_output(output.clone())
            .without_input()
            .without_signal_handler()
            .with_color_profile(ColorProfile::Ansi)
    }

    #[test]
    fn test_handle_messages_reach_update_in_order() {
        let output = SharedOutput::default();
        let program = headless(Recorder::default(), &output).with_window_size(80, 24);
        let handle = program.handle();
        assert_eq!(program.state(), ProgramState::Created);

        handle.send("one");
        handle.send("two");
        handle.send("stop");
        let model = program.run().unwrap();

        // Queued before `run`, so they precede the initial resize.
        assert_eq!(model.seen, ["one", "two"]);
        assert_eq!(handle.state(), ProgramState::Terminated);
        assert!(!handle.send("late"));
    }

    #[test]
    fn test_kill_skips_final_render() {
        let output = SharedOutput::default();
        let program = headless(Recorder::default(), &output);
        program.handle().kill();

        assert!(matches!(program.run(), Err(Error::Killed)));
        // Cursor is shown again even though the run failed.
        assert!(output.contents().ends_with("\x1b[?25h\r\n"));
    }

    #[test]
    fn test_terminal_requests_do_not_reach_update() {
        struct Titled {
            events: usize,
        }
        impl Model for Titled {
            type Message = ();
            fn init(&self) -> Cmd<()> {
                Cmd::sequence([Cmd::set_window_title("tealoop"), Cmd::quit()])
            }
            fn update(&mut self, _: Event<()>) -> Cmd<()> {
                self.events += 1;
                Cmd::none()
            }
            fn view(&self) -> String {
                "titled".to_string()
            }
        }

        let output = SharedOutput::default();
        let model = headless(Titled { events: 0 }, &output).run().unwrap();
        assert_eq!(model.events, 0);
        assert!(output.contents().contains("\x1b]2;tealoop\x07"));
    }

    #[test]
    fn test_panic_in_view_is_reported() {
        struct Broken;
        impl Model for Broken {
            type Message = ();
            fn update(&mut self, _: Event<()>) -> Cmd<()> {
                Cmd::none()
            }
            fn view(&self) -> String {
                panic!("view exploded")
            }
        }

        let output = SharedOutput::default();
        match headless(Broken, &output).run() {
            Err(Error::Panic(message)) => assert_eq!(message, "view exploded"),
            other => panic!("expected panic error, got {:?}", other.err()),
        }
        assert!(output.contents().contains("\x1b[?25h"));
    }

    #[test]
    fn test_quit_from_init_still_renders_once() {
        struct Quick;
        impl Model for Quick {
            type Message = ();
            fn init(&self) -> Cmd<()> {
                Cmd::quit()
            }
            fn update(&mut self, _: Event<()>) -> Cmd<()> {
                Cmd::none()
            }
            fn view(&self) -> String {
                "bye".to_string()
            }
        }

        let output = SharedOutput::default();
        headless(Quick, &output).run().unwrap();
        assert_eq!(output.contents().matches("bye").count(), 1);
    }

    #[test]
    fn test_guard_restore_is_idempotent() {
        let mut guard = TerminalGuard::acquire(false).unwrap();
        guard.restore().unwrap();
        guard.restore().unwrap();
        assert!(guard.restored);
    }
}
