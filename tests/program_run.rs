//! End-to-end program runs against in-memory input and output.

use proptest::prelude::*;
use std::collections::BTreeSet;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tealoop::{
    Cmd, ColorProfile, CommandError, Error, Event, KeyCode, Model, Program, ProgramState,
};

/// Output the test can still read after the program took its writer.
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl SharedOutput {
    fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    fn screen(&self, rows: u16, cols: u16) -> vt100::Parser {
        let mut parser = vt100::Parser::new(rows, cols, 0);
        parser.process(&self.bytes());
        parser
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

fn program<M: Model>(model: M, output: &SharedOutput) -> Program<M> {
    Program::new(model)
        .with_output(output.clone())
        .without_signal_handler()
        .with_color_profile(ColorProfile::Ansi)
        .with_window_size(80, 24)
}

/// Moves a cursor with the arrow keys; ctrl+c quits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Menu {
    cursor: usize,
    history: Vec<String>,
    width: u16,
}

impl Model for Menu {
    type Message = ();

    fn update(&mut self, event: Event<()>) -> Cmd<()> {
        match event {
            Event::Key(key) => {
                let name = key.to_string();
                self.history.push(name.clone());
                match name.as_str() {
                    "ctrl+c" | "q" => return Cmd::quit(),
                    "down" | "j" => self.cursor += 1,
                    "up" | "k" => self.cursor = self.cursor.saturating_sub(1),
                    _ => {}
                }
            }
            Event::Resize { width, .. } => self.width = width,
            _ => {}
        }
        Cmd::none()
    }

    fn view(&self) -> String {
        (0..3)
            .map(|i| {
                let marker = if i == self.cursor { ">" } else { " " };
                format!("{marker} item {i}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[test]
fn arrow_key_moves_cursor_and_ctrl_c_quits() {
    let output = SharedOutput::default();
    let started = Instant::now();
    let model = program(Menu::default(), &output)
        .with_alt_screen()
        .with_input(Cursor::new(b"\x1b[B\x03".to_vec()))
        .run()
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(model.cursor, 1);
    assert_eq!(model.history, ["down", "ctrl+c"]);
    assert_eq!(model.width, 80);

    let text = output.text();
    assert_eq!(text.matches("\x1b[?1049h").count(), 1);
    assert_eq!(text.matches("\x1b[?1049l").count(), 1);
    let screen = output.screen(24, 80);
    assert!(!screen.screen().alternate_screen());
    assert!(!screen.screen().hide_cursor());
}

#[test]
fn inline_frame_shows_final_view() {
    let output = SharedOutput::default();
    program(Menu::default(), &output)
        .with_input(Cursor::new(b"jjkq".to_vec()))
        .run()
        .unwrap();

    let parser = output.screen(24, 80);
    let rows: Vec<String> = parser.screen().rows(0, 80).take(3).collect();
    assert_eq!(rows, ["  item 0", "> item 1", "  item 2"]);
}

/// Stores command failures instead of stopping.
#[derive(Default)]
struct StatusCheck {
    status: Option<u16>,
    err: Option<CommandError>,
}

enum StatusMsg {
    Status(u16),
}

impl Model for StatusCheck {
    type Message = StatusMsg;

    fn init(&self) -> Cmd<StatusMsg> {
        let check = Cmd::try_perform(
            || Err::<u16, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")),
            StatusMsg::Status,
        );
        Cmd::sequence([check, Cmd::quit()])
    }

    fn update(&mut self, event: Event<StatusMsg>) -> Cmd<StatusMsg> {
        match event {
            Event::Message(StatusMsg::Status(code)) => self.status = Some(code),
            Event::Error(err) => self.err = Some(err),
            _ => {}
        }
        Cmd::none()
    }

    fn view(&self) -> String {
        match (&self.err, self.status) {
            (Some(err), _) => format!("error: {err}"),
            (None, Some(code)) => format!("status {code}"),
            (None, None) => "checking...".to_string(),
        }
    }
}

#[test]
fn failing_command_becomes_error_event() {
    let output = SharedOutput::default();
    let model = program(StatusCheck::default(), &output)
        .without_input()
        .run()
        .unwrap();

    assert_eq!(model.status, None);
    let err = model.err.expect("error event delivered");
    assert_eq!(err.message(), "connection refused");
    assert!(!err.is_panic());
    assert!(output.text().contains("error: connection refused"));
}

/// Collects batch results and quits once all arrived.
struct Collector {
    expected: usize,
    seen: Vec<usize>,
}

impl Model for Collector {
    type Message = usize;

    fn init(&self) -> Cmd<usize> {
        Cmd::batch((0..self.expected).map(|i| {
            Cmd::perform(
                move || {
                    thread::sleep(Duration::from_millis((i % 3) as u64));
                    i
                },
                |n| n,
            )
        }))
    }

    fn update(&mut self, event: Event<usize>) -> Cmd<usize> {
        if let Event::Message(n) = event {
            self.seen.push(n);
            if self.seen.len() == self.expected {
                return Cmd::quit();
            }
        }
        Cmd::none()
    }

    fn view(&self) -> String {
        format!("{}/{}", self.seen.len(), self.expected)
    }
}

#[test]
fn batch_results_arrive_exactly_once() {
    let output = SharedOutput::default();
    let model = program(
        Collector {
            expected: 12,
            seen: Vec::new(),
        },
        &output,
    )
    .without_input()
    .run()
    .unwrap();

    assert_eq!(model.seen.len(), 12);
    let unique: BTreeSet<usize> = model.seen.iter().copied().collect();
    assert_eq!(unique, (0..12).collect());
}

/// Counts messages sent from outside.
#[derive(Default)]
struct Inbox {
    received: Vec<u32>,
}

impl Model for Inbox {
    type Message = u32;

    fn update(&mut self, event: Event<u32>) -> Cmd<u32> {
        if let Event::Message(n) = event {
            self.received.push(n);
        }
        Cmd::none()
    }

    fn view(&self) -> String {
        format!("received {}", self.received.len())
    }
}

#[test]
fn handle_sends_then_quits_from_another_thread() {
    let output = SharedOutput::default();
    let program = program(Inbox::default(), &output).without_input();
    let handle = program.handle();

    let sender = thread::spawn({
        let handle = handle.clone();
        move || {
            for n in 0..5 {
                handle.send(n);
            }
            handle.quit();
        }
    });

    let model = program.run().unwrap();
    sender.join().unwrap();

    assert_eq!(model.received, [0, 1, 2, 3, 4]);
    assert_eq!(handle.state(), ProgramState::Terminated);
    assert!(output.text().contains("received 5"));
}

#[test]
fn kill_returns_error_and_restores_terminal() {
    let output = SharedOutput::default();
    let program = program(Inbox::default(), &output)
        .with_alt_screen()
        .without_input();
    let handle = program.handle();
    handle.kill();

    assert!(matches!(program.run(), Err(Error::Killed)));
    let text = output.text();
    assert_eq!(text.matches("\x1b[?1049l").count(), 1);
    assert!(text.contains("\x1b[?25h"));
}

/// Panics on any key.
struct Fragile;

impl Model for Fragile {
    type Message = ();

    fn update(&mut self, event: Event<()>) -> Cmd<()> {
        if event.key().is_some() {
            panic!("update cannot handle keys");
        }
        Cmd::none()
    }

    fn view(&self) -> String {
        "fragile".to_string()
    }
}

#[test]
fn panic_in_update_is_caught_and_terminal_restored() {
    let output = SharedOutput::default();
    let result = program(Fragile, &output)
        .with_alt_screen()
        .with_input(Cursor::new(b"x".to_vec()))
        .run();

    match result {
        Err(Error::Panic(message)) => assert_eq!(message, "update cannot handle keys"),
        other => panic!("expected a panic error, got {:?}", other.err()),
    }
    let parser = output.screen(24, 80);
    assert!(!parser.screen().alternate_screen());
    assert!(!parser.screen().hide_cursor());
}

#[test]
fn input_failure_stops_the_program() {
    struct Unplugged;
    impl Read for Unplugged {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "tty unplugged"))
        }
    }

    let output = SharedOutput::default();
    match program(Menu::default(), &output).with_input(Unplugged).run() {
        Err(Error::Input(message)) => assert!(message.contains("tty unplugged")),
        other => panic!("expected an input error, got {:?}", other.err()),
    }
}

#[test]
fn render_failure_is_fatal() {
    /// Accepts the setup sequences, then fails.
    struct Flaky {
        budget: usize,
    }
    impl Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if buf.len() > self.budget {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"));
            }
            self.budget -= buf.len();
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let result = Program::new(Menu::default())
        .with_output(Flaky { budget: 16 })
        .without_input()
        .without_signal_handler()
        .with_color_profile(ColorProfile::Ansi)
        .run();
    assert!(matches!(result, Err(Error::Render(_))));
}

/// Prints a log line, toggles the alternate screen and quits.
struct Printer;

impl Model for Printer {
    type Message = ();

    fn init(&self) -> Cmd<()> {
        Cmd::sequence([
            Cmd::println("build finished"),
            Cmd::set_window_title("printer"),
            Cmd::enter_alt_screen(),
            Cmd::exit_alt_screen(),
            Cmd::quit(),
        ])
    }

    fn update(&mut self, _: Event<()>) -> Cmd<()> {
        Cmd::none()
    }

    fn view(&self) -> String {
        "printer ready".to_string()
    }
}

#[test]
fn terminal_commands_are_applied_in_order() {
    let output = SharedOutput::default();
    program(Printer, &output).without_input().run().unwrap();

    let text = output.text();
    let title = text.find("\x1b]2;printer\x07").unwrap();
    let enter = text.find("\x1b[?1049h").unwrap();
    let exit = text.find("\x1b[?1049l").unwrap();
    assert!(title < enter && enter < exit);

    let parser = output.screen(24, 80);
    let rows: Vec<String> = parser.screen().rows(0, 80).take(2).collect();
    assert_eq!(rows, ["build finished", "printer ready"]);
}

const KEYS: &[&[u8]] = &[b"j", b"k", b"x", b"\x1b[A", b"\x1b[B", b"\x1bj", b"\t"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn same_input_gives_same_model(picks in proptest::collection::vec(0..KEYS.len(), 0..24)) {
        let mut bytes: Vec<u8> = picks.iter().flat_map(|&i| KEYS[i].iter().copied()).collect();
        bytes.push(b'q');

        let run = || {
            program(Menu::default(), &SharedOutput::default())
                .with_input(Cursor::new(bytes.clone()))
                .run()
                .unwrap()
        };
        let first = run();
        let second = run();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.history.len(), picks.len() + 1);
    }
}
