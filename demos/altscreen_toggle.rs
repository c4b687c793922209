//! Alternate screen toggle: space switches between inline and full-screen
//! rendering, q quits.
//!
//! Run with `TEALOOP_LOG=debug` to write runtime logs to
//! `altscreen_toggle.log`.

use std::process::ExitCode;
use tealoop::{Cmd, Event, Model, Program};

const KEYWORD: &str = "\x1b[38;5;204;48;5;235m";
const HELP: &str = "\x1b[38;5;241m";
const RESET: &str = "\x1b[0m";

#[derive(Default)]
struct Toggle {
    altscreen: bool,
    quitting: bool,
}

impl Model for Toggle {
    type Message = ();

    fn update(&mut self, event: Event<()>) -> Cmd<()> {
        let Some(key) = event.key() else {
            return Cmd::none();
        };
        match key.to_string().as_str() {
            "q" | "ctrl+c" | "esc" => {
                self.quitting = true;
                Cmd::quit()
            }
            " " => {
                self.altscreen = !self.altscreen;
                if self.altscreen {
                    Cmd::enter_alt_screen()
                } else {
                    Cmd::exit_alt_screen()
                }
            }
            _ => Cmd::none(),
        }
    }

    fn view(&self) -> String {
        if self.quitting {
            return "Bye!\n".to_string();
        }
        let mode = if self.altscreen {
            " altscreen mode "
        } else {
            " inline mode "
        };
        format!(
            "\n\n  You're in {KEYWORD}{mode}{RESET}\n\n\n{HELP}  space: switch modes • q: exit{RESET}\n"
        )
    }
}

fn main() -> ExitCode {
    if std::env::var_os(tealoop::logging::LOG_ENV).is_some() {
        if let Err(e) = tealoop::logging::log_to_file("altscreen_toggle.log") {
            eprintln!("Could not set up logging: {e}");
            return ExitCode::FAILURE;
        }
    }

    match Program::new(Toggle::default()).run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error running program: {e}");
            ExitCode::FAILURE
        }
    }
}
