//! Status check: a startup command probes a server and the view reports the
//! result or the error. Pass `host:port` to probe something other than the
//! default.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tealoop::{Cmd, CommandError, Event, KeyEvent, Model, Program};

const TIMEOUT: Duration = Duration::from_secs(10);

struct StatusCheck {
    address: String,
    latency: Option<Duration>,
    err: Option<CommandError>,
}

enum Msg {
    Connected(Duration),
}

fn probe(address: &str) -> io::Result<Duration> {
    let target = address
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))?;
    let started = Instant::now();
    TcpStream::connect_timeout(&target, TIMEOUT)?;
    Ok(started.elapsed())
}

impl Model for StatusCheck {
    type Message = Msg;

    fn init(&self) -> Cmd<Msg> {
        let address = self.address.clone();
        Cmd::try_perform(move || probe(&address), Msg::Connected)
    }

    fn update(&mut self, event: Event<Msg>) -> Cmd<Msg> {
        match event {
            Event::Message(Msg::Connected(latency)) => {
                self.latency = Some(latency);
                Cmd::quit()
            }
            Event::Error(err) => {
                self.err = Some(err);
                Cmd::quit()
            }
            Event::Key(key) if key == KeyEvent::ctrl('c') => Cmd::quit(),
            _ => Cmd::none(),
        }
    }

    fn view(&self) -> String {
        if let Some(err) = &self.err {
            return format!("\nWe had some trouble: {err}\n\n");
        }
        let mut line = format!("Checking {} ... ", self.address);
        if let Some(latency) = self.latency {
            line.push_str(&format!("up ({} ms)!", latency.as_millis()));
        }
        format!("\n{line}\n\n")
    }
}

fn main() -> ExitCode {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "charm.sh:443".to_string());
    let model = StatusCheck {
        address,
        latency: None,
        err: None,
    };

    match Program::new(model).run() {
        Ok(model) if model.err.is_some() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Uh oh, there was an error: {e}");
            ExitCode::FAILURE
        }
    }
}
