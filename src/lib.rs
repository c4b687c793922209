//! # tealoop
//!
//! An Elm-architecture runtime for terminal applications.
//!
//! An application is a [`Model`]: `update` applies one [`Event`] and returns a
//! [`Cmd`], `view` renders the model as text. tealoop runs the loop around it:
//! commands execute on their own threads and feed their results back through
//! a message queue, terminal input is decoded on a dedicated thread, and each
//! view is drawn by an incremental line renderer that only rewrites what
//! changed.
//!
//! ## Core Concepts
//!
//! - **Single owner**: the model lives on the loop thread; `update` takes
//!   `&mut self` and nothing else touches it
//! - **Commands**: deferred effects (`Cmd::perform`, `Cmd::tick`, ...) composed
//!   with `Cmd::batch` and `Cmd::sequence`
//! - **Line diffing**: unchanged lines cost nothing; an unchanged frame writes
//!   no bytes at all
//! - **Clean exit**: the terminal is restored exactly once, on every path out
//!
//! ## Example
//!
//! ```rust,no_run
//! use tealoop::{Cmd, Event, KeyCode, Model, Program};
//!
//! struct Counter(u32);
//!
//! impl Model for Counter {
//!     type Message = ();
//!
//!     fn update(&mut self, event: Event<()>) -> Cmd<()> {
//!         match event.key().map(|key| key.code) {
//!             Some(KeyCode::Char('q')) => Cmd::quit(),
//!             Some(_) => {
//!                 self.0 += 1;
//!                 Cmd::none()
//!             }
//!             None => Cmd::none(),
//!         }
//!     }
//!
//!     fn view(&self) -> String {
//!         format!("{} keys pressed (q quits)", self.0)
//!     }
//! }
//!
//! let counter = Program::new(Counter(0)).run()?;
//! println!("final count: {}", counter.0);
//! # Ok::<(), tealoop::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod actor;
pub mod cancel;
pub mod command;
pub mod error;
pub mod input;
pub mod logging;
pub mod terminal;

// Re-exports for convenience
pub use actor::{
    Event, InputEvent, InputSource, KeyCode, KeyEvent, KeyModifiers, MessageQueue, Model,
    MouseAction, MouseButton, MouseEvent, MouseMode, Program, ProgramConfig, ProgramHandle,
    ProgramState, QueueSender, RenderOutcome, RenderStats, Renderer, Scheduled, TerminalModes,
};
pub use cancel::{CancelSource, CancelToken};
pub use command::{Cmd, TerminalCommand};
pub use error::{CommandError, CommandErrorKind, Error};
pub use terminal::ColorProfile;
