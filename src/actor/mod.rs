//! Actor Model: Message-passing concurrency for the runtime.
//!
//! This module implements a simple actor system using crossbeam channels:
//! - **Input Actor**: Reads terminal input, forwards events to the loop
//! - **Command threads**: Run effects, forward their results to the loop
//! - **Signal watcher**: Turns SIGINT/SIGTERM into loop requests
//! - **Event Loop**: Owns the model, calls `update`/`view`, drives the renderer
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Envelope::Event   ┌──────────────┐   view()   ┌──────────┐
//! │ Input Thread │ ──────────────────▶ │              │ ─────────▶ │ Renderer │
//! └──────────────┘                     │              │            └──────────┘
//! ┌──────────────┐   Envelope::Quit    │  Event Loop  │
//! │Signal Thread │ ──────────────────▶ │  (Program)   │
//! └──────────────┘                     │              │
//! ┌──────────────┐   Envelope::Event   │              │
//! │Command Thread│ ──────────────────▶ │              │
//! └──────────────┘                     └──────────────┘
//!        ▲                                    │ Cmd
//!        └──────────── Scheduler ◀────────────┘
//! ```

pub(crate) mod messages;
mod input;
mod program;
mod queue;
mod renderer;
mod scheduler;
mod signals;

pub use input::InputSource;
pub use messages::{
    Event, InputEvent, KeyCode, KeyEvent, KeyModifiers, MouseAction, MouseButton, MouseEvent,
};
pub use program::{Model, Program, ProgramConfig, ProgramHandle, ProgramState};
pub use queue::{MessageQueue, QueueSender};
pub use renderer::{MouseMode, RenderOutcome, RenderStats, Renderer, TerminalModes};
pub use scheduler::Scheduled;
