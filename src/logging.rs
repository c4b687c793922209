//! File logging.
//!
//! The terminal belongs to the UI while a program runs, so runtime logs go to
//! a file. The filter comes from the `TEALOOP_LOG` environment variable
//! (`tracing-subscriber` `EnvFilter` syntax) and defaults to `debug`.

use crate::error::Error;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TEALOOP_LOG";

/// Build a subscriber that appends to `path`, without installing it.
pub fn file_subscriber(
    path: impl AsRef<Path>,
) -> Result<impl tracing::Subscriber + Send + Sync + 'static, Error> {
    let file = open(path.as_ref())?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("debug"));
    Ok(tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false) // Disable ANSI colors in log file
        .with_thread_names(true)
        .with_env_filter(filter)
        .finish())
}

/// Send all `tracing` output to `path` for the rest of the process.
pub fn log_to_file(path: impl AsRef<Path>) -> Result<(), Error> {
    let subscriber = file_subscriber(path)?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn open(path: &Path) -> Result<File, Error> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(Error::LogFile)
}
