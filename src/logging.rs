//! Subscriber setup for the binaries.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{DoubletError, Result};

/// Installs the global subscriber. `level` is an `EnvFilter` directive such
/// as `info` or `doubletdb=debug`. Output goes to stderr, or is appended to
/// `file` without colors when one is given.
pub fn init_logging(level: &str, file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| DoubletError::Invalid(format!("invalid log level: {e}")))?;
    let builder = fmt().with_env_filter(filter).with_target(true).with_thread_names(true);
    let installed = match file {
        Some(path) => {
            let sink = OpenOptions::new().create(true).append(true).open(path)?;
            builder.with_ansi(false).with_writer(Mutex::new(sink)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|_| DoubletError::Invalid("logging already initialized".into()))
}

