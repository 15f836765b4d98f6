use crate::error::{Result, RustMtapeError};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    /// Operational log, every message
    pub log_file: Option<PathBuf>,
    /// Error log, warnings and above
    pub error_log: Option<PathBuf>,
}

fn open_append(path: &Path) -> Result<Mutex<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            RustMtapeError::config(format!("cannot open log file {}: {}", path.display(), e))
        })?;
    Ok(Mutex::new(file))
}

pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = if settings.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr);

    let operational_layer = match &settings.log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(open_append(path)?),
        ),
        None => None,
    };

    let error_layer = match &settings.error_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(open_append(path)?)
                .with_filter(LevelFilter::WARN),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(operational_layer)
        .with(error_layer)
        .try_init()
        .map_err(|e| RustMtapeError::config(format!("logging already initialised: {}", e)))?;

    Ok(())
}
