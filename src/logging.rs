//! Installs the process-wide tracing subscriber.
//!
//! Library code only emits events; binaries call [`init`] once at startup.

use crate::config::LogConfig;
use crate::core::{RecordError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

/// Installs [`subscriber`] as the global default.
pub fn init(config: &LogConfig) -> Result<()> {
    subscriber(config)?
        .try_init()
        .map_err(|e| RecordError::Config(format!("failed to install log subscriber: {}", e)))
}

/// Builds a timestamped `fmt` subscriber at the configured level.
///
/// Events go to stderr, or are appended to `config.file` when set. When
/// `config.error_file` is set, error events are appended there as well.
pub fn subscriber(config: &LogConfig) -> Result<impl Subscriber + Send + Sync> {
    let level = LevelFilter::from_level(parse_level(config.level.as_deref())?);

    let main: Box<dyn Layer<Registry> + Send + Sync> = match &config.file {
        Some(path) => fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(open_append(path)?))
            .boxed(),
        None => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    let errors = match &config.error_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_append(path)?))
                .with_filter(LevelFilter::ERROR),
        ),
        None => None,
    };

    Ok(tracing_subscriber::registry()
        .with(main.with_filter(level))
        .with(errors))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn parse_level(level: Option<&str>) -> Result<Level> {
    match level {
        Some(name) => Level::from_str(name)
            .map_err(|_| RecordError::Config(format!("unknown log level `{}`", name))),
        None => Ok(Level::INFO),
    }
}
