//! Tracing subscriber setup for the command line.
//!
//! The library only emits events; `main` decides where they go. Console
//! output goes to stderr at a level picked by `-v`, and every run is also
//! appended to a log file at debug level.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub const DEFAULT_LOG_FILE: &str = "imgrab.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Number of `-v` flags.
    pub verbosity: u8,
    /// `None` disables the file layer.
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            log_file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn console_level(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Install the global subscriber. Keep the returned guard alive until
    /// exit or buffered file output is lost.
    pub fn init(self) -> anyhow::Result<Option<WorkerGuard>> {
        let console_filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives)?,
            _ => EnvFilter::try_new(self.console_level())?,
        };
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(console_filter);

        let (file, guard) = match &self.log_file {
            Some(path) => {
                let (dir, name) = split_log_path(path);
                let appender = tracing_appender::rolling::never(dir, name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::try_new("debug")?);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()?;

        Ok(guard)
    }
}

fn split_log_path(path: &Path) -> (&Path, &OsStr) {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path.file_name().unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    (dir, name)
}
