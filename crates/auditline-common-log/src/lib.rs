//! Logging infrastructure for Auditline.
//!
//! Every dispatch failure is reported through `tracing`, so a host that
//! never installs a subscriber loses those reports. Call [`init`] once at
//! startup, or install your own subscriber before building the pipeline.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use strum::{Display, EnumString};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable names read by [`LogConfig::from_env`].
pub mod vars {
    pub const AUDITLINE_LOG_LEVEL: &str = "AUDITLINE_LOG_LEVEL";
    pub const AUDITLINE_LOG_FORMAT: &str = "AUDITLINE_LOG_FORMAT";
    pub const AUDITLINE_LOG_FILE: &str = "AUDITLINE_LOG_FILE";
    pub const AUDITLINE_LOG_SOURCE: &str = "AUDITLINE_LOG_SOURCE";
    pub const AUDITLINE_LOG_SPANS: &str = "AUDITLINE_LOG_SPANS";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Subscriber settings, usually read from `AUDITLINE_LOG_*`.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Raw filter directives (e.g. `auditline=debug,reqwest=warn`); wins over `level`.
    pub directives: Option<String>,
    /// Output format.
    pub format: LogFormat,
    /// Append a copy of every event to this file, without ANSI colours.
    pub file_path: Option<PathBuf>,
    pub source_location: bool,
    /// Emit span open/close events.
    pub span_events: bool,
}

/// Minimum level when no explicit directives are given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[strum(to_string = "warn", serialize = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    /// Lenient parse: surrounding whitespace and case are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        s.trim().parse().ok()
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        LevelFilter::from_level(match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        })
    }
}

/// Output format. Unknown names fall back to pretty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Single line per event.
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config using `lookup` as the variable source.
    ///
    /// `AUDITLINE_LOG_LEVEL` takes precedence over `RUST_LOG`. A `RUST_LOG`
    /// value that is not a bare level is kept as filter directives.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup(vars::AUDITLINE_LOG_LEVEL) {
            config.level = LogLevel::parse(&level).unwrap_or_default();
        } else if let Some(rust_log) = lookup(vars::RUST_LOG) {
            match LogLevel::parse(&rust_log) {
                Some(l) => config.level = l,
                None if !rust_log.trim().is_empty() => config.directives = Some(rust_log),
                None => {}
            }
        }

        if let Some(format) = lookup(vars::AUDITLINE_LOG_FORMAT) {
            config.format = format.trim().parse().unwrap_or_default();
        }

        config.file_path = lookup(vars::AUDITLINE_LOG_FILE)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        config.source_location = lookup(vars::AUDITLINE_LOG_SOURCE).is_some_and(|v| is_truthy(&v));
        config.span_events = lookup(vars::AUDITLINE_LOG_SPANS).is_some_and(|v| is_truthy(&v));

        config
    }

    fn filter(&self) -> Result<EnvFilter, LogError> {
        match &self.directives {
            Some(directives) => EnvFilter::try_new(directives)
                .map_err(|e| LogError::InvalidFilter(e.to_string())),
            None => Ok(EnvFilter::default().add_directive(LevelFilter::from(self.level).into())),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Build one formatting layer for `writer`.
fn format_layer<S, W>(config: &LogConfig, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(config.span_events());

    match config.format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Install the global subscriber.
///
/// Returns [`LogError::InitError`] if one is already installed.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter = config.filter()?;
    let stderr_layer = format_layer(&config, io::stderr, true);

    let file_layer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(format_layer(&config, Mutex::new(file), false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(filter)
        .try_init()
        .map_err(|e| LogError::InitError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("global subscriber already set: {0}")]
    InitError(String),

    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("cannot open log file: {0}")]
    FileError(#[from] io::Error),
}

pub use tracing::{debug, error, info, trace, warn};

/// Spans and timing for the dispatch path.
pub mod spans;
