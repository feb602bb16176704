//! Logging for dtweet.
//!
//! Structured logging on the `tracing` ecosystem. Logs go to stderr so that
//! JSON output on stdout stays machine-readable.
//!
//! # Usage
//!
//! ```rust
//! use dtweet::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default());
//! tracing::warn!("Contract address not configured");
//! ```

use std::time::Instant;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// How events are filtered and formatted.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level for dtweet's own events.
    pub level: LogLevel,
    pub format: LogFormat,
    pub show_time: bool,
    /// Include the module path.
    pub show_target: bool,
    /// Log span enter/exit events.
    pub span_events: bool,
    pub ansi: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading a single run.
    Pretty,
    /// One line per event.
    Compact,
    /// Adds thread ids and source locations.
    Full,
}

impl LogConfig {
    /// Warnings only, no timestamps: the CLI default.
    const BASE: Self = Self {
        level: LogLevel::Warn,
        format: LogFormat::Compact,
        show_time: false,
        show_target: false,
        span_events: false,
        ansi: true,
    };

    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            ..Self::BASE
        }
    }

    /// Transactions and timed operations.
    #[must_use]
    pub const fn verbose() -> Self {
        Self {
            level: LogLevel::Info,
            show_time: true,
            ..Self::BASE
        }
    }

    /// Adds profile fallbacks, cache hits and ledger internals.
    #[must_use]
    pub const fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            show_time: true,
            show_target: true,
            ..Self::BASE
        }
    }

    #[must_use]
    pub const fn trace() -> Self {
        Self {
            level: LogLevel::Trace,
            format: LogFormat::Full,
            show_time: true,
            show_target: true,
            span_events: true,
            ansi: true,
        }
    }

    /// Preset for `-q` and repeated `-v`.
    #[must_use]
    pub const fn from_flags(quiet: bool, verbosity: u8) -> Self {
        match (quiet, verbosity) {
            (true, _) => Self::quiet(),
            (false, 0) => Self::BASE,
            (false, 1) => Self::verbose(),
            (false, 2) => Self::debug(),
            _ => Self::trace(),
        }
    }

    #[must_use]
    pub const fn with_colors(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::BASE
    }
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Directive used when `RUST_LOG` is not set. Dependencies (hyper, alloy)
/// stay silent.
fn default_directive(level: LogLevel) -> String {
    format!("dtweet={}", level.as_str())
}

/// Install the global subscriber, writing to stderr. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(default_directive(config.level))
    };

    let spans = if config.span_events {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_target(config.show_target)
        .with_span_events(spans);

    let layer = match (config.format, config.show_time) {
        (LogFormat::Pretty, true) => base.pretty().boxed(),
        (LogFormat::Pretty, false) => base.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => base.compact().boxed(),
        (LogFormat::Compact, false) => base.compact().without_time().boxed(),
        (LogFormat::Full, _) => base
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()
        .ok();
}

/// Times one contract read or write and logs how it ended.
pub struct OperationGuard {
    name: String,
    start: Instant,
}

impl OperationGuard {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(op = %name, "begin");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn complete(self) {
        tracing::info!(
            op = %self.name,
            duration_ms = self.elapsed_ms(),
            "done"
        );
    }

    pub fn fail(self, error: &dyn std::error::Error) {
        tracing::warn!(
            op = %self.name,
            duration_ms = self.elapsed_ms(),
            error = %error,
            "failed"
        );
    }
}
