//! Logging setup using tracing.
//!
//! Logs always go to stderr so that machine-readable output on stdout
//! (`--json`) is never interleaved with diagnostics.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that turns on debug logging.
pub const DEBUG_ENV: &str = "MCPSCOUT_DEBUG";

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Log level applied to the mcpscout crates.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
}

impl LogConfig {
    /// Build a config from the verbose flag and the `MCPSCOUT_DEBUG` toggle.
    pub fn from_flags(verbose: bool) -> Self {
        let debug = verbose || debug_enabled(std::env::var(DEBUG_ENV).ok().as_deref());
        Self {
            level: if debug { LogLevel::Debug } else { LogLevel::Warn },
            include_location: debug,
        }
    }

    fn directives(&self) -> String {
        let level = self.level.as_str();
        format!("warn,mcpscout={level},mcpscout_mcp={level},mcpscout_util={level}")
    }
}

/// Interpret the value of a boolean toggle variable.
pub fn debug_enabled(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// if a global subscriber was already installed.
pub fn init(config: LogConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directives()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
