//! Logging setup for the `ledger-history` tool.
//!
//! Two output formats are supported:
//!
//! - **Text** ([`LogFormat::Text`]): human-readable, optionally colored
//! - **JSON** ([`LogFormat::Json`]): one object per line for log aggregation
//!
//! `RUST_LOG` takes precedence over the configured level when set.
//!
//! # Example
//!
//! ```no_run
//! use ledger_history_app::logging::{self, LogConfig};
//!
//! logging::init(&LogConfig::default().with_level("debug")).expect("logging");
//! tracing::info!("ready");
//! ```

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text.
    ///
    /// ```text
    /// 2026-01-15T10:30:00Z DEBUG ledger_history_db::loader: Resolved lookup ids loader="AccountLoader" total=3 inserted=1
    /// ```
    #[default]
    Text,
    /// Structured JSON.
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to output.
    pub level: Level,
    /// Output format (text or JSON).
    pub format: LogFormat,
    /// Enable ANSI color codes (text format only).
    pub ansi_colors: bool,
    /// Include file/line source locations in output.
    pub with_source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            ansi_colors: true,
            with_source_location: false,
        }
    }
}

impl LogConfig {
    /// Create a JSON logging configuration.
    pub fn json() -> Self {
        Self {
            format: LogFormat::Json,
            ansi_colors: false,
            ..Self::default()
        }
    }

    /// Set the log level from a string. Unknown levels fall back to INFO.
    pub fn with_level(mut self, level: &str) -> Self {
        self.level = match normalize_level(level).as_deref() {
            Ok("trace") => Level::TRACE,
            Ok("debug") => Level::DEBUG,
            Ok("warn") => Level::WARN,
            Ok("error") => Level::ERROR,
            _ => Level::INFO,
        };
        self
    }

    /// Switch the output format. JSON output never carries ANSI codes.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        if format == LogFormat::Json {
            self.ansi_colors = false;
        }
        self
    }
}

/// Normalize a log level string to its lower-case canonical form.
pub fn normalize_level(level: &str) -> anyhow::Result<String> {
    match level.to_uppercase().as_str() {
        "TRACE" => Ok("trace".to_string()),
        "DEBUG" => Ok("debug".to_string()),
        "INFO" => Ok("info".to_string()),
        "WARN" | "WARNING" => Ok("warn".to_string()),
        "ERROR" => Ok("error".to_string()),
        _ => Err(anyhow::anyhow!("Invalid log level: {}", level)),
    }
}

/// Initialize the global logging subscriber.
///
/// Must be called at most once per process.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    match config.format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(config.ansi_colors)
                .with_target(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(config.with_source_location)
                .with_line_number(config.with_source_location);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    Ok(())
}
