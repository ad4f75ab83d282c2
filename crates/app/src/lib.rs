//! Application layer for the `ledger-history` tool.
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod logging;

pub use config::{AppConfig, DatabaseConfig, LoggingConfig, LookupConfig};
pub use logging::{LogConfig, LogFormat};
