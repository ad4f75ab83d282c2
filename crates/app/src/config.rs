//! Configuration for the `ledger-history` tool.
//!
//! Configuration is read from a TOML file and may be overridden by
//! environment variables. See [`AppConfig::sample_config`] for the format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ledger_history_db::{ConcurrencyMode, LookupPolicy, LookupTable, PgPoolOptions};
use serde::{Deserialize, Serialize};

use crate::logging::{self, LogConfig, LogFormat};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "LEDGER_HISTORY_";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum DatabaseConfig {
    Postgres {
        /// Connection URL, e.g. `postgres://user@host/db`.
        url: String,

        /// Maximum pooled connections.
        #[serde(default = "default_max_connections")]
        max_connections: u32,

        /// Per-statement timeout applied to every pooled connection.
        #[serde(default)]
        statement_timeout_ms: Option<u64>,
    },
    Sqlite {
        /// Path to the database file.
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

impl DatabaseConfig {
    /// Pool options for the PostgreSQL backend, `None` for SQLite.
    pub fn pg_pool_options(&self) -> Option<PgPoolOptions> {
        match self {
            DatabaseConfig::Postgres {
                max_connections,
                statement_timeout_ms,
                ..
            } => Some(PgPoolOptions {
                max_connections: *max_connections,
                statement_timeout_ms: *statement_timeout_ms,
                ..PgPoolOptions::default()
            }),
            DatabaseConfig::Sqlite { .. } => None,
        }
    }
}

/// Lookup-table concurrency settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Whether a lookup-table reaper runs alongside ingestion.
    #[serde(default)]
    pub reap_lookup_tables: bool,

    /// Per-table mode overrides keyed by table name.
    #[serde(default)]
    pub tables: BTreeMap<String, ConcurrencyMode>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Whether to use ANSI colors.
    #[serde(default = "default_true")]
    pub colors: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            colors: true,
        }
    }
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> anyhow::Result<LogConfig> {
        let format: LogFormat = self.format.parse()?;
        let config = LogConfig {
            ansi_colors: self.colors,
            ..LogConfig::default()
        };
        Ok(config.with_level(&self.level).with_format(format))
    }
}

/// Accepts `true/false`, `1/0`, `yes/no` and `on/off`, ignoring case.
fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("ledger-history.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Environment variables take precedence over file configuration:
    /// - LEDGER_HISTORY_DATABASE_URL (switches to the postgres backend)
    /// - LEDGER_HISTORY_DATABASE_PATH (switches to the sqlite backend)
    /// - LEDGER_HISTORY_LOG_LEVEL
    /// - LEDGER_HISTORY_LOG_FORMAT
    /// - LEDGER_HISTORY_REAP_LOOKUP_TABLES
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from `lookup`, which maps an unprefixed key such as
    /// `DATABASE_URL` to its value.
    ///
    /// Fails on a value that cannot be parsed; nothing is applied from
    /// the failing key onwards.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("DATABASE_URL") {
            self.database = match std::mem::take(&mut self.database) {
                DatabaseConfig::Postgres {
                    max_connections,
                    statement_timeout_ms,
                    ..
                } => DatabaseConfig::Postgres {
                    url: val,
                    max_connections,
                    statement_timeout_ms,
                },
                DatabaseConfig::Sqlite { .. } => DatabaseConfig::Postgres {
                    url: val,
                    max_connections: default_max_connections(),
                    statement_timeout_ms: None,
                },
            };
        }
        if let Some(val) = lookup("DATABASE_PATH") {
            self.database = DatabaseConfig::Sqlite {
                path: PathBuf::from(val),
            };
        }

        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }

        if let Some(val) = lookup("REAP_LOOKUP_TABLES") {
            self.lookup.reap_lookup_tables = parse_bool(&val).ok_or_else(|| {
                anyhow::anyhow!(
                    "{}REAP_LOOKUP_TABLES must be true or false, got {:?}",
                    ENV_PREFIX,
                    val
                )
            })?;
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.database {
            DatabaseConfig::Postgres {
                url,
                max_connections,
                ..
            } => {
                if url.trim().is_empty() {
                    anyhow::bail!("database.url must not be empty");
                }
                if *max_connections == 0 {
                    anyhow::bail!("database.max_connections must be > 0");
                }
            }
            DatabaseConfig::Sqlite { path } => {
                if path.as_os_str().is_empty() {
                    anyhow::bail!("database.path must not be empty");
                }
            }
        }

        for name in self.lookup.tables.keys() {
            name.parse::<LookupTable>()?;
        }

        logging::normalize_level(&self.logging.level)?;
        self.logging.format.parse::<LogFormat>()?;

        Ok(())
    }

    /// The lookup policy every loader of this deployment is created from.
    pub fn lookup_policy(&self) -> anyhow::Result<LookupPolicy> {
        let mut policy = LookupPolicy::for_ingestion(self.lookup.reap_lookup_tables);
        for (name, mode) in &self.lookup.tables {
            let table: LookupTable = name.parse()?;
            policy = policy.with_mode(table, *mode);
        }
        Ok(policy)
    }

    /// Sample configuration in TOML format.
    pub fn sample_config() -> &'static str {
        r#"# ledger-history configuration

[database]
# "postgres" or "sqlite"
backend = "postgres"
url = "postgres://localhost/history"
max_connections = 10
statement_timeout_ms = 30000

# [database]
# backend = "sqlite"
# path = "ledger-history.db"

[lookup]
# Run every lookup table in concurrent_deletes mode so a reaper may
# delete unreferenced rows while ingestion is running.
reap_lookup_tables = false

# Per-table overrides: concurrent_inserts or concurrent_deletes.
[lookup.tables]
# history_assets = "concurrent_inserts"

[logging]
level = "info"
format = "text"
colors = true
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(
            config.database,
            DatabaseConfig::Sqlite {
                path: PathBuf::from("ledger-history.db")
            }
        );
        assert!(!config.lookup.reap_lookup_tables);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
        assert_eq!(config.lookup_policy().unwrap(), LookupPolicy::default());
    }

    #[test]
    fn test_sample_config_parses() {
        let config: AppConfig = toml::from_str(AppConfig::sample_config()).unwrap();
        config.validate().unwrap();
        assert_eq!(
            config.database,
            DatabaseConfig::Postgres {
                url: "postgres://localhost/history".to_string(),
                max_connections: 10,
                statement_timeout_ms: Some(30000),
            }
        );
        let options = config.database.pg_pool_options().unwrap();
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.statement_timeout_ms, Some(30000));
    }

    #[test]
    fn test_from_file_with_table_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[database]
backend = "sqlite"
path = "/var/lib/history.db"

[lookup]
reap_lookup_tables = true

[lookup.tables]
history_assets = "concurrent_inserts"
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();
        assert!(config.database.pg_pool_options().is_none());

        let policy = config.lookup_policy().unwrap();
        assert_eq!(
            policy.mode(LookupTable::Accounts),
            ConcurrencyMode::ConcurrentDeletes
        );
        assert_eq!(
            policy.mode(LookupTable::Assets),
            ConcurrencyMode::ConcurrentInserts
        );
        assert!(policy.check_reapable(LookupTable::Assets).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig {
            database: DatabaseConfig::Postgres {
                url: "  ".to_string(),
                max_connections: 10,
                statement_timeout_ms: None,
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        config.database = DatabaseConfig::Postgres {
            url: "postgres://localhost/history".to_string(),
            max_connections: 0,
            statement_timeout_ms: None,
        };
        assert!(config.validate().is_err());

        config.database = DatabaseConfig::default();
        config
            .lookup
            .tables
            .insert("history_trades".to_string(), ConcurrencyMode::ConcurrentInserts);
        assert!(config.validate().is_err());
        assert!(config.lookup_policy().is_err());

        config.lookup.tables.clear();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_mode_fails_to_parse() {
        let result = toml::from_str::<AppConfig>(
            r#"
[lookup.tables]
history_accounts = "concurrent_updates"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(overrides(&[
            ("DATABASE_URL", "postgres://db.internal/history"),
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "json"),
            ("REAP_LOOKUP_TABLES", "true"),
        ]))
        .unwrap();

        assert_eq!(
            config.database,
            DatabaseConfig::Postgres {
                url: "postgres://db.internal/history".to_string(),
                max_connections: 10,
                statement_timeout_ms: None,
            }
        );
        assert!(config.lookup.reap_lookup_tables);

        let log = config.logging.to_log_config().unwrap();
        assert_eq!(log.level, tracing::Level::DEBUG);
        assert_eq!(log.format, LogFormat::Json);
        assert!(!log.ansi_colors);

        config
            .apply_overrides(overrides(&[("DATABASE_PATH", "/tmp/history.db")]))
            .unwrap();
        assert_eq!(
            config.database,
            DatabaseConfig::Sqlite {
                path: PathBuf::from("/tmp/history.db")
            }
        );
    }

    #[test]
    fn test_url_override_keeps_pool_settings() {
        let mut config = AppConfig {
            database: DatabaseConfig::Postgres {
                url: "postgres://localhost/history".to_string(),
                max_connections: 4,
                statement_timeout_ms: Some(5000),
            },
            ..AppConfig::default()
        };
        config
            .apply_overrides(overrides(&[("DATABASE_URL", "postgres://other/history")]))
            .unwrap();

        let options = config.database.pg_pool_options().unwrap();
        assert_eq!(options.max_connections, 4);
        assert_eq!(options.statement_timeout_ms, Some(5000));
    }

    #[test]
    fn test_reap_override_spellings() {
        for (val, expected) in [
            ("true", true),
            ("TRUE", true),
            ("1", true),
            ("yes", true),
            (" On ", true),
            ("false", false),
            ("0", false),
            ("No", false),
        ] {
            let mut config = AppConfig {
                lookup: LookupConfig {
                    reap_lookup_tables: !expected,
                    ..LookupConfig::default()
                },
                ..AppConfig::default()
            };
            config
                .apply_overrides(overrides(&[("REAP_LOOKUP_TABLES", val)]))
                .unwrap();
            assert_eq!(config.lookup.reap_lookup_tables, expected, "value {:?}", val);
        }
    }

    #[test]
    fn test_reap_override_rejects_garbage() {
        let mut config = AppConfig::default();
        config.lookup.reap_lookup_tables = true;

        let err = config
            .apply_overrides(overrides(&[("REAP_LOOKUP_TABLES", "enabled")]))
            .unwrap_err();
        assert!(err.to_string().contains("REAP_LOOKUP_TABLES"));
        assert!(config.lookup.reap_lookup_tables);
    }
}
