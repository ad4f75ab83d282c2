//! ledger-history - lookup-table maintenance for ledger history databases
//!
//! # Quick Start
//!
//! ```bash
//! # Create or upgrade the lookup schema
//! ledger-history --config history.toml migrate
//!
//! # Resolve account addresses to history ids
//! ledger-history --config history.toml resolve-accounts GABC... GDEF...
//!
//! # Check whether another node holds the reaper lock
//! ledger-history --config history.toml try-lock lookup-table-reaper
//! ```
//!
//! Without `--config` the tool uses a local SQLite database. Environment
//! variables prefixed with `LEDGER_HISTORY_` override file settings.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ledger_history_app::{logging, AppConfig, DatabaseConfig, LogFormat};
use ledger_history_db::{
    try_lock, verify_schema, AdvisoryLock, AssetKey, ConcurrencyMode, DbError, Loader, LoaderStats,
    LookupRow, LookupTable, PgDatabase, Session, SqliteDatabase,
};

/// Lookup-table maintenance for ledger history databases
#[derive(Parser)]
#[command(name = "ledger-history")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format (overrides the configuration file)
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Commands,
}

/// Log output format for CLI
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the lookup schema
    Migrate,

    /// Resolve account addresses to history ids
    ResolveAccounts {
        /// Strkey account addresses (G...)
        #[arg(value_name = "ADDRESS", required = true)]
        addresses: Vec<String>,
    },

    /// Resolve assets to history ids
    ResolveAssets {
        /// `native` or `CODE:ISSUER`
        #[arg(value_name = "ASSET", required = true)]
        assets: Vec<String>,
    },

    /// Try to take an advisory lock, report the result and release it
    TryLock {
        /// state-verification, reaper or lookup-table-reaper
        #[arg(value_name = "LOCK")]
        lock: String,
    },

    /// Print sample configuration
    SampleConfig,
}

/// An opened database of either backend.
enum Backend {
    Postgres(PgDatabase),
    Sqlite(SqliteDatabase),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::SampleConfig = cli.command {
        return cmd_sample_config();
    }

    let config = load_config(&cli)?;
    init_logging(&cli, &config)?;

    match cli.command {
        Commands::Migrate => cmd_migrate(&config),
        Commands::ResolveAccounts { addresses } => cmd_resolve_accounts(&config, addresses),
        Commands::ResolveAssets { assets } => cmd_resolve_assets(&config, assets),
        Commands::TryLock { lock } => cmd_try_lock(&config, &lock),
        Commands::SampleConfig => cmd_sample_config(),
    }
}

/// Load the configuration file, or defaults, with environment overrides.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file_with_env(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let mut config = AppConfig::default();
            config
                .apply_env_overrides()
                .context("invalid environment override")?;
            config
        }
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Initialize the logging subsystem.
fn init_logging(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    let mut log_config = config.logging.to_log_config()?;
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format.into());
    }

    logging::init(&log_config)?;

    tracing::debug!("Logging initialized");
    Ok(())
}

fn open_database(config: &AppConfig) -> anyhow::Result<Backend> {
    match &config.database {
        DatabaseConfig::Postgres { url, .. } => {
            let options = config.database.pg_pool_options().unwrap_or_default();
            let db = PgDatabase::connect(url, &options)?;
            Ok(Backend::Postgres(db))
        }
        DatabaseConfig::Sqlite { path } => {
            let db = SqliteDatabase::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Ok(Backend::Sqlite(db))
        }
    }
}

/// Open the database and fail unless the lookup schema is current.
fn open_migrated(config: &AppConfig) -> anyhow::Result<Backend> {
    let backend = open_database(config)?;
    match &backend {
        Backend::Postgres(db) => db.with_connection(|client| verify_schema(client)),
        Backend::Sqlite(db) => db.with_connection(|conn| verify_schema(conn)),
    }
    .context("lookup schema is not up to date; run `ledger-history migrate`")?;
    Ok(backend)
}

/// Create or upgrade the lookup schema, returning the number of migrations
/// applied.
fn migrate_database(config: &AppConfig) -> anyhow::Result<usize> {
    let applied = match &config.database {
        DatabaseConfig::Postgres { url, .. } => {
            let options = config.database.pg_pool_options().unwrap_or_default();
            PgDatabase::connect(url, &options)?.migrate()?
        }
        DatabaseConfig::Sqlite { path } => SqliteDatabase::open_unmigrated(path)
            .with_context(|| format!("failed to open {}", path.display()))?
            .migrate()?,
    };
    Ok(applied)
}

/// Migrate command handler.
fn cmd_migrate(config: &AppConfig) -> anyhow::Result<()> {
    let applied = migrate_database(config)?;

    tracing::info!(applied, "Lookup schema migrated");
    if applied == 0 {
        println!("Lookup schema is up to date");
    } else {
        println!("Applied {} migration(s)", applied);
    }
    Ok(())
}

/// Resolve-accounts command handler.
fn cmd_resolve_accounts(config: &AppConfig, addresses: Vec<String>) -> anyhow::Result<()> {
    for address in &addresses {
        stellar_strkey::ed25519::PublicKey::from_string(address)
            .map_err(|_| anyhow::anyhow!("invalid account address: {}", address))?;
    }

    let policy = config.lookup_policy()?;
    let (resolved, stats) = match open_migrated(config)? {
        Backend::Postgres(db) => {
            db.transaction(|tx| resolve(tx, &policy.account_loader(), addresses))?
        }
        Backend::Sqlite(db) => {
            db.transaction(|tx| resolve(tx, &policy.account_loader(), addresses))?
        }
    };

    for (address, id) in resolved {
        println!("{} {}", address, id);
    }
    print_stats("AccountLoader", policy.mode(LookupTable::Accounts), stats);
    Ok(())
}

/// Resolve-assets command handler.
fn cmd_resolve_assets(config: &AppConfig, assets: Vec<String>) -> anyhow::Result<()> {
    let keys = assets
        .iter()
        .map(|asset| asset.parse::<AssetKey>())
        .collect::<Result<Vec<_>, _>>()?;

    let policy = config.lookup_policy()?;
    let (resolved, stats) = match open_migrated(config)? {
        Backend::Postgres(db) => db.transaction(|tx| resolve(tx, &policy.asset_loader(), keys))?,
        Backend::Sqlite(db) => db.transaction(|tx| resolve(tx, &policy.asset_loader(), keys))?,
    };

    for (asset, id) in resolved {
        println!("{} {}", asset, id);
    }
    print_stats("AssetLoader", policy.mode(LookupTable::Assets), stats);
    Ok(())
}

/// Register `keys`, resolve them in one round and return each key with its id.
fn resolve<S, K, T>(
    session: &mut S,
    loader: &Loader<K, T>,
    keys: Vec<K>,
) -> Result<(Vec<(K, i64)>, LoaderStats), DbError>
where
    S: Session + ?Sized,
    K: Eq + std::hash::Hash + Clone + std::fmt::Display,
    T: LookupRow,
{
    let futures: Vec<_> = keys.into_iter().map(|key| loader.get_future(key)).collect();
    loader.exec(session)?;

    let resolved = futures
        .iter()
        .map(|future| Ok((future.key().clone(), future.value()?)))
        .collect::<Result<Vec<_>, DbError>>()?;
    Ok((resolved, loader.stats()))
}

fn print_stats(name: &str, mode: ConcurrencyMode, stats: LoaderStats) {
    tracing::info!(loader = name, %mode, total = stats.total, inserted = stats.inserted, "Resolved lookup keys");
    println!("{} ({}): {}", name, mode, stats);
}

/// Try-lock command handler.
fn cmd_try_lock(config: &AppConfig, lock: &str) -> anyhow::Result<()> {
    let lock: AdvisoryLock = lock.parse()?;

    let acquired = match open_database(config)? {
        Backend::Postgres(db) => {
            let mut conn = db.connection()?;
            let mut tx = conn.transaction()?;
            let acquired = try_lock(&mut tx, lock)?;
            tx.rollback()?;
            acquired
        }
        Backend::Sqlite(db) => {
            let mut conn = db.connection()?;
            let mut tx = conn.transaction()?;
            let acquired = try_lock(&mut tx, lock)?;
            tx.rollback()?;
            acquired
        }
    };

    if acquired {
        println!("{} lock ({}) is free", lock, lock.id());
    } else {
        tracing::warn!(lock = %lock, id = lock.id(), "Advisory lock is held by another session");
        println!("{} lock ({}) is held by another session", lock, lock.id());
    }
    Ok(())
}

/// Sample config command handler.
fn cmd_sample_config() -> anyhow::Result<()> {
    print!("{}", AppConfig::sample_config());
    Ok(())
}
