//! Connection pool management.
//!
//! This module provides one pooled handle per backend:
//!
//! - [`PgDatabase`] wraps an r2d2 pool of PostgreSQL clients. This is the
//!   backend for clustered deployments where several ingestion processes
//!   and the reaper share the lookup tables.
//! - [`SqliteDatabase`] wraps an r2d2 pool of SQLite connections, for
//!   single-writer deployments and tests.
//!
//! # Thread Safety
//!
//! Both types are `Clone` and can be shared across threads. Each call to
//! `connection` returns a connection from the pool, which is returned to
//! the pool when dropped.
//!
//! # Transactions
//!
//! Loaders never open transactions themselves. Use `transaction`, which
//! runs the closure inside a transaction and commits it when the closure
//! returns `Ok`; on `Err` the transaction is dropped and rolled back.

use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_postgres::postgres::NoTls;
use r2d2_postgres::PostgresConnectionManager;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::DbError;
use crate::migrations;

/// A pooled PostgreSQL client.
pub type PgPooledConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

/// A pooled SQLite connection.
pub type SqlitePooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool settings for [`PgDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgPoolOptions {
    /// Maximum number of pooled clients.
    pub max_connections: u32,
    /// Per-statement timeout applied to every client, in milliseconds.
    pub statement_timeout_ms: Option<u64>,
    /// Schema search path applied to every client.
    pub search_path: Option<String>,
    /// How long to wait for a free client.
    pub connection_timeout: Duration,
}

impl Default for PgPoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            statement_timeout_ms: None,
            search_path: None,
            connection_timeout: Duration::from_secs(30),
        }
    }
}

impl PgPoolOptions {
    /// Server options sent at connection start-up.
    fn server_options(&self) -> Option<String> {
        let mut options = Vec::new();
        if let Some(timeout) = self.statement_timeout_ms {
            options.push(format!("-c statement_timeout={}", timeout));
        }
        if let Some(path) = &self.search_path {
            options.push(format!("-c search_path={}", path));
        }
        if options.is_empty() {
            None
        } else {
            Some(options.join(" "))
        }
    }
}

/// PostgreSQL handle with connection pooling.
///
/// # Example
///
/// ```no_run
/// use ledger_history_db::{AccountLoader, ConcurrencyMode, PgDatabase, PgPoolOptions};
///
/// let db = PgDatabase::connect("postgres://localhost/history", &PgPoolOptions::default())?;
/// db.migrate()?;
///
/// let id = db.transaction(|tx| {
///     let loader = AccountLoader::new(ConcurrencyMode::ConcurrentInserts);
///     let future = loader.get_future("GABC...".to_string());
///     loader.exec(tx)?;
///     future.value()
/// })?;
/// # Ok::<(), ledger_history_db::DbError>(())
/// ```
#[derive(Clone)]
pub struct PgDatabase {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PgDatabase {
    /// Creates a pool for the database at `url`.
    ///
    /// Connections are established lazily; the first failure to connect
    /// surfaces from [`connection`](Self::connection).
    pub fn connect(url: &str, options: &PgPoolOptions) -> Result<Self, DbError> {
        let mut config: postgres::Config = url.parse()?;
        if let Some(server_options) = options.server_options() {
            config.options(&server_options);
        }
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(options.max_connections)
            .connection_timeout(options.connection_timeout)
            .build_unchecked(manager);
        info!(
            max_connections = options.max_connections,
            statement_timeout_ms = options.statement_timeout_ms,
            "Created PostgreSQL pool"
        );
        Ok(Self { pool })
    }

    /// Obtains a client from the pool.
    pub fn connection(&self) -> Result<PgPooledConnection, DbError> {
        self.pool.get().map_err(DbError::from)
    }

    /// Creates or upgrades the lookup schema, returning the number of
    /// migrations applied.
    pub fn migrate(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        migrations::run_migrations(&mut *conn)
    }

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut postgres::Transaction<'_>) -> Result<T, DbError>,
    {
        let mut conn = self.connection()?;
        let mut tx = conn.transaction()?;
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Executes a closure with a pooled client outside of a transaction.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut postgres::Client) -> Result<T, DbError>,
    {
        let mut conn = self.connection()?;
        f(&mut conn)
    }
}

/// SQLite handle with connection pooling.
///
/// The lookup schema is migrated when the database is opened, except
/// through [`SqliteDatabase::open_unmigrated`].
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteDatabase {
    /// Opens (or creates) the database file at `path` and migrates it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let db = Self::open_unmigrated(path)?;
        db.migrate()?;
        Ok(db)
    }

    /// Opens (or creates) the database file at `path` without touching
    /// its schema. Call [`migrate`](Self::migrate) before use.
    pub fn open_unmigrated(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;",
            )
        });
        let pool = Pool::builder().max_size(4).build(manager)?;
        info!(path = %path.display(), "Opened SQLite database");
        Ok(Self { pool })
    }

    /// Opens a private in-memory database.
    ///
    /// The pool holds a single connection, since every SQLite in-memory
    /// connection is a separate database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let db = Self { pool };
        db.migrate()?;
        Ok(db)
    }

    /// Obtains a connection from the pool.
    pub fn connection(&self) -> Result<SqlitePooledConnection, DbError> {
        self.pool.get().map_err(DbError::from)
    }

    /// Creates or upgrades the lookup schema, returning the number of
    /// migrations applied.
    pub fn migrate(&self) -> Result<usize, DbError> {
        let mut conn = self.connection()?;
        migrations::run_migrations(&mut *conn)
    }

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed.
    /// If it returns `Err`, the transaction is rolled back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut rusqlite::Transaction<'_>) -> Result<T, DbError>,
    {
        let mut conn = self.connection()?;
        let mut tx = conn.transaction()?;
        let result = f(&mut tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Executes a closure with a pooled connection in autocommit mode.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, DbError>,
    {
        let mut conn = self.connection()?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::StateQueries;

    #[test]
    fn test_open_in_memory_is_migrated() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let version = db
            .with_connection(|conn| conn.get_schema_version())
            .unwrap();
        assert_eq!(version, Some(migrations::CURRENT_VERSION));
        assert_eq!(db.migrate().unwrap(), 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let result: Result<(), DbError> = db.transaction(|tx| {
            tx.set_state("k", "v")?;
            Err(DbError::Integrity("boom".to_string()))
        });
        assert!(result.is_err());
        let value = db.with_connection(|conn| conn.get_state("k")).unwrap();
        assert!(value.is_none());

        db.transaction(|tx| tx.set_state("k", "v")).unwrap();
        let value = db.with_connection(|conn| conn.get_state("k")).unwrap();
        assert_eq!(value, Some("v".to_string()));
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let db = SqliteDatabase::open(&path).unwrap();
        assert!(path.exists());
        drop(db);

        // Reopening an up-to-date database applies nothing
        let db = SqliteDatabase::open(&path).unwrap();
        assert_eq!(db.migrate().unwrap(), 0);
    }

    #[test]
    fn test_open_unmigrated_reports_applied_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");

        let db = SqliteDatabase::open_unmigrated(&path).unwrap();
        assert_eq!(db.migrate().unwrap(), migrations::CURRENT_VERSION as usize);
        assert_eq!(db.migrate().unwrap(), 0);
        drop(db);

        let db = SqliteDatabase::open_unmigrated(&path).unwrap();
        assert_eq!(db.migrate().unwrap(), 0);
    }

    #[test]
    fn test_pg_server_options() {
        let options = PgPoolOptions {
            statement_timeout_ms: Some(30_000),
            search_path: Some("loader_test".to_string()),
            ..PgPoolOptions::default()
        };
        assert_eq!(
            options.server_options().as_deref(),
            Some("-c statement_timeout=30000 -c search_path=loader_test")
        );
        assert_eq!(PgPoolOptions::default().server_options(), None);
    }

    #[test]
    fn test_pg_connect_rejects_bad_url() {
        assert!(PgDatabase::connect("postgres://localhost:notaport/history", &PgPoolOptions::default()).is_err());
    }
}
