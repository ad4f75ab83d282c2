//! Database error types.
//!
//! This module defines the error types used throughout the lookup layer.
//! All errors are consolidated into the [`DbError`] enum which provides
//! automatic conversion from underlying error types.

use thiserror::Error;

/// Errors that can occur during lookup-table and locking operations.
///
/// # Error Categories
///
/// - **Infrastructure errors**: [`Postgres`](DbError::Postgres), [`Sqlite`](DbError::Sqlite),
///   [`Pool`](DbError::Pool), [`Io`](DbError::Io) - failures in the underlying systems
/// - **Resolution errors**: [`Lookup`](DbError::Lookup) wraps a failed bulk
///   operation with the operation name and table
/// - **Loader state errors**: [`LoaderNotSealed`](DbError::LoaderNotSealed),
///   [`UnknownKey`](DbError::UnknownKey), [`LoaderDropped`](DbError::LoaderDropped)
/// - **Session errors**: [`NotInTransaction`](DbError::NotInTransaction),
///   [`Unsupported`](DbError::Unsupported)
/// - **Data errors**: [`Xdr`](DbError::Xdr), [`InvalidKey`](DbError::InvalidKey),
///   [`Integrity`](DbError::Integrity)
/// - **Schema and configuration errors**: [`Migration`](DbError::Migration),
///   [`Config`](DbError::Config)
#[derive(Error, Debug)]
pub enum DbError {
    /// PostgreSQL error.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] postgres::Error),

    /// SQLite database error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    ///
    /// Occurs when a connection cannot be obtained from the pool,
    /// typically due to pool exhaustion or an unreachable server.
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error while binding key batches.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XDR serialization error while deriving a business key.
    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),

    /// A bulk lookup operation failed.
    ///
    /// Carries the operation and table so failures can be diagnosed
    /// without logging key values.
    #[error("{operation} on {table} failed: {source}")]
    Lookup {
        operation: &'static str,
        table: &'static str,
        #[source]
        source: Box<DbError>,
    },

    /// A loader was read before `exec` sealed it.
    #[error("invalid loader state: exec was not called yet to resolve {key} in {loader}")]
    LoaderNotSealed { loader: &'static str, key: String },

    /// The key was never registered or did not resolve.
    #[error("{loader} key {key} was not found")]
    UnknownKey { loader: &'static str, key: String },

    /// A future outlived the loader that issued it.
    #[error("{loader} was dropped before its future was read")]
    LoaderDropped { loader: &'static str },

    /// The operation requires an open transaction.
    #[error("{0} cannot be called outside of a transaction")]
    NotInTransaction(&'static str),

    /// The backend cannot provide the requested guarantee.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A business key could not be parsed or derived.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Data integrity violation.
    ///
    /// Indicates that data in the database is in an unexpected state,
    /// such as an unparsable schema version.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Invalid lookup configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema migration error.
    ///
    /// Occurs during database initialization or upgrade when the schema
    /// version is incompatible or a migration fails to apply.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl DbError {
    /// Wraps a backing-store failure with the bulk operation and table it hit.
    pub fn lookup(operation: &'static str, table: &'static str, source: DbError) -> Self {
        DbError::Lookup {
            operation,
            table,
            source: Box::new(source),
        }
    }
}
