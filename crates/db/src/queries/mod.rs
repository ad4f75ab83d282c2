//! Backing-store query implementations.
//!
//! Lookup resolution needs three things from the store: a set-based
//! conditional insert, a set-based conditional fetch with an optional
//! key-share lock, and a transaction-scoped advisory lock. The [`Session`]
//! trait names those operations and is implemented directly on the
//! connection and transaction types of both backends, so query code can be
//! called on whatever handle the caller already holds:
//!
//! | Type | `in_transaction` |
//! |------|------------------|
//! | [`postgres::Client`] | `false` |
//! | [`postgres::Transaction`] | `true` |
//! | [`rusqlite::Connection`] | `true` when not in autocommit mode |
//! | [`rusqlite::Transaction`] | `true` |
//!
//! The session never opens or closes transactions itself.
//!
//! # Modules
//!
//! - [`bulk`]: SQL builders and executors for the Bulk Resolution Protocol
//! - [`locks`]: advisory lock identifiers and the try-lock coordinator
//! - [`state`]: the `lookupstate` key-value table

pub mod bulk;
pub mod locks;
pub mod state;

pub use bulk::{ColumnValues, LookupRow, RowLock};
pub use locks::{try_lock, AdvisoryLock, LockQueries};
pub use state::StateQueries;

use postgres::GenericClient;

use crate::error::DbError;

/// A handle to the backing store that lookup resolution runs against.
///
/// Implementations execute statements on the caller's connection or
/// transaction. Errors are returned unwrapped; callers add the operation
/// and table context.
pub trait Session {
    /// Returns true when statements run inside an explicit transaction.
    fn in_transaction(&self) -> bool;

    /// Inserts one row per key tuple, skipping tuples whose key already
    /// exists, and returns only the rows that were created.
    fn bulk_insert<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
    ) -> Result<Vec<T>, DbError>;

    /// Returns every existing row whose key matches one of the key tuples.
    fn bulk_get<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
        lock: RowLock,
    ) -> Result<Vec<T>, DbError>;

    /// Attempts a transaction-scoped advisory lock without blocking.
    ///
    /// Prefer [`locks::try_lock`], which checks for an open transaction first.
    fn try_advisory_lock(&mut self, lock: AdvisoryLock) -> Result<bool, DbError>;
}

impl Session for postgres::Client {
    fn in_transaction(&self) -> bool {
        false
    }

    fn bulk_insert<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
    ) -> Result<Vec<T>, DbError> {
        bulk::pg_bulk_insert(self, table, columns)
    }

    fn bulk_get<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
        lock: RowLock,
    ) -> Result<Vec<T>, DbError> {
        bulk::pg_bulk_get(self, table, columns, lock)
    }

    fn try_advisory_lock(&mut self, _lock: AdvisoryLock) -> Result<bool, DbError> {
        Err(DbError::NotInTransaction("advisory lock"))
    }
}

impl Session for postgres::Transaction<'_> {
    fn in_transaction(&self) -> bool {
        true
    }

    fn bulk_insert<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
    ) -> Result<Vec<T>, DbError> {
        bulk::pg_bulk_insert(self, table, columns)
    }

    fn bulk_get<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
        lock: RowLock,
    ) -> Result<Vec<T>, DbError> {
        bulk::pg_bulk_get(self, table, columns, lock)
    }

    fn try_advisory_lock(&mut self, lock: AdvisoryLock) -> Result<bool, DbError> {
        pg_try_advisory_xact_lock(self, lock)
    }
}

impl Session for rusqlite::Connection {
    fn in_transaction(&self) -> bool {
        !self.is_autocommit()
    }

    fn bulk_insert<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
    ) -> Result<Vec<T>, DbError> {
        bulk::sqlite_bulk_insert(self, table, columns)
    }

    fn bulk_get<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
        lock: RowLock,
    ) -> Result<Vec<T>, DbError> {
        bulk::sqlite_bulk_get(self, table, columns, lock)
    }

    fn try_advisory_lock(&mut self, _lock: AdvisoryLock) -> Result<bool, DbError> {
        sqlite_advisory_lock(self)
    }
}

impl Session for rusqlite::Transaction<'_> {
    fn in_transaction(&self) -> bool {
        true
    }

    fn bulk_insert<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
    ) -> Result<Vec<T>, DbError> {
        bulk::sqlite_bulk_insert(self, table, columns)
    }

    fn bulk_get<T: LookupRow>(
        &mut self,
        table: &str,
        columns: &[ColumnValues],
        lock: RowLock,
    ) -> Result<Vec<T>, DbError> {
        bulk::sqlite_bulk_get(self, table, columns, lock)
    }

    fn try_advisory_lock(&mut self, _lock: AdvisoryLock) -> Result<bool, DbError> {
        sqlite_advisory_lock(self)
    }
}

fn pg_try_advisory_xact_lock<C: GenericClient>(
    client: &mut C,
    lock: AdvisoryLock,
) -> Result<bool, DbError> {
    let row = client.query_one("SELECT pg_try_advisory_xact_lock($1)", &[&lock.id()])?;
    Ok(row.try_get(0)?)
}

fn sqlite_advisory_lock(conn: &rusqlite::Connection) -> Result<bool, DbError> {
    if conn.is_autocommit() {
        return Err(DbError::NotInTransaction("advisory lock"));
    }
    Err(DbError::Unsupported(
        "advisory locks require the PostgreSQL backend".to_string(),
    ))
}
