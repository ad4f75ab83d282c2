//! Database schema migrations.
//!
//! This module provides a migration system for creating and upgrading the
//! lookup schema. Each migration carries the same change in both SQL
//! dialects and transforms the schema from one version to the next.
//!
//! # Migration Strategy
//!
//! Migrations are applied sequentially, one version at a time. Each migration
//! is executed in its own transaction together with the version bump, so a
//! failed migration leaves the database at its previous version.
//!
//! A database without a recorded version is at version 0 (empty).
//!
//! # Adding New Migrations
//!
//! 1. Increment [`CURRENT_VERSION`]
//! 2. Add a new `Migration` entry to the `MIGRATIONS` array
//! 3. The `from_version` should be the previous `CURRENT_VERSION`
//! 4. Provide idempotent SQL (use `IF NOT EXISTS`, `IF EXISTS`, etc.)
//!
//! # Version Compatibility
//!
//! The migration system will refuse to touch a database with a schema
//! version newer than [`CURRENT_VERSION`].

use tracing::info;

use crate::queries::StateQueries;
use crate::schema;
use crate::{DbError, Result};

/// Current database schema version.
pub const CURRENT_VERSION: i32 = 2;

/// SQL dialect of a migration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

/// Represents a single database migration.
pub struct Migration {
    /// The schema version this migration upgrades FROM.
    pub from_version: i32,
    /// The schema version this migration upgrades TO.
    pub to_version: i32,
    postgres_sql: &'static str,
    sqlite_sql: &'static str,
    /// Human-readable description of what this migration does.
    pub description: &'static str,
}

impl Migration {
    /// The upgrade SQL for `dialect`.
    pub fn sql(&self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Postgres => self.postgres_sql,
            Dialect::Sqlite => self.sqlite_sql,
        }
    }
}

/// Registry of all available migrations, ordered by version.
const MIGRATIONS: &[Migration] = &[
    Migration {
        from_version: 0,
        to_version: 1,
        postgres_sql: schema::POSTGRES_ACCOUNTS_AND_ASSETS,
        sqlite_sql: schema::SQLITE_ACCOUNTS_AND_ASSETS,
        description: "Create account and asset lookup tables",
    },
    Migration {
        from_version: 1,
        to_version: 2,
        postgres_sql: schema::POSTGRES_BALANCES_AND_POOLS,
        sqlite_sql: schema::SQLITE_BALANCES_AND_POOLS,
        description: "Create claimable balance and liquidity pool lookup tables",
    },
];

/// A database handle migrations can run against.
pub trait MigrationTarget: StateQueries {
    fn dialect(&self) -> Dialect;

    /// Executes a batch of statements outside of any migration transaction.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Applies `migration` and records its target version atomically.
    fn apply(&mut self, migration: &Migration) -> Result<()>;
}

impl MigrationTarget for rusqlite::Connection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        rusqlite::Connection::execute_batch(self, sql)?;
        Ok(())
    }

    fn apply(&mut self, migration: &Migration) -> Result<()> {
        let mut tx = self.transaction()?;
        tx.execute_batch(migration.sql(Dialect::Sqlite))?;
        tx.set_schema_version(migration.to_version)?;
        tx.commit()?;
        Ok(())
    }
}

impl MigrationTarget for postgres::Client {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.batch_execute(sql)?;
        Ok(())
    }

    fn apply(&mut self, migration: &Migration) -> Result<()> {
        let mut tx = self.transaction()?;
        tx.batch_execute(migration.sql(Dialect::Postgres))?;
        tx.set_schema_version(migration.to_version)?;
        tx.commit()?;
        Ok(())
    }
}

fn ensure_state_table<M: MigrationTarget + ?Sized>(target: &mut M) -> Result<()> {
    let ddl = match target.dialect() {
        Dialect::Postgres => schema::POSTGRES_STATE_TABLE,
        Dialect::Sqlite => schema::SQLITE_STATE_TABLE,
    };
    target.execute_batch(ddl)
}

/// Retrieves the current schema version, 0 when none is recorded.
pub fn get_schema_version<M: MigrationTarget + ?Sized>(target: &mut M) -> Result<i32> {
    ensure_state_table(target)?;
    Ok(target.get_schema_version()?.unwrap_or(0))
}

/// Returns `true` if the schema version is older than [`CURRENT_VERSION`].
pub fn needs_migration<M: MigrationTarget + ?Sized>(target: &mut M) -> Result<bool> {
    Ok(get_schema_version(target)? < CURRENT_VERSION)
}

/// Runs all necessary migrations to bring the database up to date.
///
/// Returns the number of migrations applied. If the database is already at
/// [`CURRENT_VERSION`], this is a no-op.
///
/// # Errors
///
/// Returns an error if:
/// - The database version is newer than [`CURRENT_VERSION`]
/// - A required migration is not found
/// - Any migration SQL fails to execute
pub fn run_migrations<M: MigrationTarget + ?Sized>(target: &mut M) -> Result<usize> {
    let mut current_version = get_schema_version(target)?;

    if current_version == CURRENT_VERSION {
        info!("Database is up to date at version {}", current_version);
        return Ok(0);
    }

    if current_version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {} is newer than supported version {}",
            current_version, CURRENT_VERSION
        )));
    }

    info!(
        "Migrating database from version {} to {}",
        current_version, CURRENT_VERSION
    );

    let mut applied = 0;
    while current_version < CURRENT_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from_version == current_version)
            .ok_or_else(|| {
                DbError::Migration(format!(
                    "No migration found from version {}",
                    current_version
                ))
            })?;

        info!(
            "Applying migration {} -> {}: {}",
            migration.from_version, migration.to_version, migration.description
        );
        target.apply(migration)?;

        current_version = migration.to_version;
        applied += 1;
    }

    info!(
        "All migrations complete, database at version {}",
        CURRENT_VERSION
    );
    Ok(applied)
}

/// Verifies the database schema is compatible with this software version.
///
/// # Errors
///
/// Returns an error if the schema version is:
/// - Older than [`CURRENT_VERSION`] (migrations should be run first)
/// - Newer than [`CURRENT_VERSION`] (software upgrade required)
pub fn verify_schema<M: MigrationTarget + ?Sized>(target: &mut M) -> Result<()> {
    let version = get_schema_version(target)?;

    if version < CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database schema version {} is too old, run migrations first",
            version
        )));
    }

    if version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database schema version {} is newer than this software supports ({})",
            version, CURRENT_VERSION
        )));
    }

    Ok(())
}
