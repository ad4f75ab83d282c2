//! Lookup-table id resolution for ledger history ingestion.
//!
//! History rows (operations, effects, trades, ...) reference accounts,
//! assets, claimable balances and liquidity pools through small integer ids
//! kept in dedicated lookup tables. This crate resolves business keys into
//! those ids in bulk, safely alongside other ingestion processes and the
//! lookup-table reaper, and provides the advisory locks that keep
//! maintenance jobs from running twice across a cluster.
//!
//! # Architecture
//!
//! - [`loader`]: the generic [`Loader`], its [`FutureId`]s and the concrete
//!   account, asset, claimable balance and liquidity pool loaders
//! - [`policy`]: the per-table [`ConcurrencyMode`] a deployment runs with
//! - [`queries`]: the [`Session`] abstraction over both backends, the bulk
//!   insert/fetch statements, advisory locks and the state table
//! - [`pool`]: r2d2 connection pools for PostgreSQL and SQLite
//! - [`schema`] and [`migrations`]: lookup-table DDL and schema versioning
//! - [`error`]: error types for every operation
//!
//! # Usage
//!
//! ```no_run
//! use ledger_history_db::{AssetKey, LookupPolicy, SqliteDatabase};
//!
//! let db = SqliteDatabase::open_in_memory()?;
//! let policy = LookupPolicy::for_ingestion(false);
//!
//! db.transaction(|tx| {
//!     let accounts = policy.account_loader();
//!     let assets = policy.asset_loader();
//!
//!     // Register keys while building rows; no I/O yet.
//!     let source = accounts.get_future("GABC...".to_string());
//!     let asset = assets.get_future(AssetKey::native());
//!
//!     // Resolve everything inside the same transaction.
//!     accounts.exec(tx)?;
//!     assets.exec(tx)?;
//!
//!     println!("source={} asset={}", source.value()?, asset.value()?);
//!     Ok(())
//! })?;
//! # Ok::<(), ledger_history_db::DbError>(())
//! ```
//!
//! # Maintenance locks
//!
//! ```no_run
//! use ledger_history_db::{LockQueries, PgDatabase, PgPoolOptions};
//!
//! let db = PgDatabase::connect("postgres://localhost/history", &PgPoolOptions::default())?;
//! db.transaction(|tx| {
//!     if !tx.try_lookup_table_reaper_lock()? {
//!         // another node is reaping
//!         return Ok(());
//!     }
//!     // ... delete orphaned lookup rows ...
//!     Ok(())
//! })?;
//! # Ok::<(), ledger_history_db::DbError>(())
//! ```

pub mod error;
pub mod loader;
pub mod migrations;
pub mod policy;
pub mod pool;
pub mod queries;
pub mod schema;

pub use error::DbError;
pub use loader::account::{account_key, muxed_account_key, Account, AccountLoader, FutureAccountId};
pub use loader::asset::{Asset, AssetKey, AssetLoader, FutureAssetId};
pub use loader::claimable_balance::{
    claimable_balance_key, ClaimableBalanceLoader, FutureClaimableBalanceId,
    HistoryClaimableBalance,
};
pub use loader::liquidity_pool::{
    liquidity_pool_key, FutureLiquidityPoolId, HistoryLiquidityPool, LiquidityPoolLoader,
};
pub use loader::{
    collect_stats, ConcurrencyMode, FutureId, Loader, LoaderConfig, LoaderReport, LoaderStats,
    LoaderStub,
};
pub use migrations::{needs_migration, run_migrations, verify_schema, CURRENT_VERSION};
pub use policy::{LookupPolicy, LookupTable};
pub use pool::{PgDatabase, PgPoolOptions, SqliteDatabase};
pub use queries::*;

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;
