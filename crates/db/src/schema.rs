//! Database schema definitions.
//!
//! Lookup tables map business keys to small integer ids that history rows
//! reference instead of repeating the key. Every lookup table has an
//! auto-generated `id` and a unique constraint over its key columns; the
//! bulk insert relies on that constraint to skip keys that already exist.
//!
//! # Tables
//!
//! - **State management**: `lookupstate` - key-value store for schema metadata
//! - **Accounts**: `history_accounts` - account address to id
//! - **Assets**: `history_assets` - (code, type, issuer) to id
//! - **Claimable balances**: `history_claimable_balances` - hex balance id to id
//! - **Liquidity pools**: `history_liquidity_pools` - hex pool id to id
//!
//! The DDL exists in a PostgreSQL and a SQLite dialect. Tables are created
//! by the [`migrations`](crate::migrations) module, which tracks the schema
//! version in `lookupstate`.

/// Lookup table holding account addresses.
pub const ACCOUNTS_TABLE: &str = "history_accounts";
/// Lookup table holding asset triples.
pub const ASSETS_TABLE: &str = "history_assets";
/// Lookup table holding claimable balance ids.
pub const CLAIMABLE_BALANCES_TABLE: &str = "history_claimable_balances";
/// Lookup table holding liquidity pool ids.
pub const LIQUIDITY_POOLS_TABLE: &str = "history_liquidity_pools";

/// Every lookup table, in migration order.
pub const LOOKUP_TABLES: [&str; 4] = [
    ACCOUNTS_TABLE,
    ASSETS_TABLE,
    CLAIMABLE_BALANCES_TABLE,
    LIQUIDITY_POOLS_TABLE,
];

/// PostgreSQL DDL for the state table.
pub const POSTGRES_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lookupstate (
    statename TEXT PRIMARY KEY,
    state TEXT NOT NULL
);
"#;

/// SQLite DDL for the state table.
pub const SQLITE_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lookupstate (
    statename TEXT PRIMARY KEY,
    state TEXT NOT NULL
);
"#;

/// PostgreSQL DDL for the account and asset lookup tables.
pub const POSTGRES_ACCOUNTS_AND_ASSETS: &str = r#"
CREATE TABLE IF NOT EXISTS history_accounts (
    id BIGSERIAL PRIMARY KEY,
    address CHARACTER VARYING(64) NOT NULL,
    CONSTRAINT history_accounts_address_key UNIQUE (address)
);

CREATE TABLE IF NOT EXISTS history_assets (
    id BIGSERIAL PRIMARY KEY,
    asset_type CHARACTER VARYING(64) NOT NULL,
    asset_code CHARACTER VARYING(12) NOT NULL,
    asset_issuer CHARACTER VARYING(56) NOT NULL,
    CONSTRAINT history_assets_asset_code_asset_type_asset_issuer_key
        UNIQUE (asset_code, asset_type, asset_issuer)
);
"#;

/// SQLite DDL for the account and asset lookup tables.
pub const SQLITE_ACCOUNTS_AND_ASSETS: &str = r#"
CREATE TABLE IF NOT EXISTS history_accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS history_accounts_address_key
    ON history_accounts(address);

CREATE TABLE IF NOT EXISTS history_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_type TEXT NOT NULL,
    asset_code TEXT NOT NULL,
    asset_issuer TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS history_assets_asset_code_asset_type_asset_issuer_key
    ON history_assets(asset_code, asset_type, asset_issuer);
"#;

/// PostgreSQL DDL for the claimable balance and liquidity pool lookup tables.
pub const POSTGRES_BALANCES_AND_POOLS: &str = r#"
CREATE TABLE IF NOT EXISTS history_claimable_balances (
    id BIGSERIAL PRIMARY KEY,
    claimable_balance_id TEXT NOT NULL,
    CONSTRAINT history_claimable_balances_claimable_balance_id_key
        UNIQUE (claimable_balance_id)
);

CREATE TABLE IF NOT EXISTS history_liquidity_pools (
    id BIGSERIAL PRIMARY KEY,
    liquidity_pool_id TEXT NOT NULL,
    CONSTRAINT history_liquidity_pools_liquidity_pool_id_key
        UNIQUE (liquidity_pool_id)
);
"#;

/// SQLite DDL for the claimable balance and liquidity pool lookup tables.
pub const SQLITE_BALANCES_AND_POOLS: &str = r#"
CREATE TABLE IF NOT EXISTS history_claimable_balances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    claimable_balance_id TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS history_claimable_balances_claimable_balance_id_key
    ON history_claimable_balances(claimable_balance_id);

CREATE TABLE IF NOT EXISTS history_liquidity_pools (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    liquidity_pool_id TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS history_liquidity_pools_liquidity_pool_id_key
    ON history_liquidity_pools(liquidity_pool_id);
"#;

/// Well-known keys for the `lookupstate` table.
pub mod state_keys {
    /// Current database schema version.
    ///
    /// Used by the migration system to track schema upgrades.
    pub const DATABASE_SCHEMA: &str = "databaseschema";
}
