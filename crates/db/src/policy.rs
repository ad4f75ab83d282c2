//! Per-table concurrency policy.
//!
//! Loaders in [`ConcurrencyMode::ConcurrentInserts`] and a lookup-table
//! reaper must never run against the same table at the same time, and
//! neither may loaders in the two different modes. The mode is therefore
//! fixed per table for a whole deployment: a [`LookupPolicy`] is built once
//! from configuration and every loader is created through it.

use std::fmt;
use std::str::FromStr;

use crate::error::DbError;
use crate::loader::account::AccountLoader;
use crate::loader::asset::AssetLoader;
use crate::loader::claimable_balance::ClaimableBalanceLoader;
use crate::loader::liquidity_pool::LiquidityPoolLoader;
use crate::loader::ConcurrencyMode;
use crate::schema;

/// A lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LookupTable {
    Accounts,
    Assets,
    ClaimableBalances,
    LiquidityPools,
}

impl LookupTable {
    pub const ALL: [LookupTable; 4] = [
        LookupTable::Accounts,
        LookupTable::Assets,
        LookupTable::ClaimableBalances,
        LookupTable::LiquidityPools,
    ];

    pub const fn table_name(self) -> &'static str {
        match self {
            LookupTable::Accounts => schema::ACCOUNTS_TABLE,
            LookupTable::Assets => schema::ASSETS_TABLE,
            LookupTable::ClaimableBalances => schema::CLAIMABLE_BALANCES_TABLE,
            LookupTable::LiquidityPools => schema::LIQUIDITY_POOLS_TABLE,
        }
    }

    const fn index(self) -> usize {
        match self {
            LookupTable::Accounts => 0,
            LookupTable::Assets => 1,
            LookupTable::ClaimableBalances => 2,
            LookupTable::LiquidityPools => 3,
        }
    }
}

impl fmt::Display for LookupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Parses a table name such as `history_accounts`.
impl FromStr for LookupTable {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LookupTable::ALL
            .into_iter()
            .find(|table| table.table_name() == s)
            .ok_or_else(|| DbError::Config(format!("unknown lookup table: {}", s)))
    }
}

/// The concurrency mode of every lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupPolicy {
    modes: [ConcurrencyMode; 4],
}

impl LookupPolicy {
    /// Every table in `mode`.
    pub const fn uniform(mode: ConcurrencyMode) -> Self {
        Self { modes: [mode; 4] }
    }

    /// Deployment defaults.
    ///
    /// With lookup-table reaping enabled, live ingestion runs next to the
    /// reaper and every table uses `ConcurrentDeletes`. Without it, several
    /// reingestion workers may insert in parallel and every table uses
    /// `ConcurrentInserts`.
    pub const fn for_ingestion(reap_lookup_tables: bool) -> Self {
        if reap_lookup_tables {
            Self::uniform(ConcurrencyMode::ConcurrentDeletes)
        } else {
            Self::uniform(ConcurrencyMode::ConcurrentInserts)
        }
    }

    /// Overrides the mode of one table.
    pub fn with_mode(mut self, table: LookupTable, mode: ConcurrencyMode) -> Self {
        self.modes[table.index()] = mode;
        self
    }

    pub fn mode(&self, table: LookupTable) -> ConcurrencyMode {
        self.modes[table.index()]
    }

    pub fn account_loader(&self) -> AccountLoader {
        AccountLoader::new(self.mode(LookupTable::Accounts))
    }

    pub fn asset_loader(&self) -> AssetLoader {
        AssetLoader::new(self.mode(LookupTable::Assets))
    }

    pub fn claimable_balance_loader(&self) -> ClaimableBalanceLoader {
        ClaimableBalanceLoader::new(self.mode(LookupTable::ClaimableBalances))
    }

    pub fn liquidity_pool_loader(&self) -> LiquidityPoolLoader {
        LiquidityPoolLoader::new(self.mode(LookupTable::LiquidityPools))
    }

    /// Fails unless `table` is written only by `ConcurrentDeletes` loaders,
    /// the one mode that tolerates a concurrent reaper.
    pub fn check_reapable(&self, table: LookupTable) -> Result<(), DbError> {
        match self.mode(table) {
            ConcurrencyMode::ConcurrentDeletes => Ok(()),
            mode => Err(DbError::Config(format!(
                "{} is loaded in {} mode and cannot be reaped",
                table, mode
            ))),
        }
    }
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self::for_ingestion(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_ingestion_defaults() {
        let live = LookupPolicy::for_ingestion(true);
        let reingest = LookupPolicy::for_ingestion(false);
        for table in LookupTable::ALL {
            assert_eq!(live.mode(table), ConcurrencyMode::ConcurrentDeletes);
            assert_eq!(reingest.mode(table), ConcurrencyMode::ConcurrentInserts);
            assert!(live.check_reapable(table).is_ok());
            assert!(reingest.check_reapable(table).is_err());
        }
        assert_eq!(LookupPolicy::default(), reingest);
    }

    #[test]
    fn test_override_one_table() {
        let policy = LookupPolicy::for_ingestion(true)
            .with_mode(LookupTable::Assets, ConcurrencyMode::ConcurrentInserts);

        assert_eq!(policy.account_loader().mode(), ConcurrencyMode::ConcurrentDeletes);
        assert_eq!(policy.asset_loader().mode(), ConcurrencyMode::ConcurrentInserts);
        assert_eq!(
            policy.claimable_balance_loader().table(),
            "history_claimable_balances"
        );
        assert_eq!(
            policy.liquidity_pool_loader().name(),
            "LiquidityPoolLoader"
        );

        let err = policy.check_reapable(LookupTable::Assets).unwrap_err();
        assert!(err.to_string().contains("history_assets"));
    }

    #[test]
    fn test_table_names_parse() {
        for table in LookupTable::ALL {
            assert_eq!(table.to_string().parse::<LookupTable>().unwrap(), table);
        }
        assert!("history_trades".parse::<LookupTable>().is_err());
    }
}
