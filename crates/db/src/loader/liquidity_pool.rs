//! Liquidity pool resolution against `history_liquidity_pools`.

use stellar_xdr::curr::PoolId;

use super::{ConcurrencyMode, FutureId, Loader, LoaderConfig};
use crate::queries::{ColumnValues, LookupRow};
use crate::schema::LIQUIDITY_POOLS_TABLE;

/// A row of `history_liquidity_pools`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLiquidityPool {
    pub id: i64,
    pub pool_id: String,
}

impl LookupRow for HistoryLiquidityPool {
    fn from_pg_row(row: &postgres::Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            pool_id: row.try_get("liquidity_pool_id")?,
        })
    }

    fn from_sqlite_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            pool_id: row.get("liquidity_pool_id")?,
        })
    }
}

/// Resolves hex liquidity pool ids to history ids.
pub type LiquidityPoolLoader = Loader<String, HistoryLiquidityPool>;

pub type FutureLiquidityPoolId = FutureId<String, HistoryLiquidityPool>;

impl Loader<String, HistoryLiquidityPool> {
    pub fn new(mode: ConcurrencyMode) -> Self {
        Loader::with_config(
            LoaderConfig {
                name: "LiquidityPoolLoader",
                table: LIQUIDITY_POOLS_TABLE,
                columns_for_keys: |keys| {
                    vec![ColumnValues::new("liquidity_pool_id", "text", keys.to_vec())]
                },
                mapping_from_row: |row| (row.pool_id, row.id),
                compare: |a, b| a.cmp(b),
            },
            mode,
        )
    }
}

/// Lower-case hex of the 32-byte pool id.
pub fn liquidity_pool_key(id: &PoolId) -> String {
    hex::encode(id.0 .0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::RecordingSession;
    use crate::loader::LoaderStats;
    use stellar_xdr::curr::Hash;

    #[test]
    fn test_liquidity_pool_key() {
        let key = liquidity_pool_key(&PoolId(Hash([0x0f; 32])));
        assert_eq!(key, "0f".repeat(32));
    }

    #[test]
    fn test_liquidity_pool_loader_concurrent_deletes() {
        let mut session = RecordingSession::new();
        let a = liquidity_pool_key(&PoolId(Hash([1; 32])));
        let b = liquidity_pool_key(&PoolId(Hash([2; 32])));

        let first = LiquidityPoolLoader::new(ConcurrencyMode::ConcurrentDeletes);
        first.get_future(a.clone());
        first.exec(&mut session).unwrap();
        assert_eq!(
            first.stats(),
            LoaderStats {
                total: 1,
                inserted: 1
            }
        );

        let second = LiquidityPoolLoader::new(ConcurrencyMode::ConcurrentDeletes);
        let fb = second.get_future(b.clone());
        let fa = second.get_future(a.clone());
        second.exec(&mut session).unwrap();
        assert_eq!(
            second.stats(),
            LoaderStats {
                total: 2,
                inserted: 1
            }
        );
        assert_eq!(fa.value().unwrap(), first.get_now(&a).unwrap());
        assert_ne!(fa.value().unwrap(), fb.value().unwrap());
    }
}
