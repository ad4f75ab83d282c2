//! Claimable balance resolution against `history_claimable_balances`.

use stellar_xdr::curr::{ClaimableBalanceId, Limits, WriteXdr};

use super::{ConcurrencyMode, FutureId, Loader, LoaderConfig};
use crate::error::DbError;
use crate::queries::{ColumnValues, LookupRow};
use crate::schema::CLAIMABLE_BALANCES_TABLE;

/// A row of `history_claimable_balances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryClaimableBalance {
    pub id: i64,
    pub balance_id: String,
}

impl LookupRow for HistoryClaimableBalance {
    fn from_pg_row(row: &postgres::Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            balance_id: row.try_get("claimable_balance_id")?,
        })
    }

    fn from_sqlite_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            balance_id: row.get("claimable_balance_id")?,
        })
    }
}

/// Resolves hex claimable balance ids to history ids.
pub type ClaimableBalanceLoader = Loader<String, HistoryClaimableBalance>;

pub type FutureClaimableBalanceId = FutureId<String, HistoryClaimableBalance>;

impl Loader<String, HistoryClaimableBalance> {
    pub fn new(mode: ConcurrencyMode) -> Self {
        Loader::with_config(
            LoaderConfig {
                name: "ClaimableBalanceLoader",
                table: CLAIMABLE_BALANCES_TABLE,
                columns_for_keys: |keys| {
                    vec![ColumnValues::new(
                        "claimable_balance_id",
                        "text",
                        keys.to_vec(),
                    )]
                },
                mapping_from_row: |row| (row.balance_id, row.id),
                compare: |a, b| a.cmp(b),
            },
            mode,
        )
    }
}

/// Lower-case hex of the XDR encoding of a balance id, type tag included.
pub fn claimable_balance_key(id: &ClaimableBalanceId) -> Result<String, DbError> {
    let bytes = id.to_xdr(Limits::none())?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::RecordingSession;
    use stellar_xdr::curr::Hash;

    #[test]
    fn test_claimable_balance_key() {
        let id = ClaimableBalanceId::ClaimableBalanceIdTypeV0(Hash([0xab; 32]));
        let key = claimable_balance_key(&id).unwrap();
        assert_eq!(key.len(), 72);
        assert!(key.starts_with("00000000abab"));
    }

    #[test]
    fn test_claimable_balance_loader() {
        let mut session = RecordingSession::new();
        let ids: Vec<String> = (1u8..=3)
            .map(|i| {
                claimable_balance_key(&ClaimableBalanceId::ClaimableBalanceIdTypeV0(Hash(
                    [i; 32],
                )))
                .unwrap()
            })
            .collect();

        let loader = ClaimableBalanceLoader::new(ConcurrencyMode::ConcurrentInserts);
        let futures: Vec<FutureClaimableBalanceId> = ids
            .iter()
            .rev()
            .map(|id| loader.get_future(id.clone()))
            .collect();
        loader.exec(&mut session).unwrap();

        assert_eq!(session.calls[0].table, "history_claimable_balances");
        assert_eq!(session.calls[0].columns[0].values, ids);
        let mut resolved: Vec<i64> = futures.iter().map(|f| f.value().unwrap()).collect();
        resolved.sort_unstable();
        resolved.dedup();
        assert_eq!(resolved.len(), 3);
    }
}
