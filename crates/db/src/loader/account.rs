//! Account address resolution against `history_accounts`.

use stellar_xdr::curr::{AccountId, MuxedAccount, PublicKey};

use super::{ConcurrencyMode, FutureId, Loader, LoaderConfig};
use crate::queries::{ColumnValues, LookupRow};
use crate::schema::ACCOUNTS_TABLE;

/// A row of `history_accounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub address: String,
}

impl LookupRow for Account {
    fn from_pg_row(row: &postgres::Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            address: row.try_get("address")?,
        })
    }

    fn from_sqlite_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            address: row.get("address")?,
        })
    }
}

/// Resolves account addresses to history account ids.
pub type AccountLoader = Loader<String, Account>;

/// The future history account id of an address.
pub type FutureAccountId = FutureId<String, Account>;

impl Loader<String, Account> {
    pub fn new(mode: ConcurrencyMode) -> Self {
        Loader::with_config(
            LoaderConfig {
                name: "AccountLoader",
                table: ACCOUNTS_TABLE,
                columns_for_keys: |keys| {
                    vec![ColumnValues::new(
                        "address",
                        "character varying(64)",
                        keys.to_vec(),
                    )]
                },
                mapping_from_row: |row| (row.address, row.id),
                compare: |a, b| a.cmp(b),
            },
            mode,
        )
    }
}

/// StrKey address (`G...`) of an account.
pub fn account_key(account: &AccountId) -> String {
    match &account.0 {
        PublicKey::PublicKeyTypeEd25519(key) => {
            stellar_strkey::ed25519::PublicKey(key.0).to_string()
        }
    }
}

/// StrKey address of the account behind a possibly multiplexed account.
///
/// History rows are keyed by the underlying account, so the multiplexing
/// id is discarded.
pub fn muxed_account_key(account: &MuxedAccount) -> String {
    let key = match account {
        MuxedAccount::Ed25519(key) => key.0,
        MuxedAccount::MuxedEd25519(muxed) => muxed.ed25519.0,
    };
    stellar_strkey::ed25519::PublicKey(key).to_string()
}
