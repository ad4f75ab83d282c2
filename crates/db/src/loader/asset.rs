//! Asset resolution against `history_assets`.

use std::fmt;
use std::str::FromStr;

use stellar_xdr::curr::{AlphaNum12, AlphaNum4, Asset as XdrAsset};

use super::account::account_key;
use super::{ConcurrencyMode, FutureId, Loader, LoaderConfig};
use crate::error::DbError;
use crate::queries::{ColumnValues, LookupRow};
use crate::schema::ASSETS_TABLE;

pub const ASSET_TYPE_NATIVE: &str = "native";
pub const ASSET_TYPE_CREDIT_ALPHANUM4: &str = "credit_alphanum4";
pub const ASSET_TYPE_CREDIT_ALPHANUM12: &str = "credit_alphanum12";

/// A row of `history_assets`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: i64,
    pub asset_type: String,
    pub asset_code: String,
    pub asset_issuer: String,
}

impl LookupRow for Asset {
    fn from_pg_row(row: &postgres::Row) -> Result<Self, postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            asset_type: row.try_get("asset_type")?,
            asset_code: row.try_get("asset_code")?,
            asset_issuer: row.try_get("asset_issuer")?,
        })
    }

    fn from_sqlite_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            asset_type: row.get("asset_type")?,
            asset_code: row.get("asset_code")?,
            asset_issuer: row.get("asset_issuer")?,
        })
    }
}

/// Business key of an asset.
///
/// The native asset has an empty code and issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub asset_type: String,
    pub code: String,
    pub issuer: String,
}

impl AssetKey {
    pub fn native() -> Self {
        Self {
            asset_type: ASSET_TYPE_NATIVE.to_string(),
            code: String::new(),
            issuer: String::new(),
        }
    }

    /// A credit asset; the type follows from the code length.
    pub fn credit(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        let code = code.into();
        let asset_type = if code.len() <= 4 {
            ASSET_TYPE_CREDIT_ALPHANUM4
        } else {
            ASSET_TYPE_CREDIT_ALPHANUM12
        };
        Self {
            asset_type: asset_type.to_string(),
            code,
            issuer: issuer.into(),
        }
    }

    pub fn is_native(&self) -> bool {
        self.asset_type == ASSET_TYPE_NATIVE
    }

    /// Builds the key of an XDR asset.
    pub fn from_xdr(asset: &XdrAsset) -> Result<Self, DbError> {
        match asset {
            XdrAsset::Native => Ok(Self::native()),
            XdrAsset::CreditAlphanum4(AlphaNum4 { asset_code, issuer }) => Ok(Self {
                asset_type: ASSET_TYPE_CREDIT_ALPHANUM4.to_string(),
                code: trim_code(&asset_code.0)?,
                issuer: account_key(issuer),
            }),
            XdrAsset::CreditAlphanum12(AlphaNum12 { asset_code, issuer }) => Ok(Self {
                asset_type: ASSET_TYPE_CREDIT_ALPHANUM12.to_string(),
                code: trim_code(&asset_code.0)?,
                issuer: account_key(issuer),
            }),
        }
    }
}

/// Asset codes are right-padded with zero bytes.
fn trim_code(raw: &[u8]) -> Result<String, DbError> {
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    let code = std::str::from_utf8(&raw[..end])
        .map_err(|e| DbError::InvalidKey(format!("asset code is not UTF-8: {}", e)))?;
    Ok(code.to_string())
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            f.write_str(ASSET_TYPE_NATIVE)
        } else {
            write!(f, "{}/{}/{}", self.asset_type, self.code, self.issuer)
        }
    }
}

/// Parses `native` or `CODE:ISSUER`.
impl FromStr for AssetKey {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ASSET_TYPE_NATIVE {
            return Ok(Self::native());
        }
        let (code, issuer) = s.split_once(':').ok_or_else(|| {
            DbError::InvalidKey(format!("invalid asset {:?}, use 'native' or 'CODE:ISSUER'", s))
        })?;
        if code.is_empty() || code.len() > 12 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DbError::InvalidKey(format!("invalid asset code {:?}", code)));
        }
        stellar_strkey::ed25519::PublicKey::from_string(issuer)
            .map_err(|e| DbError::InvalidKey(format!("invalid asset issuer {:?}: {}", issuer, e)))?;
        Ok(Self::credit(code, issuer))
    }
}

/// Resolves asset triples to history asset ids.
pub type AssetLoader = Loader<AssetKey, Asset>;

/// The future history asset id of an asset.
pub type FutureAssetId = FutureId<AssetKey, Asset>;

impl Loader<AssetKey, Asset> {
    pub fn new(mode: ConcurrencyMode) -> Self {
        Loader::with_config(
            LoaderConfig {
                name: "AssetLoader",
                table: ASSETS_TABLE,
                columns_for_keys: asset_columns,
                mapping_from_row: |row| {
                    (
                        AssetKey {
                            asset_type: row.asset_type,
                            code: row.asset_code,
                            issuer: row.asset_issuer,
                        },
                        row.id,
                    )
                },
                // canonical string order
                compare: |a, b| a.to_string().cmp(&b.to_string()),
            },
            mode,
        )
    }
}

fn asset_columns(keys: &[AssetKey]) -> Vec<ColumnValues> {
    let mut codes = Vec::with_capacity(keys.len());
    let mut types = Vec::with_capacity(keys.len());
    let mut issuers = Vec::with_capacity(keys.len());
    for key in keys {
        codes.push(key.code.clone());
        types.push(key.asset_type.clone());
        issuers.push(key.issuer.clone());
    }
    vec![
        ColumnValues::new("asset_code", "character varying(12)", codes),
        ColumnValues::new("asset_type", "character varying(64)", types),
        ColumnValues::new("asset_issuer", "character varying(56)", issuers),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::RecordingSession;
    use crate::loader::LoaderStats;
    use stellar_xdr::curr::{AccountId, AssetCode12, AssetCode4, PublicKey, Uint256};

    fn issuer(seed: u8) -> String {
        stellar_strkey::ed25519::PublicKey([seed; 32]).to_string()
    }

    #[test]
    fn test_asset_key_display_and_parse() {
        assert_eq!(AssetKey::native().to_string(), "native");
        assert_eq!("native".parse::<AssetKey>().unwrap(), AssetKey::native());

        let usd = AssetKey::credit("USD", issuer(1));
        assert_eq!(usd.asset_type, ASSET_TYPE_CREDIT_ALPHANUM4);
        assert_eq!(usd.to_string(), format!("credit_alphanum4/USD/{}", issuer(1)));
        assert_eq!(
            format!("USD:{}", issuer(1)).parse::<AssetKey>().unwrap(),
            usd
        );

        let long = AssetKey::credit("LONGCODE", issuer(2));
        assert_eq!(long.asset_type, ASSET_TYPE_CREDIT_ALPHANUM12);

        assert!("USD".parse::<AssetKey>().is_err());
        assert!("USD:not-a-key".parse::<AssetKey>().is_err());
        assert!(format!("WAYTOOLONGCODE:{}", issuer(1)).parse::<AssetKey>().is_err());
    }

    #[test]
    fn test_asset_key_from_xdr() {
        let account = AccountId(PublicKey::PublicKeyTypeEd25519(Uint256([1; 32])));
        assert_eq!(
            AssetKey::from_xdr(&XdrAsset::Native).unwrap(),
            AssetKey::native()
        );

        let four = XdrAsset::CreditAlphanum4(AlphaNum4 {
            asset_code: AssetCode4(*b"USD\0"),
            issuer: account.clone(),
        });
        assert_eq!(
            AssetKey::from_xdr(&four).unwrap(),
            AssetKey::credit("USD", issuer(1))
        );

        let twelve = XdrAsset::CreditAlphanum12(AlphaNum12 {
            asset_code: AssetCode12(*b"LONGCODE\0\0\0\0"),
            issuer: account,
        });
        assert_eq!(
            AssetKey::from_xdr(&twelve).unwrap(),
            AssetKey::credit("LONGCODE", issuer(1))
        );
    }

    #[test]
    fn test_asset_columns_are_parallel() {
        let keys = vec![AssetKey::credit("EUR", issuer(3)), AssetKey::native()];
        let columns = asset_columns(&keys);
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].values, vec!["EUR".to_string(), String::new()]);
        assert_eq!(
            columns[1].values,
            vec!["credit_alphanum4".to_string(), "native".to_string()]
        );
        assert_eq!(columns[2].values, vec![issuer(3), String::new()]);
    }

    #[test]
    fn test_asset_loader() {
        let mut session = RecordingSession::new();
        let usd = AssetKey::credit("USD", issuer(1));
        let eur = AssetKey::credit("EUR", issuer(1));
        // Same code, different issuer is a different asset.
        let usd2 = AssetKey::credit("USD", issuer(2));

        let first = AssetLoader::new(ConcurrencyMode::ConcurrentInserts);
        for key in [&usd, &AssetKey::native(), &eur] {
            first.get_future(key.clone());
        }
        first.exec(&mut session).unwrap();
        assert_eq!(
            first.stats(),
            LoaderStats {
                total: 3,
                inserted: 3
            }
        );
        // Sent in canonical string order.
        let sent_types = &session.calls[0].columns[1].values;
        assert_eq!(sent_types[0], "credit_alphanum4");
        assert_eq!(session.calls[0].columns[0].values[0], "EUR");
        assert_eq!(sent_types[2], "native");

        let second = AssetLoader::new(ConcurrencyMode::ConcurrentDeletes);
        let future = second.get_future(usd.clone());
        second.get_future(usd2.clone());
        second.exec(&mut session).unwrap();
        assert_eq!(
            second.stats(),
            LoaderStats {
                total: 2,
                inserted: 1
            }
        );
        assert_eq!(future.value().unwrap(), first.get_now(&usd).unwrap());
        assert_ne!(
            second.get_now(&usd2).unwrap(),
            second.get_now(&usd).unwrap()
        );
    }

    #[test]
    fn test_asset_loader_large_batch() {
        let mut session = RecordingSession::new();
        let keys: Vec<AssetKey> = (0..20_000)
            .map(|i| AssetKey::credit(format!("A{:05}", i % 5_000), issuer((i / 5_000) as u8)))
            .collect();

        let first = AssetLoader::new(ConcurrencyMode::ConcurrentInserts);
        for key in &keys {
            first.get_future(key.clone());
        }
        first.exec(&mut session).unwrap();
        assert_eq!(
            first.stats(),
            LoaderStats {
                total: 20_000,
                inserted: 20_000
            }
        );

        // Every key is found by the fetch; nothing is left to insert.
        let second = AssetLoader::new(ConcurrencyMode::ConcurrentDeletes);
        for key in keys.iter().rev() {
            second.get_future(key.clone());
        }
        second.exec(&mut session).unwrap();
        assert_eq!(
            second.stats(),
            LoaderStats {
                total: 20_000,
                inserted: 0
            }
        );
        for key in keys.iter().step_by(997) {
            assert_eq!(first.get_now(key).unwrap(), second.get_now(key).unwrap());
        }
    }

    #[test]
    fn test_asset_batch_scans_json_once() {
        let session = RecordingSession::new();
        let keys = vec![AssetKey::credit("USD", issuer(1)), AssetKey::native()];
        let columns = asset_columns(&keys);
        let sql = crate::queries::bulk::sqlite_select_sql(
            ASSETS_TABLE,
            &columns,
            crate::queries::RowLock::None,
        );

        let mut stmt = session
            .conn
            .prepare(&format!("EXPLAIN QUERY PLAN {}", sql))
            .unwrap();
        let details: Vec<String> = stmt
            .query_map([r#"[["USD","credit_alphanum4","G"]]"#], |row| row.get(3))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        let json_scans = details
            .iter()
            .filter(|detail| detail.contains("json_each"))
            .count();
        assert_eq!(json_scans, 1, "plan: {:?}", details);
    }
}
