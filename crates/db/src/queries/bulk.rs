//! Bulk Resolution Protocol.
//!
//! Both operations take a batch of keys already split into parallel column
//! arrays ([`ColumnValues`]), one array per key column. Each array is bound
//! as a single statement parameter and expanded into rows by the store, so
//! a batch of any size costs one round trip and one parameter per column.
//!
//! PostgreSQL expands arrays with `unnest`:
//!
//! ```sql
//! WITH rows AS
//!     (SELECT unnest($1::character varying(12)[]) /* asset_code */,
//!             unnest($2::character varying(64)[]) /* asset_type */, ...)
//! INSERT INTO history_assets (asset_code,asset_type,...)
//! SELECT * FROM rows
//! ON CONFLICT (asset_code,asset_type,...) DO NOTHING
//! RETURNING *
//! ```
//!
//! SQLite has no array type, so the batch is bound as one JSON array of
//! row tuples and expanded with a single `json_each`, one key per element.

use postgres::types::ToSql;
use postgres::GenericClient;

use crate::error::DbError;

/// One key column of a batch: its name, its SQL type and one value per key.
///
/// All value arrays passed to a bulk operation have the same length; the
/// i-th entries of every array together form the i-th key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValues {
    /// Column name in the lookup table.
    pub name: &'static str,
    /// PostgreSQL column type, used to cast the bound array.
    pub db_type: &'static str,
    /// One value per key, in key order.
    pub values: Vec<String>,
}

impl ColumnValues {
    pub fn new(name: &'static str, db_type: &'static str, values: Vec<String>) -> Self {
        Self {
            name,
            db_type,
            values,
        }
    }
}

/// Row-level lock taken by a bulk fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLock {
    /// Plain read.
    #[default]
    None,
    /// `FOR KEY SHARE`: matched rows cannot be deleted until the
    /// transaction ends.
    KeyShare,
}

/// A lookup-table row as returned by the store.
///
/// Rows are decoded by column name because bulk statements select `*`.
pub trait LookupRow: Sized {
    /// Decodes a PostgreSQL row.
    fn from_pg_row(row: &postgres::Row) -> Result<Self, postgres::Error>;

    /// Decodes a SQLite row.
    fn from_sqlite_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

fn column_list(columns: &[ColumnValues]) -> String {
    columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(",")
}

fn pg_unnest_list(columns: &[ColumnValues]) -> String {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            format!(
                "unnest(${}::{}[]) /* {} */",
                i + 1,
                column.db_type,
                column.name
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the PostgreSQL conditional insert statement.
pub fn postgres_insert_sql(table: &str, columns: &[ColumnValues]) -> String {
    let names = column_list(columns);
    format!(
        "WITH rows AS (SELECT {}) INSERT INTO {} ({}) SELECT * FROM rows \
         ON CONFLICT ({}) DO NOTHING RETURNING *",
        pg_unnest_list(columns),
        table,
        names,
        names
    )
}

/// Builds the PostgreSQL conditional fetch statement.
///
/// With [`RowLock::KeyShare`] the rows are locked in id order so that
/// concurrent lockers acquire them in the same sequence.
pub fn postgres_select_sql(table: &str, columns: &[ColumnValues], lock: RowLock) -> String {
    let mut sql = format!(
        "SELECT * FROM {} WHERE ({}) IN (SELECT {})",
        table,
        column_list(columns),
        pg_unnest_list(columns)
    );
    if lock == RowLock::KeyShare {
        sql.push_str(" ORDER BY id ASC FOR KEY SHARE");
    }
    sql
}

fn sqlite_source(columns: &[ColumnValues]) -> String {
    let values = (0..columns.len())
        .map(|i| format!("json_extract(value, '$[{}]')", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM json_each(?1)", values)
}

/// Builds the SQLite conditional insert statement.
///
/// The `WHERE true` keeps SQLite from parsing `ON CONFLICT` as a join
/// constraint of the `SELECT`.
pub fn sqlite_insert_sql(table: &str, columns: &[ColumnValues]) -> String {
    let names = column_list(columns);
    format!(
        "INSERT INTO {} ({}) {} WHERE true ON CONFLICT ({}) DO NOTHING RETURNING *",
        table,
        names,
        sqlite_source(columns),
        names
    )
}

/// Builds the SQLite conditional fetch statement.
///
/// SQLite holds the database write lock for the rest of a write
/// transaction, so a key-share request needs no row lock.
pub fn sqlite_select_sql(table: &str, columns: &[ColumnValues], _lock: RowLock) -> String {
    format!(
        "SELECT * FROM {} WHERE ({}) IN ({}) ORDER BY id ASC",
        table,
        column_list(columns),
        sqlite_source(columns)
    )
}

fn pg_params(columns: &[ColumnValues]) -> Vec<&(dyn ToSql + Sync)> {
    columns
        .iter()
        .map(|column| &column.values as &(dyn ToSql + Sync))
        .collect()
}

pub(crate) fn pg_bulk_insert<C: GenericClient, T: LookupRow>(
    client: &mut C,
    table: &str,
    columns: &[ColumnValues],
) -> Result<Vec<T>, DbError> {
    let sql = postgres_insert_sql(table, columns);
    let rows = client.query(sql.as_str(), &pg_params(columns))?;
    rows.iter()
        .map(|row| T::from_pg_row(row).map_err(DbError::from))
        .collect()
}

pub(crate) fn pg_bulk_get<C: GenericClient, T: LookupRow>(
    client: &mut C,
    table: &str,
    columns: &[ColumnValues],
    lock: RowLock,
) -> Result<Vec<T>, DbError> {
    let sql = postgres_select_sql(table, columns, lock);
    let rows = client.query(sql.as_str(), &pg_params(columns))?;
    rows.iter()
        .map(|row| T::from_pg_row(row).map_err(DbError::from))
        .collect()
}

/// Transposes the column arrays into `[[c0, c1, ...], ...]`, one tuple per key.
fn json_rows(columns: &[ColumnValues]) -> Result<String, DbError> {
    let len = columns.first().map_or(0, |column| column.values.len());
    if let Some(column) = columns.iter().find(|column| column.values.len() != len) {
        return Err(DbError::InvalidKey(format!(
            "column {} has {} values, expected {}",
            column.name,
            column.values.len(),
            len
        )));
    }
    let rows: Vec<Vec<&str>> = (0..len)
        .map(|i| columns.iter().map(|column| column.values[i].as_str()).collect())
        .collect();
    Ok(serde_json::to_string(&rows)?)
}

fn sqlite_query<T: LookupRow>(
    conn: &rusqlite::Connection,
    sql: &str,
    columns: &[ColumnValues],
) -> Result<Vec<T>, DbError> {
    let rows_json = json_rows(columns)?;
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([rows_json], |row| T::from_sqlite_row(row))?
        .collect::<rusqlite::Result<Vec<T>>>()?;
    Ok(rows)
}

pub(crate) fn sqlite_bulk_insert<T: LookupRow>(
    conn: &rusqlite::Connection,
    table: &str,
    columns: &[ColumnValues],
) -> Result<Vec<T>, DbError> {
    sqlite_query(conn, &sqlite_insert_sql(table, columns), columns)
}

pub(crate) fn sqlite_bulk_get<T: LookupRow>(
    conn: &rusqlite::Connection,
    table: &str,
    columns: &[ColumnValues],
    lock: RowLock,
) -> Result<Vec<T>, DbError> {
    sqlite_query(conn, &sqlite_select_sql(table, columns, lock), columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset_columns() -> Vec<ColumnValues> {
        vec![
            ColumnValues::new("asset_code", "character varying(12)", vec!["USD".into()]),
            ColumnValues::new("asset_type", "character varying(64)", vec!["credit_alphanum4".into()]),
            ColumnValues::new("asset_issuer", "character varying(56)", vec!["GABC".into()]),
        ]
    }

    #[test]
    fn test_postgres_insert_sql() {
        let sql = postgres_insert_sql("history_assets", &asset_columns());
        assert_eq!(
            sql,
            "WITH rows AS (SELECT unnest($1::character varying(12)[]) /* asset_code */,\
             unnest($2::character varying(64)[]) /* asset_type */,\
             unnest($3::character varying(56)[]) /* asset_issuer */) \
             INSERT INTO history_assets (asset_code,asset_type,asset_issuer) SELECT * FROM rows \
             ON CONFLICT (asset_code,asset_type,asset_issuer) DO NOTHING RETURNING *"
        );
    }

    #[test]
    fn test_postgres_select_sql_lock_suffix() {
        let columns = vec![ColumnValues::new(
            "address",
            "character varying(64)",
            vec!["GA".into()],
        )];
        let plain = postgres_select_sql("history_accounts", &columns, RowLock::None);
        assert_eq!(
            plain,
            "SELECT * FROM history_accounts WHERE (address) IN \
             (SELECT unnest($1::character varying(64)[]) /* address */)"
        );

        let locked = postgres_select_sql("history_accounts", &columns, RowLock::KeyShare);
        assert!(locked.starts_with(&plain));
        assert!(locked.ends_with(" ORDER BY id ASC FOR KEY SHARE"));
    }

    #[test]
    fn test_sqlite_sql_expands_one_tuple_array() {
        let sql = sqlite_insert_sql("history_assets", &asset_columns());
        assert_eq!(
            sql,
            "INSERT INTO history_assets (asset_code,asset_type,asset_issuer) \
             SELECT json_extract(value, '$[0]'), json_extract(value, '$[1]'), \
             json_extract(value, '$[2]') FROM json_each(?1) \
             WHERE true ON CONFLICT (asset_code,asset_type,asset_issuer) DO NOTHING RETURNING *"
        );

        let select = sqlite_select_sql("history_assets", &asset_columns(), RowLock::KeyShare);
        assert!(select.starts_with(
            "SELECT * FROM history_assets WHERE (asset_code,asset_type,asset_issuer) IN (SELECT"
        ));
        assert_eq!(select.matches("json_each").count(), 1);
        assert!(!select.contains("FOR KEY SHARE"));
    }

    #[test]
    fn test_json_rows_one_tuple_per_key() {
        let columns = vec![
            ColumnValues::new("asset_code", "character varying(12)", vec!["USD".into(), "".into()]),
            ColumnValues::new(
                "asset_type",
                "character varying(64)",
                vec!["credit_alphanum4".into(), "native".into()],
            ),
            ColumnValues::new("asset_issuer", "character varying(56)", vec!["GABC".into(), "".into()]),
        ];
        assert_eq!(
            json_rows(&columns).unwrap(),
            r#"[["USD","credit_alphanum4","GABC"],["","native",""]]"#
        );
    }

    #[test]
    fn test_json_rows_rejects_ragged_columns() {
        let columns = vec![
            ColumnValues::new("asset_code", "text", vec!["USD".into(), "EUR".into()]),
            ColumnValues::new("asset_type", "text", vec!["credit_alphanum4".into()]),
        ];
        assert!(matches!(json_rows(&columns), Err(DbError::InvalidKey(_))));
    }
}
