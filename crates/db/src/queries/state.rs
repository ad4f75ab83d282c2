//! State queries for the lookupstate table.
//!
//! The `lookupstate` table is a simple key-value store holding metadata for
//! the lookup schema itself, most importantly the schema version used by
//! the [`migrations`](crate::migrations) module.
//!
//! See [`state_keys`] for well-known key constants.

use rusqlite::{params, OptionalExtension};

use crate::error::DbError;
use crate::schema::state_keys;

/// Query trait for the lookupstate key-value table.
///
/// Implemented for the connection and transaction types of both backends.
pub trait StateQueries {
    /// Retrieves a state value by key.
    ///
    /// Returns `None` if the key does not exist.
    fn get_state(&mut self, key: &str) -> Result<Option<String>, DbError>;

    /// Stores a state value, replacing any existing one.
    fn set_state(&mut self, key: &str, value: &str) -> Result<(), DbError>;

    /// Deletes a state value.
    ///
    /// This is a no-op if the key does not exist.
    fn delete_state(&mut self, key: &str) -> Result<(), DbError>;

    /// Returns the recorded schema version, if any.
    fn get_schema_version(&mut self) -> Result<Option<i32>, DbError> {
        match self.get_state(state_keys::DATABASE_SCHEMA)? {
            Some(s) => {
                let version = s.parse::<i32>().map_err(|e| {
                    DbError::Integrity(format!("Invalid schema version {:?}: {}", s, e))
                })?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    /// Records the schema version.
    fn set_schema_version(&mut self, version: i32) -> Result<(), DbError> {
        self.set_state(state_keys::DATABASE_SCHEMA, &version.to_string())
    }
}

fn sqlite_get_state(conn: &rusqlite::Connection, key: &str) -> Result<Option<String>, DbError> {
    let result = conn
        .query_row(
            "SELECT state FROM lookupstate WHERE statename = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(result)
}

fn sqlite_set_state(conn: &rusqlite::Connection, key: &str, value: &str) -> Result<(), DbError> {
    conn.execute(
        "INSERT OR REPLACE INTO lookupstate (statename, state) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn sqlite_delete_state(conn: &rusqlite::Connection, key: &str) -> Result<(), DbError> {
    conn.execute("DELETE FROM lookupstate WHERE statename = ?1", params![key])?;
    Ok(())
}

fn pg_get_state<C: postgres::GenericClient>(
    client: &mut C,
    key: &str,
) -> Result<Option<String>, DbError> {
    let row = client.query_opt(
        "SELECT state FROM lookupstate WHERE statename = $1",
        &[&key],
    )?;
    Ok(row.map(|row| row.try_get::<_, String>(0)).transpose()?)
}

fn pg_set_state<C: postgres::GenericClient>(
    client: &mut C,
    key: &str,
    value: &str,
) -> Result<(), DbError> {
    client.execute(
        "INSERT INTO lookupstate (statename, state) VALUES ($1, $2) \
         ON CONFLICT (statename) DO UPDATE SET state = EXCLUDED.state",
        &[&key, &value],
    )?;
    Ok(())
}

fn pg_delete_state<C: postgres::GenericClient>(client: &mut C, key: &str) -> Result<(), DbError> {
    client.execute("DELETE FROM lookupstate WHERE statename = $1", &[&key])?;
    Ok(())
}

impl StateQueries for rusqlite::Connection {
    fn get_state(&mut self, key: &str) -> Result<Option<String>, DbError> {
        sqlite_get_state(self, key)
    }

    fn set_state(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        sqlite_set_state(self, key, value)
    }

    fn delete_state(&mut self, key: &str) -> Result<(), DbError> {
        sqlite_delete_state(self, key)
    }
}

impl StateQueries for rusqlite::Transaction<'_> {
    fn get_state(&mut self, key: &str) -> Result<Option<String>, DbError> {
        sqlite_get_state(self, key)
    }

    fn set_state(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        sqlite_set_state(self, key, value)
    }

    fn delete_state(&mut self, key: &str) -> Result<(), DbError> {
        sqlite_delete_state(self, key)
    }
}

impl StateQueries for postgres::Client {
    fn get_state(&mut self, key: &str) -> Result<Option<String>, DbError> {
        pg_get_state(self, key)
    }

    fn set_state(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        pg_set_state(self, key, value)
    }

    fn delete_state(&mut self, key: &str) -> Result<(), DbError> {
        pg_delete_state(self, key)
    }
}

impl StateQueries for postgres::Transaction<'_> {
    fn get_state(&mut self, key: &str) -> Result<Option<String>, DbError> {
        pg_get_state(self, key)
    }

    fn set_state(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        pg_set_state(self, key, value)
    }

    fn delete_state(&mut self, key: &str) -> Result<(), DbError> {
        pg_delete_state(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE lookupstate (statename TEXT PRIMARY KEY, state TEXT NOT NULL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_get_set_state() {
        let mut conn = setup_db();

        assert!(conn.get_state("test_key").unwrap().is_none());

        conn.set_state("test_key", "test_value").unwrap();
        assert_eq!(
            conn.get_state("test_key").unwrap(),
            Some("test_value".to_string())
        );

        conn.set_state("test_key", "new_value").unwrap();
        assert_eq!(
            conn.get_state("test_key").unwrap(),
            Some("new_value".to_string())
        );
    }

    #[test]
    fn test_delete_state() {
        let mut conn = setup_db();

        conn.set_state("test_key", "test_value").unwrap();
        conn.delete_state("test_key").unwrap();
        assert!(conn.get_state("test_key").unwrap().is_none());

        // Deleting a missing key is fine
        conn.delete_state("test_key").unwrap();
    }

    #[test]
    fn test_schema_version() {
        let mut conn = setup_db();
        assert_eq!(conn.get_schema_version().unwrap(), None);

        conn.set_schema_version(2).unwrap();
        assert_eq!(conn.get_schema_version().unwrap(), Some(2));

        conn.set_state(state_keys::DATABASE_SCHEMA, "two").unwrap();
        assert!(matches!(
            conn.get_schema_version(),
            Err(DbError::Integrity(_))
        ));
    }

    #[test]
    fn test_state_inside_transaction() {
        let mut conn = setup_db();
        {
            let mut tx = conn.transaction().unwrap();
            tx.set_state("k", "v").unwrap();
            assert_eq!(tx.get_state("k").unwrap(), Some("v".to_string()));
            // dropped without commit
        }
        assert!(conn.get_state("k").unwrap().is_none());
    }
}
