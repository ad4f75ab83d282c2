//! Deferred lookup ids.

use std::error::Error;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Weak;

use bytes::BytesMut;
use parking_lot::RwLock;
use postgres::types::{to_sql_checked, IsNull, Type};
use rusqlite::types::ToSqlOutput;

use super::LoaderInner;
use crate::error::DbError;

/// The id a key will have once its loader has run.
///
/// A future does not keep its loader alive. It can be bound directly as a
/// statement parameter on either backend; the id is read when the
/// statement is serialized, so history rows can be built before `exec`
/// and inserted after it.
pub struct FutureId<K, T> {
    key: K,
    loader: Weak<RwLock<LoaderInner<K>>>,
    name: &'static str,
    _row: PhantomData<fn() -> T>,
}

impl<K, T> FutureId<K, T> {
    pub(crate) fn new(key: K, loader: Weak<RwLock<LoaderInner<K>>>, name: &'static str) -> Self {
        Self {
            key,
            loader,
            name,
            _row: PhantomData,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Name of the loader that issued this future.
    pub fn loader_name(&self) -> &'static str {
        self.name
    }
}

impl<K, T> FutureId<K, T>
where
    K: Eq + Hash + fmt::Display,
{
    /// Returns the resolved id.
    ///
    /// Fails like [`Loader::get_now`](super::Loader::get_now), or with
    /// [`DbError::LoaderDropped`] if the loader no longer exists.
    pub fn value(&self) -> Result<i64, DbError> {
        let loader = self
            .loader
            .upgrade()
            .ok_or(DbError::LoaderDropped { loader: self.name })?;
        let inner = loader.read();
        inner.get(self.name, &self.key)
    }
}

impl<K: Clone, T> Clone for FutureId<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            loader: self.loader.clone(),
            name: self.name,
            _row: PhantomData,
        }
    }
}

impl<K: PartialEq, T> PartialEq for FutureId<K, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.loader, &other.loader)
    }
}

impl<K: Eq, T> Eq for FutureId<K, T> {}

impl<K: fmt::Debug, T> fmt::Debug for FutureId<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureId")
            .field("loader", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

impl<K, T> postgres::types::ToSql for FutureId<K, T>
where
    K: Eq + Hash + fmt::Display + fmt::Debug,
{
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        let id = self.value()?;
        <i64 as postgres::types::ToSql>::to_sql(&id, ty, out)
    }

    fn accepts(ty: &Type) -> bool {
        <i64 as postgres::types::ToSql>::accepts(ty)
    }

    to_sql_checked!();
}

impl<K, T> rusqlite::types::ToSql for FutureId<K, T>
where
    K: Eq + Hash + fmt::Display,
{
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let id = self
            .value()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::account::AccountLoader;
    use crate::loader::test_support::RecordingSession;
    use crate::loader::ConcurrencyMode;

    #[test]
    fn test_futures_from_different_loaders_differ() {
        let a = AccountLoader::new(ConcurrencyMode::ConcurrentInserts);
        let b = AccountLoader::new(ConcurrencyMode::ConcurrentInserts);
        let fa = a.get_future("GA".to_string());
        let fb = b.get_future("GA".to_string());
        assert_ne!(fa, fb);
        assert_eq!(fa, fa.clone());
        assert_eq!(fa.key(), "GA");
        assert_eq!(fa.loader_name(), "AccountLoader");
    }

    #[test]
    fn test_value_after_loader_dropped() {
        let loader = AccountLoader::new(ConcurrencyMode::ConcurrentInserts);
        let future = loader.get_future("GA".to_string());
        drop(loader);
        assert!(matches!(
            future.value(),
            Err(DbError::LoaderDropped { .. })
        ));
    }

    #[test]
    fn test_bind_as_sqlite_parameter() {
        let mut session = RecordingSession::new();
        let loader = AccountLoader::new(ConcurrencyMode::ConcurrentInserts);
        let future = loader.get_future("GA".to_string());

        // Binding before exec fails at serialization time.
        let err = session
            .conn
            .query_row("SELECT ?1", [&future], |row| row.get::<_, i64>(0))
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::ToSqlConversionFailure(_)));

        loader.exec(&mut session).unwrap();
        let bound: i64 = session
            .conn
            .query_row("SELECT ?1", [&future], |row| row.get(0))
            .unwrap();
        assert_eq!(bound, future.value().unwrap());
    }

    #[test]
    fn test_postgres_accepts_bigint_only() {
        use postgres::types::ToSql;
        assert!(<crate::loader::account::FutureAccountId as ToSql>::accepts(&Type::INT8));
        assert!(!<crate::loader::account::FutureAccountId as ToSql>::accepts(&Type::TEXT));
    }
}
