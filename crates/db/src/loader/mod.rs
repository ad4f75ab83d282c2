//! Lookup-table id resolution.
//!
//! History rows reference accounts, assets, claimable balances and liquidity
//! pools by small integer ids stored in dedicated lookup tables. A
//! [`Loader`] collects the business keys a batch of history rows needs,
//! resolves all of them in one pass against the store, and hands out
//! [`FutureId`]s that yield the id once resolution has happened.
//!
//! # Lifecycle
//!
//! 1. Create a loader (open).
//! 2. Call [`Loader::get_future`] for every key while building rows. Keys
//!    are deduplicated; no I/O happens.
//! 3. Call [`Loader::exec`] once inside the caller's transaction. This
//!    seals the loader and resolves every registered key.
//! 4. Read ids through [`Loader::get_now`] or [`FutureId::value`].
//!
//! Registering a key after `exec` is a programming error and panics.
//! Reading an id before `exec` returns [`DbError::LoaderNotSealed`].
//!
//! # Concurrency modes
//!
//! Several ingestion processes may write to the same lookup tables while a
//! reaper deletes unreferenced rows. A loader runs in exactly one of two
//! modes, each safe against one kind of concurrent writer:
//!
//! - [`ConcurrencyMode::ConcurrentInserts`]: insert first, then fetch the
//!   keys that already existed. Safe with other inserters, not with a
//!   concurrent reaper (a fetched row may be deleted before commit).
//! - [`ConcurrencyMode::ConcurrentDeletes`]: fetch first with a key-share
//!   lock, then insert the keys that were missing. Safe with a concurrent
//!   reaper, not with other inserters.
//!
//! Keys are always sorted before they reach the store, so two transactions
//! inserting overlapping key sets take their row locks in the same order
//! and cannot deadlock.

pub mod account;
pub mod asset;
pub mod claimable_balance;
pub mod future;
pub mod liquidity_pool;
pub mod stats;
pub mod stub;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DbError;
use crate::queries::{ColumnValues, LookupRow, RowLock, Session};

pub use future::FutureId;
pub use stats::{collect_stats, LoaderReport, LoaderStats};
pub use stub::LoaderStub;

/// Which concurrent writer a loader is safe against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// Safe with concurrent inserters, unsafe with a concurrent reaper.
    ConcurrentInserts,
    /// Safe with a concurrent reaper, unsafe with concurrent inserters.
    ConcurrentDeletes,
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::ConcurrentInserts => f.write_str("ConcurrentInserts"),
            ConcurrencyMode::ConcurrentDeletes => f.write_str("ConcurrentDeletes"),
        }
    }
}

/// Table-specific behaviour of a loader.
///
/// Every field is a plain function so a configuration is a constant.
pub struct LoaderConfig<K, T> {
    /// Loader name used in logs, errors and stats.
    pub name: &'static str,
    /// Lookup table the loader resolves against.
    pub table: &'static str,
    /// Splits a key batch into one value array per key column.
    pub columns_for_keys: fn(&[K]) -> Vec<ColumnValues>,
    /// Extracts the key and id from a returned row.
    pub mapping_from_row: fn(T) -> (K, i64),
    /// Global key order used before any batched mutation.
    pub compare: fn(&K, &K) -> Ordering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Open,
    Sealed,
}

/// State shared between a loader and its futures.
pub(crate) struct LoaderInner<K> {
    state: LoaderState,
    pending: HashSet<K>,
    ids: HashMap<K, i64>,
    stats: LoaderStats,
}

impl<K: Eq + Hash> LoaderInner<K> {
    fn new() -> Self {
        Self {
            state: LoaderState::Open,
            pending: HashSet::new(),
            ids: HashMap::new(),
            stats: LoaderStats::default(),
        }
    }

    pub(crate) fn get(&self, name: &'static str, key: &K) -> Result<i64, DbError>
    where
        K: fmt::Display,
    {
        if self.state == LoaderState::Open {
            return Err(DbError::LoaderNotSealed {
                loader: name,
                key: key.to_string(),
            });
        }
        self.ids.get(key).copied().ok_or_else(|| DbError::UnknownKey {
            loader: name,
            key: key.to_string(),
        })
    }
}

/// Resolves business keys of type `K` to lookup-table ids, reading rows of
/// type `T`.
///
/// A loader is single use: it is sealed by the first [`exec`](Self::exec)
/// and only answers reads afterwards.
pub struct Loader<K, T> {
    config: LoaderConfig<K, T>,
    mode: ConcurrencyMode,
    inner: Arc<RwLock<LoaderInner<K>>>,
}

impl<K, T> Loader<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: LookupRow,
{
    /// Creates an open loader for the table described by `config`.
    pub fn with_config(config: LoaderConfig<K, T>, mode: ConcurrencyMode) -> Self {
        Self {
            config,
            mode,
            inner: Arc::new(RwLock::new(LoaderInner::new())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn table(&self) -> &'static str {
        self.config.table
    }

    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Returns true once [`exec`](Self::exec) has been called.
    pub fn is_sealed(&self) -> bool {
        self.inner.read().state == LoaderState::Sealed
    }

    /// Registers `key` for resolution and returns a future for its id.
    ///
    /// Registering the same key twice is harmless and yields equal futures.
    ///
    /// # Panics
    ///
    /// Panics if the loader is already sealed.
    pub fn get_future(&self, key: K) -> FutureId<K, T> {
        let mut inner = self.inner.write();
        if inner.state == LoaderState::Sealed {
            panic!(
                "cannot register more entries to {} after calling exec",
                self.config.name
            );
        }
        inner.pending.insert(key.clone());
        FutureId::new(key, Arc::downgrade(&self.inner), self.config.name)
    }

    /// Returns the id of a resolved key.
    ///
    /// Fails if the loader is not sealed yet, or if `key` was never
    /// registered or could not be resolved.
    pub fn get_now(&self, key: &K) -> Result<i64, DbError> {
        self.inner.read().get(self.config.name, key)
    }

    /// Counters for the keys resolved so far.
    pub fn stats(&self) -> LoaderStats {
        self.inner.read().stats
    }

    /// Seals the loader and resolves every registered key against
    /// `session`.
    ///
    /// Runs inside the caller's transaction and never commits. On failure
    /// the loader stays sealed with whatever ids were resolved before the
    /// failing statement. Calling `exec` on a sealed loader does nothing.
    pub fn exec<S: Session + ?Sized>(&self, session: &mut S) -> Result<(), DbError> {
        let mut keys: Vec<K> = {
            let mut inner = self.inner.write();
            if inner.state == LoaderState::Sealed {
                debug!(loader = self.config.name, "Loader already sealed, skipping exec");
                return Ok(());
            }
            inner.state = LoaderState::Sealed;
            inner.pending.drain().collect()
        };

        if keys.is_empty() {
            return Ok(());
        }

        keys.sort_by(self.config.compare);

        match self.mode {
            ConcurrencyMode::ConcurrentInserts => {
                // Inserting first means a key created by another writer
                // after our insert is still picked up by the fetch.
                self.insert(session, &keys)?;
                self.fetch(session, &keys, RowLock::None)?;
            }
            ConcurrencyMode::ConcurrentDeletes => {
                // The key-share lock keeps the reaper from deleting rows we
                // are about to reference.
                self.fetch(session, &keys, RowLock::KeyShare)?;
                self.insert(session, &keys)?;
            }
        }

        let stats = self.stats();
        debug!(
            loader = self.config.name,
            table = self.config.table,
            mode = %self.mode,
            keys = keys.len(),
            total = stats.total,
            inserted = stats.inserted,
            "Resolved lookup ids"
        );
        Ok(())
    }

    /// Keys with no resolved id yet, in input order.
    fn filter(&self, keys: &[K]) -> Vec<K> {
        let inner = self.inner.read();
        keys.iter()
            .filter(|key| !inner.ids.contains_key(*key))
            .cloned()
            .collect()
    }

    fn insert<S: Session + ?Sized>(&self, session: &mut S, keys: &[K]) -> Result<(), DbError> {
        let keys = self.filter(keys);
        if keys.is_empty() {
            return Ok(());
        }
        let columns = (self.config.columns_for_keys)(&keys);
        let rows: Vec<T> = session
            .bulk_insert(self.config.table, &columns)
            .map_err(|e| DbError::lookup("bulk insert", self.config.table, e))?;

        let mut inner = self.inner.write();
        inner.stats.total += rows.len();
        inner.stats.inserted += rows.len();
        self.merge(&mut inner, rows);
        Ok(())
    }

    fn fetch<S: Session + ?Sized>(
        &self,
        session: &mut S,
        keys: &[K],
        lock: RowLock,
    ) -> Result<(), DbError> {
        let keys = self.filter(keys);
        if keys.is_empty() {
            return Ok(());
        }
        let columns = (self.config.columns_for_keys)(&keys);
        let rows: Vec<T> = session
            .bulk_get(self.config.table, &columns, lock)
            .map_err(|e| DbError::lookup("bulk get", self.config.table, e))?;

        let mut inner = self.inner.write();
        inner.stats.total += rows.len();
        self.merge(&mut inner, rows);
        Ok(())
    }

    fn merge(&self, inner: &mut LoaderInner<K>, rows: Vec<T>) {
        for row in rows {
            let (key, id) = (self.config.mapping_from_row)(row);
            inner.ids.insert(key, id);
        }
    }

    /// Seals the loader and records `key -> id` without touching a store.
    pub(crate) fn insert_resolved(&self, key: K, id: i64) {
        let mut inner = self.inner.write();
        inner.state = LoaderState::Sealed;
        inner.pending.clear();
        inner.ids.insert(key, id);
    }
}

impl<K, T> LoaderReport for Loader<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: LookupRow,
{
    fn name(&self) -> &'static str {
        self.config.name
    }

    fn stats(&self) -> LoaderStats {
        Loader::stats(self)
    }
}
