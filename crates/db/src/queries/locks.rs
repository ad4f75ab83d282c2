//! Advisory lock coordination.
//!
//! Maintenance jobs (state verification, history reaping, lookup-table
//! reaping) must run on at most one node of a cluster at a time. Instead of
//! a coordinator service, each job takes a transaction-scoped advisory lock
//! keyed by a fixed integer. The attempt never blocks: a node that loses the
//! race skips the job for this round. The lock is released when the
//! transaction commits or rolls back.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use super::Session;
use crate::error::DbError;

/// Advisory lock id for state verification.
pub const STATE_VERIFICATION_LOCK_ID: i64 = 73897213;

/// Advisory lock id for the history reaper.
pub const REAPER_LOCK_ID: i64 = 944670730;

/// Advisory lock id for the lookup-table reaper.
pub const LOOKUP_TABLE_REAPER_LOCK_ID: i64 = 329518896;

/// A cluster-wide maintenance lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvisoryLock {
    StateVerification,
    Reaper,
    LookupTableReaper,
}

impl AdvisoryLock {
    pub const ALL: [AdvisoryLock; 3] = [
        AdvisoryLock::StateVerification,
        AdvisoryLock::Reaper,
        AdvisoryLock::LookupTableReaper,
    ];

    /// The integer the store locks on.
    pub const fn id(self) -> i64 {
        match self {
            AdvisoryLock::StateVerification => STATE_VERIFICATION_LOCK_ID,
            AdvisoryLock::Reaper => REAPER_LOCK_ID,
            AdvisoryLock::LookupTableReaper => LOOKUP_TABLE_REAPER_LOCK_ID,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AdvisoryLock::StateVerification => "state-verification",
            AdvisoryLock::Reaper => "reaper",
            AdvisoryLock::LookupTableReaper => "lookup-table-reaper",
        }
    }
}

impl fmt::Display for AdvisoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AdvisoryLock {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdvisoryLock::ALL
            .into_iter()
            .find(|lock| lock.name() == s)
            .ok_or_else(|| DbError::InvalidKey(format!("unknown advisory lock: {}", s)))
    }
}

/// Attempts to take `lock` for the rest of the session's transaction.
///
/// Returns `Ok(true)` when acquired and `Ok(false)` when another
/// transaction holds it. Fails with [`DbError::NotInTransaction`] when the
/// session has no open transaction, since a transaction-scoped lock taken
/// in autocommit mode would be released immediately.
pub fn try_lock<S: Session + ?Sized>(session: &mut S, lock: AdvisoryLock) -> Result<bool, DbError> {
    if !session.in_transaction() {
        return Err(DbError::NotInTransaction("advisory lock"));
    }
    let acquired = session.try_advisory_lock(lock)?;
    debug!(lock = %lock, id = lock.id(), acquired, "Advisory lock attempt");
    Ok(acquired)
}

/// Named maintenance locks, available on every [`Session`].
pub trait LockQueries: Session {
    /// Takes the state verification lock if it is free.
    fn try_state_verification_lock(&mut self) -> Result<bool, DbError> {
        try_lock(self, AdvisoryLock::StateVerification)
    }

    /// Takes the history reaper lock if it is free.
    fn try_reaper_lock(&mut self) -> Result<bool, DbError> {
        try_lock(self, AdvisoryLock::Reaper)
    }

    /// Takes the lookup-table reaper lock if it is free.
    fn try_lookup_table_reaper_lock(&mut self) -> Result<bool, DbError> {
        try_lock(self, AdvisoryLock::LookupTableReaper)
    }
}

impl<S: Session + ?Sized> LockQueries for S {}
