//! Loaders with hand-assigned ids.
//!
//! Code that builds history rows takes loaders and futures as inputs. A
//! [`LoaderStub`] lets tests of that code assign ids directly, without a
//! database.

use std::fmt;
use std::hash::Hash;

use super::{FutureId, Loader};
use crate::queries::LookupRow;

/// Wraps a loader whose ids are assigned by [`insert`](Self::insert).
pub struct LoaderStub<K, T> {
    loader: Loader<K, T>,
}

impl<K, T> LoaderStub<K, T>
where
    K: Eq + Hash + Clone + fmt::Display,
    T: LookupRow,
{
    pub fn new(loader: Loader<K, T>) -> Self {
        Self { loader }
    }

    /// Seals the wrapped loader and maps `key` to `id`.
    ///
    /// Futures for `key` obtained before the call resolve to `id`
    /// afterwards. Keys registered but never inserted stay unresolved.
    pub fn insert(&self, key: K, id: i64) {
        self.loader.insert_resolved(key, id);
    }

    pub fn loader(&self) -> &Loader<K, T> {
        &self.loader
    }

    /// Shortcut for `loader().get_future(key)`.
    pub fn get_future(&self, key: K) -> FutureId<K, T> {
        self.loader.get_future(key)
    }

    pub fn into_inner(self) -> Loader<K, T> {
        self.loader
    }
}
