//! Shared contract of every secondary index.

use crate::handle::Handle;
use crate::store::RecordStore;
use multidex_common::Result;
use serde::{Deserialize, Serialize};

/// Index variant chosen for a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    /// Hash buckets, equal keys grouped.
    Unordered,
    /// Red-black tree of packed buckets, globally sorted.
    Ordered,
    /// Hash buckets kept sorted by the comparator.
    HashOrdered,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::Unordered => write!(f, "unordered"),
            IndexKind::Ordered => write!(f, "ordered"),
            IndexKind::HashOrdered => write!(f, "hash-ordered"),
        }
    }
}

/// A secondary index over the records of a `RecordStore`.
///
/// Indexes hold handles only. Every method that needs a record's key reads it
/// through the store passed in, so the record a handle names must still be in
/// the store whenever that handle is inserted or erased.
pub trait RecordIndex<T> {
    /// Equal-key range returned by `equal_range`.
    type Range<'a>: Iterator<Item = Handle>
    where
        Self: 'a;

    /// Full traversal in the index's native order.
    type Iter<'a>: Iterator<Item = Handle>
    where
        Self: 'a;

    /// Variant implemented by this index.
    const KIND: IndexKind;

    /// Inserts `handle`. A hashed index may rehash first unless
    /// `suppress_rehash` is set. On error the index is unchanged.
    fn insert(&mut self, store: &RecordStore<T>, handle: Handle, suppress_rehash: bool)
    -> Result<()>;

    /// Removes exactly `handle`, matched by identity. Returns 1 if it was
    /// present and 0 otherwise.
    fn erase(&mut self, store: &RecordStore<T>, handle: Handle) -> usize;

    /// Returns every handle whose record carries the same key as `key`.
    fn equal_range<'a>(&'a self, store: &RecordStore<T>, key: &T) -> Self::Range<'a>;

    /// Returns the first handle of `equal_range(key)`.
    fn find(&self, store: &RecordStore<T>, key: &T) -> Option<Handle> {
        self.equal_range(store, key).next()
    }

    /// Returns true if `a` and `b` carry the same key for this index.
    fn is_equal(&self, a: &T, b: &T) -> bool;

    /// Variant implemented by this index.
    fn kind(&self) -> IndexKind {
        Self::KIND
    }

    /// Number of handles held.
    fn len(&self) -> usize;

    /// Returns true if the index holds no handles.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every handle.
    fn clear(&mut self);

    /// Walks every handle in native order.
    fn iter(&self) -> Self::Iter<'_>;

    /// Checks every structural invariant of the index against `store`.
    fn verify(&self, store: &RecordStore<T>) -> Result<()>;
}
