//! Hashed secondary indexes.
//!
//! Both hashed variants share one implementation, `HashedIndex`, and differ only
//! in the `BucketOrder` discipline applied inside each bucket:
//!
//! - `HashIndex`: equal keys grouped, linear search, driven by `Unordered`.
//! - `HashOrderedIndex`: buckets sorted by `less`, binary search, driven by
//!   `HashOrdered`.

mod bucket;
mod order;

pub use order::BucketOrder;

use std::collections::HashSet;
use std::iter::Copied;
use std::slice;

use crate::handle::Handle;
use crate::index::{IndexKind, RecordIndex};
use crate::predicate::{HashOrdered, Unordered};
use crate::store::RecordStore;
use bucket::HashBucket;
use multidex_common::{HashConfig, MAX_HASH_SIZE, MultidexError, Result};
use tracing::{debug, warn};

/// Hash index with grouped buckets.
pub type HashIndex<P, const CAP: usize> = HashedIndex<Unordered<P>, CAP>;

/// Hash index with sorted buckets.
pub type HashOrderedIndex<P, const CAP: usize> = HashedIndex<HashOrdered<P>, CAP>;

/// Bucket table of packed handle arrays.
///
/// A handle always lives in bucket `hash(record) % bucket_count`. Unless an
/// insertion asks to suppress it, the table grows before the insertion that
/// would push `len / bucket_count` above the configured load factor.
pub struct HashedIndex<O, const CAP: usize> {
    order: O,
    table: Vec<HashBucket<CAP>>,
    total: usize,
    max_load_factor: f32,
}

impl<O, const CAP: usize> HashedIndex<O, CAP> {
    /// Creates an empty index with `config.bucket_count()` buckets.
    pub fn new(order: O, config: HashConfig) -> Result<Self> {
        const { assert!(CAP > 0, "bucket capacity must be positive") };
        let table = Self::empty_table(config.bucket_count())?;
        Ok(Self {
            order,
            table,
            total: 0,
            max_load_factor: config.max_load_factor,
        })
    }

    fn empty_table(buckets: usize) -> Result<Vec<HashBucket<CAP>>> {
        let mut table = Vec::new();
        table
            .try_reserve_exact(buckets)
            .map_err(|_| MultidexError::out_of_memory("allocating hash table", buckets))?;
        table.resize_with(buckets, HashBucket::new);
        Ok(table)
    }

    /// Returns the current number of buckets.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.len()
    }

    /// Returns `len / bucket_count`.
    pub fn load_factor(&self) -> f32 {
        self.total as f32 / self.table.len() as f32
    }

    /// Returns the configured rehash threshold.
    pub fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    /// Returns the predicate wrapper driving this index.
    pub fn order(&self) -> &O {
        &self.order
    }

    fn exceeds_load(&self, items: usize, buckets: usize) -> bool {
        items as f64 / buckets as f64 > self.max_load_factor as f64
    }

    /// Smallest `n -> 2n + 1` successor of the current size that keeps `items`
    /// within the load factor. Fails without allocating if that size is past
    /// `MAX_HASH_SIZE`.
    fn grown_bucket_count(&self, items: usize) -> Result<usize> {
        let mut buckets = self.table.len();
        while self.exceeds_load(items, buckets) {
            buckets = buckets
                .checked_mul(2)
                .and_then(|n| n.checked_add(1))
                .filter(|n| *n <= MAX_HASH_SIZE)
                .ok_or_else(|| {
                    MultidexError::ConfigError(format!(
                        "{items} items at max_load_factor {} need more than {MAX_HASH_SIZE} buckets",
                        self.max_load_factor
                    ))
                })?;
        }
        Ok(buckets)
    }

    #[inline]
    fn bucket_of<T>(&self, record: &T, buckets: usize) -> usize
    where
        O: BucketOrder<T>,
    {
        self.order.hash(record) % buckets
    }

    /// Rebuilds the bucket table with `buckets` buckets.
    ///
    /// The new table is built completely before the old one is released. If any
    /// allocation fails the new table is dropped and the index is unchanged.
    pub fn rehash<T>(&mut self, store: &RecordStore<T>, buckets: usize) -> Result<()>
    where
        O: BucketOrder<T>,
    {
        let buckets = buckets.max(1);
        let kind = O::KIND;
        debug!(
            old_buckets = self.table.len(),
            new_buckets = buckets,
            items = self.total,
            kind = %kind,
            "Rehashing hash index"
        );

        let mut table = Self::empty_table(buckets)?;
        for bucket in &self.table {
            for handle in bucket.as_slice() {
                let record = &store[*handle];
                let target = &mut table[self.bucket_of(record, buckets)];
                let pos = self.order.insert_position(store, target.as_slice(), record);
                target.insert_at(pos, *handle)?;
            }
        }

        self.table = table;
        Ok(())
    }
}

impl<T, O: BucketOrder<T>, const CAP: usize> RecordIndex<T> for HashedIndex<O, CAP> {
    type Range<'a>
        = Copied<slice::Iter<'a, Handle>>
    where
        Self: 'a;

    type Iter<'a>
        = Iter<'a, CAP>
    where
        Self: 'a;

    const KIND: IndexKind = O::KIND;

    fn insert(&mut self, store: &RecordStore<T>, handle: Handle, suppress_rehash: bool) -> Result<()> {
        let record = store
            .get(handle)
            .ok_or_else(|| MultidexError::StaleHandle(handle.to_string()))?;

        if !suppress_rehash && self.exceeds_load(self.total + 1, self.table.len()) {
            let buckets = self.grown_bucket_count(self.total + 1)?;
            if let Err(err) = self.rehash(store, buckets) {
                warn!(buckets, error = %err, "Hash index rehash failed");
                return Err(err);
            }
        }

        let idx = self.bucket_of(record, self.table.len());
        let bucket = &mut self.table[idx];
        let pos = self.order.insert_position(store, bucket.as_slice(), record);
        if let Err(err) = bucket.insert_at(pos, handle) {
            warn!(bucket = idx, len = bucket.len(), error = %err, "Hash bucket growth failed");
            return Err(err);
        }
        self.total += 1;
        Ok(())
    }

    fn erase(&mut self, store: &RecordStore<T>, handle: Handle) -> usize {
        let Some(record) = store.get(handle) else {
            return 0;
        };
        let idx = self.bucket_of(record, self.table.len());
        let bucket = &mut self.table[idx];
        let range = self.order.key_range(store, bucket.as_slice(), record);
        if bucket.remove_in(range, handle) {
            self.total -= 1;
            1
        } else {
            0
        }
    }

    fn equal_range<'a>(&'a self, store: &RecordStore<T>, key: &T) -> Self::Range<'a> {
        let bucket = &self.table[self.bucket_of(key, self.table.len())];
        let range = self.order.key_range(store, bucket.as_slice(), key);
        bucket.as_slice()[range].iter().copied()
    }

    #[inline]
    fn is_equal(&self, a: &T, b: &T) -> bool {
        self.order.equal(a, b)
    }

    #[inline]
    fn len(&self) -> usize {
        self.total
    }

    fn clear(&mut self) {
        for bucket in &mut self.table {
            bucket.clear();
        }
        self.total = 0;
    }

    fn iter(&self) -> Self::Iter<'_> {
        Iter {
            buckets: self.table.iter(),
            current: Default::default(),
            remaining: self.total,
        }
    }

    fn verify(&self, store: &RecordStore<T>) -> Result<()> {
        if self.table.is_empty() {
            return Err(MultidexError::IndexCorrupted(
                "hash table has no buckets".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.total);
        let mut count = 0;
        for (idx, bucket) in self.table.iter().enumerate() {
            for handle in bucket.as_slice() {
                let record = store
                    .get(*handle)
                    .ok_or_else(|| MultidexError::StaleHandle(handle.to_string()))?;
                if !seen.insert(*handle) {
                    return Err(MultidexError::IndexCorrupted(format!(
                        "handle {handle} stored twice"
                    )));
                }
                let expected = self.bucket_of(record, self.table.len());
                if expected != idx {
                    return Err(MultidexError::IndexCorrupted(format!(
                        "handle {handle} in bucket {idx}, hashes to {expected}"
                    )));
                }
            }
            self.order.check_bucket(store, bucket.as_slice())?;
            count += bucket.len();
        }

        if count != self.total {
            return Err(MultidexError::IndexCorrupted(format!(
                "hash index counts {} items, buckets hold {count}",
                self.total
            )));
        }
        Ok(())
    }
}

/// Walks a hashed index bucket by bucket.
pub struct Iter<'a, const CAP: usize> {
    buckets: slice::Iter<'a, HashBucket<CAP>>,
    current: slice::Iter<'a, Handle>,
    remaining: usize,
}

impl<const CAP: usize> Iterator for Iter<'_, CAP> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        loop {
            if let Some(handle) = self.current.next() {
                self.remaining -= 1;
                return Some(*handle);
            }
            self.current = self.buckets.next()?.as_slice().iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const CAP: usize> ExactSizeIterator for Iter<'_, CAP> {}
