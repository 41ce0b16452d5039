//! Bucket-local ordering disciplines for the hashed indexes.

use std::ops::Range;

use crate::handle::Handle;
use crate::index::IndexKind;
use crate::predicate::{HashOrdered, HashOrderedPredicate, Unordered, UnorderedPredicate};
use crate::store::RecordStore;
use multidex_common::{MultidexError, Result};

/// How handles are laid out inside one hash bucket.
///
/// `Unordered` groups equal keys together and searches linearly.
/// `HashOrdered` keeps the bucket sorted by `less` and binary-searches it.
pub trait BucketOrder<T> {
    /// Variant served by this discipline.
    const KIND: IndexKind;

    /// Hashes the key part of `record`.
    fn hash(&self, record: &T) -> usize;

    /// Key equality used by the index.
    fn equal(&self, a: &T, b: &T) -> bool;

    /// Returns the half-open range of `bucket` holding keys equal to `key`.
    fn key_range(&self, store: &RecordStore<T>, bucket: &[Handle], key: &T) -> Range<usize>;

    /// Returns where `record` goes in `bucket`. Equal keys stay contiguous and
    /// the new handle lands after any existing equal keys.
    fn insert_position(&self, store: &RecordStore<T>, bucket: &[Handle], record: &T) -> usize;

    /// Checks that `bucket` obeys the discipline.
    fn check_bucket(&self, store: &RecordStore<T>, bucket: &[Handle]) -> Result<()>;
}

impl<T, P: UnorderedPredicate<T>> BucketOrder<T> for Unordered<P> {
    const KIND: IndexKind = IndexKind::Unordered;

    #[inline]
    fn hash(&self, record: &T) -> usize {
        self.0.hash(record)
    }

    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        self.0.equal(a, b)
    }

    fn key_range(&self, store: &RecordStore<T>, bucket: &[Handle], key: &T) -> Range<usize> {
        let Some(lo) = bucket.iter().position(|h| self.0.equal(key, &store[*h])) else {
            return bucket.len()..bucket.len();
        };
        let hi = bucket[lo..]
            .iter()
            .position(|h| !self.0.equal(key, &store[*h]))
            .map_or(bucket.len(), |offset| lo + offset);
        lo..hi
    }

    fn insert_position(&self, store: &RecordStore<T>, bucket: &[Handle], record: &T) -> usize {
        self.key_range(store, bucket, record).end
    }

    fn check_bucket(&self, store: &RecordStore<T>, bucket: &[Handle]) -> Result<()> {
        for (i, h) in bucket.iter().enumerate() {
            if i == 0 || self.0.equal(&store[bucket[i - 1]], &store[*h]) {
                continue;
            }
            // A new group starts here: its key must not appear earlier.
            if bucket[..i - 1]
                .iter()
                .any(|prev| self.0.equal(&store[*prev], &store[*h]))
            {
                return Err(MultidexError::IndexCorrupted(format!(
                    "equal keys not grouped at bucket offset {i}"
                )));
            }
        }
        Ok(())
    }
}

impl<T, P: HashOrderedPredicate<T>> BucketOrder<T> for HashOrdered<P> {
    const KIND: IndexKind = IndexKind::HashOrdered;

    #[inline]
    fn hash(&self, record: &T) -> usize {
        self.0.hash(record)
    }

    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        self.0.equivalent(a, b)
    }

    fn key_range(&self, store: &RecordStore<T>, bucket: &[Handle], key: &T) -> Range<usize> {
        let lo = bucket.partition_point(|h| self.0.less(&store[*h], key));
        let hi = lo + bucket[lo..].partition_point(|h| !self.0.less(key, &store[*h]));
        lo..hi
    }

    fn insert_position(&self, store: &RecordStore<T>, bucket: &[Handle], record: &T) -> usize {
        bucket.partition_point(|h| !self.0.less(record, &store[*h]))
    }

    fn check_bucket(&self, store: &RecordStore<T>, bucket: &[Handle]) -> Result<()> {
        for (i, pair) in bucket.windows(2).enumerate() {
            if self.0.less(&store[pair[1]], &store[pair[0]]) {
                return Err(MultidexError::IndexCorrupted(format!(
                    "hash-ordered bucket out of order at offset {}",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tens;

    impl UnorderedPredicate<u32> for Tens {
        fn hash(&self, record: &u32) -> usize {
            (*record / 10) as usize
        }

        fn equal(&self, a: &u32, b: &u32) -> bool {
            a / 10 == b / 10
        }
    }

    impl HashOrderedPredicate<u32> for Tens {
        fn hash(&self, record: &u32) -> usize {
            (*record / 10) as usize
        }

        fn less(&self, a: &u32, b: &u32) -> bool {
            a / 10 < b / 10
        }
    }

    fn build(store: &mut RecordStore<u32>, values: &[u32]) -> Vec<Handle> {
        values.iter().map(|v| store.append(*v).unwrap()).collect()
    }

    #[test]
    fn test_grouped_key_range_linear_scan() {
        let mut store = RecordStore::new();
        let bucket = build(&mut store, &[51, 12, 15, 18, 33]);
        let order = Unordered(Tens);

        assert_eq!(order.key_range(&store, &bucket, &10), 1..4);
        assert_eq!(order.key_range(&store, &bucket, &50), 0..1);
        assert_eq!(order.key_range(&store, &bucket, &39), 4..5);
        assert_eq!(order.key_range(&store, &bucket, &70), 5..5);
    }

    #[test]
    fn test_grouped_insert_joins_group_end() {
        let mut store = RecordStore::new();
        let bucket = build(&mut store, &[51, 12, 15, 33]);
        let order = Unordered(Tens);

        assert_eq!(order.insert_position(&store, &bucket, &19), 3);
        assert_eq!(order.insert_position(&store, &bucket, &77), 4);
    }

    #[test]
    fn test_grouped_check_detects_split_group() {
        let mut store = RecordStore::new();
        let order = Unordered(Tens);
        let good = build(&mut store, &[51, 12, 15, 33]);
        assert!(order.check_bucket(&store, &good).is_ok());

        let bad = build(&mut store, &[12, 51, 15]);
        assert!(matches!(
            order.check_bucket(&store, &bad),
            Err(MultidexError::IndexCorrupted(_))
        ));
    }

    #[test]
    fn test_sorted_key_range_binary_search() {
        let mut store = RecordStore::new();
        let bucket = build(&mut store, &[3, 12, 15, 18, 33, 35]);
        let order = HashOrdered(Tens);

        assert_eq!(order.key_range(&store, &bucket, &10), 1..4);
        assert_eq!(order.key_range(&store, &bucket, &0), 0..1);
        assert_eq!(order.key_range(&store, &bucket, &30), 4..6);
        assert_eq!(order.key_range(&store, &bucket, &20), 4..4);
        assert_eq!(order.key_range(&store, &bucket, &90), 6..6);
    }

    #[test]
    fn test_sorted_insert_at_upper_bound() {
        let mut store = RecordStore::new();
        let bucket = build(&mut store, &[3, 12, 15, 33]);
        let order = HashOrdered(Tens);

        assert_eq!(order.insert_position(&store, &bucket, &11), 3);
        assert_eq!(order.insert_position(&store, &bucket, &0), 1);
        assert_eq!(order.insert_position(&store, &bucket, &25), 3);
        assert_eq!(order.insert_position(&store, &bucket, &99), 4);
    }

    #[test]
    fn test_sorted_check_detects_disorder() {
        let mut store = RecordStore::new();
        let order = HashOrdered(Tens);
        let bad = build(&mut store, &[12, 3]);
        assert!(order.check_bucket(&store, &bad).is_err());
        let good = build(&mut store, &[3, 12, 19]);
        assert!(order.check_bucket(&store, &good).is_ok());
    }
}
