//! Index predicates and the classifier that maps them onto index variants.
//!
//! A predicate decides how one index orders and groups records. Users implement
//! one of the three predicate traits and wrap the value in the matching marker
//! (`Unordered`, `Ordered` or `HashOrdered`). The marker selects the index
//! implementation at compile time; a predicate that does not implement the
//! trait its marker requires is rejected by the type checker.

use crate::hash::{HashIndex, HashOrderedIndex};
use crate::index::{IndexKind, RecordIndex};
use crate::ordered::OrderedIndex;
use multidex_common::{Result, TableConfig};

/// Predicate for a hash-only index.
pub trait UnorderedPredicate<T> {
    /// Hashes the key part of `record`.
    fn hash(&self, record: &T) -> usize;

    /// Returns true if `a` and `b` carry the same key.
    fn equal(&self, a: &T, b: &T) -> bool;
}

/// Predicate for a globally sorted index.
pub trait OrderedPredicate<T> {
    /// Strict weak ordering over the key part of records.
    fn less(&self, a: &T, b: &T) -> bool;

    /// Key equivalence derived from `less`.
    #[inline]
    fn equivalent(&self, a: &T, b: &T) -> bool {
        !self.less(a, b) && !self.less(b, a)
    }
}

/// Predicate for a hashed index whose buckets are kept sorted.
///
/// `hash` must agree with `less`: records that are equivalent under `less` must
/// hash to the same value.
pub trait HashOrderedPredicate<T> {
    /// Hashes the key part of `record`.
    fn hash(&self, record: &T) -> usize;

    /// Strict weak ordering over the key part of records.
    fn less(&self, a: &T, b: &T) -> bool;

    /// Key equivalence derived from `less`.
    #[inline]
    fn equivalent(&self, a: &T, b: &T) -> bool {
        !self.less(a, b) && !self.less(b, a)
    }
}

/// Marks a predicate as driving a `HashIndex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unordered<P>(pub P);

/// Marks a predicate as driving an `OrderedIndex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ordered<P>(pub P);

/// Marks a predicate as driving a `HashOrderedIndex`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashOrdered<P>(pub P);

/// Classifies a marked predicate into the index that serves it.
pub trait IndexPredicate<T, const CAP: usize>: Sized {
    /// Index variant selected by this predicate.
    const KIND: IndexKind;

    /// Concrete index type.
    type Index: RecordIndex<T>;

    /// Builds an empty index driven by this predicate.
    fn into_index(self, config: &TableConfig) -> Result<Self::Index>;
}

impl<T, P: UnorderedPredicate<T>, const CAP: usize> IndexPredicate<T, CAP> for Unordered<P> {
    const KIND: IndexKind = IndexKind::Unordered;
    type Index = HashIndex<P, CAP>;

    fn into_index(self, config: &TableConfig) -> Result<Self::Index> {
        HashIndex::new(self, config.hash_config())
    }
}

impl<T, P: HashOrderedPredicate<T>, const CAP: usize> IndexPredicate<T, CAP> for HashOrdered<P> {
    const KIND: IndexKind = IndexKind::HashOrdered;
    type Index = HashOrderedIndex<P, CAP>;

    fn into_index(self, config: &TableConfig) -> Result<Self::Index> {
        HashOrderedIndex::new(self, config.hash_config())
    }
}

impl<T, P: OrderedPredicate<T>, const CAP: usize> IndexPredicate<T, CAP> for Ordered<P> {
    const KIND: IndexKind = IndexKind::Ordered;
    type Index = OrderedIndex<P, CAP>;

    fn into_index(self, _config: &TableConfig) -> Result<Self::Index> {
        Ok(OrderedIndex::new(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ByValue;

    impl UnorderedPredicate<u32> for ByValue {
        fn hash(&self, record: &u32) -> usize {
            *record as usize
        }

        fn equal(&self, a: &u32, b: &u32) -> bool {
            a == b
        }
    }

    impl OrderedPredicate<u32> for ByValue {
        fn less(&self, a: &u32, b: &u32) -> bool {
            a < b
        }
    }

    impl HashOrderedPredicate<u32> for ByValue {
        fn hash(&self, record: &u32) -> usize {
            (*record / 10) as usize
        }

        fn less(&self, a: &u32, b: &u32) -> bool {
            a / 10 < b / 10
        }
    }

    fn kind_of<P: IndexPredicate<u32, 4>>(_: &P) -> IndexKind {
        P::KIND
    }

    #[test]
    fn test_classifier_maps_markers() {
        assert_eq!(kind_of(&Unordered(ByValue)), IndexKind::Unordered);
        assert_eq!(kind_of(&Ordered(ByValue)), IndexKind::Ordered);
        assert_eq!(kind_of(&HashOrdered(ByValue)), IndexKind::HashOrdered);
    }

    #[test]
    fn test_derived_equivalence() {
        assert!(OrderedPredicate::equivalent(&ByValue, &3u32, &3));
        assert!(!OrderedPredicate::equivalent(&ByValue, &3u32, &4));
        assert!(HashOrderedPredicate::equivalent(&ByValue, &31u32, &39));
        assert!(!HashOrderedPredicate::equivalent(&ByValue, &31u32, &41));
    }

    #[test]
    fn test_into_index_builds_empty_index() {
        let config = TableConfig::new(8, 1.0);
        let index = IndexPredicate::<u32, 4>::into_index(Unordered(ByValue), &config).unwrap();
        assert_eq!(RecordIndex::<u32>::len(&index), 0);
        assert_eq!(index.bucket_count(), 8);

        let index = IndexPredicate::<u32, 4>::into_index(Ordered(ByValue), &config).unwrap();
        assert_eq!(RecordIndex::<u32>::len(&index), 0);
        assert_eq!(index.node_count(), 0);
    }
}
