//! Ordered secondary index: a red-black tree of packed handle buckets.
//!
//! Every tree node carries a sorted `PackedBucket` of up to `CAP` handles, and
//! an in-order walk concatenating the buckets yields records in non-decreasing
//! key order. A full node splits when a key lands inside its range; a small
//! leaf folds into its parent after an erase.
//!
//! ```text
//!                 [40 50 60]
//!                /          \
//!        [10 20 30]        [70 80]
//! ```

mod packed;
mod tree;

use std::collections::HashSet;

use crate::handle::Handle;
use crate::index::{IndexKind, RecordIndex};
use crate::predicate::OrderedPredicate;
use crate::store::RecordStore;
use multidex_common::{MultidexError, Result};
use packed::PackedBucket;
use tracing::{trace, warn};
use tree::{NIL, NodeId, RbTree, Side};

/// Position of one handle inside the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    node: NodeId,
    offset: usize,
}

impl Cursor {
    /// One past the last handle.
    const END: Cursor = Cursor {
        node: NIL,
        offset: 0,
    };

    fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Globally sorted index over the records of a store.
pub struct OrderedIndex<P, const CAP: usize> {
    pred: P,
    tree: RbTree<PackedBucket<CAP>>,
    total: usize,
}

impl<P, const CAP: usize> OrderedIndex<P, CAP> {
    /// Creates an empty index.
    pub fn new(pred: P) -> Self {
        const { assert!(CAP > 0, "bucket capacity must be positive") };
        Self {
            pred,
            tree: RbTree::new(),
            total: 0,
        }
    }

    /// Number of tree nodes currently allocated.
    pub fn node_count(&self) -> usize {
        self.tree.len()
    }

    /// Returns the predicate driving this index.
    pub fn predicate(&self) -> &P {
        &self.pred
    }

    /// Handles held per node in in-order sequence.
    pub fn node_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.tree.len());
        let mut node = self.tree.leftmost();
        while node != NIL {
            sizes.push(self.tree.value(node).len());
            node = self.tree.next(node);
        }
        sizes
    }

    /// Reverse-capable range covering the whole index.
    pub fn range_all(&self) -> OrderedRange<'_, CAP> {
        OrderedRange {
            tree: &self.tree,
            front: self.begin(),
            back: Cursor::END,
        }
    }

    fn begin(&self) -> Cursor {
        Cursor::new(self.tree.leftmost(), 0)
    }

    fn handle_at(&self, cursor: Cursor) -> Handle {
        self.tree.value(cursor.node).get(cursor.offset)
    }

    #[inline]
    fn less<T>(&self, a: &T, b: &T) -> bool
    where
        P: OrderedPredicate<T>,
    {
        self.pred.less(a, b)
    }

    /// Upper-bound offset of `record` in `node`.
    fn upper_offset<T>(&self, store: &RecordStore<T>, node: NodeId, record: &T) -> usize
    where
        P: OrderedPredicate<T>,
    {
        self.tree
            .value(node)
            .partition_point(|h| !self.less(record, &store[*h]))
    }

    /// Lower-bound offset of `key` in `node`.
    fn lower_offset<T>(&self, store: &RecordStore<T>, node: NodeId, key: &T) -> usize
    where
        P: OrderedPredicate<T>,
    {
        self.tree
            .value(node)
            .partition_point(|h| self.less(&store[*h], key))
    }

    #[inline]
    fn last_record<'s, T>(&self, store: &'s RecordStore<T>, node: NodeId) -> &'s T {
        &store[self.tree.value(node).last()]
    }

    /// Finds the `[lower, upper)` cursors for `key`.
    fn bounds<T>(&self, store: &RecordStore<T>, key: &T) -> (Cursor, Cursor)
    where
        P: OrderedPredicate<T>,
    {
        let mut x = self.tree.root();
        let mut lower = NIL;
        let mut upper = NIL;

        // First node whose last key is not below `key`, and an early upper
        // candidate if one shows up on the way.
        while x != NIL {
            let last = self.last_record(store, x);
            if self.less(last, key) {
                x = self.tree.right(x);
            } else {
                if upper == NIL && self.less(key, last) {
                    upper = x;
                }
                lower = x;
                x = self.tree.left(x);
            }
        }

        // Tighten the upper candidate.
        x = if upper == NIL {
            self.tree.root()
        } else {
            self.tree.left(upper)
        };
        while x != NIL {
            if self.less(key, self.last_record(store, x)) {
                upper = x;
                x = self.tree.left(x);
            } else {
                x = self.tree.right(x);
            }
        }

        let lo = if lower == NIL {
            Cursor::END
        } else {
            Cursor::new(lower, self.lower_offset(store, lower, key))
        };
        let hi = if upper == NIL {
            Cursor::END
        } else {
            Cursor::new(
                upper,
                self.tree
                    .value(upper)
                    .partition_point(|h| !self.less(key, &store[*h])),
            )
        };
        (lo, hi)
    }

    /// Picks the empty child slot adjacent to `w` on `side` in key order.
    fn neighbour_slot(&self, w: NodeId, side: Side) -> (NodeId, Side) {
        match side {
            Side::Left if self.tree.left(w) == NIL => (w, Side::Left),
            Side::Left => (self.tree.max(self.tree.left(w)), Side::Right),
            Side::Right if self.tree.right(w) == NIL => (w, Side::Right),
            Side::Right => (self.tree.min(self.tree.right(w)), Side::Left),
        }
    }

    fn insert_handle<T>(&mut self, store: &RecordStore<T>, handle: Handle, record: &T) -> Result<()>
    where
        P: OrderedPredicate<T>,
    {
        let mut x = self.tree.root();
        let mut w = NIL;
        let mut side = Side::Left;
        while x != NIL {
            w = x;
            let bucket = self.tree.value(x);
            if self.less(record, &store[bucket.first()]) {
                side = Side::Left;
                x = self.tree.left(x);
            } else if self.less(&store[bucket.last()], record) || CAP == 1 {
                side = Side::Right;
                x = self.tree.right(x);
            } else {
                break;
            }
        }

        if w == NIL {
            self.tree.attach(NIL, Side::Left, PackedBucket::with(handle))?;
        } else if !self.tree.value(w).is_full() {
            let pos = self.upper_offset(store, w, record);
            self.tree.value_mut(w).insert_at(pos, handle);
        } else if CAP > 1 {
            let pos = self.upper_offset(store, w, record);
            let mut kept = *self.tree.value(w);
            let (split_side, sibling) = kept.split_insert(pos, handle);
            let (parent, slot) = self.neighbour_slot(w, split_side);
            let new_node = self.tree.attach(parent, slot, sibling)?;
            *self.tree.value_mut(w) = kept;
            trace!(
                node = w,
                sibling = new_node,
                side = ?split_side,
                kept = kept.len(),
                moved = sibling.len(),
                "Split ordered index node"
            );
        } else {
            self.tree.attach(w, side, PackedBucket::with(handle))?;
        }

        self.total += 1;
        Ok(())
    }

    fn remove_at(&mut self, cursor: Cursor) {
        let node = cursor.node;
        if self.tree.value(node).len() == 1 {
            self.tree.remove(node);
        } else {
            self.tree.value_mut(node).remove_at(cursor.offset);
            self.try_merge(node);
        }
        self.total -= 1;
    }

    /// Folds a small leaf-side node into its parent.
    fn try_merge(&mut self, node: NodeId) {
        if node == self.tree.root() {
            return;
        }
        let parent = self.tree.parent(node);
        let half = CAP / 2;
        let moved = *self.tree.value(node);
        if moved.len() >= half || self.tree.value(parent).len() >= half {
            return;
        }

        if node == self.tree.left(parent) && self.tree.right(node) == NIL {
            self.tree.value_mut(parent).prepend(&moved);
        } else if node == self.tree.right(parent) && self.tree.left(node) == NIL {
            self.tree.value_mut(parent).append(&moved);
        } else {
            return;
        }
        self.tree.remove(node);
        trace!(
            node,
            parent,
            moved = moved.len(),
            parent_len = self.tree.value(parent).len(),
            "Merged ordered index node into parent"
        );
    }
}

impl<T, P: OrderedPredicate<T>, const CAP: usize> RecordIndex<T> for OrderedIndex<P, CAP> {
    type Range<'a>
        = OrderedRange<'a, CAP>
    where
        Self: 'a;

    type Iter<'a>
        = OrderedRange<'a, CAP>
    where
        Self: 'a;

    const KIND: IndexKind = IndexKind::Ordered;

    fn insert(&mut self, store: &RecordStore<T>, handle: Handle, _suppress_rehash: bool) -> Result<()> {
        let record = store
            .get(handle)
            .ok_or_else(|| MultidexError::StaleHandle(handle.to_string()))?;
        self.insert_handle(store, handle, record).inspect_err(|err| {
            warn!(nodes = self.tree.len(), error = %err, "Ordered index insert failed");
        })
    }

    fn erase(&mut self, store: &RecordStore<T>, handle: Handle) -> usize {
        let Some(record) = store.get(handle) else {
            return 0;
        };
        let (lo, hi) = self.bounds(store, record);
        let found = OrderedRange {
            tree: &self.tree,
            front: lo,
            back: hi,
        }
        .cursors()
        .find(|c| self.handle_at(*c) == handle);

        match found {
            Some(cursor) => {
                self.remove_at(cursor);
                1
            }
            None => 0,
        }
    }

    fn equal_range<'a>(&'a self, store: &RecordStore<T>, key: &T) -> Self::Range<'a> {
        let (front, back) = self.bounds(store, key);
        OrderedRange {
            tree: &self.tree,
            front,
            back,
        }
    }

    fn find(&self, store: &RecordStore<T>, key: &T) -> Option<Handle> {
        let mut x = self.tree.root();
        let mut lower = NIL;
        while x != NIL {
            if self.less(self.last_record(store, x), key) {
                x = self.tree.right(x);
            } else {
                lower = x;
                x = self.tree.left(x);
            }
        }
        if lower == NIL {
            return None;
        }
        let handle = self
            .tree
            .value(lower)
            .get(self.lower_offset(store, lower, key));
        (!self.less(key, &store[handle])).then_some(handle)
    }

    #[inline]
    fn is_equal(&self, a: &T, b: &T) -> bool {
        self.pred.equivalent(a, b)
    }

    #[inline]
    fn len(&self) -> usize {
        self.total
    }

    fn clear(&mut self) {
        self.tree.clear();
        self.total = 0;
    }

    fn iter(&self) -> Self::Iter<'_> {
        self.range_all()
    }

    fn verify(&self, store: &RecordStore<T>) -> Result<()> {
        self.tree.check()?;

        let mut seen = HashSet::with_capacity(self.total);
        let mut prev: Option<&T> = None;
        let mut count = 0;
        let mut node = self.tree.leftmost();
        while node != NIL {
            let bucket = self.tree.value(node);
            if bucket.is_empty() {
                return Err(MultidexError::IndexCorrupted(format!(
                    "tree node {node} holds no handles"
                )));
            }
            for handle in bucket.as_slice() {
                let record = store
                    .get(*handle)
                    .ok_or_else(|| MultidexError::StaleHandle(handle.to_string()))?;
                if !seen.insert(*handle) {
                    return Err(MultidexError::IndexCorrupted(format!(
                        "handle {handle} stored twice"
                    )));
                }
                if prev.is_some_and(|p| self.less(record, p)) {
                    return Err(MultidexError::IndexCorrupted(format!(
                        "ordered index out of order at handle {handle} in node {node}"
                    )));
                }
                prev = Some(record);
            }
            count += bucket.len();
            node = self.tree.next(node);
        }

        if count != self.total {
            return Err(MultidexError::IndexCorrupted(format!(
                "ordered index counts {} items, nodes hold {count}",
                self.total
            )));
        }
        Ok(())
    }
}

/// Half-open run of handles in key order. Walks forwards and backwards.
pub struct OrderedRange<'a, const CAP: usize> {
    tree: &'a RbTree<PackedBucket<CAP>>,
    front: Cursor,
    back: Cursor,
}

impl<'a, const CAP: usize> OrderedRange<'a, CAP> {
    fn advance(&self, cursor: Cursor) -> Cursor {
        if cursor.offset + 1 < self.tree.value(cursor.node).len() {
            Cursor::new(cursor.node, cursor.offset + 1)
        } else {
            Cursor::new(self.tree.next(cursor.node), 0)
        }
    }

    fn retreat(&self, cursor: Cursor) -> Cursor {
        if cursor.offset > 0 {
            Cursor::new(cursor.node, cursor.offset - 1)
        } else {
            let node = self.tree.prev(cursor.node);
            Cursor::new(node, self.tree.value(node).len().saturating_sub(1))
        }
    }

    /// Yields positions instead of handles.
    fn cursors(self) -> impl Iterator<Item = Cursor> + 'a {
        let mut range = self;
        std::iter::from_fn(move || {
            if range.front == range.back {
                return None;
            }
            let cursor = range.front;
            range.front = range.advance(cursor);
            Some(cursor)
        })
    }
}

impl<const CAP: usize> Iterator for OrderedRange<'_, CAP> {
    type Item = Handle;

    fn next(&mut self) -> Option<Handle> {
        if self.front == self.back {
            return None;
        }
        let handle = self.tree.value(self.front.node).get(self.front.offset);
        self.front = self.advance(self.front);
        Some(handle)
    }
}

impl<const CAP: usize> DoubleEndedIterator for OrderedRange<'_, CAP> {
    fn next_back(&mut self) -> Option<Handle> {
        if self.front == self.back {
            return None;
        }
        self.back = self.retreat(self.back);
        Some(self.tree.value(self.back.node).get(self.back.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Orders `(key, tag)` pairs by key alone.
    struct ByKey;

    impl OrderedPredicate<(u32, u32)> for ByKey {
        fn less(&self, a: &(u32, u32), b: &(u32, u32)) -> bool {
            a.0 < b.0
        }
    }

    type Rec = (u32, u32);
    type Index<const CAP: usize> = OrderedIndex<ByKey, CAP>;

    fn insert<const CAP: usize>(
        index: &mut Index<CAP>,
        store: &mut RecordStore<Rec>,
        key: u32,
    ) -> Handle {
        let tag = store.len() as u32;
        let h = store.append((key, tag)).unwrap();
        index.insert(store, h, false).unwrap();
        h
    }

    fn keys<const CAP: usize>(index: &Index<CAP>, store: &RecordStore<Rec>) -> Vec<u32> {
        RecordIndex::<Rec>::iter(index).map(|h| store[h].0).collect()
    }

    fn range_keys(
        store: &RecordStore<Rec>,
        range: impl Iterator<Item = Handle>,
    ) -> Vec<Rec> {
        range.map(|h| store[h]).collect()
    }

    #[test]
    fn test_empty_index() {
        let store: RecordStore<Rec> = RecordStore::new();
        let index = Index::<4>::new(ByKey);
        assert_eq!(index.node_count(), 0);
        assert_eq!(index.equal_range(&store, &(1, 0)).count(), 0);
        assert_eq!(index.find(&store, &(1, 0)), None);
        assert_eq!(RecordIndex::<Rec>::iter(&index).next_back(), None);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_fill_single_node_then_split() {
        let mut store = RecordStore::new();
        let mut index = Index::<4>::new(ByKey);
        for key in [10, 20, 30, 40] {
            insert(&mut index, &mut store, key);
        }
        assert_eq!(index.node_count(), 1);

        insert(&mut index, &mut store, 50);
        assert_eq!(index.node_count(), 2);
        assert_eq!(index.node_sizes(), vec![2, 3]);
        assert_eq!(keys(&index, &store), vec![10, 20, 30, 40, 50]);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_split_into_lower_half() {
        let mut store = RecordStore::new();
        let mut index = Index::<4>::new(ByKey);
        for key in [10, 30, 40, 50] {
            insert(&mut index, &mut store, key);
        }
        insert(&mut index, &mut store, 20);
        assert_eq!(index.node_sizes(), vec![3, 2]);
        assert_eq!(keys(&index, &store), vec![10, 20, 30, 40, 50]);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_equal_range_spans_nodes() {
        let mut store = RecordStore::new();
        let mut index = Index::<3>::new(ByKey);
        let mut expected = Vec::new();
        for key in [5, 7, 7, 7, 7, 7, 7, 7, 9, 1] {
            let h = insert(&mut index, &mut store, key);
            if key == 7 {
                expected.push(h);
            }
        }
        assert!(index.node_count() > 2);

        let mut found: Vec<_> = index.equal_range(&store, &(7, 0)).collect();
        found.sort_by_key(|h| h.slot());
        assert_eq!(found, expected);
        assert_eq!(index.equal_range(&store, &(6, 0)).count(), 0);
        assert_eq!(index.equal_range(&store, &(10, 0)).count(), 0);
        assert_eq!(index.equal_range(&store, &(0, 0)).count(), 0);
        assert_eq!(range_keys(&store, index.equal_range(&store, &(9, 0))), vec![(9, 8)]);

        let back: Vec<_> = index.equal_range(&store, &(7, 0)).rev().collect();
        assert_eq!(back.len(), 7);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_find_returns_lowest_equal() {
        let mut store = RecordStore::new();
        let mut index = Index::<2>::new(ByKey);
        for key in [3, 1, 2, 2, 5] {
            insert(&mut index, &mut store, key);
        }
        let found = index.find(&store, &(2, 0)).map(|h| store[h]);
        assert_eq!(found.map(|r| r.0), Some(2));
        assert_eq!(index.find(&store, &(4, 0)), None);
        assert_eq!(index.find(&store, &(6, 0)), None);
        assert_eq!(
            index.find(&store, &(2, 0)),
            index.equal_range(&store, &(2, 0)).next()
        );
    }

    #[test]
    fn test_equal_keys_keep_insertion_order_in_node() {
        let mut store = RecordStore::new();
        let mut index = Index::<8>::new(ByKey);
        for key in [4, 4, 4] {
            insert(&mut index, &mut store, key);
        }
        let tags: Vec<_> = index.equal_range(&store, &(4, 0)).map(|h| store[h].1).collect();
        assert_eq!(tags, vec![0, 1, 2]);
    }

    #[test]
    fn test_erase_by_identity_among_equal_keys() {
        let mut store = RecordStore::new();
        let mut index = Index::<2>::new(ByKey);
        let handles: Vec<_> = (0..6).map(|_| insert(&mut index, &mut store, 1)).collect();

        assert_eq!(index.erase(&store, handles[3]), 1);
        assert_eq!(index.erase(&store, handles[3]), 0);
        let remaining: Vec<_> = index.equal_range(&store, &(1, 0)).collect();
        assert_eq!(remaining.len(), 5);
        assert!(!remaining.contains(&handles[3]));
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_merge_into_parent_on_underflow() {
        let mut store = RecordStore::new();
        let mut index = Index::<4>::new(ByKey);
        let mut handles = Vec::new();
        for key in [10, 20, 30, 40, 50] {
            handles.push(insert(&mut index, &mut store, key));
        }
        // Root [10 20], right child [30 40 50].
        assert_eq!(index.node_sizes(), vec![2, 3]);

        for victim in [0, 3] {
            index.erase(&store, handles[victim]);
            store.remove(handles[victim]);
        }
        assert_eq!(index.node_sizes(), vec![1, 2]);

        index.erase(&store, handles[4]);
        store.remove(handles[4]);
        // Child dropped to one handle with a one-handle parent: folded.
        assert_eq!(index.node_count(), 1);
        assert_eq!(index.node_sizes(), vec![2]);
        assert_eq!(keys(&index, &store), vec![20, 30]);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_erase_last_handle_removes_node() {
        let mut store = RecordStore::new();
        let mut index = Index::<1>::new(ByKey);
        let handles: Vec<_> = [3, 1, 2].iter().map(|k| insert(&mut index, &mut store, *k)).collect();
        assert_eq!(index.node_count(), 3);

        index.erase(&store, handles[0]);
        assert_eq!(index.node_count(), 2);
        store.remove(handles[0]);
        assert_eq!(keys(&index, &store), vec![1, 2]);
        index.verify(&store).unwrap();
    }

    #[test]
    fn test_reverse_iteration() {
        let mut store = RecordStore::new();
        let mut index = Index::<3>::new(ByKey);
        for key in [8, 3, 5, 1, 9, 2, 7, 4, 6] {
            insert(&mut index, &mut store, key);
        }
        let back: Vec<_> = RecordIndex::<Rec>::iter(&index).rev().map(|h| store[h].0).collect();
        assert_eq!(back, vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);

        let mut range = index.range_all();
        assert_eq!(range.next().map(|h| store[h].0), Some(1));
        assert_eq!(range.next_back().map(|h| store[h].0), Some(9));
        assert_eq!(range.count(), 7);
    }

    #[test]
    fn test_clear_resets_tree() {
        let mut store = RecordStore::new();
        let mut index = Index::<2>::new(ByKey);
        for key in 0..20 {
            insert(&mut index, &mut store, key);
        }
        RecordIndex::<Rec>::clear(&mut index);
        assert_eq!(index.node_count(), 0);
        assert_eq!(RecordIndex::<Rec>::len(&index), 0);
        store.clear();
        index.verify(&store).unwrap();
    }

    fn random_workload<const CAP: usize>() {
        let mut rng = rand::rng();
        let mut store = RecordStore::new();
        let mut index = Index::<CAP>::new(ByKey);
        let mut live: Vec<Handle> = Vec::new();

        for round in 0..3000 {
            if live.is_empty() || rng.random_range(0..5) < 3 {
                let key = rng.random_range(0..200);
                live.push(insert(&mut index, &mut store, key));
            } else {
                let h = live.swap_remove(rng.random_range(0..live.len()));
                assert_eq!(index.erase(&store, h), 1);
                store.remove(h);
            }
            if round % 50 == 0 {
                index.verify(&store).unwrap();
            }
        }
        index.verify(&store).unwrap();

        let mut expected: Vec<_> = live.iter().map(|h| store[*h].0).collect();
        expected.sort_unstable();
        assert_eq!(keys(&index, &store), expected);

        for key in 0..200 {
            let want = expected.iter().filter(|k| **k == key).count();
            assert_eq!(index.equal_range(&store, &(key, 0)).count(), want);
            assert_eq!(index.equal_range(&store, &(key, 0)).rev().count(), want);
            assert_eq!(index.find(&store, &(key, 0)).is_some(), want > 0);
        }
    }

    #[test]
    fn test_random_workload_small_nodes() {
        random_workload::<1>();
        random_workload::<2>();
        random_workload::<3>();
        random_workload::<4>();
    }

    #[test]
    fn test_random_workload_default_nodes() {
        random_workload::<8>();
        random_workload::<32>();
    }
}
