//! Fixed-capacity handle arrays carried by ordered-index tree nodes.

use super::tree::Side;
use crate::handle::Handle;

/// A sorted run of at most `CAP` handles stored inline in a tree node.
///
/// The array knows nothing about record keys. Callers locate positions with
/// `partition_point` and keep the run sorted themselves.
#[derive(Clone, Copy)]
pub(crate) struct PackedBucket<const CAP: usize> {
    len: usize,
    slots: [Handle; CAP],
}

impl<const CAP: usize> PackedBucket<CAP> {
    pub(crate) const fn new() -> Self {
        Self {
            len: 0,
            slots: [Handle::NULL; CAP],
        }
    }

    /// Builds a bucket holding a single handle.
    pub(crate) fn with(handle: Handle) -> Self {
        let mut bucket = Self::new();
        bucket.slots[0] = handle;
        bucket.len = 1;
        bucket
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len == CAP
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[Handle] {
        &self.slots[..self.len]
    }

    #[inline]
    pub(crate) fn get(&self, pos: usize) -> Handle {
        self.as_slice()[pos]
    }

    #[inline]
    pub(crate) fn first(&self) -> Handle {
        self.get(0)
    }

    #[inline]
    pub(crate) fn last(&self) -> Handle {
        self.get(self.len - 1)
    }

    /// Index of the first handle for which `pred` is false.
    #[inline]
    pub(crate) fn partition_point(&self, pred: impl FnMut(&Handle) -> bool) -> usize {
        self.as_slice().partition_point(pred)
    }

    pub(crate) fn insert_at(&mut self, pos: usize, handle: Handle) {
        debug_assert!(self.len < CAP && pos <= self.len);
        self.slots.copy_within(pos..self.len, pos + 1);
        self.slots[pos] = handle;
        self.len += 1;
    }

    pub(crate) fn remove_at(&mut self, pos: usize) -> Handle {
        debug_assert!(pos < self.len);
        let handle = self.slots[pos];
        self.slots.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        handle
    }

    /// Puts every handle of `lower` in front of this run.
    pub(crate) fn prepend(&mut self, lower: &Self) {
        debug_assert!(self.len + lower.len <= CAP);
        self.slots.copy_within(0..self.len, lower.len);
        self.slots[..lower.len].copy_from_slice(lower.as_slice());
        self.len += lower.len;
    }

    /// Puts every handle of `upper` after this run.
    pub(crate) fn append(&mut self, upper: &Self) {
        debug_assert!(self.len + upper.len <= CAP);
        self.slots[self.len..self.len + upper.len].copy_from_slice(upper.as_slice());
        self.len += upper.len;
    }

    /// Splits a full run around an insertion at `pos`.
    ///
    /// With `m = (CAP - 1) / 2`: if `pos <= m` the returned sibling takes the
    /// lower `m + 1` handles plus `handle` and belongs on the left; otherwise it
    /// takes the handles above `m` plus `handle` and belongs on the right, while
    /// this run keeps the lower `m + 1`. Requires `CAP > 1`.
    pub(crate) fn split_insert(&mut self, pos: usize, handle: Handle) -> (Side, Self) {
        debug_assert!(CAP > 1 && self.is_full() && pos <= CAP);
        let m = (CAP - 1) / 2;
        let mut sibling = Self::new();

        if pos <= m {
            let moved = m + 1;
            sibling.slots[..moved].copy_from_slice(&self.slots[..moved]);
            sibling.len = moved;
            sibling.insert_at(pos, handle);

            self.slots.copy_within(moved..CAP, 0);
            self.len = CAP - moved;
            (Side::Left, sibling)
        } else {
            let kept = m + 1;
            let moved = CAP - kept;
            sibling.slots[..moved].copy_from_slice(&self.slots[kept..CAP]);
            sibling.len = moved;
            sibling.insert_at(pos - kept, handle);

            self.len = kept;
            (Side::Right, sibling)
        }
    }
}

impl<const CAP: usize> Default for PackedBucket<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> std::fmt::Debug for PackedBucket<CAP> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
