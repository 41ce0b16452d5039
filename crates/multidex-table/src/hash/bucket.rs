//! Packed handle arrays used as hash buckets.

use crate::handle::Handle;
use multidex_common::{MultidexError, Result};
use tracing::warn;

/// A growable packed array of handles.
///
/// An empty bucket owns no allocation. The first insertion reserves exactly
/// `CAP` slots, a full bucket doubles, and a removal that leaves the bucket
/// under half of `CAP` collapses an enlarged array back to `CAP` slots.
#[derive(Debug, Default)]
pub(crate) struct HashBucket<const CAP: usize> {
    handles: Vec<Handle>,
}

impl<const CAP: usize> HashBucket<CAP> {
    pub(crate) const fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.handles.capacity()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[Handle] {
        &self.handles
    }

    /// Inserts `handle` at `pos`, growing the array first if it is full.
    /// On allocation failure the bucket is untouched.
    pub(crate) fn insert_at(&mut self, pos: usize, handle: Handle) -> Result<()> {
        debug_assert!(pos <= self.handles.len());
        if self.handles.len() == self.handles.capacity() {
            let additional = if self.handles.capacity() == 0 {
                CAP
            } else {
                self.handles.capacity()
            };
            self.handles
                .try_reserve_exact(additional)
                .map_err(|_| MultidexError::out_of_memory("growing hash bucket", additional))?;
        }
        self.handles.insert(pos, handle);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, handle: Handle) -> Result<()> {
        let pos = self.handles.len();
        self.insert_at(pos, handle)
    }

    /// Removes the handle at `pos` and shrinks the array if it became sparse.
    pub(crate) fn remove_at(&mut self, pos: usize) -> Handle {
        let handle = self.handles.remove(pos);
        if self.handles.capacity() > CAP && self.handles.len() * 2 < CAP {
            self.shrink();
        }
        handle
    }

    /// Removes the first occurrence of `handle` within `range`.
    pub(crate) fn remove_in(&mut self, range: std::ops::Range<usize>, handle: Handle) -> bool {
        match self.handles[range.clone()].iter().position(|h| *h == handle) {
            Some(offset) => {
                self.remove_at(range.start + offset);
                true
            }
            None => false,
        }
    }

    fn shrink(&mut self) {
        let mut smaller = Vec::new();
        if smaller.try_reserve_exact(CAP).is_err() {
            warn!(
                capacity = self.handles.capacity(),
                target = CAP,
                "Skipping hash bucket shrink, allocation failed"
            );
            return;
        }
        smaller.extend_from_slice(&self.handles);
        self.handles = smaller;
    }

    /// Releases the array.
    pub(crate) fn clear(&mut self) {
        self.handles = Vec::new();
    }
}
