//! Generational record arena with insertion-order links.

use crate::handle::Handle;
use multidex_common::{MultidexError, Result};

/// Sentinel slot number for the insertion-order links.
const NULL_SLOT: u32 = u32::MAX;

struct Slot<T> {
    /// Bumped every time the slot is vacated.
    generation: u32,
    record: Option<T>,
    prev: u32,
    next: u32,
}

/// Authoritative owner of every record in a table.
///
/// Records live in a slot arena. Each append returns a `Handle` that stays valid
/// until that record is erased; inserting or erasing any other record never
/// invalidates it. Occupied slots are threaded on a doubly-linked list so
/// iteration follows insertion order, and vacated slots are recycled through a
/// free list.
pub struct RecordStore<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
}

impl<T> RecordStore<T> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: NULL_SLOT,
            tail: NULL_SLOT,
            len: 0,
        }
    }

    /// Returns the number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends a record at the end and returns its handle.
    pub fn append(&mut self, record: T) -> Result<Handle> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.slots.len() >= NULL_SLOT as usize {
                    return Err(MultidexError::out_of_memory("appending record", 1));
                }
                self.slots
                    .try_reserve(1)
                    .map_err(|_| MultidexError::out_of_memory("appending record", 1))?;
                // Free list can hold every slot, so remove and clear never allocate.
                let wanted = self.slots.len() + 1;
                self.free
                    .try_reserve(wanted)
                    .map_err(|_| MultidexError::out_of_memory("appending record", wanted))?;
                self.slots.push(Slot {
                    generation: 0,
                    record: None,
                    prev: NULL_SLOT,
                    next: NULL_SLOT,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let tail = self.tail;
        let entry = &mut self.slots[slot as usize];
        entry.record = Some(record);
        entry.prev = tail;
        entry.next = NULL_SLOT;
        let generation = entry.generation;

        if tail == NULL_SLOT {
            self.head = slot;
        } else {
            self.slots[tail as usize].next = slot;
        }
        self.tail = slot;
        self.len += 1;

        Ok(Handle::new(slot, generation))
    }

    /// Returns true if the handle names a live record.
    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Returns the record named by `handle`, if it is still live.
    #[inline]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.slot as usize) {
            Some(slot) if slot.generation == handle.generation => slot.record.as_ref(),
            _ => None,
        }
    }

    /// Returns the record named by `handle` mutably.
    ///
    /// Callers that mutate an indexed record must keep every index coherent,
    /// which is why the table only mutates through `replace`.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.slot as usize) {
            Some(slot) if slot.generation == handle.generation => slot.record.as_mut(),
            _ => None,
        }
    }

    /// Overwrites the record in place, returning the previous value.
    ///
    /// The handle stays valid. Returns None (and drops `record`) if the handle
    /// is stale.
    pub fn replace(&mut self, handle: Handle, record: T) -> Option<T> {
        self.get_mut(handle)
            .map(|slot| std::mem::replace(slot, record))
    }

    /// Removes the record named by `handle`. Only that handle is invalidated.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        let record = entry.record.take()?;
        let (prev, next) = (entry.prev, entry.next);
        entry.generation = entry.generation.wrapping_add(1);
        entry.prev = NULL_SLOT;
        entry.next = NULL_SLOT;

        if prev == NULL_SLOT {
            self.head = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        if next == NULL_SLOT {
            self.tail = prev;
        } else {
            self.slots[next as usize].prev = prev;
        }

        self.free.push(handle.slot);
        self.len -= 1;
        Some(record)
    }

    /// Removes every record. All outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if slot.record.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.prev = NULL_SLOT;
            slot.next = NULL_SLOT;
            self.free.push(idx as u32);
        }
        // Pop order hands out low slots first.
        self.free.reverse();
        self.head = NULL_SLOT;
        self.tail = NULL_SLOT;
        self.len = 0;
    }

    /// Iterates live records in insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            store: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Iterates live handles in insertion order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }
}

impl<T> Default for RecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::ops::Index<Handle> for RecordStore<T> {
    type Output = T;

    /// Panics if the handle is stale. Indexes only hold live handles.
    #[inline]
    fn index(&self, handle: Handle) -> &T {
        match self.get(handle) {
            Some(record) => record,
            None => panic!("stale record handle {handle}"),
        }
    }
}

/// Insertion-order iterator over a `RecordStore`.
pub struct Iter<'a, T> {
    store: &'a RecordStore<T>,
    cursor: u32,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NULL_SLOT {
            return None;
        }
        let slot = &self.store.slots[self.cursor as usize];
        let handle = Handle::new(self.cursor, slot.generation);
        self.cursor = slot.next;
        self.remaining -= 1;
        slot.record.as_ref().map(|record| (handle, record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(store: &RecordStore<i32>) -> Vec<i32> {
        store.iter().map(|(_, r)| *r).collect()
    }

    #[test]
    fn test_append_and_get() {
        let mut store = RecordStore::new();
        let a = store.append(10).unwrap();
        let b = store.append(20).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a), Some(&10));
        assert_eq!(store[b], 20);
        assert_ne!(a, b);
    }

    #[test]
    fn test_remove_invalidates_only_that_handle() {
        let mut store = RecordStore::new();
        let a = store.append(1).unwrap();
        let b = store.append(2).unwrap();
        let c = store.append(3).unwrap();

        assert_eq!(store.remove(b), Some(2));
        assert!(!store.contains(b));
        assert!(store.contains(a));
        assert!(store.contains(c));
        assert_eq!(store.remove(b), None);
        assert_eq!(records(&store), vec![1, 3]);
    }

    #[test]
    fn test_reused_slot_rejects_old_handle() {
        let mut store = RecordStore::new();
        let a = store.append(1).unwrap();
        store.remove(a);
        let b = store.append(2).unwrap();

        assert_eq!(a.slot(), b.slot());
        assert_ne!(a, b);
        assert_eq!(store.get(a), None);
        assert_eq!(store.get(b), Some(&2));
    }

    #[test]
    fn test_replace_in_place() {
        let mut store = RecordStore::new();
        let a = store.append(1).unwrap();
        let b = store.append(2).unwrap();

        assert_eq!(store.replace(a, 100), Some(1));
        assert_eq!(store[a], 100);
        assert_eq!(records(&store), vec![100, 2]);

        store.remove(b);
        assert_eq!(store.replace(b, 5), None);
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut store = RecordStore::new();
        let handles: Vec<_> = (0..6).map(|i| store.append(i).unwrap()).collect();

        store.remove(handles[0]);
        store.remove(handles[5]);
        store.remove(handles[3]);
        store.append(6).unwrap();

        assert_eq!(records(&store), vec![1, 2, 4, 6]);
        assert_eq!(store.iter().len(), 4);
        assert_eq!(store.handles().count(), 4);
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut store = RecordStore::new();
        let a = store.append(1).unwrap();
        let b = store.append(2).unwrap();

        store.clear();
        assert!(store.is_empty());
        assert!(!store.contains(a));
        assert!(!store.contains(b));

        let c = store.append(3).unwrap();
        assert_eq!(c.slot(), 0);
        assert!(!store.contains(a));
        assert_eq!(records(&store), vec![3]);

        store.clear();
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.iter().next(), None);
    }

    #[test]
    #[should_panic(expected = "stale record handle")]
    fn test_index_with_stale_handle_panics() {
        let mut store = RecordStore::new();
        let a = store.append(1).unwrap();
        store.remove(a);
        let _ = store[a];
    }
}
