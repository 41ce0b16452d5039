//! The multi-index table.

use std::marker::PhantomData;

use crate::handle::Handle;
use crate::index::{IndexKind, RecordIndex};
use crate::list::{IndexAt, IndexList, IndexOf, PredicateList};
use crate::lock::{Internal, LockPolicy};
use crate::store::RecordStore;
use multidex_common::{DEFAULT_CAPACITY, LockMode, MultidexError, Result, TableConfig};
use tracing::{debug, warn};

/// Records plus every index over them. Always accessed through the table lock.
struct TableCore<T, I> {
    store: RecordStore<T>,
    indexes: I,
}

impl<T: Clone, I: IndexList<T>> TableCore<T, I> {
    fn insert(&mut self, record: T) -> Result<()> {
        let handle = self.store.append(record)?;
        for pos in 0..I::LEN {
            if let Err(err) = self.indexes.insert_at(pos, &self.store, handle, false) {
                warn!(index = pos, handle = %handle, error = %err, "Rolling back table insert");
                for done in 0..pos {
                    self.indexes.erase_at(done, &self.store, handle);
                }
                self.store.remove(handle);
                return Err(err);
            }
        }
        Ok(())
    }

    fn matching<const K: usize>(&self, key: &T) -> Vec<Handle>
    where
        I: IndexAt<T, K>,
    {
        self.indexes.index_at().equal_range(&self.store, key).collect()
    }

    fn update<const K: usize>(&mut self, key: &T, record: &T) -> Result<bool>
    where
        I: IndexAt<T, K>,
    {
        let handles = self.matching::<K>(key);
        for handle in &handles {
            self.update_one(*handle, record)?;
        }
        Ok(!handles.is_empty())
    }

    /// Moves one record to its new value, touching only the indexes whose key
    /// changes.
    fn update_one(&mut self, handle: Handle, record: &T) -> Result<()> {
        debug_assert!(I::LEN <= u32::BITS as usize);
        let mut affected = 0u32;
        for pos in 0..I::LEN {
            if !self.indexes.is_equal_at(pos, &self.store[handle], record) {
                affected |= 1 << pos;
                self.indexes.erase_at(pos, &self.store, handle);
            }
        }

        self.store.replace(handle, record.clone());

        for pos in (0..I::LEN).filter(|pos| affected & (1 << pos) != 0) {
            if let Err(err) = self.indexes.insert_at(pos, &self.store, handle, true) {
                warn!(index = pos, handle = %handle, error = %err, "Dropping record after failed update");
                for i in 0..I::LEN {
                    self.indexes.erase_at(i, &self.store, handle);
                }
                self.store.remove(handle);
                return Err(err);
            }
        }
        Ok(())
    }

    fn delete<const K: usize>(&mut self, key: &T) -> usize
    where
        I: IndexAt<T, K>,
    {
        let handles = self.matching::<K>(key);
        for handle in &handles {
            for pos in 0..I::LEN {
                self.indexes.erase_at(pos, &self.store, *handle);
            }
            self.store.remove(*handle);
        }
        handles.len()
    }

    fn clear(&mut self) {
        self.indexes.clear_all();
        self.store.clear();
    }

    fn verify(&self) -> Result<()> {
        for pos in 0..I::LEN {
            let held = self.indexes.len_at(pos);
            if held != self.store.len() {
                return Err(MultidexError::IndexCorrupted(format!(
                    "index {pos} holds {held} handles, store holds {} records",
                    self.store.len()
                )));
            }
            self.indexes.verify_at(pos, &self.store)?;
        }
        Ok(())
    }
}

/// A collection of records kept coherent across a fixed tuple of indexes.
///
/// `P` is a tuple of marked predicates, for example
/// `(Unordered<ById>, Ordered<ByName>)`; each becomes one index. Lookups name
/// an index by position (`find_all::<1>`), and a position past the end of the
/// tuple is a compile error. `L` picks the lock policy and `CAP` the packed
/// bucket capacity shared by every index.
///
/// Every operation runs to completion under the table lock: lookups and
/// traversals take it shared, mutations take it exclusive, so readers never
/// observe a record present in some indexes and missing from others.
pub struct MultiIndexTable<T, P, L = Internal, const CAP: usize = DEFAULT_CAPACITY>
where
    P: PredicateList<T, CAP>,
    L: LockPolicy,
{
    config: TableConfig,
    core: L::Cell<TableCore<T, P::Indexes>>,
    _predicates: PhantomData<fn() -> P>,
}

impl<T, P, L, const CAP: usize> MultiIndexTable<T, P, L, CAP>
where
    T: Clone,
    P: PredicateList<T, CAP>,
    L: LockPolicy,
{
    /// Builds an empty table with one index per predicate.
    pub fn new(config: TableConfig, predicates: P) -> Result<Self> {
        const { assert!(CAP > 0, "bucket capacity must be positive") };
        config.validate()?;
        let indexes = predicates.into_indexes(&config)?;

        let index_count = <P::Indexes as IndexList<T>>::LEN;
        let lock_mode = L::MODE;
        debug!(
            indexes = index_count,
            capacity = CAP,
            hash_size = config.hash_size,
            max_load_factor = config.max_load_factor,
            lock_mode = ?lock_mode,
            "Created multi-index table"
        );

        Ok(Self {
            config,
            core: L::new_cell(TableCore {
                store: RecordStore::new(),
                indexes,
            }),
            _predicates: PhantomData,
        })
    }

    fn read<R>(&self, f: impl FnOnce(&TableCore<T, P::Indexes>) -> R) -> R {
        L::read::<TableCore<T, P::Indexes>, R>(&self.core, f)
    }

    fn write<R>(&self, f: impl FnOnce(&mut TableCore<T, P::Indexes>) -> R) -> R {
        L::write::<TableCore<T, P::Indexes>, R>(&self.core, f)
    }

    /// Builds an empty table with the default configuration.
    pub fn with_predicates(predicates: P) -> Result<Self> {
        Self::new(TableConfig::default(), predicates)
    }

    /// Returns the configuration the table was built with.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Returns the lock policy in effect.
    pub fn lock_mode(&self) -> LockMode {
        L::MODE
    }

    /// Number of indexes.
    pub fn index_count(&self) -> usize {
        <P::Indexes as IndexList<T>>::LEN
    }

    /// Inserts a record into the store and every index.
    ///
    /// All or nothing: if any index fails to take the record, it is removed
    /// from the indexes that took it and from the store before the error is
    /// returned.
    pub fn insert(&self, record: T) -> Result<()> {
        self.write(|core| core.insert(record))
    }

    /// Overwrites every record whose key matches `key` in index `K`.
    ///
    /// Only indexes whose key for a record changes are touched, and they are
    /// refilled without rehashing. Returns whether any record matched. If an
    /// index cannot take an updated record back, that record is dropped from
    /// the table entirely and the error is returned; records updated before it
    /// keep their new value.
    pub fn update<const K: usize>(&self, key: &T, record: T) -> Result<bool>
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.write(|core| core.update::<K>(key, &record))
    }

    /// Deletes every record whose key matches `key` in index `K`. Returns the
    /// number deleted.
    pub fn delete<const K: usize>(&self, key: &T) -> usize
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.write(|core| core.delete::<K>(key))
    }

    /// Returns a copy of the first record matching `key` in index `K`.
    pub fn find_first<const K: usize>(&self, key: &T) -> Option<T>
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.read(|core| {
            core.indexes
                .index_at()
                .find(&core.store, key)
                .map(|handle| core.store[handle].clone())
        })
    }

    /// Returns copies of every record matching `key` in index `K`, in the
    /// index's equal-range order.
    pub fn find_all<const K: usize>(&self, key: &T) -> Vec<T>
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.read(|core| {
            core.indexes
                .index_at()
                .equal_range(&core.store, key)
                .map(|handle| core.store[handle].clone())
                .collect()
        })
    }

    /// Calls `selector` on every record matching `key` in index `K`.
    ///
    /// The shared lock is held for the whole walk, so `selector` must not call
    /// back into the table.
    pub fn find_by_selector<const K: usize, F>(&self, mut selector: F, key: &T)
    where
        P::Indexes: IndexAt<T, K>,
        F: FnMut(&T),
    {
        self.read(|core| {
            for handle in core.indexes.index_at().equal_range(&core.store, key) {
                selector(&core.store[handle]);
            }
        })
    }

    /// Calls `visitor` on every record in the native order of index `K`:
    /// bucket order for hashed indexes, key order for the ordered index.
    pub fn traverse<const K: usize, F>(&self, mut visitor: F)
    where
        P::Indexes: IndexAt<T, K>,
        F: FnMut(&T),
    {
        self.read(|core| {
            for handle in core.indexes.index_at().iter() {
                visitor(&core.store[handle]);
            }
        })
    }

    /// Runs `f` against index `K` and the record store under the shared lock.
    pub fn with_index<const K: usize, R>(
        &self,
        f: impl FnOnce(&IndexOf<T, P::Indexes, K>, &RecordStore<T>) -> R,
    ) -> R
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.read(|core| f(core.indexes.index_at(), &core.store))
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.write(|core| core.clear())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.read(|core| core.store.len())
    }

    /// Returns true if the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of handles held by index `K`.
    pub fn index_len<const K: usize>(&self) -> usize
    where
        P::Indexes: IndexAt<T, K>,
    {
        self.read(|core| core.indexes.index_at().len())
    }

    /// Variant of index `K`.
    pub fn index_kind<const K: usize>(&self) -> IndexKind
    where
        P::Indexes: IndexAt<T, K>,
    {
        <IndexOf<T, P::Indexes, K> as RecordIndex<T>>::KIND
    }

    /// Copies every record in insertion order.
    pub fn records(&self) -> Vec<T> {
        self.read(|core| {
            core.store.iter().map(|(_, record)| record.clone()).collect()
        })
    }

    /// Checks that every index holds exactly the live records and that each
    /// index's own invariants hold.
    pub fn verify(&self) -> Result<()> {
        self.read(|core| core.verify())
    }
}
