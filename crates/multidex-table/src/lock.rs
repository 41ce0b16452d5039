//! Type-level lock policies for `MultiIndexTable`.
//!
//! A policy owns the cell that wraps a table's state and decides how shared
//! and exclusive access to it is obtained. Access is closure-scoped so the
//! guard never escapes an operation.

use std::cell::RefCell;

use multidex_common::LockMode;
use parking_lot::RwLock;

mod private {
    pub trait Sealed {}
}

/// How a table serializes access to its records and indexes.
pub trait LockPolicy: private::Sealed {
    /// Runtime mirror of the policy.
    const MODE: LockMode;

    /// Cell holding the protected state.
    type Cell<D>;

    fn new_cell<D>(data: D) -> Self::Cell<D>;

    /// Runs `f` with shared access.
    fn read<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&D) -> R) -> R;

    /// Runs `f` with exclusive access.
    fn write<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&mut D) -> R) -> R;
}

/// Every operation takes a reader/writer lock: shared for lookups and
/// traversal, exclusive for mutation. Tables using it are `Sync`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Internal;

/// No locking. The caller serializes access, typically by composing the table
/// into a coarser scheme of its own. Tables using it are `!Sync`, and calling
/// back into the table from a selector or visitor panics instead of aliasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct External;

impl private::Sealed for Internal {}
impl private::Sealed for External {}

impl LockPolicy for Internal {
    const MODE: LockMode = LockMode::Internal;

    type Cell<D> = RwLock<D>;

    fn new_cell<D>(data: D) -> Self::Cell<D> {
        RwLock::new(data)
    }

    #[inline]
    fn read<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&D) -> R) -> R {
        f(&cell.read())
    }

    #[inline]
    fn write<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut cell.write())
    }
}

impl LockPolicy for External {
    const MODE: LockMode = LockMode::External;

    type Cell<D> = RefCell<D>;

    fn new_cell<D>(data: D) -> Self::Cell<D> {
        RefCell::new(data)
    }

    #[inline]
    fn read<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&D) -> R) -> R {
        f(&cell.borrow())
    }

    #[inline]
    fn write<D, R>(cell: &Self::Cell<D>, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut cell.borrow_mut())
    }
}
