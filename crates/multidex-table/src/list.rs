//! Heterogeneous index tuples.
//!
//! A table owns a tuple `(I0, I1, ..)` of indexes, each of its own type.
//! `IndexList` drives every member by runtime position for the operations that
//! touch all indexes, while `IndexAt<T, K>` names member `K` statically so that
//! a lookup through a position that does not exist fails to compile.
//! Implementations cover tuples of one to eight indexes.

use crate::handle::Handle;
use crate::index::{IndexKind, RecordIndex};
use crate::predicate::IndexPredicate;
use crate::store::RecordStore;
use multidex_common::{Result, TableConfig};

/// Positional access to every index of a tuple.
pub trait IndexList<T> {
    /// Number of indexes.
    const LEN: usize;

    fn kind_at(&self, pos: usize) -> IndexKind;

    fn insert_at(
        &mut self,
        pos: usize,
        store: &RecordStore<T>,
        handle: Handle,
        suppress_rehash: bool,
    ) -> Result<()>;

    fn erase_at(&mut self, pos: usize, store: &RecordStore<T>, handle: Handle) -> usize;

    fn is_equal_at(&self, pos: usize, a: &T, b: &T) -> bool;

    fn len_at(&self, pos: usize) -> usize;

    fn verify_at(&self, pos: usize, store: &RecordStore<T>) -> Result<()>;

    fn clear_all(&mut self);
}

/// Static access to index `K` of a tuple.
pub trait IndexAt<T, const K: usize> {
    type Output: RecordIndex<T>;

    fn index_at(&self) -> &Self::Output;
}

/// Index `K` of tuple `I`.
pub type IndexOf<T, I, const K: usize> = <I as IndexAt<T, K>>::Output;

/// A tuple of marked predicates, one per index.
pub trait PredicateList<T, const CAP: usize> {
    type Indexes: IndexList<T>;

    fn into_indexes(self, config: &TableConfig) -> Result<Self::Indexes>;
}

fn out_of_range(pos: usize, len: usize) -> ! {
    unreachable!("index position {pos} out of range for a table of {len} indexes")
}

macro_rules! index_tuple {
    (@at $all:tt; $( $idx:tt => $I:ident ),+) => {
        $( index_tuple!(@one $all; $idx => $I); )+
    };

    (@one ($($all:ident),+); $idx:tt => $I:ident) => {
        impl<T, $($all: RecordIndex<T>),+> IndexAt<T, $idx> for ($($all,)+) {
            type Output = $I;

            #[inline]
            fn index_at(&self) -> &$I {
                &self.$idx
            }
        }
    };

    ($len:expr; $( $idx:tt => $I:ident, $P:ident );+) => {
        impl<T, $($I: RecordIndex<T>),+> IndexList<T> for ($($I,)+) {
            const LEN: usize = $len;

            fn kind_at(&self, pos: usize) -> IndexKind {
                match pos {
                    $( $idx => <$I as RecordIndex<T>>::KIND, )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn insert_at(
                &mut self,
                pos: usize,
                store: &RecordStore<T>,
                handle: Handle,
                suppress_rehash: bool,
            ) -> Result<()> {
                match pos {
                    $( $idx => self.$idx.insert(store, handle, suppress_rehash), )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn erase_at(&mut self, pos: usize, store: &RecordStore<T>, handle: Handle) -> usize {
                match pos {
                    $( $idx => self.$idx.erase(store, handle), )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn is_equal_at(&self, pos: usize, a: &T, b: &T) -> bool {
                match pos {
                    $( $idx => self.$idx.is_equal(a, b), )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn len_at(&self, pos: usize) -> usize {
                match pos {
                    $( $idx => self.$idx.len(), )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn verify_at(&self, pos: usize, store: &RecordStore<T>) -> Result<()> {
                match pos {
                    $( $idx => self.$idx.verify(store), )+
                    _ => out_of_range(pos, $len),
                }
            }

            fn clear_all(&mut self) {
                $( self.$idx.clear(); )+
            }
        }

        impl<T, const CAP: usize, $($P: IndexPredicate<T, CAP>),+> PredicateList<T, CAP>
            for ($($P,)+)
        {
            type Indexes = ($(<$P as IndexPredicate<T, CAP>>::Index,)+);

            fn into_indexes(self, config: &TableConfig) -> Result<Self::Indexes> {
                Ok(($( self.$idx.into_index(config)?, )+))
            }
        }

        index_tuple!(@at ($($I),+); $( $idx => $I ),+);
    };
}

index_tuple!(1; 0 => I0, P0);
index_tuple!(2; 0 => I0, P0; 1 => I1, P1);
index_tuple!(3; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2);
index_tuple!(4; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2; 3 => I3, P3);
index_tuple!(5; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2; 3 => I3, P3; 4 => I4, P4);
index_tuple!(6; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2; 3 => I3, P3; 4 => I4, P4; 5 => I5, P5);
index_tuple!(
    7; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2; 3 => I3, P3; 4 => I4, P4; 5 => I5, P5; 6 => I6, P6
);
index_tuple!(
    8; 0 => I0, P0; 1 => I1, P1; 2 => I2, P2; 3 => I3, P3; 4 => I4, P4; 5 => I5, P5; 6 => I6, P6;
    7 => I7, P7
);
