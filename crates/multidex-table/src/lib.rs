//! In-memory multi-index table.
//!
//! This crate provides:
//! - A generational record store addressed by stable handles
//! - Hashed indexes with grouped or sorted buckets
//! - An ordered index built on a red-black tree of packed buckets
//! - `MultiIndexTable`, which keeps one record collection coherent across a
//!   fixed tuple of those indexes under a type-level lock policy

pub mod hash;
pub mod handle;
pub mod index;
pub mod list;
pub mod lock;
pub mod ordered;
pub mod predicate;
pub mod store;
pub mod table;

pub use hash::{BucketOrder, HashIndex, HashOrderedIndex, HashedIndex};
pub use handle::Handle;
pub use index::{IndexKind, RecordIndex};
pub use list::{IndexAt, IndexList, IndexOf, PredicateList};
pub use lock::{External, Internal, LockPolicy};
pub use ordered::{OrderedIndex, OrderedRange};
pub use predicate::{
    HashOrdered, HashOrderedPredicate, IndexPredicate, Ordered, OrderedPredicate, Unordered,
    UnorderedPredicate,
};
pub use store::RecordStore;
pub use table::MultiIndexTable;

pub use multidex_common::{
    DEFAULT_CAPACITY, HashConfig, LockMode, MAX_HASH_SIZE, MIN_LOAD_FACTOR, MultidexError, Result,
    TableConfig,
};
