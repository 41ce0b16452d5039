//! Multidex common types, errors, and configuration.
//!
//! This crate provides shared definitions used by the table and its indexes.

pub mod config;
pub mod error;

pub use config::{
    DEFAULT_CAPACITY, HashConfig, LockMode, MAX_HASH_SIZE, MIN_LOAD_FACTOR, TableConfig,
};
pub use error::{MultidexError, Result};
