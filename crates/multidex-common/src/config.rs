//! Configuration structures for multidex tables.

use crate::error::{MultidexError, Result};
use serde::{Deserialize, Serialize};

/// Default per-bucket array length, used as the `CAP` const generic default.
pub const DEFAULT_CAPACITY: usize = 32;

/// Largest bucket table a hashed index builds, initially or by rehash.
pub const MAX_HASH_SIZE: usize = u32::MAX as usize;

/// Smallest `max_load_factor` accepted by `TableConfig::validate`.
pub const MIN_LOAD_FACTOR: f32 = 1.0 / 1024.0;

/// Table-wide configuration shared by every index of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Initial bucket count for hashed indexes (0 is treated as 1).
    pub hash_size: usize,
    /// Load factor above which an insertion triggers a rehash.
    pub max_load_factor: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            hash_size: 1024,
            max_load_factor: 1.0,
        }
    }
}

impl TableConfig {
    /// Creates a configuration with the given bucket count and load factor.
    pub fn new(hash_size: usize, max_load_factor: f32) -> Self {
        Self {
            hash_size,
            max_load_factor,
        }
    }

    /// Checks that the configuration can drive a table.
    pub fn validate(&self) -> Result<()> {
        if !self.max_load_factor.is_finite() || self.max_load_factor < MIN_LOAD_FACTOR {
            return Err(MultidexError::InvalidParameter {
                name: "max_load_factor".to_string(),
                value: self.max_load_factor.to_string(),
            });
        }
        if self.hash_size > MAX_HASH_SIZE {
            return Err(MultidexError::ConfigError(format!(
                "hash_size {} exceeds maximum of {}",
                self.hash_size, MAX_HASH_SIZE
            )));
        }
        Ok(())
    }

    /// Returns the settings handed to each hashed index.
    pub fn hash_config(&self) -> HashConfig {
        HashConfig {
            min_bucket_count: self.hash_size,
            max_load_factor: self.max_load_factor,
        }
    }
}

/// Settings for a single hashed index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Initial size of the bucket table.
    pub min_bucket_count: usize,
    /// Rehash threshold for `items / buckets`.
    pub max_load_factor: f32,
}

impl HashConfig {
    /// Returns the initial bucket count, mapping 0 to 1.
    pub fn bucket_count(&self) -> usize {
        self.min_bucket_count.max(1)
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        TableConfig::default().hash_config()
    }
}

/// How a table serializes access to its records and indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// Every operation takes the table's reader/writer lock.
    #[default]
    Internal,
    /// The table performs no locking; the caller serializes access.
    External,
}
