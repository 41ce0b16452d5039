//! Error types for the multidex table.

use thiserror::Error;

/// Result type alias using MultidexError.
pub type Result<T> = std::result::Result<T, MultidexError>;

/// Errors that can occur in multidex operations.
///
/// The table never panics on allocation failure. Every fallible allocation goes
/// through `try_reserve` and surfaces here instead.
#[derive(Debug, Error)]
pub enum MultidexError {
    // Allocation errors
    #[error("Out of memory while {context} ({requested} slots requested)")]
    OutOfMemory {
        context: &'static str,
        requested: usize,
    },

    // Index errors
    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Stale record handle: {0}")]
    StaleHandle(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

impl MultidexError {
    /// Builds an out-of-memory error for a failed reservation.
    pub fn out_of_memory(context: &'static str, requested: usize) -> Self {
        Self::OutOfMemory { context, requested }
    }

    /// Returns true if this error reports an allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}
