//! Stable record handles.

/// Opaque, stable reference to one record inside a `RecordStore`.
///
/// A handle combines a slot number with the generation the slot had when the
/// record was appended. Erasing the record bumps the slot generation, so the
/// old handle stops resolving even after the slot is reused. Equality asks
/// whether two handles name the same record, never whether records are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    /// Slot index within the store.
    pub(crate) slot: u32,
    /// Generation of the slot at append time.
    pub(crate) generation: u32,
}

impl Handle {
    /// Handle that never names a record.
    pub const NULL: Handle = Handle {
        slot: u32::MAX,
        generation: 0,
    };

    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Returns the slot index.
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Returns the slot generation this handle was issued for.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns true unless this is `Handle::NULL`.
    pub fn is_null(&self) -> bool {
        self.slot == u32::MAX
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.slot, self.generation)
    }
}
