//! Error types for AtlasStore
//!
//! Provides a unified error type for all operations.
//!
//! Errors fall into two classes:
//! - **Recoverable** outcomes (erasing an already-unmapped range, a failed
//!   merge) are not errors at all; those operations return `bool`/`Option`.
//! - **Contract violations** (bounds overruns, unknown or never-written
//!   addresses, unresolved IDs) are returned as errors for which
//!   [`AtlasError::is_contract_violation`] is true. Callers should treat them
//!   as programming errors and abort the operation.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasStore operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Backing Store Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Backing store capacity exceeded: requested {requested} bytes, limit {limit}")]
    CapacityExceeded { requested: u64, limit: u64 },

    #[error("Corrupt store header: {0}")]
    CorruptHeader(String),

    // -------------------------------------------------------------------------
    // Address Errors (contract violations)
    // -------------------------------------------------------------------------
    #[error("Invalid address {addr:#x} (size {size})")]
    InvalidAddress { addr: u64, size: u64 },

    #[error("Address {0:#x} was never allocated")]
    UnknownAddress(u64),

    #[error("Read of never-written range {addr:#x} (size {size})")]
    UnmappedRead { addr: u64, size: u64 },

    #[error("Range {addr:#x} (size {size}) collides with an existing reservation")]
    AddressCollision { addr: u64, size: u64 },

    #[error("Range {addr:#x} (size {size}) is not physically contiguous")]
    Fragmented { addr: u64, size: u64 },

    #[error("Access of {len} bytes at offset {offset} overruns capacity {capacity}")]
    BufferOverrun { offset: u64, len: u64, capacity: u64 },

    // -------------------------------------------------------------------------
    // Object Store Errors
    // -------------------------------------------------------------------------
    #[error("Slot {0} is empty")]
    EmptySlot(usize),

    #[error("Slot index {index} is too far past the end of the table (limit {limit})")]
    SlotIndexOutOfRange { index: usize, limit: usize },

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Unique id {0} has neither a resident instance nor an address")]
    UnresolvedId(u32),

    #[error("Unique id {0} is registered with a different type")]
    InstanceTypeMismatch(u32),

    #[error("Unique id space exhausted")]
    IdSpaceExhausted,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AtlasError {
    /// Whether this error signals a caller bug rather than a runtime condition
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            AtlasError::InvalidAddress { .. }
                | AtlasError::UnknownAddress(_)
                | AtlasError::UnmappedRead { .. }
                | AtlasError::AddressCollision { .. }
                | AtlasError::Fragmented { .. }
                | AtlasError::BufferOverrun { .. }
                | AtlasError::EmptySlot(_)
                | AtlasError::SlotIndexOutOfRange { .. }
                | AtlasError::UnresolvedId(_)
                | AtlasError::InstanceTypeMismatch(_)
        )
    }
}

impl From<bincode::Error> for AtlasError {
    fn from(e: bincode::Error) -> Self {
        AtlasError::Serialization(e.to_string())
    }
}
