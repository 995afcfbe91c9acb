//! Storage addresses
//!
//! A [`StorageAddress`] is an opaque virtual handle plus a byte length. It is
//! meaningful only inside the [`StorageEngine`](crate::StorageEngine) that
//! minted it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

/// Sentinel `addr` value marking the null address
pub const NULL_ADDR: u64 = u64::MAX;

/// A virtual address range `[addr, addr + size)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageAddress {
    /// First virtual byte
    pub addr: u64,
    /// Length in bytes
    pub size: u64,
}

impl StorageAddress {
    /// The null address
    pub const NULL: StorageAddress = StorageAddress {
        addr: NULL_ADDR,
        size: 0,
    };

    pub fn new(addr: u64, size: u64) -> Self {
        Self { addr, size }
    }

    pub fn is_null(&self) -> bool {
        self.addr == NULL_ADDR
    }

    /// Last byte covered (inclusive)
    pub fn last(&self) -> u64 {
        self.addr + self.size - 1
    }

    /// One past the last byte
    pub fn end(&self) -> u64 {
        self.addr + self.size
    }

    /// Fails unless this is a non-null, non-empty range that fits in u64
    pub fn validate(&self) -> Result<()> {
        if self.is_null() || self.size == 0 || self.addr.checked_add(self.size).is_none() {
            return Err(AtlasError::InvalidAddress {
                addr: self.addr,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl Default for StorageAddress {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for StorageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Address(null)")
        } else {
            write!(f, "Address({:#x}+{})", self.addr, self.size)
        }
    }
}
