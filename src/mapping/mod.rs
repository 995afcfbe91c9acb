//! Virtual Address Mapping Module
//!
//! Translates virtual address ranges to physical offsets in the backing
//! store and recycles physical space.
//!
//! ## Responsibilities
//! - Track reserved virtual ranges and their physical backing
//! - Materialize reserved ranges lazily on first write
//! - Best-fit reuse of freed physical ranges
//! - Persisted form for reopen
//!
//! ## State
//! ```text
//! virtual   [0 ─ 4095][4096 ─ 4195]   [gap]   [..]
//!              │            │
//!              ▼            ▼
//!           Physical(0)  Unmapped (reserved, no bytes yet)
//!
//! free list  {(len, offset)}   best fit = smallest len >= request
//! high water (next_addr, next_offset)
//! ```
//!
//! Physical space only grows: when the free list has nothing large enough the
//! high-water offset moves up.

mod free_list;
mod snapshot;
mod table;

use serde::{Deserialize, Serialize};

use crate::interval::IntervalValue;

pub use free_list::FreeList;
pub use snapshot::MappingSnapshot;
pub use table::AddressMapping;

/// What a virtual range resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mapping {
    /// Backed by bytes starting at this physical offset
    Physical(u64),

    /// Reserved but never written
    Unmapped,
}

impl IntervalValue for Mapping {
    fn advance(&self, delta: u64) -> Self {
        match self {
            Mapping::Physical(offset) => Mapping::Physical(offset + delta),
            other => *other,
        }
    }
}

/// Boundary past which nothing has been handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HighWaterMark {
    /// One past the highest reserved virtual byte
    pub next_addr: u64,

    /// One past the highest physical byte ever allocated
    pub next_offset: u64,
}
