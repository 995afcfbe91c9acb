//! Persisted form of the address mapping
//!
//! ```text
//! MappingSnapshot (bincode)
//!   mapped    [(start, end, offset)]   virtual range -> physical offset
//!   unmapped  [(start, end)]           reserved, never written
//!   free      [(offset, len)]          reusable physical ranges
//!   high_water (next_addr, next_offset)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};
use crate::interval::IntervalMap;

use super::{AddressMapping, FreeList, HighWaterMark, Mapping};

/// Serializable copy of an [`AddressMapping`]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub mapped: Vec<(u64, u64, u64)>,
    pub unmapped: Vec<(u64, u64)>,
    pub free: Vec<(u64, u64)>,
    pub high_water: HighWaterMark,
}

impl MappingSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Exact length of `to_bytes`
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(bincode::serialized_size(self)?)
    }
}

impl AddressMapping {
    /// Capture the full state
    pub fn snapshot(&self) -> MappingSnapshot {
        let mut snapshot = MappingSnapshot {
            high_water: self.high_water(),
            free: self.free_list().iter().collect(),
            ..Default::default()
        };
        for (start, end, mapping) in self.intervals().iter() {
            match *mapping {
                Mapping::Physical(offset) => snapshot.mapped.push((start, end, offset)),
                Mapping::Unmapped => snapshot.unmapped.push((start, end)),
            }
        }
        snapshot
    }

    /// Rebuild a mapping, rejecting overlapping or out-of-range tables
    pub fn restore(snapshot: MappingSnapshot, min_free_size: u64) -> Result<Self> {
        let high_water = snapshot.high_water;
        let mut intervals = IntervalMap::new();

        let ranges = snapshot
            .mapped
            .iter()
            .map(|&(s, e, offset)| (s, e, Mapping::Physical(offset)))
            .chain(snapshot.unmapped.iter().map(|&(s, e)| (s, e, Mapping::Unmapped)));

        for (start, end, mapping) in ranges {
            if start > end || intervals.has(start, end) {
                return Err(AtlasError::CorruptHeader(format!(
                    "mapping table has invalid range [{:#x}, {:#x}]",
                    start, end
                )));
            }
            if let Mapping::Physical(offset) = mapping {
                if offset + (end - start) >= high_water.next_offset {
                    return Err(AtlasError::CorruptHeader(format!(
                        "range [{:#x}, {:#x}] maps past the high-water mark",
                        start, end
                    )));
                }
            }
            intervals.insert(start, end, mapping);
        }

        let mut free = FreeList::new(min_free_size);
        for (offset, len) in snapshot.free {
            free.push(offset, len);
        }

        Ok(AddressMapping::from_parts(intervals, free, high_water))
    }

    /// Serialized size of the current state
    pub fn encoded_len(&self) -> Result<u64> {
        self.snapshot().encoded_len()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.snapshot().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8], min_free_size: u64) -> Result<Self> {
        Self::restore(MappingSnapshot::from_bytes(bytes)?, min_free_size)
    }
}
