//! AddressMapping implementation

use tracing::debug;

use crate::address::StorageAddress;
use crate::error::{AtlasError, Result};
use crate::interval::IntervalMap;

use super::{FreeList, HighWaterMark, Mapping};

/// Virtual-to-physical translation table plus the physical allocator
#[derive(Debug, Clone, PartialEq)]
pub struct AddressMapping {
    /// Every reserved virtual range
    intervals: IntervalMap<u64, Mapping>,
    /// Freed physical ranges
    free: FreeList,
    high_water: HighWaterMark,
    /// Physical bytes the backing store can grow to
    limit: u64,
}

impl AddressMapping {
    /// Empty mapping; physical allocation starts at `base_offset`
    pub fn new(min_free_size: u64, base_offset: u64) -> Self {
        Self {
            intervals: IntervalMap::new(),
            free: FreeList::new(min_free_size),
            high_water: HighWaterMark {
                next_addr: 0,
                next_offset: base_offset,
            },
            limit: u64::MAX,
        }
    }

    pub(crate) fn from_parts(
        intervals: IntervalMap<u64, Mapping>,
        free: FreeList,
        high_water: HighWaterMark,
    ) -> Self {
        Self {
            intervals,
            free,
            high_water,
            limit: u64::MAX,
        }
    }

    /// Cap physical allocation at `limit` bytes
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    // =========================================================================
    // Translation
    // =========================================================================

    /// Physical offset of `addr` and how many bytes stay contiguous from it
    ///
    /// An unmapped range is materialized now unless `read_only` is set, in
    /// which case reading it is a contract violation. A failed
    /// materialization leaves the mapping unchanged.
    pub fn lookup(&mut self, addr: u64, size: u64, read_only: bool) -> Result<(u64, u64)> {
        if read_only {
            return self.translate(addr, size);
        }
        let last = span_last(addr, size)?;
        let (start, end, mapping) = self.resolve(addr)?;
        match mapping {
            Mapping::Physical(offset) => Ok((offset + (addr - start), end - addr + 1)),
            Mapping::Unmapped => {
                let piece_end = end.min(last);
                let len = piece_end - addr + 1;
                let offset = self.alloc_offset(len)?;
                self.intervals.set(addr, piece_end, Mapping::Physical(offset));
                debug!(addr, len, offset, "materialized range");
                Ok((offset, len))
            }
        }
    }

    /// Read-only translation; never allocates
    pub fn translate(&self, addr: u64, size: u64) -> Result<(u64, u64)> {
        span_last(addr, size)?;
        let (start, end, mapping) = self.resolve(addr)?;
        match mapping {
            Mapping::Physical(offset) => Ok((offset + (addr - start), end - addr + 1)),
            Mapping::Unmapped => Err(AtlasError::UnmappedRead { addr, size }),
        }
    }

    /// Mapping state at `addr`
    pub fn state(&self, addr: u64) -> Option<Mapping> {
        self.intervals.find(addr).map(|(_, _, m)| *m)
    }

    // =========================================================================
    // Reservation
    // =========================================================================

    /// Reserve and back `[addr, addr + size)` immediately
    pub fn alloc(&mut self, addr: u64, size: u64) -> Result<u64> {
        let last = self.check_free_span(addr, size)?;
        let offset = self.alloc_offset(size)?;
        self.intervals.insert(addr, last, Mapping::Physical(offset));
        self.bump_addr(last);
        debug!(addr, size, offset, "allocated mapped range");
        Ok(offset)
    }

    /// Reserve `[addr, addr + size)` without physical backing
    pub fn alloc_unmapped(&mut self, addr: u64, size: u64) -> Result<()> {
        let last = self.check_free_span(addr, size)?;
        self.intervals.insert(addr, last, Mapping::Unmapped);
        self.bump_addr(last);
        Ok(())
    }

    /// Return the physical bytes of `[addr, addr + size)` to the free list
    ///
    /// The virtual range stays reserved as unmapped. Returns false when
    /// nothing in the range was backed.
    pub fn del(&mut self, addr: u64, size: u64) -> bool {
        let Ok(last) = span_last(addr, size) else {
            return false;
        };
        let pieces = self.pieces(addr, last);

        let mut freed = false;
        for &(start, end, mapping) in &pieces {
            if let Mapping::Physical(offset) = mapping {
                self.free_offset(offset, end - start + 1);
                freed = true;
            }
        }
        for (start, end, _) in pieces {
            self.intervals.set(start, end, Mapping::Unmapped);
        }
        freed
    }

    /// Retire `[addr, addr + size)`, freeing its bytes and dropping the range
    ///
    /// The range stops resolving. Returns false if nothing below the virtual
    /// high-water mark is reserved there any more.
    pub fn release(&mut self, addr: u64, size: u64) -> Result<bool> {
        let last = span_last(addr, size)?;
        let pieces = self.pieces(addr, last);
        if pieces.is_empty() {
            if addr < self.high_water.next_addr {
                return Ok(false);
            }
            return Err(AtlasError::UnknownAddress(addr));
        }
        for &(start, end, mapping) in &pieces {
            if let Mapping::Physical(offset) = mapping {
                self.free_offset(offset, end - start + 1);
            }
        }
        for (start, end, _) in pieces {
            self.intervals.del(start, end);
        }
        Ok(true)
    }

    /// Append `extra` bytes after `address`
    ///
    /// When the address's last byte sits right below the physical high-water
    /// mark the backing is extended in place; otherwise the appended range
    /// gets its own backing (or stays unmapped if the address is unwritten).
    pub fn expand(&mut self, address: StorageAddress, extra: u64) -> Result<()> {
        address.validate()?;
        if extra == 0 {
            return Ok(());
        }
        let new_start = address.end();
        let new_last = self.check_free_span(new_start, extra)?;

        let (start, _, mapping) = self.resolve(address.last())?;
        match mapping {
            Mapping::Unmapped => {
                self.intervals.insert(new_start, new_last, Mapping::Unmapped);
                self.bump_addr(new_last);
                Ok(())
            }
            Mapping::Physical(offset) => {
                let tail_offset = offset + (address.last() - start) + 1;
                let fits = tail_offset
                    .checked_add(extra)
                    .is_some_and(|end| end <= self.limit);
                if tail_offset == self.high_water.next_offset && fits {
                    self.high_water.next_offset += extra;
                    self.intervals
                        .insert(new_start, new_last, Mapping::Physical(tail_offset));
                    self.bump_addr(new_last);
                    debug!(addr = address.addr, extra, "expanded in place");
                    Ok(())
                } else {
                    self.alloc(new_start, extra).map(|_| ())
                }
            }
        }
    }

    // =========================================================================
    // Physical Allocation
    // =========================================================================

    /// Best fit from the free list, else grow the high-water mark
    ///
    /// Fails without side effects when growing would pass the limit.
    pub fn alloc_offset(&mut self, size: u64) -> Result<u64> {
        if let Some((offset, len)) = self.free.take(size) {
            if len > size {
                self.free.push(offset + size, len - size);
            }
            return Ok(offset);
        }
        let offset = self.high_water.next_offset;
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= self.limit)
            .ok_or(AtlasError::CapacityExceeded {
                requested: offset.saturating_add(size),
                limit: self.limit,
            })?;
        self.high_water.next_offset = end;
        Ok(offset)
    }

    /// Hand `[offset, offset + len)` back for reuse
    pub fn free_offset(&mut self, offset: u64, len: u64) {
        self.free.push(offset, len);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn high_water(&self) -> HighWaterMark {
        self.high_water
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free
    }

    pub fn intervals(&self) -> &IntervalMap<u64, Mapping> {
        &self.intervals
    }

    /// Bytes currently backed by a physical range
    pub fn mapped_bytes(&self) -> u64 {
        self.intervals
            .iter()
            .filter(|(_, _, m)| matches!(m, Mapping::Physical(_)))
            .map(|(s, e, _)| e - s + 1)
            .sum()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn resolve(&self, addr: u64) -> Result<(u64, u64, Mapping)> {
        self.intervals
            .find(addr)
            .map(|(s, e, m)| (s, e, *m))
            .ok_or(AtlasError::UnknownAddress(addr))
    }

    /// Reserved pieces of `[addr, last]`, clipped
    fn pieces(&self, addr: u64, last: u64) -> Vec<(u64, u64, Mapping)> {
        let mut pieces = Vec::new();
        self.intervals
            .for_each_interval(addr, last, |s, e, m| pieces.push((s, e, *m)));
        pieces
    }

    fn check_free_span(&self, addr: u64, size: u64) -> Result<u64> {
        let last = span_last(addr, size)?;
        if self.intervals.has(addr, last) {
            return Err(AtlasError::AddressCollision { addr, size });
        }
        Ok(last)
    }

    fn bump_addr(&mut self, last: u64) {
        self.high_water.next_addr = self.high_water.next_addr.max(last + 1);
    }
}

/// Last byte of `[addr, addr + size)`
fn span_last(addr: u64, size: u64) -> Result<u64> {
    StorageAddress::new(addr, size).validate()?;
    Ok(addr + size - 1)
}
