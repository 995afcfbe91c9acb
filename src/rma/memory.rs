//! Memory-backed RMA
//!
//! Anonymous mapping with the same interface as [`FileRma`](super::FileRma).
//! Growth copies into a larger mapping.

use memmap2::MmapMut;
use tracing::debug;

use crate::error::Result;

use super::{grown_len, to_usize, view_range, RandomAccess};

/// Anonymous, non-persistent store
#[derive(Debug)]
pub struct MemoryRma {
    mmap: MmapMut,
    max_size: u64,
}

impl MemoryRma {
    pub fn new(initial_size: u64, max_size: u64) -> Result<Self> {
        let initial = grown_len(0, initial_size.max(1), max_size)?;
        let mmap = MmapMut::map_anon(to_usize(initial)?)?;
        Ok(Self { mmap, max_size })
    }
}

impl RandomAccess for MemoryRma {
    fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn ensure_len(&mut self, len: u64) -> Result<()> {
        let current = self.len();
        if len <= current {
            return Ok(());
        }
        let new_len = grown_len(current, len, self.max_size)?;
        let mut grown = MmapMut::map_anon(to_usize(new_len)?)?;
        grown[..self.mmap.len()].copy_from_slice(&self.mmap);
        self.mmap = grown;

        debug!(old_len = current, new_len, "grew anonymous store");
        Ok(())
    }

    fn readb(&self, offset: u64, size: u64) -> Result<&[u8]> {
        let range = view_range(offset, size, self.len())?;
        Ok(&self.mmap[range])
    }

    fn writeb(&mut self, offset: u64, size: u64) -> Result<&mut [u8]> {
        let range = view_range(offset, size, self.len())?;
        Ok(&mut self.mmap[range])
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
