//! Random Memory Access (RMA) Module
//!
//! Raw byte storage addressed by physical offset.
//!
//! ## Responsibilities
//! - Copying reads and writes at a byte offset
//! - Zero-copy views straight into the mapped region (`readb` / `writeb`)
//! - Growing on demand up to a fixed reservation, never shrinking
//!
//! ## Backings
//! - [`FileRma`]: memory-mapped file, persistent. Mutations through a view are
//!   visible in the file immediately; `sync` forces them to disk.
//! - [`MemoryRma`]: anonymous mapping, discarded on drop.
//!
//! All raw pointer handling in the crate lives in this module. Views borrow
//! the store, so growing (which remaps) cannot run while a view is alive.

mod file;
mod memory;

use std::ops::Range;

pub use file::FileRma;
pub use memory::MemoryRma;

use crate::error::{AtlasError, Result};

/// Offset-addressed byte storage
pub trait RandomAccess: Send {
    /// Bytes currently backed
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound the store may grow to
    fn max_size(&self) -> u64;

    /// Grow so that at least `len` bytes are backed
    fn ensure_len(&mut self, len: u64) -> Result<()>;

    /// Immutable view of `[offset, offset + size)`
    fn readb(&self, offset: u64, size: u64) -> Result<&[u8]>;

    /// Mutable view of `[offset, offset + size)`
    fn writeb(&mut self, offset: u64, size: u64) -> Result<&mut [u8]>;

    /// Copy `buf.len()` bytes out of the store
    fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.readb(offset, buf.len() as u64)?);
        Ok(())
    }

    /// Copy `buf` into the store
    fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.writeb(offset, buf.len() as u64)?.copy_from_slice(buf);
        Ok(())
    }

    /// Flush mapped pages to the backing medium
    fn sync(&self) -> Result<()>;

    /// Whether contents survive a close
    fn is_persistent(&self) -> bool;
}

/// Grown size for a request: at least double, clamped to the reservation
pub(crate) fn grown_len(current: u64, requested: u64, max_size: u64) -> Result<u64> {
    if requested > max_size {
        return Err(AtlasError::CapacityExceeded {
            requested,
            limit: max_size,
        });
    }
    Ok(requested.max(current.saturating_mul(2)).min(max_size))
}

/// Byte range of `[offset, offset + size)` within a store of `len` bytes
pub(crate) fn view_range(offset: u64, size: u64, len: u64) -> Result<Range<usize>> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(offset as usize..end as usize),
        _ => Err(AtlasError::BufferOverrun {
            offset,
            len: size,
            capacity: len,
        }),
    }
}

pub(crate) fn to_usize(len: u64) -> Result<usize> {
    usize::try_from(len).map_err(|_| AtlasError::CapacityExceeded {
        requested: len,
        limit: usize::MAX as u64,
    })
}
