//! File-backed RMA
//!
//! The whole file is mapped with `MAP_SHARED`. Growth extends the file with
//! `set_len` and maps it again.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::debug;

use crate::error::{AtlasError, Result};

use super::{grown_len, view_range, RandomAccess};

/// Memory-mapped file store
#[derive(Debug)]
pub struct FileRma {
    /// Path of the backing file
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    /// Mapped length (equals the file length)
    len: u64,
    /// Reservation the file never grows past
    max_size: u64,
}

impl FileRma {
    /// Open or create the file, extending it to `initial_size` if shorter
    pub fn open(path: &Path, initial_size: u64, max_size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut len = file.metadata()?.len();
        if len > max_size {
            return Err(AtlasError::CapacityExceeded {
                requested: len,
                limit: max_size,
            });
        }
        if len < initial_size {
            file.set_len(initial_size)?;
            len = initial_size;
        }
        if len == 0 {
            return Err(AtlasError::Config(
                "cannot map an empty store file".to_string(),
            ));
        }

        // SAFETY: the mapping is only reached through bounds-checked views
        // that borrow `self`, and the file is not meant to be modified by
        // other processes while open.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        debug!(path = %path.display(), len, "mapped store file");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            len,
            max_size,
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the mapping
    pub fn close(self) -> Result<()> {
        self.sync()
    }
}

impl RandomAccess for FileRma {
    fn len(&self) -> u64 {
        self.len
    }

    fn max_size(&self) -> u64 {
        self.max_size
    }

    fn ensure_len(&mut self, len: u64) -> Result<()> {
        if len <= self.len {
            return Ok(());
        }
        let new_len = grown_len(self.len, len, self.max_size)?;

        self.mmap.flush()?;
        self.file.set_len(new_len)?;

        // SAFETY: `ensure_len` takes `&mut self`, so no view into the old
        // mapping can still be alive; the file was extended above.
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };

        debug!(old_len = self.len, new_len, "grew store file");
        self.len = new_len;
        Ok(())
    }

    fn readb(&self, offset: u64, size: u64) -> Result<&[u8]> {
        let range = view_range(offset, size, self.len)?;
        Ok(&self.mmap[range])
    }

    fn writeb(&mut self, offset: u64, size: u64) -> Result<&mut [u8]> {
        let range = view_range(offset, size, self.len)?;
        Ok(&mut self.mmap[range])
    }

    fn sync(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        true
    }
}
