//! Engine Module
//!
//! The storage engine that composes the backing store and the address
//! mapping into the address-space abstraction used by higher layers.
//!
//! ## Responsibilities
//! - Mint, expand and erase virtual addresses
//! - Route reads and writes through the mapping onto the backing store
//! - Reserve the static section for higher-layer metadata
//! - Persist the mapping on teardown and recover it on open
//!
//! ## Virtual Address Layout
//! ```text
//! 0                     header (HEADER_RESERVED bytes, physical 0)
//! HEADER_RESERVED ..    data addresses, each followed by `address_gap`
//! METADATA_BASE ..      static section, persisted mapping tables
//! ```

mod header;

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::address::StorageAddress;
use crate::codec::{self, Persist};
use crate::config::{BackingKind, Config};
use crate::error::{AtlasError, Result};
use crate::mapping::AddressMapping;
use crate::rma::{FileRma, MemoryRma, RandomAccess};

pub use header::{HeaderState, StoreHeader};

/// Bytes reserved for the header at the start of the store
pub const HEADER_RESERVED: u64 = 4096;

/// First virtual address of the metadata region
pub const METADATA_BASE: u64 = 1 << 62;

/// Virtual address of the header itself
const HEADER_ADDR: u64 = 0;

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Bytes currently backed by the RMA
    pub backing_len: u64,
    /// Physical high-water mark
    pub high_water_offset: u64,
    /// Bytes mapped to live virtual ranges
    pub mapped_bytes: u64,
    /// Bytes on the free list
    pub free_bytes: u64,
    /// Ranges on the free list
    pub free_ranges: usize,
    /// Intervals in the mapping table
    pub intervals: usize,
    /// Next data address the generator will hand out
    pub next_addr: u64,
}

/// The storage engine
///
/// Single-threaded: every method assumes exclusive access. Views returned by
/// `readb`/`writeb` borrow the engine, so they cannot outlive a growth of
/// the backing store.
pub struct StorageEngine {
    /// Engine configuration
    config: Config,

    /// Raw bytes
    rma: Box<dyn RandomAccess>,

    /// Virtual-to-physical translation and physical allocator
    mapping: AddressMapping,

    /// Generator state and persisted-mapping location
    header: StoreHeader,

    /// Fixed address handed to higher layers
    static_section: StorageAddress,

    /// Metadata address of the last checkpoint, still backed
    checkpoint: Option<StorageAddress>,

    /// Set once the mapping has been persisted by `close`
    closed: bool,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("config", &self.config)
            .field("mapping", &self.mapping)
            .field("header", &self.header)
            .field("static_section", &self.static_section)
            .field("checkpoint", &self.checkpoint)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl StorageEngine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const STORE_FILENAME: &'static str = "atlas.store";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Open/create the backing store
    /// 2. Read the header at offset 0
    /// 3. Fresh store: reserve the header and carve out the static section
    /// 4. Existing store: load the mapping and unmap its own storage
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let rma: Box<dyn RandomAccess> = match config.backing {
            BackingKind::File => {
                fs::create_dir_all(&config.data_dir)?;
                let path = config.data_dir.join(Self::STORE_FILENAME);
                Box::new(FileRma::open(&path, config.initial_size, config.max_size)?)
            }
            BackingKind::Memory => Box::new(MemoryRma::new(config.initial_size, config.max_size)?),
        };

        let state = StoreHeader::decode(rma.readb(0, header::HEADER_SIZE as u64)?);
        match state {
            HeaderState::Fresh => Self::initialize(config, rma),
            HeaderState::Valid(header) => Self::recover(config, rma, header),
            HeaderState::Corrupt(reason) if config.recreate_on_corrupt_header => {
                warn!(%reason, "store header unreadable, re-initializing and discarding contents");
                let mut rma = rma;
                rma.writeb(0, HEADER_RESERVED)?.fill(0);
                Self::initialize(config, rma)
            }
            HeaderState::Corrupt(reason) => Err(AtlasError::CorruptHeader(reason)),
        }
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Open a non-persistent engine on anonymous memory
    pub fn in_memory(config: Config) -> Result<Self> {
        let mut config = config;
        config.backing = BackingKind::Memory;
        Self::open(config)
    }

    fn initialize(config: Config, rma: Box<dyn RandomAccess>) -> Result<Self> {
        let mut mapping = AddressMapping::new(config.min_free_size, 0);
        mapping.set_limit(rma.max_size());
        mapping.alloc(HEADER_ADDR, HEADER_RESERVED)?;

        let mut engine = Self {
            header: StoreHeader {
                next_addr: HEADER_RESERVED,
                next_metadata_addr: METADATA_BASE,
                ..Default::default()
            },
            static_section: StorageAddress::NULL,
            checkpoint: None,
            closed: false,
            config,
            rma,
            mapping,
        };

        let static_size = engine.config.static_section_size;
        if static_size > 0 {
            let section = engine.mint_metadata(static_size)?;
            let offset = engine.mapping.alloc(section.addr, section.size)?;
            engine.ensure_capacity()?;
            engine.rma.writeb(offset, section.size)?.fill(0);
            engine.header.static_addr = section.addr;
            engine.header.static_size = section.size;
            engine.static_section = section;
        }

        info!(
            backing = ?engine.config.backing,
            static_size,
            "initialized new store"
        );
        Ok(engine)
    }

    fn recover(config: Config, rma: Box<dyn RandomAccess>, header: StoreHeader) -> Result<Self> {
        let bytes = rma.readb(header.mapping_offset, header.mapping_len)?;
        let crc = crc32fast::hash(bytes);
        if crc != header.mapping_crc {
            return Err(AtlasError::CorruptHeader(format!(
                "mapping checksum mismatch: stored {:#010x}, computed {:#010x}",
                header.mapping_crc, crc
            )));
        }
        let mut mapping = AddressMapping::from_bytes(bytes, config.min_free_size)?;
        mapping.set_limit(rma.max_size());

        // The persisted table is rewritten elsewhere on the next teardown
        mapping.del(header.mapping_addr, header.mapping_size);

        let static_section = if header.static_size > 0 {
            StorageAddress::new(header.static_addr, header.static_size)
        } else {
            StorageAddress::NULL
        };

        let mut engine = Self {
            config,
            rma,
            mapping,
            header,
            static_section,
            checkpoint: None,
            closed: false,
        };
        engine.ensure_capacity()?;

        info!(
            intervals = engine.mapping.intervals().len(),
            free_ranges = engine.mapping.free_list().len(),
            high_water = engine.mapping.high_water().next_offset,
            "recovered store"
        );
        Ok(engine)
    }

    // =========================================================================
    // Address Lifecycle
    // =========================================================================

    /// Mint a new reserved, unbacked address of `size` bytes
    pub fn get_random_address(&mut self, size: u64) -> Result<StorageAddress> {
        let addr = self.header.next_addr;
        let address = StorageAddress::new(addr, size);
        address.validate()?;

        let next = addr
            .checked_add(size)
            .and_then(|end| end.checked_add(self.config.address_gap))
            .filter(|&next| next <= METADATA_BASE)
            .ok_or_else(|| AtlasError::Storage("virtual address space exhausted".to_string()))?;

        self.mapping.alloc_unmapped(addr, size)?;
        self.header.next_addr = next;
        debug!(%address, "minted address");
        Ok(address)
    }

    /// Grow `address` by `size` bytes, returning the longer address
    pub fn expand_address(&mut self, address: StorageAddress, size: u64) -> Result<StorageAddress> {
        address.validate()?;
        if size == 0 {
            return Ok(address);
        }
        self.mapping.expand(address, size)?;
        self.ensure_capacity()?;

        let expanded = StorageAddress::new(address.addr, address.size + size);
        if expanded.end() > self.header.next_addr && expanded.addr < METADATA_BASE {
            self.header.next_addr = expanded.end().saturating_add(self.config.address_gap);
        }
        Ok(expanded)
    }

    /// Release `address`; its bytes become reusable, the address never is
    ///
    /// Returns false if it had already been erased.
    pub fn erase(&mut self, address: StorageAddress) -> Result<bool> {
        address.validate()?;
        let erased = self.mapping.release(address.addr, address.size)?;
        debug!(%address, erased, "erased address");
        Ok(erased)
    }

    /// The fixed address reserved for higher-layer metadata at creation
    pub fn get_static_section(&self) -> StorageAddress {
        self.static_section
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Write `buf` at the start of `address`
    pub fn write(&mut self, address: StorageAddress, buf: &[u8]) -> Result<()> {
        self.write_at(address, 0, buf)
    }

    /// Write `buf` at `offset` bytes into `address`, materializing as needed
    pub fn write_at(&mut self, address: StorageAddress, offset: u64, buf: &[u8]) -> Result<()> {
        let (addr, len) = sub_range(address, offset, buf.len() as u64)?;
        let mut done = 0u64;
        while done < len {
            let (phys, contiguous) = self.mapping.lookup(addr + done, len - done, false)?;
            self.ensure_capacity()?;
            let n = contiguous.min(len - done);
            self.rma
                .write(phys, &buf[done as usize..(done + n) as usize])?;
            done += n;
        }
        Ok(())
    }

    /// Fill `buf` from the start of `address`
    pub fn read(&self, address: StorageAddress, buf: &mut [u8]) -> Result<()> {
        self.read_at(address, 0, buf)
    }

    /// Fill `buf` from `offset` bytes into `address`
    ///
    /// Reading a range that was never written is a contract violation.
    pub fn read_at(&self, address: StorageAddress, offset: u64, buf: &mut [u8]) -> Result<()> {
        let (addr, len) = sub_range(address, offset, buf.len() as u64)?;
        let mut done = 0u64;
        while done < len {
            let (phys, contiguous) = self.mapping.translate(addr + done, len - done)?;
            let n = contiguous.min(len - done);
            self.rma
                .read(phys, &mut buf[done as usize..(done + n) as usize])?;
            done += n;
        }
        Ok(())
    }

    /// All bytes of `address`: borrowed when contiguous, copied otherwise
    pub fn read_bytes(&self, address: StorageAddress) -> Result<Cow<'_, [u8]>> {
        address.validate()?;
        let (phys, contiguous) = self.mapping.translate(address.addr, address.size)?;
        if contiguous >= address.size {
            return Ok(Cow::Borrowed(self.rma.readb(phys, address.size)?));
        }
        let mut buf = vec![0u8; codec_len(address.size)?];
        self.read(address, &mut buf)?;
        Ok(Cow::Owned(buf))
    }

    /// Zero-copy mutable view of `address`, materializing it first
    ///
    /// Fails with `Fragmented` if its backing is not one physical range.
    pub fn writeb(&mut self, address: StorageAddress) -> Result<&mut [u8]> {
        address.validate()?;
        let mut done = 0u64;
        while done < address.size {
            let (_, contiguous) =
                self.mapping
                    .lookup(address.addr + done, address.size - done, false)?;
            done += contiguous.min(address.size - done);
        }
        self.ensure_capacity()?;

        let phys = self.contiguous_offset(address)?;
        self.rma.writeb(phys, address.size)
    }

    /// Zero-copy view of `address`
    pub fn readb(&self, address: StorageAddress) -> Result<&[u8]> {
        address.validate()?;
        let phys = self.contiguous_offset(address)?;
        self.rma.readb(phys, address.size)
    }

    /// Mutations through views are visible immediately; kept as the hook a
    /// buffered backing would flush on
    pub fn commit(&mut self, address: StorageAddress) -> Result<()> {
        address.validate()
    }

    /// Flush the backing store to its medium
    pub fn sync(&self) -> Result<()> {
        self.rma.sync()
    }

    // =========================================================================
    // Object Helpers
    // =========================================================================

    /// Encode `value` into a freshly minted address
    pub fn store_object<T: Persist>(&mut self, value: &T) -> Result<StorageAddress> {
        let bytes = codec::to_vec(value)?;
        let address = self.get_random_address(bytes.len().max(1) as u64)?;
        self.write(address, &bytes)?;
        Ok(address)
    }

    /// Encode `value` over the start of an existing address
    pub fn write_object<T: Persist>(&mut self, address: StorageAddress, value: &T) -> Result<()> {
        let bytes = codec::to_vec(value)?;
        self.write(address, &bytes)
    }

    /// Decode a value stored at `address`
    pub fn load_object<T: Persist>(&self, address: StorageAddress) -> Result<T> {
        let bytes = self.read_bytes(address)?;
        codec::from_slice(&bytes)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persist the mapping and header without closing
    pub fn checkpoint(&mut self) -> Result<()> {
        if !self.rma.is_persistent() {
            return Ok(());
        }
        if let Some(previous) = self.checkpoint.take() {
            self.mapping.del(previous.addr, previous.size);
        }

        let mut reserve = self.mapping.encoded_len()? + self.config.mapping_spare;
        let (meta, offset, bytes) = loop {
            let meta = self.mint_metadata(reserve)?;
            let offset = self.mapping.alloc(meta.addr, meta.size)?;
            let bytes = self.mapping.to_bytes()?;
            if bytes.len() as u64 <= meta.size {
                break (meta, offset, bytes);
            }
            // Allocating the table's own storage grew the table
            self.mapping.del(meta.addr, meta.size);
            reserve = bytes.len() as u64 * 2;
        };
        self.ensure_capacity()?;
        self.rma.write(offset, &bytes)?;

        self.header.mapping_offset = offset;
        self.header.mapping_len = bytes.len() as u64;
        self.header.mapping_crc = crc32fast::hash(&bytes);
        self.header.mapping_addr = meta.addr;
        self.header.mapping_size = meta.size;
        self.rma.write(0, &self.header.encode()?)?;
        self.rma.sync()?;
        self.checkpoint = Some(meta);

        debug!(
            offset,
            len = bytes.len(),
            intervals = self.mapping.intervals().len(),
            "persisted address mapping"
        );
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Persists the mapping and header and syncs to disk
    pub fn close(mut self) -> Result<()> {
        self.checkpoint()?;
        self.closed = true;
        info!("store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the store file
    pub fn store_path(&self) -> PathBuf {
        self.config.data_dir.join(Self::STORE_FILENAME)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The address mapping
    pub fn mapping(&self) -> &AddressMapping {
        &self.mapping
    }

    pub fn is_persistent(&self) -> bool {
        self.rma.is_persistent()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            backing_len: self.rma.len(),
            high_water_offset: self.mapping.high_water().next_offset,
            mapped_bytes: self.mapping.mapped_bytes(),
            free_bytes: self.mapping.free_list().total_bytes(),
            free_ranges: self.mapping.free_list().len(),
            intervals: self.mapping.intervals().len(),
            next_addr: self.header.next_addr,
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Next address in the metadata region
    fn mint_metadata(&mut self, size: u64) -> Result<StorageAddress> {
        let address = StorageAddress::new(self.header.next_metadata_addr, size);
        address.validate()?;
        self.header.next_metadata_addr = address.end();
        Ok(address)
    }

    /// Grow the backing store to cover the physical high-water mark
    ///
    /// The mapping never allocates past the store's maximum, so this only
    /// fails on I/O errors.
    fn ensure_capacity(&mut self) -> Result<()> {
        let needed = self.mapping.high_water().next_offset;
        if needed <= self.rma.len() {
            return Ok(());
        }
        self.rma.ensure_len(needed)
    }

    fn contiguous_offset(&self, address: StorageAddress) -> Result<u64> {
        let (phys, contiguous) = self.mapping.translate(address.addr, address.size)?;
        if contiguous < address.size {
            return Err(AtlasError::Fragmented {
                addr: address.addr,
                size: address.size,
            });
        }
        Ok(phys)
    }
}

impl Drop for StorageEngine {
    fn drop(&mut self) {
        if self.closed || !self.rma.is_persistent() {
            return;
        }
        if let Err(e) = self.checkpoint() {
            error!("failed to persist store on drop: {}", e);
        }
    }
}

/// Virtual range of `len` bytes at `offset` inside `address`
fn sub_range(address: StorageAddress, offset: u64, len: u64) -> Result<(u64, u64)> {
    address.validate()?;
    match offset.checked_add(len) {
        Some(end) if end <= address.size => Ok((address.addr + offset, len)),
        _ => Err(AtlasError::BufferOverrun {
            offset,
            len,
            capacity: address.size,
        }),
    }
}

fn codec_len(size: u64) -> Result<usize> {
    usize::try_from(size).map_err(|_| AtlasError::CapacityExceeded {
        requested: size,
        limit: usize::MAX as u64,
    })
}
