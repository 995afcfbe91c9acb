//! Configuration for AtlasStore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{AtlasError, Result};

/// Main configuration for an AtlasStore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backing Store Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the store file
    /// Internal structure:
    ///   {data_dir}/
    ///     └── atlas.store      (header, mapping table and all object bytes)
    pub data_dir: PathBuf,

    /// Where the bytes live
    pub backing: BackingKind,

    /// Address-space reservation: the backing store never grows past this (bytes)
    pub max_size: u64,

    /// Initial backing size for a new store (bytes)
    pub initial_size: u64,

    // -------------------------------------------------------------------------
    // Allocator Configuration
    // -------------------------------------------------------------------------
    /// Size of the static section handed to higher layers (0 = none)
    pub static_section_size: u64,

    /// Freed ranges shorter than this are not tracked on the free list
    pub min_free_size: u64,

    /// Virtual headroom left after every minted address for in-place expansion
    pub address_gap: u64,

    /// Extra bytes reserved when persisting the address mapping
    pub mapping_spare: u64,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// Re-initialize silently when the header is unreadable instead of failing.
    /// This discards whatever the file held.
    pub recreate_on_corrupt_header: bool,
}

/// Kind of backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingKind {
    /// Memory-mapped file, persistent across reopen
    File,

    /// Anonymous memory, discarded on close
    Memory,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlasstore_data"),
            backing: BackingKind::File,
            max_size: 1024 * 1024 * 1024, // 1 GB
            initial_size: 1024 * 1024,    // 1 MB
            static_section_size: 4096,
            min_free_size: 16,
            address_gap: 1 << 30,
            mapping_spare: 1024,
            recreate_on_corrupt_header: false,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_size < self.initial_size {
            return Err(AtlasError::Config(format!(
                "max_size ({}) is smaller than initial_size ({})",
                self.max_size, self.initial_size
            )));
        }
        if self.initial_size < crate::engine::HEADER_RESERVED + self.static_section_size {
            return Err(AtlasError::Config(format!(
                "initial_size ({}) cannot hold the header and a static section of {} bytes",
                self.initial_size, self.static_section_size
            )));
        }
        if self.address_gap == 0 {
            return Err(AtlasError::Config("address_gap must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the backing kind
    pub fn backing(mut self, backing: BackingKind) -> Self {
        self.config.backing = backing;
        self
    }

    /// Set the address-space reservation (in bytes)
    pub fn max_size(mut self, size: u64) -> Self {
        self.config.max_size = size;
        self
    }

    /// Set the initial backing size (in bytes)
    pub fn initial_size(mut self, size: u64) -> Self {
        self.config.initial_size = size;
        self
    }

    /// Set the static section size (in bytes)
    pub fn static_section_size(mut self, size: u64) -> Self {
        self.config.static_section_size = size;
        self
    }

    /// Set the minimum tracked free range (in bytes)
    pub fn min_free_size(mut self, size: u64) -> Self {
        self.config.min_free_size = size;
        self
    }

    /// Set the virtual gap left after each address
    pub fn address_gap(mut self, gap: u64) -> Self {
        self.config.address_gap = gap;
        self
    }

    /// Set the spare bytes reserved for the persisted mapping
    pub fn mapping_spare(mut self, spare: u64) -> Self {
        self.config.mapping_spare = spare;
        self
    }

    /// Re-initialize instead of failing on an unreadable header
    pub fn recreate_on_corrupt_header(mut self, recreate: bool) -> Self {
        self.config.recreate_on_corrupt_header = recreate;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
