//! # AtlasStore
//!
//! An embedded storage engine with:
//! - A sparse 64-bit virtual address space over one memory-mapped file
//! - Lazy materialization: addresses get physical bytes on first write
//! - Best-fit reuse of freed physical ranges
//! - A persisted address mapping, validated by a checksummed header
//! - Slot-indexed object storage and a lazily resolving unique-ID registry
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │         SlotStore<T>         │   │     Registry / UniqueIdPtr   │
//! │   (index -> address, pool)   │   │  (id -> instance | address)  │
//! └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                │        Persist (codec)           │
//!                └────────────────┬─────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                        StorageEngine                            │
//! │        (address minting, header, static section, recovery)      │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                        AddressMapping                           │
//! │   IntervalMap<virtual -> physical>  +  FreeList  +  high water  │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                    RandomAccess (backing store)                 │
//! │              FileRma (mmap file) / MemoryRma (anon)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod address;

pub mod codec;
pub mod interval;
pub mod rma;
pub mod mapping;
pub mod engine;
pub mod slots;
pub mod registry;
pub mod context;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AtlasError, Result};
pub use config::{BackingKind, Config};
pub use address::{StorageAddress, NULL_ADDR};
pub use codec::Persist;
pub use engine::StorageEngine;
pub use slots::{CacheMode, SlotStore};
pub use registry::{Identified, Registry, UniqueId, UniqueIdPtr};
pub use context::StoreContext;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasStore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
