//! Slot Store Module
//!
//! Integer-indexed object storage on top of the engine.
//!
//! ## Responsibilities
//! - Map slot indices to storage addresses
//! - Reuse freed addresses by size (best fit)
//! - Track which indices are present
//! - Optionally keep decoded objects in memory
//!
//! ## Slot Table
//! ```text
//! index   0        1        2        3
//!         Some(a0) None     Some(a2) None      present iff Some
//!
//! free pool  size -> [addresses]   released by `clear` / regrowth
//! cache      index -> decoded T     filled by CacheMode::Keep
//! ```
//!
//! The engine is passed to every call that touches stored bytes; the store
//! itself owns only its table.

mod store;

pub use store::{SlotEntry, SlotStore, MAX_INDEX_GAP};

/// How a decoded object is retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Decode, hand out, discard
    #[default]
    Once,

    /// Decode once and keep it for later calls
    Keep,
}
