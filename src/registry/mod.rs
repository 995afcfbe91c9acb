//! Registry Module
//!
//! Resolves unique IDs to in-memory instances, loading them from the engine
//! on first use.
//!
//! ## Responsibilities
//! - Hand out monotonically increasing IDs
//! - Own resident instances (`Rc`) keyed by ID
//! - Remember where each ID's persisted form lives
//! - Lazily decode and cache instances that are only known by address
//!
//! ## Resolution
//! ```text
//! get_instance(id)
//!     │
//!     ├── resident?  ──► Rc<T> (downcast)
//!     │
//!     ├── address?   ──► engine.load_object ──► cache resident ──► Rc<T>
//!     │
//!     └── neither    ──► UnresolvedId
//! ```
//!
//! [`UniqueIdPtr`] is the weak handle other objects embed: it persists only
//! the ID and is resolved through the registry at most once.

mod ptr;
mod table;

pub use ptr::UniqueIdPtr;
pub use table::Registry;

/// Identifier handed out by [`Registry::generate_id`]
pub type UniqueId = u32;

/// Objects that carry their own unique ID
pub trait Identified {
    fn unique_id(&self) -> UniqueId;
}
