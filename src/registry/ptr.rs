//! Weak ID handle

use std::fmt;
use std::rc::{Rc, Weak};

use crate::codec::{Decoder, Encoder, Persist};
use crate::engine::StorageEngine;
use crate::error::Result;

use super::{Identified, Registry, UniqueId};

/// Reference to a registry-owned instance by ID
///
/// Starts unresolved (ID only) after decoding; `init` looks the ID up once
/// and keeps a weak pointer to the instance.
pub struct UniqueIdPtr<T> {
    id: UniqueId,
    target: Weak<T>,
}

impl<T> UniqueIdPtr<T> {
    /// Unresolved handle for `id`
    pub fn new(id: UniqueId) -> Self {
        Self {
            id,
            target: Weak::new(),
        }
    }

    /// Resolved handle to an instance already in hand
    pub fn from_rc(instance: &Rc<T>) -> Self
    where
        T: Identified,
    {
        Self {
            id: instance.unique_id(),
            target: Rc::downgrade(instance),
        }
    }

    pub fn id(&self) -> UniqueId {
        self.id
    }

    pub fn is_resolved(&self) -> bool {
        self.target.strong_count() > 0
    }

    /// The instance, if resolved and still alive
    pub fn get(&self) -> Option<Rc<T>> {
        self.target.upgrade()
    }
}

impl<T: Persist + 'static> UniqueIdPtr<T> {
    /// Resolve through the registry unless already resolved
    pub fn init(&mut self, registry: &mut Registry, engine: &StorageEngine) -> Result<Rc<T>> {
        if let Some(target) = self.target.upgrade() {
            return Ok(target);
        }
        let target = registry.get_instance::<T>(engine, self.id)?;
        self.target = Rc::downgrade(&target);
        Ok(target)
    }
}

impl<T> Clone for UniqueIdPtr<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            target: Weak::clone(&self.target),
        }
    }
}

impl<T> fmt::Debug for UniqueIdPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueIdPtr")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Only the ID is stored
impl<T> Persist for UniqueIdPtr<T> {
    fn encoded_len(&self) -> usize {
        self.id.encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.id.encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self::new(UniqueId::decode(input)?))
    }
}
