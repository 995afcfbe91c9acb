//! Registry implementation

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::address::StorageAddress;
use crate::codec::{Decoder, Encoder, Persist};
use crate::engine::StorageEngine;
use crate::error::{AtlasError, Result};

use super::{Identified, UniqueId};

/// First ID handed out by a new registry
const FIRST_ID: UniqueId = 1;

#[derive(Default)]
struct RegistryEntry {
    /// Where the persisted form lives
    address: Option<StorageAddress>,
    /// Resident instance, owned by the registry
    instance: Option<Rc<dyn Any>>,
}

/// Arena of instances keyed by unique ID
///
/// The registry owns resident instances; callers hold `Rc` handles or IDs.
pub struct Registry {
    entries: BTreeMap<UniqueId, RegistryEntry>,
    next_id: UniqueId,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: FIRST_ID,
        }
    }

    // =========================================================================
    // IDs
    // =========================================================================

    /// Next ID from the monotone counter
    pub fn generate_id(&mut self) -> Result<UniqueId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(AtlasError::IdSpaceExhausted)?;
        Ok(id)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Take ownership of `obj` under its own ID
    ///
    /// Replaces any resident instance; a recorded address is kept.
    pub fn register_instance<T: Identified + 'static>(&mut self, obj: T) -> Rc<T> {
        let id = obj.unique_id();
        let instance = Rc::new(obj);
        let erased: Rc<dyn Any> = instance.clone();
        self.entries.entry(id).or_default().instance = Some(erased);

        // IDs assigned elsewhere must never be handed out again
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
        instance
    }

    /// Attach the persisted address of an already-registered ID
    pub fn register_instance_address(&mut self, id: UniqueId, address: StorageAddress) -> Result<()> {
        address.validate()?;
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AtlasError::UnresolvedId(id))?;
        entry.address = Some(address);
        Ok(())
    }

    /// Remove the entry for `id` entirely
    pub fn delete_instance(&mut self, id: UniqueId) -> bool {
        self.entries.remove(&id).is_some()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// The instance for `id`, decoding it from its address on first use
    pub fn get_instance<T: Persist + 'static>(
        &mut self,
        engine: &StorageEngine,
        id: UniqueId,
    ) -> Result<Rc<T>> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AtlasError::UnresolvedId(id))?;

        if let Some(instance) = &entry.instance {
            return Rc::clone(instance)
                .downcast::<T>()
                .map_err(|_| AtlasError::InstanceTypeMismatch(id));
        }

        let address = entry.address.ok_or(AtlasError::UnresolvedId(id))?;
        let instance = Rc::new(engine.load_object::<T>(address)?);
        let erased: Rc<dyn Any> = instance.clone();
        entry.instance = Some(erased);
        debug!(id, %address, "resolved instance from storage");
        Ok(instance)
    }

    /// Write the resident instance for `id` and record its address
    ///
    /// The current address is reused when the encoding fits, otherwise it is
    /// erased and a new one minted.
    pub fn persist_instance<T: Persist + 'static>(
        &mut self,
        engine: &mut StorageEngine,
        id: UniqueId,
    ) -> Result<StorageAddress> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(AtlasError::UnresolvedId(id))?;
        let instance = entry
            .instance
            .as_ref()
            .ok_or(AtlasError::UnresolvedId(id))?
            .downcast_ref::<T>()
            .ok_or(AtlasError::InstanceTypeMismatch(id))?;

        let address = match entry.address {
            Some(address) if instance.encoded_len() as u64 <= address.size => {
                engine.write_object(address, instance)?;
                address
            }
            previous => {
                let address = engine.store_object(instance)?;
                if let Some(previous) = previous {
                    engine.erase(previous)?;
                }
                address
            }
        };
        entry.address = Some(address);
        Ok(address)
    }

    /// Drop the resident instance of a persisted ID
    ///
    /// Returns false when there is no instance or nothing to reload it from.
    pub fn evict(&mut self, id: UniqueId) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.address.is_some() && entry.instance.is_some() => {
                entry.instance = None;
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn contains(&self, id: UniqueId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn is_resident(&self, id: UniqueId) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.instance.is_some())
    }

    pub fn address(&self, id: UniqueId) -> Option<StorageAddress> {
        self.entries.get(&id).and_then(|entry| entry.address)
    }

    pub fn ids(&self) -> impl Iterator<Item = UniqueId> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persisted form: counter and every ID that has an address
    fn table(&self) -> (UniqueId, Vec<(UniqueId, StorageAddress)>) {
        let addressed = self
            .entries
            .iter()
            .filter_map(|(&id, entry)| entry.address.map(|address| (id, address)))
            .collect();
        (self.next_id, addressed)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Resident-only IDs are not persisted
impl Persist for Registry {
    fn encoded_len(&self) -> usize {
        self.table().encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.table().encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let (next_id, addressed): (UniqueId, Vec<(UniqueId, StorageAddress)>) =
            Persist::decode(input)?;
        let entries = addressed
            .into_iter()
            .map(|(id, address)| {
                let entry = RegistryEntry {
                    address: Some(address),
                    instance: None,
                };
                (id, entry)
            })
            .collect();
        Ok(Self { entries, next_id })
    }
}
