//! SlotStore implementation

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::address::StorageAddress;
use crate::codec::{self, Decoder, Encoder, Persist};
use crate::engine::StorageEngine;
use crate::error::{AtlasError, Result};

use super::CacheMode;

/// How far past the current end `put_at` may place an index
pub const MAX_INDEX_GAP: usize = 1 << 20;

/// Where a present slot's bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    /// Backing address (may be larger than the encoded object)
    pub address: StorageAddress,
    /// Encoded length of the stored object
    pub len: u64,
}

/// Index-addressed store of `T` objects
///
/// An index has an address iff it is present. Cleared addresses go to a
/// size-ordered pool and are handed to later puts whose encoding fits.
pub struct SlotStore<T> {
    /// Slot table; `None` = absent
    slots: Vec<Option<SlotEntry>>,
    /// Absent indices below `slots.len()`
    vacant: BTreeSet<usize>,
    /// Reusable addresses by size
    free_pool: BTreeMap<u64, Vec<StorageAddress>>,
    /// Decoded objects kept by `CacheMode::Keep`
    cache: HashMap<usize, T>,
    /// Cached objects changed through `get_mut`
    dirty: BTreeSet<usize>,
}

impl<T: Persist> SlotStore<T> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: BTreeSet::new(),
            free_pool: BTreeMap::new(),
            cache: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    // =========================================================================
    // Presence
    // =========================================================================

    /// Size of the index space (one past the highest index ever used)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no index is present
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Number of present indices
    pub fn count(&self) -> usize {
        self.slots.len() - self.vacant.len()
    }

    pub fn has(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn entry(&self, index: usize) -> Option<SlotEntry> {
        self.slots.get(index).copied().flatten()
    }

    /// Present indices in ascending order
    pub fn iter_present(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|_| i))
    }

    /// Index the next `put` will use: the lowest absent one
    pub fn next_index(&self) -> usize {
        self.vacant.first().copied().unwrap_or(self.slots.len())
    }

    /// Addresses waiting in the free pool
    pub fn pooled(&self) -> usize {
        self.free_pool.values().map(Vec::len).sum()
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.contains_key(&index)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Decode the object at `index`
    ///
    /// With `CacheMode::Keep` the decoded object is retained and later calls
    /// return copies of it without decoding again.
    pub fn get(&mut self, engine: &StorageEngine, index: usize, mode: CacheMode) -> Result<T>
    where
        T: Clone,
    {
        if let Some(value) = self.cache.get(&index) {
            return Ok(value.clone());
        }
        let value = self.decode(engine, index)?;
        if mode == CacheMode::Keep {
            self.cache.insert(index, value.clone());
        }
        Ok(value)
    }

    /// Borrow the cached object at `index`, decoding it on first use
    pub fn get_ref(&mut self, engine: &StorageEngine, index: usize) -> Result<&T> {
        self.load_cached(engine, index)?;
        self.cache.get(&index).ok_or(AtlasError::EmptySlot(index))
    }

    /// Mutably borrow the cached object; changes are written by `flush`
    pub fn get_mut(&mut self, engine: &StorageEngine, index: usize) -> Result<&mut T> {
        self.load_cached(engine, index)?;
        self.dirty.insert(index);
        self.cache.get_mut(&index).ok_or(AtlasError::EmptySlot(index))
    }

    /// Visit present indices in `[start, end)`
    pub fn for_each<F>(&self, engine: &StorageEngine, start: usize, end: usize, mut f: F) -> Result<()>
    where
        F: FnMut(usize, &T),
    {
        for index in start..end.min(self.slots.len()) {
            if !self.has(index) {
                continue;
            }
            match self.cache.get(&index) {
                Some(value) => f(index, value),
                None => {
                    let value = self.decode(engine, index)?;
                    f(index, &value);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` at the lowest absent index and return it
    pub fn put(&mut self, engine: &mut StorageEngine, value: T) -> Result<usize> {
        let index = self.next_index();
        self.put_at(engine, value, index)?;
        Ok(index)
    }

    /// Store `value` at `index`, replacing what was there
    ///
    /// `index` may lie at most [`MAX_INDEX_GAP`] past the end of the table.
    pub fn put_at(&mut self, engine: &mut StorageEngine, value: T, index: usize) -> Result<()> {
        let limit = self.slots.len().saturating_add(MAX_INDEX_GAP);
        if index > limit {
            return Err(AtlasError::SlotIndexOutOfRange { index, limit });
        }
        let bytes = codec::to_vec(&value)?;
        self.store_bytes(engine, index, &bytes)?;
        if let Some(cached) = self.cache.get_mut(&index) {
            *cached = value;
        }
        self.dirty.remove(&index);
        Ok(())
    }

    /// Fill every absent index in `[start, end)` from `generate`
    pub fn for_each_empty<F>(
        &mut self,
        engine: &mut StorageEngine,
        start: usize,
        end: usize,
        mut generate: F,
    ) -> Result<usize>
    where
        F: FnMut(usize) -> T,
    {
        let mut filled = 0;
        for index in start..end {
            if self.has(index) {
                continue;
            }
            self.put_at(engine, generate(index), index)?;
            filled += 1;
        }
        Ok(filled)
    }

    /// Remove the object at `index`, pooling its address
    pub fn clear(&mut self, index: usize) -> bool {
        let Some(entry) = self.entry(index) else {
            return false;
        };
        self.slots[index] = None;
        self.vacant.insert(index);
        self.release(entry.address);
        self.cache.remove(&index);
        self.dirty.remove(&index);
        true
    }

    /// Clear every present index in `[start, end)`, returning how many
    pub fn clear_range(&mut self, start: usize, end: usize) -> usize {
        let end = end.min(self.slots.len());
        (start..end).filter(|&index| self.clear(index)).count()
    }

    /// Write back objects changed through `get_mut`
    pub fn flush(&mut self, engine: &mut StorageEngine) -> Result<usize> {
        let dirty = std::mem::take(&mut self.dirty);
        let mut written = 0;
        for index in dirty {
            let bytes = match self.cache.get(&index) {
                Some(value) => codec::to_vec(value)?,
                None => continue,
            };
            self.store_bytes(engine, index, &bytes)?;
            written += 1;
        }
        Ok(written)
    }

    /// Drop clean cached objects
    pub fn evict_clean(&mut self) {
        let dirty = &self.dirty;
        self.cache.retain(|index, _| dirty.contains(index));
    }

    /// Erase every address the store owns
    pub fn destroy(self, engine: &mut StorageEngine) -> Result<()> {
        let live = self.slots.iter().flatten().map(|entry| entry.address);
        let pooled = self.free_pool.values().flatten().copied();
        for address in live.chain(pooled) {
            engine.erase(address)?;
        }
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn decode(&self, engine: &StorageEngine, index: usize) -> Result<T> {
        let entry = self.entry(index).ok_or(AtlasError::EmptySlot(index))?;
        if entry.len == 0 {
            return codec::from_slice(&[]);
        }
        let bytes = engine.read_bytes(StorageAddress::new(entry.address.addr, entry.len))?;
        codec::from_slice(&bytes)
    }

    fn load_cached(&mut self, engine: &StorageEngine, index: usize) -> Result<()> {
        if !self.cache.contains_key(&index) {
            let value = self.decode(engine, index)?;
            self.cache.insert(index, value);
        }
        Ok(())
    }

    /// Write `bytes` for `index`; the previous address is pooled only once
    /// the new one holds the data
    fn store_bytes(&mut self, engine: &mut StorageEngine, index: usize, bytes: &[u8]) -> Result<()> {
        let needed = (bytes.len() as u64).max(1);
        let previous = self.entry(index).map(|entry| entry.address);
        let address = match previous {
            Some(address) if needed <= address.size => {
                engine.write(address, bytes)?;
                address
            }
            _ => {
                let address = self.acquire(engine, needed)?;
                if let Err(e) = engine.write(address, bytes) {
                    self.release(address);
                    return Err(e);
                }
                if let Some(previous) = previous {
                    self.release(previous);
                }
                address
            }
        };

        if index >= self.slots.len() {
            self.vacant.extend(self.slots.len()..index);
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(SlotEntry {
            address,
            len: bytes.len() as u64,
        });
        self.vacant.remove(&index);
        Ok(())
    }

    /// Smallest pooled address of at least `size` bytes, else a new one
    fn acquire(&mut self, engine: &mut StorageEngine, size: u64) -> Result<StorageAddress> {
        let fit = self.free_pool.range(size..).next().map(|(&k, _)| k);
        if let Some(key) = fit {
            if let Some(addresses) = self.free_pool.get_mut(&key) {
                if let Some(address) = addresses.pop() {
                    if addresses.is_empty() {
                        self.free_pool.remove(&key);
                    }
                    debug!(%address, size, "reused pooled address");
                    return Ok(address);
                }
            }
        }
        engine.get_random_address(size)
    }

    fn release(&mut self, address: StorageAddress) {
        self.free_pool.entry(address.size).or_default().push(address);
    }

    /// Persisted form: slot table and free pool
    fn table(&self) -> (Vec<Option<(StorageAddress, u64)>>, Vec<StorageAddress>) {
        let slots = self
            .slots
            .iter()
            .map(|slot| slot.map(|entry| (entry.address, entry.len)))
            .collect();
        let pool = self.free_pool.values().flatten().copied().collect();
        (slots, pool)
    }
}

impl<T: Persist> Default for SlotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stores the slot table and free pool; cached objects are not included,
/// so `flush` pending changes first
impl<T: Persist> Persist for SlotStore<T> {
    fn encoded_len(&self) -> usize {
        self.table().encoded_len()
    }

    fn encode(&self, out: &mut Encoder<'_>) -> Result<()> {
        self.table().encode(out)
    }

    fn decode(input: &mut Decoder<'_>) -> Result<Self> {
        let (slots, pool): (Vec<Option<(StorageAddress, u64)>>, Vec<StorageAddress>) =
            Persist::decode(input)?;

        let mut store = SlotStore::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some((address, len)) => store.slots.push(Some(SlotEntry { address, len })),
                None => {
                    store.slots.push(None);
                    store.vacant.insert(index);
                }
            }
        }
        for address in pool {
            store.release(address);
        }
        Ok(store)
    }
}
