//! Free list of physical ranges
//!
//! Multimap `length -> offset`, kept as an ordered set of `(length, offset)`
//! pairs so that best fit is a single range query. A second index by offset
//! lets a pushed range absorb the ranges touching it on either side.

use std::collections::{BTreeMap, BTreeSet};

/// Freed physical ranges available for reuse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeList {
    by_len: BTreeSet<(u64, u64)>,
    by_offset: BTreeMap<u64, u64>,
    /// Ranges shorter than this are dropped instead of tracked
    min_size: u64,
    total_bytes: u64,
}

impl FreeList {
    pub fn new(min_size: u64) -> Self {
        Self {
            by_len: BTreeSet::new(),
            by_offset: BTreeMap::new(),
            min_size: min_size.max(1),
            total_bytes: 0,
        }
    }

    /// Track `[offset, offset + len)`, merged with adjacent free ranges
    ///
    /// Returns false if the range is already tracked or, after merging, too
    /// small to keep.
    pub fn push(&mut self, offset: u64, len: u64) -> bool {
        if len == 0 || self.by_offset.contains_key(&offset) {
            return false;
        }
        let mut offset = offset;
        let mut len = len;

        let left = self
            .by_offset
            .range(..offset)
            .next_back()
            .map(|(&o, &l)| (o, l))
            .filter(|&(o, l)| o + l == offset);
        if let Some((o, l)) = left {
            self.remove(o, l);
            offset = o;
            len += l;
        }

        let right = self.by_offset.get(&(offset + len)).copied();
        if let Some(l) = right {
            self.remove(offset + len, l);
            len += l;
        }

        if len < self.min_size {
            return false;
        }
        self.by_len.insert((len, offset));
        self.by_offset.insert(offset, len);
        self.total_bytes += len;
        true
    }

    /// Remove and return the smallest range of at least `size` bytes
    pub fn take(&mut self, size: u64) -> Option<(u64, u64)> {
        let (len, offset) = *self.by_len.range((size, 0)..).next()?;
        self.remove(offset, len);
        Some((offset, len))
    }

    /// Number of tracked ranges
    pub fn len(&self) -> usize {
        self.by_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_len.is_empty()
    }

    /// Sum of tracked range lengths
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// `(offset, len)` pairs ordered by length
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.by_len.iter().map(|&(len, offset)| (offset, len))
    }

    fn remove(&mut self, offset: u64, len: u64) {
        self.by_len.remove(&(len, offset));
        self.by_offset.remove(&offset);
        self.total_bytes -= len;
    }
}
