//! IntervalMap implementation
//!
//! BTreeMap keyed by interval start, holding `(end, value)`.

use std::collections::BTreeMap;

use super::{IntervalKey, IntervalValue};

/// Ordered map of non-overlapping closed intervals
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalMap<K, V> {
    map: BTreeMap<K, (K, V)>,
}

impl<K: IntervalKey, V: IntervalValue> IntervalMap<K, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    /// Number of stored intervals
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// All intervals in ascending order as `(start, end, value)`
    pub fn iter(&self) -> impl Iterator<Item = (K, K, &V)> + '_ {
        self.map.iter().map(|(&start, (end, value))| (start, *end, value))
    }

    /// Interval starting exactly at `start`
    pub fn get(&self, start: K) -> Option<(K, &V)> {
        self.map.get(&start).map(|(end, value)| (*end, value))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The interval containing `key`
    pub fn find(&self, key: K) -> Option<(K, K, &V)> {
        let (&start, (end, value)) = self.map.range(..=key).next_back()?;
        if *end >= key {
            Some((start, *end, value))
        } else {
            None
        }
    }

    /// The single interval fully containing `[start, end]`
    pub fn find_range(&self, start: K, end: K) -> Option<(K, K, &V)> {
        assert_range(start, end);
        self.find(start).filter(|&(_, e, _)| e >= end)
    }

    /// Whether any part of `[start, end]` intersects a stored interval
    pub fn has(&self, start: K, end: K) -> bool {
        assert_range(start, end);
        self.find(start).is_some() || self.map.range(start..=end).next().is_some()
    }

    /// Visit every interval intersecting `[start, end]`, clipped to it
    ///
    /// A piece clipped at the front is reported with its advanced value.
    pub fn for_each_interval<F>(&self, start: K, end: K, mut f: F)
    where
        F: FnMut(K, K, &V),
    {
        assert_range(start, end);
        if let Some((s, e, value)) = self.find(start) {
            if s < start {
                let clipped = value.advance(start.offset_from(s));
                f(start, e.min(end), &clipped);
            }
        }
        for (&s, (e, value)) in self.map.range(start..=end) {
            f(s, (*e).min(end), value);
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert `[start, end] -> value`, removing any overlapped region first
    /// and merging with touching intervals that continue the value
    pub fn insert(&mut self, start: K, end: K, value: V) {
        assert_range(start, end);
        if self.has(start, end) {
            self.del(start, end);
        }
        self.place(start, end, value);
    }

    /// Like `insert`, without the overlap probe
    pub fn set(&mut self, start: K, end: K, value: V) {
        assert_range(start, end);
        self.del(start, end);
        self.place(start, end, value);
    }

    /// Remove exactly `[start, end]`
    ///
    /// Intervals are trimmed at either edge, split in two, or dropped when
    /// the range spans them. Returns false when nothing was stored there.
    pub fn del(&mut self, start: K, end: K) -> bool {
        assert_range(start, end);
        let mut starts = Vec::new();
        if let Some((s, _, _)) = self.find(start) {
            if s < start {
                starts.push(s);
            }
        }
        starts.extend(self.map.range(start..=end).map(|(&s, _)| s));
        if starts.is_empty() {
            return false;
        }

        for s in starts {
            let Some((e, value)) = self.map.remove(&s) else {
                continue;
            };
            if e > end {
                let tail = succ(end);
                self.map
                    .insert(tail, (e, value.advance(tail.offset_from(s))));
            }
            if s < start {
                self.map.insert(s, (pred(start), value));
            }
        }
        true
    }

    /// Move the end of the interval starting at `start` to `new_end`
    ///
    /// Growing fails if it would reach the next interval. `f` receives the
    /// prior and the new end once the change is applied.
    pub fn expand<F>(&mut self, start: K, new_end: K, f: F) -> bool
    where
        F: FnOnce(K, K),
    {
        let Some(&(old_end, _)) = self.map.get(&start) else {
            return false;
        };
        if new_end < start {
            return false;
        }
        if new_end > old_end {
            let next_start = self
                .map
                .range(succ(old_end)..)
                .next()
                .map(|(&s, _)| s);
            if matches!(next_start, Some(s) if s <= new_end) {
                return false;
            }
        }
        if let Some(entry) = self.map.get_mut(&start) {
            entry.0 = new_end;
        }
        f(old_end, new_end);
        self.coalesce_right(start);
        true
    }

    /// Split the interval starting at `start` into `[start, mid]` and
    /// `[mid + 1, end]`; `f` derives the right value from the left one
    pub fn split<F>(&mut self, start: K, mid: K, f: F) -> bool
    where
        F: FnOnce(&V) -> V,
    {
        let Some((end, value)) = self.map.get_mut(&start) else {
            return false;
        };
        if mid < start || mid >= *end {
            return false;
        }
        let right_end = *end;
        let right_value = f(&*value);
        *end = mid;
        self.map.insert(succ(mid), (right_end, right_value));
        true
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Store `[start, end]` into a free region, merging with neighbours
    fn place(&mut self, start: K, end: K, value: V) {
        let mut start = start;
        let mut end = end;
        let mut value = value;

        if let Some(before) = start.checked_pred() {
            let left = self
                .find(before)
                .filter(|&(_, e, _)| e == before)
                .filter(|&(s, _, v)| v.advance(start.offset_from(s)) == value)
                .map(|(s, _, v)| (s, v.clone()));
            if let Some((s, v)) = left {
                self.map.remove(&s);
                start = s;
                value = v;
            }
        }

        if let Some(after) = end.checked_succ() {
            let right = self
                .map
                .get(&after)
                .filter(|(_, v)| value.advance(after.offset_from(start)) == *v)
                .map(|(e, _)| *e);
            if let Some(e) = right {
                self.map.remove(&after);
                end = e;
            }
        }

        self.map.insert(start, (end, value));
    }

    /// Merge the interval at `start` with its right neighbour if touching
    fn coalesce_right(&mut self, start: K) {
        let Some((end, value)) = self.map.get(&start) else {
            return;
        };
        let Some(after) = end.checked_succ() else {
            return;
        };
        let expected = value.advance(after.offset_from(start));
        let merged_end = match self.map.get(&after) {
            Some((e, v)) if *v == expected => *e,
            _ => return,
        };
        self.map.remove(&after);
        if let Some(entry) = self.map.get_mut(&start) {
            entry.0 = merged_end;
        }
    }
}

impl<K: IntervalKey, V: IntervalValue> Default for IntervalMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn assert_range<K: IntervalKey>(start: K, end: K) {
    assert!(start <= end, "inverted interval [{:?}, {:?}]", start, end);
}

fn succ<K: IntervalKey>(key: K) -> K {
    key.checked_succ()
        .expect("key below another key has a successor")
}

fn pred<K: IntervalKey>(key: K) -> K {
    key.checked_pred()
        .expect("key above another key has a predecessor")
}
