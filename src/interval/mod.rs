//! Interval Module
//!
//! Ordered mapping from closed integer ranges to values.
//!
//! ## Responsibilities
//! - Point and range lookup (`find`, `find_range`, `has`)
//! - Insert with overlap removal and coalescing of adjacent intervals
//! - Sub-range deletion (shrink, split, or span several intervals)
//! - In-place growth/shrink and explicit splitting
//!
//! ## Invariants
//! - Intervals never overlap
//! - Two touching intervals are merged whenever the right one's value
//!   *continues* the left one (see [`IntervalValue::advance`])
//!
//! ## Layout
//! ```text
//! BTreeMap<start, (end, value)>
//!
//!   [10 ─ 15]    [20 ───── 30]          [50 ── 60]
//!      "a"           "b"                   "a"
//! ```

mod map;

pub use map::IntervalMap;

/// Integer key usable as an interval boundary
pub trait IntervalKey: Copy + Ord + std::fmt::Debug {
    /// Next key, or None at the top of the domain
    fn checked_succ(self) -> Option<Self>;

    /// Previous key, or None at the bottom of the domain
    fn checked_pred(self) -> Option<Self>;

    /// Number of keys from `base` up to `self` (requires `base <= self`)
    fn offset_from(self, base: Self) -> u64;
}

macro_rules! interval_key {
    ($($ty:ty),*) => {
        $(
            impl IntervalKey for $ty {
                fn checked_succ(self) -> Option<Self> {
                    self.checked_add(1)
                }

                fn checked_pred(self) -> Option<Self> {
                    self.checked_sub(1)
                }

                fn offset_from(self, base: Self) -> u64 {
                    (self as i128 - base as i128) as u64
                }
            }
        )*
    };
}

interval_key!(u16, u32, u64, usize, i32, i64);

/// Value stored against an interval
///
/// `advance(delta)` is the value describing the same interval as seen from
/// `delta` keys after its start. Splitting or trimming the front of an
/// interval uses it to derive the value of the remaining piece, and two
/// touching intervals merge when `left.advance(len(left)) == right`.
///
/// The default keeps the value unchanged, which gives plain equality
/// semantics for labels, ids and flags.
pub trait IntervalValue: Clone + PartialEq {
    fn advance(&self, _delta: u64) -> Self {
        self.clone()
    }
}

impl IntervalValue for () {}
impl IntervalValue for bool {}
impl IntervalValue for u32 {}
impl IntervalValue for u64 {}
impl IntervalValue for i64 {}
impl IntervalValue for String {}
impl IntervalValue for &'static str {}
