//! Key ranges
//!
//! A [`BoundRange`] is a pair of [`Bound`]s over [`Key`]. It implements
//! [`RangeBounds`], so it can drive `BTreeMap::range` directly once
//! [`BoundRange::is_empty`] has ruled out inverted ranges.

use crate::types::Key;
use std::ops::{Bound, Range, RangeBounds, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive};

/// A range of keys with independently inclusive or exclusive ends
///
/// # Examples
///
/// ```
/// use keyspan_core::{BoundRange, Key};
///
/// // scan(start = "k1", end = None, include_start = false)
/// let range = BoundRange::new(Some(Key::from("k1")), None, false, false);
/// assert!(!range.contains(&Key::from("k1")));
/// assert!(range.contains(&Key::from("k2")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundRange {
    from: Bound<Key>,
    to: Bound<Key>,
}

impl BoundRange {
    /// Build a range from optional endpoints and inclusivity flags
    ///
    /// A missing endpoint is unbounded and its flag is ignored.
    pub fn new(
        start: Option<Key>,
        end: Option<Key>,
        include_start: bool,
        include_end: bool,
    ) -> Self {
        let from = match start {
            Some(key) if include_start => Bound::Included(key),
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let to = match end {
            Some(key) if include_end => Bound::Included(key),
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        BoundRange { from, to }
    }

    /// Build a range from explicit bounds
    pub fn from_bounds(from: Bound<Key>, to: Bound<Key>) -> Self {
        BoundRange { from, to }
    }

    /// The whole keyspace
    pub fn all() -> Self {
        BoundRange {
            from: Bound::Unbounded,
            to: Bound::Unbounded,
        }
    }

    /// Lower bound
    pub fn start(&self) -> &Bound<Key> {
        &self.from
    }

    /// Upper bound
    pub fn end(&self) -> &Bound<Key> {
        &self.to
    }

    /// Consume the range, returning both bounds
    pub fn into_bounds(self) -> (Bound<Key>, Bound<Key>) {
        (self.from, self.to)
    }

    /// Check if no key can fall within this range
    ///
    /// True when both ends are bounded and the lower end is past the upper
    /// end, or they meet with at least one end exclusive.
    pub fn is_empty(&self) -> bool {
        match (&self.from, &self.to) {
            (Bound::Included(start), Bound::Included(end)) => start > end,
            (Bound::Included(start), Bound::Excluded(end))
            | (Bound::Excluded(start), Bound::Included(end))
            | (Bound::Excluded(start), Bound::Excluded(end)) => start >= end,
            _ => false,
        }
    }

    /// Check if a key falls within this range
    pub fn contains(&self, key: &Key) -> bool {
        RangeBounds::contains(self, key)
    }
}

impl RangeBounds<Key> for BoundRange {
    fn start_bound(&self) -> Bound<&Key> {
        self.from.as_ref()
    }

    fn end_bound(&self) -> Bound<&Key> {
        self.to.as_ref()
    }
}

impl From<(Bound<Key>, Bound<Key>)> for BoundRange {
    fn from((from, to): (Bound<Key>, Bound<Key>)) -> Self {
        BoundRange { from, to }
    }
}

impl From<Range<Key>> for BoundRange {
    fn from(range: Range<Key>) -> Self {
        BoundRange::from_bounds(Bound::Included(range.start), Bound::Excluded(range.end))
    }
}

impl From<RangeInclusive<Key>> for BoundRange {
    fn from(range: RangeInclusive<Key>) -> Self {
        let (start, end) = range.into_inner();
        BoundRange::from_bounds(Bound::Included(start), Bound::Included(end))
    }
}

impl From<RangeFrom<Key>> for BoundRange {
    fn from(range: RangeFrom<Key>) -> Self {
        BoundRange::from_bounds(Bound::Included(range.start), Bound::Unbounded)
    }
}

impl From<RangeTo<Key>> for BoundRange {
    fn from(range: RangeTo<Key>) -> Self {
        BoundRange::from_bounds(Bound::Unbounded, Bound::Excluded(range.end))
    }
}

impl From<RangeToInclusive<Key>> for BoundRange {
    fn from(range: RangeToInclusive<Key>) -> Self {
        BoundRange::from_bounds(Bound::Unbounded, Bound::Included(range.end))
    }
}

impl From<RangeFull> for BoundRange {
    fn from(_: RangeFull) -> Self {
        BoundRange::all()
    }
}
