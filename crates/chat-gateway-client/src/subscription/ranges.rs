//! Member index ranges

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Inclusive range of member-list indices, `[start, end]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRange {
    start: u32,
    end: u32,
}

impl MemberRange {
    /// Page size the server uses for member lists
    pub const PAGE: u32 = 100;

    /// Range covering both bounds, whichever order they are given in
    #[must_use]
    pub fn new(a: u32, b: u32) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// The `n`th page of the list: `[100n, 100n + 99]`
    #[must_use]
    pub fn page(n: u32) -> Self {
        let start = n.saturating_mul(Self::PAGE);
        Self::new(start, start.saturating_add(Self::PAGE - 1))
    }

    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.start <= index && index <= self.end
    }

    #[must_use]
    pub fn covers(&self, other: &MemberRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl Serialize for MemberRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.start, self.end).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MemberRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (a, b) = <(u32, u32)>::deserialize(deserializer)?;
        Ok(Self::new(a, b))
    }
}

impl std::fmt::Display for MemberRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Sorted set of disjoint, non-adjacent ranges
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<MemberRange>,
}

impl RangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every index of `range` is already in the set
    #[must_use]
    pub fn covers(&self, range: &MemberRange) -> bool {
        self.ranges.iter().any(|r| r.covers(range))
    }

    /// Add a range, merging overlapping and adjacent neighbours
    ///
    /// Returns `true` if coverage grew.
    pub fn insert(&mut self, range: MemberRange) -> bool {
        if self.covers(&range) {
            return false;
        }

        self.ranges.push(range);
        self.ranges.sort_unstable();

        let mut merged: Vec<MemberRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(r.end);
                }
                _ => merged.push(r),
            }
        }
        self.ranges = merged;
        true
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MemberRange] {
        &self.ranges
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
