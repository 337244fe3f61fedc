//! Byte-interval arithmetic and coalescing range sets.

use std::fmt;

use crate::error::{Result, TransferError};

/// A half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    start: u64,
    end: u64,
}

impl Interval {
    /// Create a new interval. Fails when `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(TransferError::IllegalArgument(format!(
                "interval start {start} exceeds end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The empty interval `[0, 0)`.
    pub fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True when the interval covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True when `offset` falls inside the interval.
    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }

    /// True when `other` lies entirely inside this interval.
    pub fn contains(&self, other: &Interval) -> bool {
        other.is_empty() || (other.start >= self.start && other.end <= self.end)
    }

    /// Intersect with a chunk positioned at `[stream_offset, stream_offset + chunk_len)`.
    ///
    /// The result is translated to chunk-local offsets so it can be used
    /// directly as a slice into the chunk buffer. Empty when there is no
    /// overlap.
    pub fn intersect(&self, stream_offset: u64, chunk_len: usize) -> Interval {
        let chunk_end = stream_offset + chunk_len as u64;
        let lo = self.start.max(stream_offset);
        let hi = self.end.min(chunk_end);
        if lo >= hi {
            return Interval::empty();
        }
        Interval {
            start: lo - stream_offset,
            end: hi - stream_offset,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

/// A set of pairwise-disjoint byte ranges.
///
/// Adjacent and overlapping ranges are coalesced on insertion, so the set
/// converges to a single range once a contiguous region is fully covered.
#[derive(Debug, Clone, Default)]
pub struct DisjointRanges {
    // Sorted by start; no two entries overlap or touch.
    ranges: Vec<Interval>,
}

impl DisjointRanges {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a range, coalescing with any overlapping or adjacent entries.
    pub fn add(&mut self, range: Interval) {
        if range.is_empty() {
            return;
        }
        let mut start = range.start;
        let mut end = range.end;

        // First entry that could touch the new range.
        let mut idx = self.ranges.partition_point(|r| r.end < start);
        while idx < self.ranges.len() && self.ranges[idx].start <= end {
            start = start.min(self.ranges[idx].start);
            end = end.max(self.ranges[idx].end);
            self.ranges.remove(idx);
        }
        self.ranges.insert(idx, Interval { start, end });
    }

    /// True iff the set is exactly the single range `[0, length)`.
    pub fn covers(&self, length: u64) -> bool {
        if length == 0 {
            return self.ranges.is_empty();
        }
        self.ranges.len() == 1 && self.ranges[0].start == 0 && self.ranges[0].end == length
    }

    /// Total number of bytes covered across all ranges.
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(Interval::len).sum()
    }

    /// Number of disjoint ranges currently held.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True when no ranges have been added.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// The ranges in ascending order.
    pub fn ranges(&self) -> &[Interval] {
        &self.ranges
    }
}
