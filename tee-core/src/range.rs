#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Represents a non-empty range of addresses or file offsets.
///
/// It is guaranteed that the range is valid, i.e. start <= end.
pub struct MemoryRange {
    /// The start address of the range.
    start: u64,
    /// The end (inclusive) address of the range.
    end: u64,
}

impl MemoryRange {
    #[must_use]
    #[inline]
    /// Builds the range `[start, start + size)`.
    ///
    /// Returns `None` for empty ranges or if the end does not fit in a `u64`.
    pub const fn from_start_size(start: u64, size: u64) -> Option<Self> {
        if size == 0 {
            return None;
        }
        match start.checked_add(size - 1) {
            Some(end) => Some(Self { start, end }),
            None => None,
        }
    }

    #[must_use]
    #[inline]
    /// Returns the intersection of both ranges, if any.
    pub const fn overlaps(&self, other: &Self) -> Option<Self> {
        if self.start > other.end || other.start > self.end {
            None
        } else {
            Some(Self {
                start: if self.start > other.start {
                    self.start
                } else {
                    other.start
                },
                end: if self.end < other.end {
                    self.end
                } else {
                    other.end
                },
            })
        }
    }

    #[must_use]
    #[inline]
    pub const fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    #[inline]
    /// Last address of the range, inclusive.
    pub const fn end(&self) -> u64 {
        self.end
    }
}
